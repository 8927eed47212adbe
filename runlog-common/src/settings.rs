//! Per-user preferences
//!
//! Stored by the submission backend and cached in the user's session.

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

use crate::notation::DecimalSeparator;
use crate::run::RunType;

/// Fields that can be included when a run is shared to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShareField {
    Tier,
    Wave,
    Duration,
    Coins,
    Cells,
    Dice,
    CoinsPerHour,
    CellsPerHour,
    DicePerHour,
    KilledBy,
    RunType,
    Date,
    Notes,
}

impl ShareField {
    pub fn label(&self) -> &'static str {
        match self {
            ShareField::Tier => "Tier",
            ShareField::Wave => "Wave",
            ShareField::Duration => "Duration",
            ShareField::Coins => "Coins",
            ShareField::Cells => "Cells",
            ShareField::Dice => "Dice",
            ShareField::CoinsPerHour => "Coins/hr",
            ShareField::CellsPerHour => "Cells/hr",
            ShareField::DicePerHour => "Dice/hr",
            ShareField::KilledBy => "Killed By",
            ShareField::RunType => "Run Type",
            ShareField::Date => "Date",
            ShareField::Notes => "Notes",
        }
    }
}

fn default_share_fields() -> Vec<ShareField> {
    vec![
        ShareField::Tier,
        ShareField::Wave,
        ShareField::Duration,
        ShareField::Coins,
        ShareField::Cells,
        ShareField::CoinsPerHour,
        ShareField::CellsPerHour,
        ShareField::KilledBy,
    ]
}

/// User preferences with built-in defaults for anything the backend omits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSettings {
    /// OCR language code
    pub scan_language: String,
    /// UTC offset such as `+02:00`, or `UTC`
    pub timezone: String,
    pub default_run_type: RunType,
    pub auto_detect_duplicates: bool,
    pub confirm_before_submit: bool,
    pub decimal_separator: DecimalSeparator,
    pub share_fields: Vec<ShareField>,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            scan_language: "eng".to_string(),
            timezone: "+00:00".to_string(),
            default_run_type: RunType::Farming,
            auto_detect_duplicates: true,
            confirm_before_submit: true,
            decimal_separator: DecimalSeparator::Period,
            share_fields: default_share_fields(),
        }
    }
}

impl UserSettings {
    /// Timezone as a fixed offset; unrecognised text means UTC
    pub fn utc_offset(&self) -> FixedOffset {
        parse_utc_offset(&self.timezone).unwrap_or_else(utc)
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Parse `UTC`, `Z`, `+2`, `-05:30` or `+0530`
pub fn parse_utc_offset(input: &str) -> Option<FixedOffset> {
    let trimmed = input.trim();
    let upper = trimmed.to_ascii_uppercase();
    if upper == "UTC" || upper == "GMT" || upper == "Z" {
        return Some(utc());
    }
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);

    let (sign, body) = match rest.chars().next()? {
        '+' => (1, &rest[1..]),
        '-' => (-1, &rest[1..]),
        _ => return None,
    };
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit() || c == ':') {
        return None;
    }

    let (hours, minutes) = match body.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None if body.len() == 4 => (body[..2].parse().ok()?, body[2..].parse().ok()?),
        None => (body.parse().ok()?, 0),
    };
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = UserSettings::default();
        assert!(s.auto_detect_duplicates);
        assert!(s.confirm_before_submit);
        assert_eq!(s.default_run_type, RunType::Farming);
        assert_eq!(s.utc_offset().local_minus_utc(), 0);
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let s: UserSettings =
            serde_json::from_value(serde_json::json!({ "confirmBeforeSubmit": false, "decimalSeparator": "comma" }))
                .unwrap();
        assert!(!s.confirm_before_submit);
        assert_eq!(s.decimal_separator, DecimalSeparator::Comma);
        assert_eq!(s.scan_language, "eng");
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_utc_offset("+2").unwrap().local_minus_utc(), 7200);
        assert_eq!(parse_utc_offset("-05:30").unwrap().local_minus_utc(), -19800);
        assert_eq!(parse_utc_offset("+0530").unwrap().local_minus_utc(), 19800);
        assert_eq!(parse_utc_offset("UTC+1").unwrap().local_minus_utc(), 3600);
        assert!(parse_utc_offset("Europe/Paris").is_none());
        assert!(parse_utc_offset("+25").is_none());
        assert!(parse_utc_offset("+-5").is_none());
        assert!(parse_utc_offset("+").is_none());
    }

    #[test]
    fn test_non_ascii_timezone_falls_back_to_utc() {
        for timezone in ["+1é1", "-é", "UTC+０５", "+12é"] {
            assert!(parse_utc_offset(timezone).is_none(), "{timezone}");
            let settings = UserSettings {
                timezone: timezone.to_string(),
                ..UserSettings::default()
            };
            assert_eq!(settings.utc_offset().local_minus_utc(), 0, "{timezone}");
        }
    }
}
