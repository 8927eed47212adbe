//! Run record model
//!
//! A [`RunRecord`] is one logged play-session. Numeric fields keep their
//! canonical text (plain number or notation-suffixed string) and derive
//! numeric values on demand, so nothing typed by the user is lost.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::duration::RunDuration;
use crate::notation::{format_magnitude, parse_magnitude, parse_magnitude_with, standardize_notation_case, DecimalSeparator};

/// Default cause of death when none was captured
pub const DEFAULT_KILLED_BY: &str = "Apathy";

/// Display text for an unknown tier or wave
pub const UNKNOWN: &str = "Unknown";

/// Tier reached, with the optional `+` qualifier ("at least this tier")
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Tier {
    pub level: Option<u32>,
    pub plus: bool,
}

impl Tier {
    pub fn new(level: u32) -> Self {
        Self {
            level: Some(level),
            plus: false,
        }
    }

    pub fn plus(level: u32) -> Self {
        Self {
            level: Some(level),
            plus: true,
        }
    }

    /// Parse `15`, `15+`, `T15` or `Tier 15+`; anything else is unknown
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let plus = trimmed.ends_with('+');
        let digits: String = trimmed
            .trim_end_matches('+')
            .trim_start_matches(|c: char| c.is_ascii_alphabetic() || c.is_whitespace())
            .trim()
            .to_string();
        match digits.parse::<u32>() {
            Ok(level) => Self {
                level: Some(level),
                plus,
            },
            Err(_) => Self::default(),
        }
    }

    pub fn is_known(&self) -> bool {
        self.level.is_some()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.level {
            Some(level) if self.plus => write!(f, "{}+", level),
            Some(level) => write!(f, "{}", level),
            None => f.write_str(UNKNOWN),
        }
    }
}

/// Parse a wave number in the user's number format
///
/// Grouping separators are dropped and notation suffixes apply (`1.5K` is
/// 1500). Text that is not a whole, non-negative count yields `None`.
pub fn parse_wave(input: &str, separator: DecimalSeparator) -> Option<u64> {
    let trimmed = input.trim();
    if !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let value = parse_magnitude_with(trimmed, separator);
    if value == 0.0 {
        let all_zero = trimmed
            .chars()
            .all(|c| c == '0' || c == separator.as_char() || separator.is_grouping(c));
        return all_zero.then_some(0);
    }
    let rounded = value.round();
    if !value.is_finite() || value < 0.0 || (value - rounded).abs() > 1e-6 * rounded.max(1.0) {
        return None;
    }
    // Saturating cast caps absurd waves instead of wrapping
    Some(rounded as u64)
}

/// Currency amount in canonical notation text
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount {
    text: String,
}

impl Amount {
    pub fn zero() -> Self {
        Self {
            text: "0".to_string(),
        }
    }

    /// Canonicalize typed or extracted text
    ///
    /// Grouping separators are dropped, the decimal mark becomes `.`, and the
    /// suffix case is standardized. Text that does not parse becomes `0`.
    pub fn parse(input: &str, separator: DecimalSeparator) -> Self {
        let value = parse_magnitude_with(input, separator);
        if value == 0.0 {
            return Self::zero();
        }
        let cleaned: String = input
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && !separator.is_grouping(*c))
            .map(|c| if c == ',' { '.' } else { c })
            .collect();
        Self {
            text: standardize_notation_case(&cleaned),
        }
    }

    pub fn from_number(value: f64) -> Self {
        if !value.is_finite() || value == 0.0 {
            return Self::zero();
        }
        let text = if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{}", value as i64)
        } else {
            format!("{}", value)
        };
        Self { text }
    }

    /// Canonical text, e.g. `5M` or `5000000`
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn value(&self) -> f64 {
        parse_magnitude(&self.text)
    }

    /// Loose numeric equality (`"5M"` equals `5000000`)
    pub fn same_value(&self, other: &Amount) -> bool {
        let (a, b) = (self.value(), other.value());
        if a == b {
            return true;
        }
        let scale = a.abs().max(b.abs());
        (a - b).abs() <= scale * 1e-9
    }

    /// Notation text for display in the user's decimal style
    pub fn display(&self, separator: DecimalSeparator) -> String {
        format_magnitude(self.value(), separator)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Kind of run being logged
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RunType {
    #[default]
    Farming,
    Overnight,
    Tournament,
    Milestone,
}

impl RunType {
    pub const ALL: [RunType; 4] = [
        RunType::Farming,
        RunType::Overnight,
        RunType::Tournament,
        RunType::Milestone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Farming => "Farming",
            RunType::Overnight => "Overnight",
            RunType::Tournament => "Tournament",
            RunType::Milestone => "Milestone",
        }
    }

    /// Case-insensitive parse accepting common abbreviations
    pub fn parse(input: &str) -> Option<Self> {
        let lower = input.trim().to_ascii_lowercase();
        if lower.is_empty() {
            return None;
        }
        match lower.as_str() {
            "farm" | "farming" => Some(RunType::Farming),
            "overnight" | "night" | "afk" => Some(RunType::Overnight),
            "tournament" | "tourney" | "tourn" => Some(RunType::Tournament),
            "milestone" | "ms" => Some(RunType::Milestone),
            other => RunType::ALL
                .into_iter()
                .find(|t| t.as_str().to_ascii_lowercase().starts_with(other)),
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-editable fields of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunField {
    Tier,
    Wave,
    Duration,
    Coins,
    Cells,
    Dice,
    KilledBy,
    RunType,
    Date,
    Time,
    Notes,
}

impl RunField {
    pub const ALL: [RunField; 11] = [
        RunField::Tier,
        RunField::Wave,
        RunField::Duration,
        RunField::Coins,
        RunField::Cells,
        RunField::Dice,
        RunField::KilledBy,
        RunField::RunType,
        RunField::Date,
        RunField::Time,
        RunField::Notes,
    ];

    /// Canonical record key
    pub fn key(&self) -> &'static str {
        match self {
            RunField::Tier => "tier",
            RunField::Wave => "wave",
            RunField::Duration => "duration",
            RunField::Coins => "coins",
            RunField::Cells => "cells",
            RunField::Dice => "dice",
            RunField::KilledBy => "killedBy",
            RunField::RunType => "type",
            RunField::Date => "date",
            RunField::Time => "time",
            RunField::Notes => "notes",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunField::Tier => "Tier",
            RunField::Wave => "Wave",
            RunField::Duration => "Duration",
            RunField::Coins => "Coins",
            RunField::Cells => "Cells",
            RunField::Dice => "Dice",
            RunField::KilledBy => "Killed By",
            RunField::RunType => "Run Type",
            RunField::Date => "Date",
            RunField::Time => "Time",
            RunField::Notes => "Notes",
        }
    }

    /// Match a canonical key or label, ignoring case
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        RunField::ALL
            .into_iter()
            .find(|f| f.key().eq_ignore_ascii_case(trimmed) || f.label().eq_ignore_ascii_case(trimmed))
    }
}

impl fmt::Display for RunField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One logged play-session
#[derive(Debug, Clone, PartialEq)]
pub struct RunRecord {
    /// Backend-assigned id; absent for drafts
    pub run_id: Option<String>,
    pub tier: Tier,
    pub wave: Option<u64>,
    pub duration: RunDuration,
    pub killed_by: String,
    pub coins: Amount,
    pub cells: Amount,
    pub dice: Amount,
    pub run_type: RunType,
    pub date: Option<String>,
    pub time: Option<String>,
    pub notes: String,
    /// Extracted fields with no canonical slot
    pub extra: BTreeMap<String, String>,
}

impl Default for RunRecord {
    fn default() -> Self {
        Self {
            run_id: None,
            tier: Tier::default(),
            wave: None,
            duration: RunDuration::default(),
            killed_by: DEFAULT_KILLED_BY.to_string(),
            coins: Amount::zero(),
            cells: Amount::zero(),
            dice: Amount::zero(),
            run_type: RunType::default(),
            date: None,
            time: None,
            notes: String::new(),
            extra: BTreeMap::new(),
        }
    }
}

impl RunRecord {
    /// Empty draft of the given type
    pub fn draft(run_type: RunType) -> Self {
        Self {
            run_type,
            ..Self::default()
        }
    }

    /// Canonical text of one field, as stored
    pub fn field_text(&self, field: RunField) -> String {
        match field {
            RunField::Tier => self.tier.to_string(),
            RunField::Wave => self.wave.map_or_else(|| UNKNOWN.to_string(), |w| w.to_string()),
            RunField::Duration => self.duration.to_string(),
            RunField::Coins => self.coins.to_string(),
            RunField::Cells => self.cells.to_string(),
            RunField::Dice => self.dice.to_string(),
            RunField::KilledBy => self.killed_by.clone(),
            RunField::RunType => self.run_type.to_string(),
            RunField::Date => self.date.clone().unwrap_or_default(),
            RunField::Time => self.time.clone().unwrap_or_default(),
            RunField::Notes => self.notes.clone(),
        }
    }

    /// Field text for display, amounts in notation with the user's separator
    pub fn field_display(&self, field: RunField, separator: DecimalSeparator) -> String {
        match field {
            RunField::Coins => self.coins.display(separator),
            RunField::Cells => self.cells.display(separator),
            RunField::Dice => self.dice.display(separator),
            RunField::Date | RunField::Time | RunField::Notes => {
                let text = self.field_text(field);
                if text.is_empty() {
                    "-".to_string()
                } else {
                    text
                }
            }
            other => self.field_text(other),
        }
    }

    /// Apply typed text to a field
    ///
    /// Text that does not parse falls back to the field default rather than
    /// failing, so a bad value is visible and editable instead of blocking.
    pub fn set_field(&mut self, field: RunField, raw: &str, separator: DecimalSeparator) {
        let raw = raw.trim();
        match field {
            RunField::Tier => self.tier = Tier::parse(raw),
            RunField::Wave => self.wave = parse_wave(raw, separator),
            RunField::Duration => self.duration = RunDuration::parse(raw),
            RunField::Coins => self.coins = Amount::parse(raw, separator),
            RunField::Cells => self.cells = Amount::parse(raw, separator),
            RunField::Dice => self.dice = Amount::parse(raw, separator),
            RunField::KilledBy => {
                self.killed_by = if raw.is_empty() {
                    DEFAULT_KILLED_BY.to_string()
                } else {
                    title_case(raw)
                }
            }
            RunField::RunType => self.run_type = RunType::parse(raw).unwrap_or_default(),
            RunField::Date => self.date = (!raw.is_empty()).then(|| raw.to_string()),
            RunField::Time => self.time = (!raw.is_empty()).then(|| raw.to_string()),
            RunField::Notes => self.notes = raw.to_string(),
        }
    }

    /// Copy one field's value from another record
    pub fn copy_field_from(&mut self, other: &RunRecord, field: RunField) {
        match field {
            RunField::Tier => self.tier = other.tier,
            RunField::Wave => self.wave = other.wave,
            RunField::Duration => self.duration = other.duration,
            RunField::Coins => self.coins = other.coins.clone(),
            RunField::Cells => self.cells = other.cells.clone(),
            RunField::Dice => self.dice = other.dice.clone(),
            RunField::KilledBy => self.killed_by = other.killed_by.clone(),
            RunField::RunType => self.run_type = other.run_type,
            RunField::Date => self.date = other.date.clone(),
            RunField::Time => self.time = other.time.clone(),
            RunField::Notes => self.notes = other.notes.clone(),
        }
    }

    /// Fill absent date/time from the capture instant in the user's offset
    pub fn stamp_capture_time(&mut self, captured_at: DateTime<Utc>, offset: FixedOffset) {
        let local = captured_at.with_timezone(&offset);
        if self.date.is_none() {
            self.date = Some(local.format("%Y-%m-%d").to_string());
        }
        if self.time.is_none() {
            self.time = Some(local.format("%H:%M:%S").to_string());
        }
    }

    /// Combined `date time` text when both parts are known
    pub fn battle_date(&self) -> Option<String> {
        match (&self.date, &self.time) {
            (Some(d), Some(t)) => Some(format!("{} {}", d, t)),
            _ => None,
        }
    }
}

/// `the ORB` → `The Orb`
pub fn title_case(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
