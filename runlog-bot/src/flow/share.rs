//! Share output and derived rates

use runlog_common::duration::format_hourly_rate;
use runlog_common::settings::ShareField;
use runlog_common::{RunField, RunRecord, UserSettings};

/// Label and display value for one share field; `None` when there is nothing to show
pub fn share_value(run: &RunRecord, field: ShareField, settings: &UserSettings) -> Option<String> {
    let sep = settings.decimal_separator;
    let value = match field {
        ShareField::Tier => run.tier.to_string(),
        ShareField::Wave => run.field_text(RunField::Wave),
        ShareField::Duration => run.duration.to_string(),
        ShareField::Coins => run.coins.display(sep),
        ShareField::Cells => run.cells.display(sep),
        ShareField::Dice => run.dice.display(sep),
        ShareField::CoinsPerHour => format_hourly_rate(run.coins.value(), &run.duration, sep),
        ShareField::CellsPerHour => format_hourly_rate(run.cells.value(), &run.duration, sep),
        ShareField::DicePerHour => format_hourly_rate(run.dice.value(), &run.duration, sep),
        ShareField::KilledBy => run.killed_by.clone(),
        ShareField::RunType => run.run_type.to_string(),
        ShareField::Date => run.battle_date().or_else(|| run.date.clone())?,
        ShareField::Notes => {
            if run.notes.is_empty() {
                return None;
            }
            run.notes.clone()
        }
    };
    Some(value)
}

/// Name/value pairs in the user's chosen order
pub fn share_lines(run: &RunRecord, settings: &UserSettings) -> Vec<(&'static str, String)> {
    settings
        .share_fields
        .iter()
        .filter_map(|field| share_value(run, *field, settings).map(|v| (field.label(), v)))
        .collect()
}

/// Text posted when a user shares a run
pub fn share_text(user_name: &str, run: &RunRecord, settings: &UserSettings) -> String {
    let mut text = format!("{} logged a {} run", user_name, run.run_type);
    for (label, value) in share_lines(run, settings) {
        text.push('\n');
        text.push_str(label);
        text.push_str(": ");
        text.push_str(&value);
    }
    text
}

/// Hourly rate lines shown under the review fields
pub fn rate_lines(run: &RunRecord, settings: &UserSettings) -> Vec<(&'static str, String)> {
    [ShareField::CoinsPerHour, ShareField::CellsPerHour, ShareField::DicePerHour]
        .into_iter()
        .filter_map(|field| share_value(run, field, settings).map(|v| (field.label(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlog_common::{Amount, DecimalSeparator, RunDuration, Tier};

    fn run() -> RunRecord {
        RunRecord {
            tier: Tier::plus(11),
            wave: Some(4000),
            duration: RunDuration::new(2, 0, 0),
            coins: Amount::parse("10T", DecimalSeparator::Period),
            cells: Amount::parse("1800", DecimalSeparator::Period),
            ..RunRecord::default()
        }
    }

    #[test]
    fn test_share_text_follows_settings_order() {
        let settings = UserSettings {
            share_fields: vec![ShareField::Wave, ShareField::Tier, ShareField::CoinsPerHour, ShareField::Notes],
            ..UserSettings::default()
        };
        let text = share_text("ana", &run(), &settings);
        assert_eq!(text, "ana logged a Farming run\nWave: 4000\nTier: 11+\nCoins/hr: 5T");
    }

    #[test]
    fn test_rates_respect_separator() {
        let settings = UserSettings {
            decimal_separator: DecimalSeparator::Comma,
            ..UserSettings::default()
        };
        let rates = rate_lines(&run(), &settings);
        assert_eq!(rates[0], ("Coins/hr", "5T".to_string()));
        assert_eq!(rates[1], ("Cells/hr", "900".to_string()));
        assert_eq!(rates[2], ("Dice/hr", "0".to_string()));
    }
}
