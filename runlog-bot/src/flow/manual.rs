//! Manual entry cursor
//!
//! Walks a fixed ordered field list one prompt at a time. Values are kept as
//! typed so that stepping back shows exactly what the user entered.

use std::collections::BTreeMap;

use runlog_common::{DecimalSeparator, RunField, RunRecord};

/// Outcome of recording a value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualStep {
    Prompt(RunField),
    Complete,
}

/// Outcome of stepping back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualBack {
    Prompt(RunField),
    /// Back from the first field leaves manual entry
    Exit,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManualEntry {
    fields: Vec<RunField>,
    cursor: usize,
    values: BTreeMap<RunField, String>,
}

impl ManualEntry {
    pub fn start(fields: Vec<RunField>) -> Self {
        Self {
            fields,
            cursor: 0,
            values: BTreeMap::new(),
        }
    }

    /// Field awaiting input, `None` once every field is answered
    pub fn current_field(&self) -> Option<RunField> {
        self.fields.get(self.cursor).copied()
    }

    /// Previously entered text for the current field
    pub fn current_value(&self) -> Option<&str> {
        self.current_field()
            .and_then(|field| self.values.get(&field))
            .map(String::as_str)
    }

    /// 1-based position and total, for "Field 2 of 7"
    pub fn position(&self) -> (usize, usize) {
        (self.cursor + 1, self.fields.len())
    }

    pub fn record(&mut self, text: &str) -> ManualStep {
        let Some(field) = self.current_field() else {
            return ManualStep::Complete;
        };
        self.values.insert(field, text.trim().to_string());
        self.cursor += 1;
        match self.current_field() {
            Some(next) => ManualStep::Prompt(next),
            None => ManualStep::Complete,
        }
    }

    pub fn back(&mut self) -> ManualBack {
        if self.cursor == 0 {
            return ManualBack::Exit;
        }
        self.cursor -= 1;
        match self.current_field() {
            Some(field) => ManualBack::Prompt(field),
            None => ManualBack::Exit,
        }
    }

    /// Write every entered value into `run`
    pub fn apply_to(&self, run: &mut RunRecord, separator: DecimalSeparator) {
        for (field, text) in &self.values {
            run.set_field(*field, text, separator);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runlog_common::{RunType, Tier};

    fn three() -> ManualEntry {
        ManualEntry::start(vec![RunField::Tier, RunField::Wave, RunField::Coins])
    }

    #[test]
    fn test_back_shows_previous_value() {
        let mut entry = three();
        assert_eq!(entry.record("12"), ManualStep::Prompt(RunField::Wave));
        assert_eq!(entry.back(), ManualBack::Prompt(RunField::Tier));
        assert_eq!(entry.current_value(), Some("12"));
        assert_eq!(entry.back(), ManualBack::Exit);
    }

    #[test]
    fn test_complete_and_apply() {
        let mut entry = three();
        entry.record("12+");
        entry.record("1500");
        assert_eq!(entry.position(), (3, 3));
        assert_eq!(entry.record("2.5b"), ManualStep::Complete);
        assert_eq!(entry.current_field(), None);

        let mut run = RunRecord::draft(RunType::Farming);
        entry.apply_to(&mut run, DecimalSeparator::Period);
        assert_eq!(run.tier, Tier::plus(12));
        assert_eq!(run.wave, Some(1500));
        assert!((run.coins.value() - 2.5e9).abs() < 1.0);
    }

    #[test]
    fn test_reentered_value_replaces_old() {
        let mut entry = three();
        entry.record("5");
        entry.back();
        entry.record("6");
        let mut run = RunRecord::default();
        entry.apply_to(&mut run, DecimalSeparator::Period);
        assert_eq!(run.tier, Tier::new(6));
    }
}
