//! Edit pass over a snapshot of the draft
//!
//! The user picks a subset of fields, answers one prompt per field, and the
//! answers are merged into a clone of the pre-edit snapshot. Only fields whose
//! value actually changed are overwritten and reported.

use std::collections::BTreeMap;

use runlog_common::{DecimalSeparator, RunField, RunRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditStep {
    Prompt(RunField),
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditBack {
    Prompt(RunField),
    /// Back from the first field returns to field selection
    SelectFields,
    /// Back from field selection abandons the pass
    ExitToReview,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditPass {
    selecting: bool,
    fields: Vec<RunField>,
    cursor: usize,
    pending: BTreeMap<RunField, String>,
}

impl Default for EditPass {
    fn default() -> Self {
        Self::begin()
    }
}

impl EditPass {
    /// New pass, waiting for field selection
    pub fn begin() -> Self {
        Self {
            selecting: true,
            fields: Vec::new(),
            cursor: 0,
            pending: BTreeMap::new(),
        }
    }

    pub fn is_selecting(&self) -> bool {
        self.selecting
    }

    /// Fix the fields to edit; duplicates are dropped, order kept
    pub fn select(&mut self, fields: Vec<RunField>) -> EditStep {
        let mut unique = Vec::with_capacity(fields.len());
        for field in fields {
            if !unique.contains(&field) {
                unique.push(field);
            }
        }
        self.fields = unique;
        self.cursor = 0;
        self.pending.clear();
        self.selecting = false;
        match self.current_field() {
            Some(field) => EditStep::Prompt(field),
            None => EditStep::Complete,
        }
    }

    pub fn current_field(&self) -> Option<RunField> {
        if self.selecting {
            return None;
        }
        self.fields.get(self.cursor).copied()
    }

    /// Answer already given for `field` during this pass
    pub fn pending_value(&self, field: RunField) -> Option<&str> {
        self.pending.get(&field).map(String::as_str)
    }

    /// 1-based position and total
    pub fn position(&self) -> (usize, usize) {
        (self.cursor + 1, self.fields.len())
    }

    pub fn record(&mut self, text: &str) -> EditStep {
        let Some(field) = self.current_field() else {
            return EditStep::Complete;
        };
        self.pending.insert(field, text.trim().to_string());
        self.cursor += 1;
        match self.current_field() {
            Some(next) => EditStep::Prompt(next),
            None => EditStep::Complete,
        }
    }

    pub fn back(&mut self) -> EditBack {
        if self.selecting {
            return EditBack::ExitToReview;
        }
        if self.cursor == 0 {
            self.selecting = true;
            self.pending.clear();
            return EditBack::SelectFields;
        }
        self.cursor -= 1;
        match self.current_field() {
            Some(field) => EditBack::Prompt(field),
            None => EditBack::SelectFields,
        }
    }

    pub fn pending(&self) -> &BTreeMap<RunField, String> {
        &self.pending
    }
}

fn field_changed(before: &RunRecord, after: &RunRecord, field: RunField) -> bool {
    match field {
        RunField::Coins => !before.coins.same_value(&after.coins),
        RunField::Cells => !before.cells.same_value(&after.cells),
        RunField::Dice => !before.dice.same_value(&after.dice),
        other => before.field_text(other) != after.field_text(other),
    }
}

/// Merge typed answers into a clone of `original`
///
/// Returns the merged record and the fields that changed, in field order.
pub fn merge_edits(
    original: &RunRecord,
    pending: &BTreeMap<RunField, String>,
    separator: DecimalSeparator,
) -> (RunRecord, Vec<RunField>) {
    let mut merged = original.clone();
    let mut changed = Vec::new();
    for (field, text) in pending {
        let mut candidate = original.clone();
        candidate.set_field(*field, text, separator);
        if field_changed(original, &candidate, *field) {
            merged.copy_field_from(&candidate, *field);
            changed.push(*field);
        }
    }
    (merged, changed)
}
