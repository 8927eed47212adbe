//! Flow stages and the transition table
//!
//! Initial → {AwaitingUpload | AwaitingPaste | ManualEntry} → ReviewingData
//! → {EditingFields → ReviewingData}* → Submitting → PostSubmit
//!
//! `Cancelled`, `TimedOut` and `Closed` are absorbing. The table below is the
//! single source of truth for which actions a stage accepts; the engine
//! rejects anything not listed. Targets are nominal: an action can land
//! somewhere else depending on session data (the last manual field moves on
//! to review, a failed submission stays in `Submitting`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use runlog_common::events::FlowInstanceId;

use super::action::ActionKind;

/// Flow stage of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Entry-method menu
    Initial,
    AwaitingUpload,
    AwaitingPaste,
    /// One field per round-trip
    ManualEntry,
    ReviewingData,
    /// Field selection, then one prompt per selected field
    EditingFields,
    /// Submission in progress or failed and awaiting retry
    Submitting,
    PostSubmit,
    Cancelled,
    TimedOut,
    Closed,
}

impl Stage {
    pub const ALL: [Stage; 11] = [
        Stage::Initial,
        Stage::AwaitingUpload,
        Stage::AwaitingPaste,
        Stage::ManualEntry,
        Stage::ReviewingData,
        Stage::EditingFields,
        Stage::Submitting,
        Stage::PostSubmit,
        Stage::Cancelled,
        Stage::TimedOut,
        Stage::Closed,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Cancelled | Stage::TimedOut | Stage::Closed)
    }
}

/// Stage-specific transitions; universal ones are handled in [`transition`]
const TRANSITIONS: &[(Stage, ActionKind, Stage)] = &[
    (Stage::Initial, ActionKind::StartUpload, Stage::AwaitingUpload),
    (Stage::Initial, ActionKind::StartPaste, Stage::AwaitingPaste),
    (Stage::Initial, ActionKind::StartManual, Stage::ManualEntry),
    (Stage::Initial, ActionKind::EditLast, Stage::EditingFields),
    (Stage::Initial, ActionKind::DeleteLast, Stage::Initial),
    (Stage::Initial, ActionKind::UpdateSettings, Stage::Initial),
    (Stage::Initial, ActionKind::Close, Stage::Closed),
    (Stage::AwaitingUpload, ActionKind::Upload, Stage::ReviewingData),
    (Stage::AwaitingUpload, ActionKind::Back, Stage::Initial),
    (Stage::AwaitingPaste, ActionKind::Paste, Stage::ReviewingData),
    (Stage::AwaitingPaste, ActionKind::Back, Stage::Initial),
    (Stage::ManualEntry, ActionKind::Input, Stage::ManualEntry),
    (Stage::ManualEntry, ActionKind::Back, Stage::ManualEntry),
    (Stage::ReviewingData, ActionKind::Accept, Stage::Submitting),
    (Stage::ReviewingData, ActionKind::Edit, Stage::EditingFields),
    (Stage::ReviewingData, ActionKind::SelectRunType, Stage::ReviewingData),
    (Stage::EditingFields, ActionKind::SelectFields, Stage::EditingFields),
    (Stage::EditingFields, ActionKind::Input, Stage::EditingFields),
    (Stage::EditingFields, ActionKind::Back, Stage::EditingFields),
    (Stage::Submitting, ActionKind::Retry, Stage::Submitting),
    (Stage::Submitting, ActionKind::Edit, Stage::EditingFields),
    (Stage::PostSubmit, ActionKind::Share, Stage::PostSubmit),
    (Stage::PostSubmit, ActionKind::EditSubmitted, Stage::EditingFields),
    (Stage::PostSubmit, ActionKind::StartAnother, Stage::Initial),
    (Stage::PostSubmit, ActionKind::Close, Stage::Closed),
];

/// Nominal target of `action` in `stage`, or `None` when not accepted
pub fn transition(stage: Stage, action: ActionKind) -> Option<Stage> {
    if stage.is_terminal() {
        return None;
    }
    match action {
        ActionKind::Cancel => Some(Stage::Cancelled),
        ActionKind::MainMenu | ActionKind::OpenSettings => Some(Stage::Initial),
        _ => TRANSITIONS
            .iter()
            .find(|(from, kind, _)| *from == stage && *kind == action)
            .map(|(_, _, to)| *to),
    }
}

/// Actions `stage` accepts, in vocabulary order
pub fn available_actions(stage: Stage) -> Vec<ActionKind> {
    ActionKind::ALL
        .into_iter()
        .filter(|kind| transition(stage, *kind).is_some())
        .collect()
}

/// Record of one stage change, for logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub instance: FlowInstanceId,
    pub old_stage: Stage,
    pub new_stage: Stage,
    pub transitioned_at: DateTime<Utc>,
}
