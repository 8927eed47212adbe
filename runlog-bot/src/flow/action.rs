//! User action vocabulary
//!
//! Everything the UI layer can send back to a flow. [`ActionKind`] is the
//! payload-free mirror used by the transition table and by prompts to list
//! which buttons are available.

use std::fmt;

use serde::{Deserialize, Serialize};

use runlog_common::{RunField, RunType, UserSettings};

/// A user-originated action with its payload
#[derive(Debug, Clone, PartialEq)]
pub enum UserAction {
    StartUpload,
    StartPaste,
    StartManual,
    EditLast,
    DeleteLast,
    OpenSettings,
    UpdateSettings(UserSettings),
    Upload { bytes: Vec<u8>, url: String, filename: String },
    Paste(String),
    /// Typed value for the field currently being prompted
    Input(String),
    Back,
    Accept,
    Edit,
    SelectRunType(RunType),
    /// Fields chosen for an edit pass, in prompt order
    SelectFields(Vec<RunField>),
    Retry,
    Share,
    EditSubmitted,
    StartAnother,
    MainMenu,
    Close,
    Cancel,
}

impl UserAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            UserAction::StartUpload => ActionKind::StartUpload,
            UserAction::StartPaste => ActionKind::StartPaste,
            UserAction::StartManual => ActionKind::StartManual,
            UserAction::EditLast => ActionKind::EditLast,
            UserAction::DeleteLast => ActionKind::DeleteLast,
            UserAction::OpenSettings => ActionKind::OpenSettings,
            UserAction::UpdateSettings(_) => ActionKind::UpdateSettings,
            UserAction::Upload { .. } => ActionKind::Upload,
            UserAction::Paste(_) => ActionKind::Paste,
            UserAction::Input(_) => ActionKind::Input,
            UserAction::Back => ActionKind::Back,
            UserAction::Accept => ActionKind::Accept,
            UserAction::Edit => ActionKind::Edit,
            UserAction::SelectRunType(_) => ActionKind::SelectRunType,
            UserAction::SelectFields(_) => ActionKind::SelectFields,
            UserAction::Retry => ActionKind::Retry,
            UserAction::Share => ActionKind::Share,
            UserAction::EditSubmitted => ActionKind::EditSubmitted,
            UserAction::StartAnother => ActionKind::StartAnother,
            UserAction::MainMenu => ActionKind::MainMenu,
            UserAction::Close => ActionKind::Close,
            UserAction::Cancel => ActionKind::Cancel,
        }
    }
}

/// Action identifier without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    StartUpload,
    StartPaste,
    StartManual,
    EditLast,
    DeleteLast,
    OpenSettings,
    UpdateSettings,
    Upload,
    Paste,
    Input,
    Back,
    Accept,
    Edit,
    SelectRunType,
    SelectFields,
    Retry,
    Share,
    EditSubmitted,
    StartAnother,
    MainMenu,
    Close,
    Cancel,
}

impl ActionKind {
    pub const ALL: [ActionKind; 22] = [
        ActionKind::StartUpload,
        ActionKind::StartPaste,
        ActionKind::StartManual,
        ActionKind::EditLast,
        ActionKind::DeleteLast,
        ActionKind::OpenSettings,
        ActionKind::UpdateSettings,
        ActionKind::Upload,
        ActionKind::Paste,
        ActionKind::Input,
        ActionKind::Back,
        ActionKind::Accept,
        ActionKind::Edit,
        ActionKind::SelectRunType,
        ActionKind::SelectFields,
        ActionKind::Retry,
        ActionKind::Share,
        ActionKind::EditSubmitted,
        ActionKind::StartAnother,
        ActionKind::MainMenu,
        ActionKind::Close,
        ActionKind::Cancel,
    ];

    /// Button caption
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::StartUpload => "Upload Screenshot",
            ActionKind::StartPaste => "Paste Report",
            ActionKind::StartManual => "Manual Entry",
            ActionKind::EditLast => "Edit Last Run",
            ActionKind::DeleteLast => "Delete Last Run",
            ActionKind::OpenSettings => "Settings",
            ActionKind::UpdateSettings => "Save Settings",
            ActionKind::Upload => "Upload",
            ActionKind::Paste => "Paste",
            ActionKind::Input => "Enter Value",
            ActionKind::Back => "Back",
            ActionKind::Accept => "Accept",
            ActionKind::Edit => "Edit",
            ActionKind::SelectRunType => "Run Type",
            ActionKind::SelectFields => "Choose Fields",
            ActionKind::Retry => "Retry",
            ActionKind::Share => "Share",
            ActionKind::EditSubmitted => "Edit Run",
            ActionKind::StartAnother => "Log Another",
            ActionKind::MainMenu => "Main Menu",
            ActionKind::Close => "Close",
            ActionKind::Cancel => "Cancel",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
