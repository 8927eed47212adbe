//! Prompt builders, one per stage
//!
//! Pure functions of the session. The engine picks one after each step and
//! adds a notice or warning where the step produced one.

use runlog_common::{RunField, RunRecord, RunType, UserSettings};

use crate::render::{InputRequest, Prompt};
use crate::session::Session;

use super::action::ActionKind;
use super::share::{rate_lines, share_lines};
use super::stage::Stage;

const DUPLICATE_WARNING: &str = "This run matches one you already logged. Submitting will update that run.";

/// Prompt for whatever the session is currently doing
pub fn for_session(session: &Session) -> Prompt {
    match session.stage {
        Stage::Initial => main_menu(session),
        Stage::AwaitingUpload => upload(),
        Stage::AwaitingPaste => paste(),
        Stage::ManualEntry => manual_field(session),
        Stage::ReviewingData => review(session),
        Stage::EditingFields if session.edit.is_selecting() => edit_select(session),
        Stage::EditingFields => edit_field(session),
        Stage::Submitting => submit_failed(session),
        Stage::PostSubmit => post_submit(session),
        terminal => finished(terminal),
    }
}

pub fn main_menu(session: &Session) -> Prompt {
    let mut prompt = Prompt::new(Stage::Initial, "Track a Run").actions([
        ActionKind::StartUpload,
        ActionKind::StartPaste,
        ActionKind::StartManual,
        ActionKind::EditLast,
        ActionKind::DeleteLast,
        ActionKind::OpenSettings,
        ActionKind::Close,
    ]);
    if let Some(history) = &session.cached_run_history {
        prompt = prompt.field("Runs logged", history.total().to_string());
        for (run_type, count) in &history.counts_by_type {
            prompt = prompt.field(run_type.as_str(), count.to_string());
        }
    }
    prompt
}

pub fn settings(settings: &UserSettings) -> Prompt {
    let share: Vec<&str> = settings.share_fields.iter().map(|f| f.label()).collect();
    Prompt::new(Stage::Initial, "Settings")
        .field("Scan language", settings.scan_language.clone())
        .field("Timezone", settings.timezone.clone())
        .field("Default run type", settings.default_run_type.as_str())
        .field("Duplicate detection", on_off(settings.auto_detect_duplicates))
        .field("Confirm before submit", on_off(settings.confirm_before_submit))
        .field("Decimal separator", settings.decimal_separator.as_char().to_string())
        .field("Share fields", share.join(", "))
        .actions([ActionKind::UpdateSettings, ActionKind::MainMenu, ActionKind::Cancel])
}

fn on_off(value: bool) -> &'static str {
    if value {
        "On"
    } else {
        "Off"
    }
}

pub fn upload() -> Prompt {
    Prompt::new(Stage::AwaitingUpload, "Upload Screenshot")
        .input(InputRequest::text("Attach a screenshot of your battle report"))
        .actions([ActionKind::Upload, ActionKind::Back, ActionKind::Cancel, ActionKind::MainMenu])
}

pub fn paste() -> Prompt {
    Prompt::new(Stage::AwaitingPaste, "Paste Battle Report")
        .input(InputRequest::text("Paste the battle report text copied from the game"))
        .actions([ActionKind::Paste, ActionKind::Back, ActionKind::Cancel, ActionKind::MainMenu])
}

pub fn manual_field(session: &Session) -> Prompt {
    let (index, total) = session.manual.position();
    let Some(field) = session.manual.current_field() else {
        return review(session);
    };
    let current = session.manual.current_value().map(str::to_string);
    Prompt::new(Stage::ManualEntry, format!("Manual Entry ({} of {})", index, total))
        .input(InputRequest::for_field(field, current))
        .actions([ActionKind::Input, ActionKind::Back, ActionKind::Cancel, ActionKind::MainMenu])
}

fn with_run_fields(mut prompt: Prompt, run: &RunRecord, settings: &UserSettings) -> Prompt {
    for field in RunField::ALL {
        prompt = prompt.field(field.label(), run.field_display(field, settings.decimal_separator));
    }
    for (label, value) in rate_lines(run, settings) {
        prompt = prompt.field(label, value);
    }
    prompt
}

pub fn review(session: &Session) -> Prompt {
    let choices = RunType::ALL.iter().map(|t| t.as_str().to_string()).collect();
    let mut prompt = with_run_fields(Prompt::new(Stage::ReviewingData, "Review Run"), &session.draft_run, &session.settings)
        .input(InputRequest::text("Run type").choices(choices, false))
        .actions([
            ActionKind::Accept,
            ActionKind::Edit,
            ActionKind::SelectRunType,
            ActionKind::Cancel,
            ActionKind::MainMenu,
        ]);
    if session.is_duplicate_run {
        prompt = prompt.warning(DUPLICATE_WARNING);
    }
    if !session.changed_fields.is_empty() {
        let changed: Vec<&str> = session.changed_fields.iter().map(RunField::label).collect();
        prompt = prompt.notice(format!("Updated: {}", changed.join(", ")));
    }
    prompt
}

pub fn edit_select(session: &Session) -> Prompt {
    let choices = RunField::ALL.iter().map(|f| f.label().to_string()).collect();
    with_run_fields(Prompt::new(Stage::EditingFields, "Edit Run"), &session.draft_run, &session.settings)
        .input(InputRequest::text("Choose the fields to change").choices(choices, true))
        .actions([ActionKind::SelectFields, ActionKind::Back, ActionKind::Cancel, ActionKind::MainMenu])
}

pub fn edit_field(session: &Session) -> Prompt {
    let Some(field) = session.edit.current_field() else {
        return edit_select(session);
    };
    let (index, total) = session.edit.position();
    let current = session
        .edit
        .pending_value(field)
        .map(str::to_string)
        .unwrap_or_else(|| session.draft_run.field_text(field));
    Prompt::new(Stage::EditingFields, format!("Edit {} ({} of {})", field.label(), index, total))
        .input(InputRequest::for_field(field, Some(current)))
        .actions([ActionKind::Input, ActionKind::Back, ActionKind::Cancel, ActionKind::MainMenu])
}

pub fn submit_failed(session: &Session) -> Prompt {
    let reason = session.last_error.as_deref().unwrap_or("the backend did not respond");
    with_run_fields(Prompt::new(Stage::Submitting, "Submission Failed"), &session.draft_run, &session.settings)
        .warning(format!("Your run was not saved: {}. Nothing you entered was lost.", reason))
        .actions([ActionKind::Retry, ActionKind::Edit, ActionKind::Cancel, ActionKind::MainMenu])
}

pub fn post_submit(session: &Session) -> Prompt {
    let mut prompt = Prompt::new(Stage::PostSubmit, "Run Logged").actions([
        ActionKind::Share,
        ActionKind::EditSubmitted,
        ActionKind::StartAnother,
        ActionKind::MainMenu,
        ActionKind::Close,
    ]);
    if let Some(run) = &session.last_submitted {
        for (label, value) in share_lines(run, &session.settings) {
            prompt = prompt.field(label, value);
        }
    }
    if let Some(history) = &session.cached_run_history {
        prompt = prompt.field("Runs logged", history.total().to_string());
    }
    prompt
}

/// Closing message for a finished flow
pub fn finished(stage: Stage) -> Prompt {
    let (title, body) = match stage {
        Stage::TimedOut => ("Timed Out", "No response for a while. Run the command again to continue."),
        Stage::Closed => ("Done", "Run the command again to log another run."),
        _ => ("Cancelled", "Nothing was saved. Run the command again to start over."),
    };
    Prompt::new(stage, title).body(body)
}

/// Reply to an action whose session no longer exists
pub fn session_lost() -> Prompt {
    Prompt::new(Stage::Cancelled, "Session Expired").body("This menu is no longer active. Run the command again to start over.")
}

/// Reply after an unexpected failure aborted the flow
pub fn failure() -> Prompt {
    Prompt::new(Stage::Cancelled, "Something Went Wrong")
        .body("The flow was stopped and nothing was saved. Run the command again to start over.")
}
