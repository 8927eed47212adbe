//! Render instructions
//!
//! The flow never draws anything itself. It hands a [`Prompt`] to the
//! [`Renderer`], which shows it to the user however the chat surface allows
//! and later feeds the user's choice back as a `UserAction`.

use std::fmt::Write as _;
use std::io::Write as _;

use async_trait::async_trait;

use runlog_common::events::FlowInstanceId;
use runlog_common::{Error, Result, RunField};

use crate::flow::action::ActionKind;
use crate::flow::stage::Stage;

/// One name/value line of a prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptField {
    pub name: String,
    pub value: String,
}

/// Request for typed or selected input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputRequest {
    pub label: String,
    /// Run field being asked for, if any
    pub field: Option<RunField>,
    /// Value to show as current (previous answer or stored value)
    pub current: Option<String>,
    /// Fixed choices for select-style input
    pub choices: Vec<String>,
    pub multi_select: bool,
}

impl InputRequest {
    pub fn text(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            field: None,
            current: None,
            choices: Vec::new(),
            multi_select: false,
        }
    }

    pub fn for_field(field: RunField, current: Option<String>) -> Self {
        Self {
            label: field.label().to_string(),
            field: Some(field),
            current,
            choices: Vec::new(),
            multi_select: false,
        }
    }

    pub fn choices(mut self, choices: Vec<String>, multi_select: bool) -> Self {
        self.choices = choices;
        self.multi_select = multi_select;
        self
    }
}

/// What to show the user next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub stage: Stage,
    pub title: String,
    pub fields: Vec<PromptField>,
    /// Free text shown under the title (share output, help)
    pub body: Option<String>,
    pub actions: Vec<ActionKind>,
    pub input: Option<InputRequest>,
    /// Shown as a warning banner, e.g. a detected duplicate
    pub warning: Option<String>,
    /// Neutral status line, e.g. "Run logged"
    pub notice: Option<String>,
}

impl Prompt {
    pub fn new(stage: Stage, title: impl Into<String>) -> Self {
        Self {
            stage,
            title: title.into(),
            fields: Vec::new(),
            body: None,
            actions: Vec::new(),
            input: None,
            warning: None,
            notice: None,
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push(PromptField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = ActionKind>) -> Self {
        self.actions = actions.into_iter().collect();
        self
    }

    pub fn input(mut self, input: InputRequest) -> Self {
        self.input = Some(input);
        self
    }

    pub fn warning(mut self, warning: impl Into<String>) -> Self {
        self.warning = Some(warning.into());
        self
    }

    pub fn notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }

    pub fn offers(&self, action: ActionKind) -> bool {
        self.actions.contains(&action)
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

/// Delivers prompts to the user
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, user_id: &str, instance: FlowInstanceId, prompt: Prompt) -> Result<()>;
}

/// Plain-text layout of a prompt
pub fn format_prompt(prompt: &Prompt) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "== {} ==", prompt.title);
    if let Some(notice) = &prompt.notice {
        let _ = writeln!(out, "{}", notice);
    }
    if let Some(warning) = &prompt.warning {
        let _ = writeln!(out, "! {}", warning);
    }
    for field in &prompt.fields {
        let _ = writeln!(out, "  {:<12} {}", field.name, field.value);
    }
    if let Some(body) = &prompt.body {
        let _ = writeln!(out, "{}", body);
    }
    if let Some(input) = &prompt.input {
        match &input.current {
            Some(current) => {
                let _ = writeln!(out, "> {} (current: {})", input.label, current);
            }
            None => {
                let _ = writeln!(out, "> {}", input.label);
            }
        }
        if !input.choices.is_empty() {
            let _ = writeln!(out, "  choices: {}", input.choices.join(", "));
        }
    }
    let actions: Vec<&str> = prompt.actions.iter().map(ActionKind::label).collect();
    let _ = write!(out, "[{}]", actions.join("] ["));
    out
}

/// Writes prompts to stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleRenderer;

#[async_trait]
impl Renderer for ConsoleRenderer {
    async fn render(&self, user_id: &str, instance: FlowInstanceId, prompt: Prompt) -> Result<()> {
        tracing::debug!(user_id = %user_id, instance = %instance, stage = ?prompt.stage, "Rendering prompt");
        let text = format_prompt(&prompt);
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "\n{}", text).map_err(Error::Io)?;
        stdout.flush().map_err(Error::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_prompt() {
        let prompt = Prompt::new(Stage::ManualEntry, "Manual Entry (1 of 3)")
            .field("Tier", "12")
            .input(InputRequest::for_field(RunField::Tier, Some("12".to_string())))
            .warning("careful")
            .actions([ActionKind::Back, ActionKind::Cancel]);

        let text = format_prompt(&prompt);
        assert!(text.starts_with("== Manual Entry (1 of 3) =="));
        assert!(text.contains("! careful"));
        assert!(text.contains("> Tier (current: 12)"));
        assert!(text.ends_with("[Back] [Cancel]"));
        assert!(prompt.offers(ActionKind::Back));
        assert_eq!(prompt.field_value("Tier"), Some("12"));
    }
}
