//! Line-oriented console driver
//!
//! Maps typed commands onto flow actions so the bot can be exercised from a
//! terminal against the console renderer.

use std::path::PathBuf;

use serde_json::Value;

use runlog_common::{Error, Result, RunField, RunType, UserSettings};

use crate::flow::UserAction;

/// Terminates a multi-line paste
pub const PASTE_TERMINATOR: &str = ".";

pub const HELP: &str = "\
commands:
  start [user]          begin a flow (default user: console)
  upload <path>         attach a screenshot file
  paste                 paste a battle report; end with a line containing only '.'
  manual | edit-last | delete-last | settings
  set <key> <value>     change a setting, e.g. set confirmBeforeSubmit false
  input <text>          answer the current field prompt
  fields <a,b,...>      choose fields to edit
  type <run type>       change the run type while reviewing
  accept | edit | retry | back | share | edit-submitted | another | menu | close | cancel
  sweep                 evict idle sessions now
  help | quit";

/// One parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Start(String),
    Action(UserAction),
    UploadFile(PathBuf),
    BeginPaste,
    Set { key: String, value: String },
    Sweep,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let action = match word.to_ascii_lowercase().as_str() {
        "start" => {
            let user = if rest.is_empty() { "console" } else { rest };
            return Ok(Command::Start(user.to_string()));
        }
        "upload" if rest.is_empty() => return Err(Error::InvalidInput("upload needs a file path".to_string())),
        "upload" => return Ok(Command::UploadFile(PathBuf::from(rest))),
        "paste" => return Ok(Command::BeginPaste),
        "set" => {
            let (key, value) = rest
                .split_once(char::is_whitespace)
                .ok_or_else(|| Error::InvalidInput("usage: set <key> <value>".to_string()))?;
            return Ok(Command::Set {
                key: key.to_string(),
                value: value.trim().to_string(),
            });
        }
        "sweep" => return Ok(Command::Sweep),
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        "manual" => UserAction::StartManual,
        "edit-last" => UserAction::EditLast,
        "delete-last" => UserAction::DeleteLast,
        "settings" => UserAction::OpenSettings,
        "input" => UserAction::Input(rest.to_string()),
        "fields" => UserAction::SelectFields(parse_fields(rest)?),
        "type" => UserAction::SelectRunType(
            RunType::parse(rest).ok_or_else(|| Error::InvalidInput(format!("unknown run type '{}'", rest)))?,
        ),
        "accept" => UserAction::Accept,
        "edit" => UserAction::Edit,
        "retry" => UserAction::Retry,
        "back" => UserAction::Back,
        "share" => UserAction::Share,
        "edit-submitted" => UserAction::EditSubmitted,
        "another" => UserAction::StartAnother,
        "menu" => UserAction::MainMenu,
        "close" => UserAction::Close,
        "cancel" => UserAction::Cancel,
        other => return Err(Error::InvalidInput(format!("unknown command '{}'", other))),
    };
    Ok(Command::Action(action))
}

fn parse_fields(input: &str) -> Result<Vec<RunField>> {
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| RunField::parse(name).ok_or_else(|| Error::InvalidInput(format!("unknown field '{}'", name))))
        .collect()
}

/// Apply one `key value` change to a copy of `settings`
///
/// Keys use the settings' serialized names. The value is read as JSON when
/// it parses, otherwise as a plain string.
pub fn apply_setting(settings: &UserSettings, key: &str, value: &str) -> Result<UserSettings> {
    let mut json = serde_json::to_value(settings).map_err(|e| Error::Internal(e.to_string()))?;
    let Some(fields) = json.as_object_mut() else {
        return Err(Error::Internal("settings did not serialize to an object".to_string()));
    };
    if !fields.contains_key(key) {
        return Err(Error::InvalidInput(format!("unknown setting '{}'", key)));
    }
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    fields.insert(key.to_string(), parsed);
    serde_json::from_value(json).map_err(|e| Error::InvalidInput(format!("bad value for '{}': {}", key, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("start").unwrap(), Command::Start("console".to_string()));
        assert_eq!(parse_command("start bob").unwrap(), Command::Start("bob".to_string()));
        assert_eq!(parse_command("  accept ").unwrap(), Command::Action(UserAction::Accept));
        assert_eq!(
            parse_command("input 12+").unwrap(),
            Command::Action(UserAction::Input("12+".to_string()))
        );
        assert_eq!(
            parse_command("type tournament").unwrap(),
            Command::Action(UserAction::SelectRunType(RunType::Tournament))
        );
        assert_eq!(
            parse_command("upload shots/run.png").unwrap(),
            Command::UploadFile(PathBuf::from("shots/run.png"))
        );
        assert!(parse_command("fly").is_err());
        assert!(parse_command("upload").is_err());
    }

    #[test]
    fn test_parse_field_list() {
        let command = parse_command("fields tier, coins").unwrap();
        assert_eq!(
            command,
            Command::Action(UserAction::SelectFields(vec![RunField::Tier, RunField::Coins]))
        );
        assert!(parse_command("fields tier, nonsense").is_err());
    }

    #[test]
    fn test_apply_setting() {
        let settings = UserSettings::default();
        let updated = apply_setting(&settings, "confirmBeforeSubmit", "false").unwrap();
        assert!(!updated.confirm_before_submit);

        let updated = apply_setting(&settings, "timezone", "+02:00").unwrap();
        assert_eq!(updated.timezone, "+02:00");

        assert!(apply_setting(&settings, "favouriteColour", "blue").is_err());
        assert!(apply_setting(&settings, "autoDetectDuplicates", "maybe").is_err());
    }
}
