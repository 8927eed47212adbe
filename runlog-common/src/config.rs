//! Bootstrap configuration
//!
//! Loaded once at startup from TOML. Resolution order for the file:
//! 1. Command-line `--config` path (highest priority)
//! 2. `RUNLOG_CONFIG` environment variable
//! 3. `~/.config/runlog/runlog-bot.toml`
//! 4. Compiled defaults (no file)
//!
//! A missing file at steps 3-4 is not an error. A path given explicitly at
//! steps 1-2 must exist, and any file that exists must parse.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::run::RunField;
use crate::{Error, Result};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "RUNLOG_CONFIG";

/// Environment variable overriding `[backend] api_key`
pub const API_KEY_ENV_VAR: &str = "RUNLOG_API_KEY";

const CONFIG_DIR_NAME: &str = "runlog";
const CONFIG_FILE_NAME: &str = "runlog-bot.toml";

/// Top-level bootstrap configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub health: HealthConfig,
}

/// Session lifetime and flow settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle time after which a sweep evicts a session
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Time a prompt waits for a user action before the flow times out
    #[serde(default = "default_prompt_timeout_secs")]
    pub prompt_timeout_secs: u64,

    /// Fields asked for, in order, during manual entry
    #[serde(default = "default_manual_fields")]
    pub manual_fields: Vec<RunField>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            prompt_timeout_secs: default_prompt_timeout_secs(),
            manual_fields: default_manual_fields(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.prompt_timeout_secs)
    }
}

/// Which submission backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Process-local store; data is lost on restart
    #[default]
    Memory,
    /// JSON web API
    Web,
}

/// Submission backend settings
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// Base URL of the web API (required when `kind = "web"`)
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            base_url: None,
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` wins when set
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Health endpoint settings
#[derive(Debug, Clone, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
        }
    }
}

fn default_idle_timeout_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    1800
}

fn default_prompt_timeout_secs() -> u64 {
    300
}

fn default_manual_fields() -> Vec<RunField> {
    vec![
        RunField::Tier,
        RunField::Wave,
        RunField::Duration,
        RunField::Coins,
        RunField::Cells,
        RunField::Dice,
        RunField::KilledBy,
    ]
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1:5780".to_string()
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse one file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Load following the resolution order, then apply env overrides
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path)? {
            Some(path) => {
                tracing::info!(path = %path.display(), "Loading configuration");
                Self::from_file(&path)?
            }
            None => {
                tracing::info!("No configuration file found, using defaults");
                Self::default()
            }
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `RUNLOG_API_KEY` when set and non-empty
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV_VAR) {
            if !key.trim().is_empty() {
                self.backend.api_key = Some(key);
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.session.manual_fields.is_empty() {
            return Err(Error::Config("session.manual_fields must name at least one field".to_string()));
        }
        if self.session.prompt_timeout_secs == 0 {
            return Err(Error::Config("session.prompt_timeout_secs must be positive".to_string()));
        }
        if self.backend.kind == BackendKind::Web
            && self.backend.base_url.as_deref().map_or(true, |url| url.trim().is_empty())
        {
            return Err(Error::Config("backend.base_url is required for the web backend".to_string()));
        }
        Ok(())
    }
}

/// Pick the config file to read, if any
///
/// Explicit paths (CLI or env) must exist; the per-user default is optional.
pub fn resolve_config_path(cli_path: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_path {
        return require_existing(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return require_existing(PathBuf::from(path));
        }
    }

    Ok(default_config_path().filter(|path| path.exists()))
}

/// `~/.config/runlog/runlog-bot.toml` on Linux, platform equivalent elsewhere
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

fn require_existing(path: PathBuf) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path))
    } else {
        Err(Error::Config(format!("Config file not found: {}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.session.idle_timeout(), Duration::from_secs(3600));
        assert_eq!(config.session.sweep_interval(), Duration::from_secs(1800));
        assert_eq!(config.session.prompt_timeout(), Duration::from_secs(300));
        assert_eq!(config.session.manual_fields.first(), Some(&RunField::Tier));
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.logging.level, "info");
        assert!(config.health.enabled);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [session]
            idle_timeout_secs = 60
            manual_fields = ["tier", "wave", "killedBy"]
            "#,
        )
        .unwrap();
        assert_eq!(config.session.idle_timeout_secs, 60);
        assert_eq!(config.session.prompt_timeout_secs, 300);
        assert_eq!(
            config.session.manual_fields,
            vec![RunField::Tier, RunField::Wave, RunField::KilledBy]
        );
        assert_eq!(config.backend.request_timeout(), Duration::from_secs(15));
    }

    #[test]
    fn test_web_backend_requires_url() {
        let err = TomlConfig::from_toml_str("[backend]\nkind = \"web\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let ok = TomlConfig::from_toml_str("[backend]\nkind = \"web\"\nbase_url = \"http://localhost:9\"\n").unwrap();
        assert_eq!(ok.backend.kind, BackendKind::Web);
    }

    #[test]
    fn test_malformed_is_error() {
        assert!(TomlConfig::from_toml_str("[session\n").is_err());
        assert!(TomlConfig::from_toml_str("[session]\nmanual_fields = []\n").is_err());
        assert!(TomlConfig::from_toml_str("[session]\nmanual_fields = [\"bogus\"]\n").is_err());
    }
}
