//! # runlog common library
//!
//! Shared code for the run logging bot:
//! - Notation and duration codec
//! - Run record model and normalizer
//! - Duplicate fingerprint matching
//! - User settings
//! - Per-flow event dispatch bus
//! - Bootstrap configuration

pub mod config;
pub mod duplicate;
pub mod duration;
pub mod error;
pub mod events;
pub mod normalize;
pub mod notation;
pub mod run;
pub mod settings;

pub use duplicate::{find_duplicate, DuplicateMatch};
pub use duration::RunDuration;
pub use error::{Error, Result};
pub use notation::DecimalSeparator;
pub use run::{Amount, RunField, RunRecord, RunType, Tier};
pub use settings::UserSettings;
