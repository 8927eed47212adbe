//! Error types for runlog-bot
//!
//! Flow-level failures on top of the shared [`runlog_common::Error`].

use thiserror::Error;

use runlog_common::events::FlowInstanceId;

/// Errors raised while driving a flow
#[derive(Error, Debug)]
pub enum FlowError {
    /// An action arrived for a session that was evicted, finished, or never started
    #[error("No active session for user {user_id} (instance {instance})")]
    SessionLost { user_id: String, instance: FlowInstanceId },

    /// The renderer could not deliver a prompt
    #[error("Render failed: {0}")]
    Render(String),

    /// Shared error from the codec, config or a collaborator
    #[error(transparent)]
    Common(#[from] runlog_common::Error),
}

/// Convenience Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
