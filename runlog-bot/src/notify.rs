//! Role side-channel
//!
//! After a successful submission the user's new run total is handed to a
//! [`RoleNotifier`] so out-of-band effects (role grants) can happen. Calls
//! are fire-and-forget; a failure here never fails the submission.

use async_trait::async_trait;

use runlog_common::Result;

#[async_trait]
pub trait RoleNotifier: Send + Sync {
    async fn run_count_changed(&self, user_id: &str, total_runs: usize) -> Result<()>;
}

/// Notifier that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl RoleNotifier for LogNotifier {
    async fn run_count_changed(&self, user_id: &str, total_runs: usize) -> Result<()> {
        tracing::info!(user_id = %user_id, total_runs, "Run count changed");
        Ok(())
    }
}
