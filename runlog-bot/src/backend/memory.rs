//! Process-local backend
//!
//! Keeps runs and settings in memory. Used by the console driver and tests;
//! failures can be injected to exercise retry paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use runlog_common::{Error, Result, RunRecord, UserSettings};

use super::{RunHistory, SubmissionBackend};

#[derive(Default)]
pub struct InMemoryBackend {
    runs: RwLock<HashMap<String, Vec<RunRecord>>>,
    settings: RwLock<HashMap<String, UserSettings>>,
    next_id: AtomicU64,
    /// Number of upcoming mutating calls that fail
    failing_writes: AtomicUsize,
    failing_reads: AtomicBool,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` insert/update/delete/save calls fail
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Make every list/settings read fail until switched off
    pub fn set_failing_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }

    /// Stored runs for a user, in insertion order
    pub async fn runs_for(&self, user_id: &str) -> Vec<RunRecord> {
        self.runs.read().await.get(user_id).cloned().unwrap_or_default()
    }

    /// Seed a run as if it had been submitted earlier; returns its id
    pub async fn seed_run(&self, user_id: &str, run: RunRecord) -> String {
        self.store_new(user_id, run).await
    }

    async fn store_new(&self, user_id: &str, mut run: RunRecord) -> String {
        let run_id = format!("run-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        run.run_id = Some(run_id.clone());
        self.runs.write().await.entry(user_id.to_string()).or_default().push(run);
        run_id
    }

    fn check_write(&self, operation: &str) -> Result<()> {
        let injected = self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            tracing::debug!(operation, "Injected backend write failure");
            return Err(Error::Backend(format!("{} failed: backend unavailable", operation)));
        }
        Ok(())
    }

    fn check_read(&self, operation: &str) -> Result<()> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(Error::Backend(format!("{} failed: backend unavailable", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionBackend for InMemoryBackend {
    async fn insert_run(&self, user_id: &str, run: &RunRecord) -> Result<String> {
        self.check_write("insert_run")?;
        let run_id = self.store_new(user_id, run.clone()).await;
        tracing::debug!(user_id = %user_id, run_id = %run_id, "Inserted run");
        Ok(run_id)
    }

    async fn update_run(&self, user_id: &str, run_id: &str, run: &RunRecord) -> Result<()> {
        self.check_write("update_run")?;
        let mut runs = self.runs.write().await;
        let slot = runs
            .get_mut(user_id)
            .and_then(|list| list.iter_mut().find(|r| r.run_id.as_deref() == Some(run_id)))
            .ok_or_else(|| Error::NotFound(format!("run {} for user {}", run_id, user_id)))?;
        let mut updated = run.clone();
        updated.run_id = Some(run_id.to_string());
        *slot = updated;
        tracing::debug!(user_id = %user_id, run_id = %run_id, "Updated run");
        Ok(())
    }

    async fn list_runs(&self, user_id: &str) -> Result<RunHistory> {
        self.check_read("list_runs")?;
        Ok(RunHistory::from_runs(self.runs_for(user_id).await))
    }

    async fn delete_run(&self, user_id: &str, run_id: &str) -> Result<()> {
        self.check_write("delete_run")?;
        let mut runs = self.runs.write().await;
        let list = runs
            .get_mut(user_id)
            .ok_or_else(|| Error::NotFound(format!("runs for user {}", user_id)))?;
        let before = list.len();
        list.retain(|r| r.run_id.as_deref() != Some(run_id));
        if list.len() == before {
            return Err(Error::NotFound(format!("run {} for user {}", run_id, user_id)));
        }
        Ok(())
    }

    async fn get_user_settings(&self, user_id: &str) -> Result<UserSettings> {
        self.check_read("get_user_settings")?;
        Ok(self.settings.read().await.get(user_id).cloned().unwrap_or_default())
    }

    async fn save_user_settings(&self, user_id: &str, settings: &UserSettings) -> Result<()> {
        self.check_write("save_user_settings")?;
        self.settings
            .write()
            .await
            .insert(user_id.to_string(), settings.clone());
        Ok(())
    }
}
