//! Submission backend
//!
//! All persistence is delegated to a [`SubmissionBackend`]. The flow treats
//! every implementation as interchangeable; field naming on the wire is the
//! backend's concern.

pub mod http;
pub mod memory;

use std::collections::BTreeMap;

use async_trait::async_trait;

use runlog_common::{Result, RunRecord, RunType, UserSettings};

pub use http::WebApiBackend;
pub use memory::InMemoryBackend;

/// Authoritative list of one user's runs
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunHistory {
    pub last_run: Option<RunRecord>,
    pub runs: Vec<RunRecord>,
    pub counts_by_type: BTreeMap<RunType, usize>,
}

impl RunHistory {
    /// Build from a run list in logging order; the last element is the latest run
    pub fn from_runs(runs: Vec<RunRecord>) -> Self {
        let mut history = Self {
            last_run: runs.last().cloned(),
            runs,
            counts_by_type: BTreeMap::new(),
        };
        history.recount();
        history
    }

    pub fn total(&self) -> usize {
        self.runs.len()
    }

    /// Apply a successful insert or update locally
    ///
    /// Used when re-fetching after a submission fails, so the cache still
    /// reflects what the backend accepted.
    pub fn record_submission(&mut self, run: RunRecord) {
        let existing = run
            .run_id
            .as_deref()
            .and_then(|id| self.runs.iter().position(|r| r.run_id.as_deref() == Some(id)));
        match existing {
            Some(index) => self.runs[index] = run.clone(),
            None => self.runs.push(run.clone()),
        }
        self.last_run = Some(run);
        self.recount();
    }

    /// Drop a run locally; returns whether it was present
    pub fn remove(&mut self, run_id: &str) -> bool {
        let before = self.runs.len();
        self.runs.retain(|r| r.run_id.as_deref() != Some(run_id));
        let removed = self.runs.len() != before;
        if removed {
            self.last_run = self.runs.last().cloned();
            self.recount();
        }
        removed
    }

    fn recount(&mut self) {
        self.counts_by_type.clear();
        for run in &self.runs {
            *self.counts_by_type.entry(run.run_type).or_insert(0) += 1;
        }
    }
}

/// Storage for runs and per-user settings
#[async_trait]
pub trait SubmissionBackend: Send + Sync {
    /// Store a new run; returns the assigned run id
    async fn insert_run(&self, user_id: &str, run: &RunRecord) -> Result<String>;

    async fn update_run(&self, user_id: &str, run_id: &str, run: &RunRecord) -> Result<()>;

    async fn list_runs(&self, user_id: &str) -> Result<RunHistory>;

    async fn delete_run(&self, user_id: &str, run_id: &str) -> Result<()>;

    async fn get_user_settings(&self, user_id: &str) -> Result<UserSettings>;

    async fn save_user_settings(&self, user_id: &str, settings: &UserSettings) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(id: &str, run_type: RunType) -> RunRecord {
        RunRecord {
            run_id: Some(id.to_string()),
            run_type,
            ..RunRecord::default()
        }
    }

    #[test]
    fn test_from_runs_counts() {
        let history = RunHistory::from_runs(vec![
            run("a", RunType::Farming),
            run("b", RunType::Tournament),
            run("c", RunType::Farming),
        ]);
        assert_eq!(history.total(), 3);
        assert_eq!(history.counts_by_type.get(&RunType::Farming), Some(&2));
        assert_eq!(history.last_run.and_then(|r| r.run_id).as_deref(), Some("c"));
    }

    #[test]
    fn test_record_submission_updates_in_place() {
        let mut history = RunHistory::from_runs(vec![run("a", RunType::Farming), run("b", RunType::Farming)]);
        history.record_submission(run("a", RunType::Milestone));
        assert_eq!(history.total(), 2);
        assert_eq!(history.counts_by_type.get(&RunType::Milestone), Some(&1));

        history.record_submission(run("z", RunType::Farming));
        assert_eq!(history.total(), 3);
        assert_eq!(history.last_run.and_then(|r| r.run_id).as_deref(), Some("z"));
    }

    #[test]
    fn test_remove() {
        let mut history = RunHistory::from_runs(vec![run("a", RunType::Farming), run("b", RunType::Overnight)]);
        assert!(history.remove("b"));
        assert!(!history.remove("b"));
        assert_eq!(history.last_run.and_then(|r| r.run_id).as_deref(), Some("a"));
        assert_eq!(history.counts_by_type.get(&RunType::Overnight), None);
    }
}
