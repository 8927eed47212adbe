//! Per-user session state
//!
//! A [`Session`] holds everything one user's flow has accumulated. Sessions
//! live in a [`SessionStore`] keyed by user id, so a user has at most one live
//! session. The store is passive: it evicts idle sessions only when
//! [`SessionStore::sweep`] is called, and it reads time from an injected
//! [`Clock`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use runlog_common::events::FlowInstanceId;
use runlog_common::{RunField, RunRecord, UserSettings};

use crate::backend::RunHistory;
use crate::flow::edit::EditPass;
use crate::flow::manual::ManualEntry;
use crate::flow::stage::{Stage, StateTransition};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Uploaded screenshot kept for display and final upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotAttachment {
    pub url: String,
    pub filename: String,
}

/// One user's in-flight flow
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    /// Flow instance that owns this session
    pub instance_id: FlowInstanceId,
    pub stage: Stage,
    pub draft_run: RunRecord,
    /// Snapshot taken when an edit pass begins
    pub original_run: Option<RunRecord>,
    /// When set, submission updates this run instead of inserting
    pub editing_run_id: Option<String>,
    pub is_duplicate_run: bool,
    pub cached_run_history: Option<RunHistory>,
    pub settings: UserSettings,
    pub screenshot: Option<ScreenshotAttachment>,
    pub last_activity: DateTime<Utc>,

    pub manual: ManualEntry,
    pub edit: EditPass,
    pub last_submitted: Option<RunRecord>,
    pub last_error: Option<String>,
    /// Fields changed by the most recent edit pass
    pub changed_fields: Vec<RunField>,
    /// Bumped on every prompt; a timeout only fires for the latest prompt
    pub prompt_seq: u64,
}

impl Session {
    pub fn new(user_id: impl Into<String>, instance_id: FlowInstanceId, settings: UserSettings, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            instance_id,
            stage: Stage::Initial,
            draft_run: RunRecord::draft(settings.default_run_type),
            original_run: None,
            editing_run_id: None,
            is_duplicate_run: false,
            cached_run_history: None,
            settings,
            screenshot: None,
            last_activity: now,
            manual: ManualEntry::default(),
            edit: EditPass::default(),
            last_submitted: None,
            last_error: None,
            changed_fields: Vec::new(),
            prompt_seq: 0,
        }
    }

    /// Move to `new_stage`, returning the transition for logging
    pub fn transition_to(&mut self, new_stage: Stage, at: DateTime<Utc>) -> StateTransition {
        let transition = StateTransition {
            instance: self.instance_id,
            old_stage: self.stage,
            new_stage,
            transitioned_at: at,
        };
        self.stage = new_stage;
        transition
    }

    /// Forget everything collected so far; history and settings survive
    pub fn reset_draft(&mut self) {
        self.draft_run = RunRecord::draft(self.settings.default_run_type);
        self.original_run = None;
        self.editing_run_id = None;
        self.is_duplicate_run = false;
        self.screenshot = None;
        self.manual = ManualEntry::default();
        self.edit = EditPass::default();
        self.last_error = None;
        self.changed_fields.clear();
    }

    pub fn is_idle(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        now.signed_duration_since(self.last_activity) > idle_timeout
    }
}

/// In-memory session table keyed by user id
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    idle_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(idle_timeout: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout: Duration::from_std(idle_timeout).unwrap_or_else(|_| Duration::hours(1)),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    /// Snapshot of a user's session
    pub async fn get(&self, user_id: &str) -> Option<Session> {
        self.sessions.read().await.get(user_id).cloned()
    }

    /// Insert or replace; returns the session it replaced
    pub async fn set(&self, session: Session) -> Option<Session> {
        self.sessions
            .write()
            .await
            .insert(session.user_id.clone(), session)
    }

    /// Write back a session only if the same flow instance still owns the slot
    ///
    /// Returns false when the session was removed or replaced meanwhile (a
    /// timeout, a sweep, or a new flow for the same user).
    pub async fn commit(&self, session: Session) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.user_id) {
            Some(slot) if slot.instance_id == session.instance_id => {
                *slot = session;
                true
            }
            _ => false,
        }
    }

    pub async fn remove(&self, user_id: &str) -> Option<Session> {
        self.sessions.write().await.remove(user_id)
    }

    /// Remove only if owned by `instance`
    pub async fn remove_instance(&self, user_id: &str, instance: FlowInstanceId) -> Option<Session> {
        let mut sessions = self.sessions.write().await;
        if sessions.get(user_id).is_some_and(|s| s.instance_id == instance) {
            sessions.remove(user_id)
        } else {
            None
        }
    }

    /// Mark activity now; returns false if no session exists
    pub async fn touch(&self, user_id: &str) -> bool {
        let now = self.clock.now();
        match self.sessions.write().await.get_mut(user_id) {
            Some(session) => {
                session.last_activity = now;
                true
            }
            None => false,
        }
    }

    /// Session owned by a flow instance, whoever the user is
    pub async fn find_instance(&self, instance: FlowInstanceId) -> Option<Session> {
        self.sessions
            .read()
            .await
            .values()
            .find(|s| s.instance_id == instance)
            .cloned()
    }

    /// Evict every session idle for longer than the threshold at `now`
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<Session> {
        let mut sessions = self.sessions.write().await;
        let idle: Vec<String> = sessions
            .iter()
            .filter(|(_, s)| s.is_idle(now, self.idle_timeout))
            .map(|(user_id, _)| user_id.clone())
            .collect();
        let evicted: Vec<Session> = idle.iter().filter_map(|user_id| sessions.remove(user_id)).collect();
        if !evicted.is_empty() {
            tracing::info!(evicted = evicted.len(), remaining = sessions.len(), "Swept idle sessions");
        }
        evicted
    }

    /// All live sessions, ordered by user id
    pub async fn snapshot(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
