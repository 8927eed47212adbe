//! Shared fixtures for runlog-bot integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{Map, Value};

use runlog_bot::backend::InMemoryBackend;
use runlog_bot::extract::Extractor;
use runlog_bot::flow::{Collaborators, FlowEngine, FlowOptions, Stage, UserAction};
use runlog_bot::notify::RoleNotifier;
use runlog_bot::render::{Prompt, Renderer};
use runlog_bot::session::{ManualClock, Session, SessionStore};
use runlog_common::events::{DispatchBus, FlowInstanceId};
use runlog_common::{Error, Result, RunField};

pub const IDLE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Renderer that keeps every prompt it was asked to show
#[derive(Default)]
pub struct RecordingRenderer {
    prompts: Mutex<Vec<(String, FlowInstanceId, Prompt)>>,
    failing: Mutex<bool>,
}

impl RecordingRenderer {
    pub fn all(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().iter().map(|(_, _, p)| p.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn last(&self) -> Prompt {
        self.prompts
            .lock()
            .unwrap()
            .last()
            .map(|(_, _, p)| p.clone())
            .expect("no prompt rendered")
    }

    pub fn titles(&self) -> Vec<String> {
        self.all().into_iter().map(|p| p.title).collect()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap() = failing;
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn render(&self, user_id: &str, instance: FlowInstanceId, prompt: Prompt) -> Result<()> {
        if *self.failing.lock().unwrap() {
            return Err(Error::Internal("renderer offline".to_string()));
        }
        self.prompts
            .lock()
            .unwrap()
            .push((user_id.to_string(), instance, prompt));
        Ok(())
    }
}

/// Notifier that records run totals
#[derive(Default)]
pub struct RecordingNotifier {
    calls: Mutex<Vec<(String, usize)>>,
}

impl RecordingNotifier {
    pub fn calls(&self) -> Vec<(String, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoleNotifier for RecordingNotifier {
    async fn run_count_changed(&self, user_id: &str, total_runs: usize) -> Result<()> {
        self.calls.lock().unwrap().push((user_id.to_string(), total_runs));
        Ok(())
    }
}

/// Extractor returning a preset field map, or failing when none is set
#[derive(Default)]
pub struct ScriptedExtractor {
    fields: Mutex<Option<Map<String, Value>>>,
}

impl ScriptedExtractor {
    pub fn respond_with(&self, fields: Value) {
        *self.fields.lock().unwrap() = fields.as_object().cloned();
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    async fn extract(&self, _image: &[u8], _language: &str) -> Result<Map<String, Value>> {
        self.fields
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::InvalidInput("unreadable image".to_string()))
    }
}

pub struct Harness {
    pub engine: Arc<FlowEngine>,
    pub backend: Arc<InMemoryBackend>,
    pub renderer: Arc<RecordingRenderer>,
    pub notifier: Arc<RecordingNotifier>,
    pub extractor: Arc<ScriptedExtractor>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(FlowOptions {
            manual_fields: vec![RunField::Tier, RunField::Wave, RunField::Coins],
            prompt_timeout: Duration::from_secs(300),
        })
    }

    pub fn with_options(options: FlowOptions) -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 10, 14, 12, 0, 0).unwrap()));
        let backend = Arc::new(InMemoryBackend::new());
        let renderer = Arc::new(RecordingRenderer::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let extractor = Arc::new(ScriptedExtractor::default());
        let store = Arc::new(SessionStore::new(IDLE_TIMEOUT, clock.clone()));
        let engine = FlowEngine::new(
            store,
            DispatchBus::new(),
            Collaborators {
                backend: backend.clone(),
                extractor: extractor.clone(),
                renderer: renderer.clone(),
                notifier: notifier.clone(),
            },
            options,
        );
        Self {
            engine,
            backend,
            renderer,
            notifier,
            extractor,
            clock,
        }
    }

    pub async fn begin(&self, user_id: &str) -> FlowInstanceId {
        self.engine.begin(user_id).await.unwrap()
    }

    pub async fn act(&self, instance: FlowInstanceId, user_id: &str, action: UserAction) {
        self.engine.handle_action(instance, user_id, action).await.unwrap();
    }

    pub async fn session(&self, user_id: &str) -> Option<Session> {
        self.engine.store().get(user_id).await
    }

    pub async fn stage(&self, user_id: &str) -> Option<Stage> {
        self.session(user_id).await.map(|s| s.stage)
    }

    /// Turn confirmation off or on through the settings action
    pub async fn set_confirm(&self, instance: FlowInstanceId, user_id: &str, confirm: bool) {
        let mut settings = self.session(user_id).await.unwrap().settings;
        settings.confirm_before_submit = confirm;
        self.act(instance, user_id, UserAction::UpdateSettings(settings)).await;
    }
}

/// Paste text for a tier 15, wave 200, one hour, 5M coin run
pub const REPORT_15_200: &str = "Battle Report\n\
    Tier\t15\n\
    Wave\t200\n\
    Real Time\t1h 0m 0s\n\
    Coins Earned\t5M\n\
    Cells Earned\t1.2K\n\
    Killed By\tboss\n";

/// Poll `condition` until it holds, yielding to spawned tasks in between
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
