//! Flow engine
//!
//! Drives one session per user through the stage table. Each flow instance
//! subscribes an [`EngineHandler`] on the dispatch bus, so actions for one
//! instance are handled strictly in order while other users' flows run
//! independently.
//!
//! Every prompt arms a timeout keyed by the session's prompt sequence number.
//! Cancel, close, timeout, sweep and unexpected failures all end in the same
//! release path, which drops the bus subscription and the pending timer and
//! is safe to run more than once.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use runlog_common::config::SessionConfig;
use runlog_common::duplicate::find_duplicate;
use runlog_common::events::{DispatchBus, FlowFault, FlowHandler, FlowInstanceId, NavigateTarget, Subscription};
use runlog_common::normalize::{normalize_incoming_with, NormalizeOptions};
use runlog_common::{RunField, RunRecord, UserSettings};

use crate::backend::{RunHistory, SubmissionBackend};
use crate::error::{FlowError, Result};
use crate::extract::{parse_pasted_report, Extractor};
use crate::notify::RoleNotifier;
use crate::render::{Prompt, Renderer};
use crate::session::{ScreenshotAttachment, Session, SessionStore};

use super::action::UserAction;
use super::edit::{merge_edits, EditBack, EditPass, EditStep};
use super::manual::{ManualBack, ManualEntry, ManualStep};
use super::prompts;
use super::share::share_text;
use super::stage::{transition, Stage};

/// Tunables taken from the `[session]` config section
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub manual_fields: Vec<RunField>,
    pub prompt_timeout: Duration,
}

impl Default for FlowOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

impl From<&SessionConfig> for FlowOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            manual_fields: config.manual_fields.clone(),
            prompt_timeout: config.prompt_timeout(),
        }
    }
}

/// External services the engine calls out to
#[derive(Clone)]
pub struct Collaborators {
    pub backend: Arc<dyn SubmissionBackend>,
    pub extractor: Arc<dyn Extractor>,
    pub renderer: Arc<dyn Renderer>,
    pub notifier: Arc<dyn RoleNotifier>,
}

enum Step {
    Continue,
    Finish(Stage),
}

pub struct FlowEngine {
    store: Arc<SessionStore>,
    bus: DispatchBus<UserAction>,
    backend: Arc<dyn SubmissionBackend>,
    extractor: Arc<dyn Extractor>,
    renderer: Arc<dyn Renderer>,
    notifier: Arc<dyn RoleNotifier>,
    options: FlowOptions,
    subscriptions: Mutex<HashMap<FlowInstanceId, Subscription<UserAction>>>,
    /// Pending prompt timer per instance, tagged with its prompt sequence number
    timers: Mutex<HashMap<FlowInstanceId, (u64, JoinHandle<()>)>>,
    me: Weak<FlowEngine>,
}

impl FlowEngine {
    pub fn new(
        store: Arc<SessionStore>,
        bus: DispatchBus<UserAction>,
        collaborators: Collaborators,
        options: FlowOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            store,
            bus,
            backend: collaborators.backend,
            extractor: collaborators.extractor,
            renderer: collaborators.renderer,
            notifier: collaborators.notifier,
            options,
            subscriptions: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            me: me.clone(),
        })
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn bus(&self) -> &DispatchBus<UserAction> {
        &self.bus
    }

    /// Queue an action on the instance's bus channel
    pub fn dispatch(&self, instance: FlowInstanceId, user_id: &str, action: UserAction) -> usize {
        self.bus.dispatch(instance, user_id, action)
    }

    /// Flow instances still holding a bus subscription
    pub fn active_subscriptions(&self) -> usize {
        self.lock_subscriptions().len()
    }

    /// Start a new flow for `user_id`, replacing any live one
    pub async fn begin(&self, user_id: &str) -> Result<FlowInstanceId> {
        let instance = FlowInstanceId::new();
        let settings = match self.backend.get_user_settings(user_id).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Could not load settings, using defaults");
                UserSettings::default()
            }
        };

        let mut session = Session::new(user_id, instance, settings, self.store.now());
        self.ensure_history(&mut session).await;

        let handler = Arc::new(EngineHandler {
            engine: self.me.clone(),
        });
        let subscription = self.bus.subscribe(instance, handler);
        self.lock_subscriptions().insert(instance, subscription);

        if let Some(previous) = self.store.set(session.clone()).await {
            tracing::info!(
                user_id = %user_id,
                old_instance = %previous.instance_id,
                "Replacing existing session"
            );
            self.release(previous.instance_id);
        }
        tracing::info!(user_id = %user_id, instance = %instance, "Flow started");

        let prompt = prompts::main_menu(&session);
        if let Err(e) = self.present(&mut session, prompt).await {
            self.terminate(user_id, instance, Stage::Cancelled).await;
            return Err(e);
        }
        self.store.commit(session).await;
        Ok(instance)
    }

    /// Process one user action for `instance`
    pub async fn handle_action(&self, instance: FlowInstanceId, user_id: &str, action: UserAction) -> Result<()> {
        let kind = action.kind();
        let Some(mut session) = self
            .store
            .get(user_id)
            .await
            .filter(|s| s.instance_id == instance)
        else {
            let lost = FlowError::SessionLost {
                user_id: user_id.to_string(),
                instance,
            };
            tracing::info!(action = ?kind, "{}", lost);
            self.release(instance);
            return self.render_detached(user_id, instance, prompts::session_lost()).await;
        };

        session.last_activity = self.store.now();

        let Some(target) = transition(session.stage, kind) else {
            tracing::debug!(
                user_id = %user_id,
                instance = %instance,
                stage = ?session.stage,
                action = ?kind,
                "Action not available in this stage"
            );
            let prompt = prompts::for_session(&session).notice("That option is not available right now.");
            self.present(&mut session, prompt).await?;
            self.store.commit(session).await;
            return Ok(());
        };

        tracing::debug!(
            user_id = %user_id,
            instance = %instance,
            stage = ?session.stage,
            action = ?kind,
            target = ?target,
            "Handling action"
        );

        match self.step(&mut session, action).await? {
            Step::Continue => {
                if !self.store.commit(session).await {
                    tracing::debug!(user_id = %user_id, instance = %instance, "Session ended while handling action");
                }
            }
            Step::Finish(stage) => {
                self.terminate(user_id, instance, stage).await;
            }
        }
        Ok(())
    }

    /// Coarse navigation from outside the current prompt
    pub async fn navigate(&self, instance: FlowInstanceId, user_id: &str, target: NavigateTarget) -> Result<()> {
        let action = match target {
            NavigateTarget::MainMenu => UserAction::MainMenu,
            NavigateTarget::Cancel => UserAction::Cancel,
            NavigateTarget::OpenSettings => UserAction::OpenSettings,
        };
        self.handle_action(instance, user_id, action).await
    }

    /// End a flow after an unexpected handler failure
    pub async fn abort(&self, instance: FlowInstanceId, fault: &FlowFault) {
        let user_id = match &fault.user_id {
            Some(user_id) => Some(user_id.clone()),
            None => self.store.find_instance(instance).await.map(|s| s.user_id),
        };
        tracing::error!(
            instance = %instance,
            user_id = ?user_id,
            panicked = fault.panicked,
            error = %fault.message,
            "Aborting flow after handler failure"
        );

        let removed = match &user_id {
            Some(user_id) => self.store.remove_instance(user_id, instance).await,
            None => None,
        };
        self.release(instance);

        if let (Some(user_id), Some(_)) = (user_id, removed) {
            if let Err(e) = self.renderer.render(&user_id, instance, prompts::failure()).await {
                tracing::warn!(user_id = %user_id, error = %e, "Could not deliver failure notice");
            }
        }
    }

    /// Remove the session and release the instance; returns false if already gone
    pub async fn terminate(&self, user_id: &str, instance: FlowInstanceId, reason: Stage) -> bool {
        let removed = self.store.remove_instance(user_id, instance).await;
        self.release(instance);

        let Some(mut session) = removed else {
            return false;
        };
        let transition = session.transition_to(reason, self.store.now());
        tracing::info!(
            user_id = %user_id,
            instance = %instance,
            from = ?transition.old_stage,
            to = ?transition.new_stage,
            "Flow finished"
        );
        if let Err(e) = self.renderer.render(user_id, instance, prompts::finished(reason)).await {
            tracing::warn!(user_id = %user_id, error = %e, "Could not deliver closing message");
        }
        true
    }

    /// Evict idle sessions and release their instances
    pub async fn sweep(&self) -> usize {
        let evicted = self.store.sweep(self.store.now()).await;
        for session in &evicted {
            self.release(session.instance_id);
            tracing::info!(
                user_id = %session.user_id,
                instance = %session.instance_id,
                stage = ?session.stage,
                "Evicted idle session"
            );
        }
        evicted.len()
    }

    async fn on_timeout(&self, user_id: &str, instance: FlowInstanceId, seq: u64) {
        {
            let mut timers = self.lock_timers();
            if !timers.get(&instance).is_some_and(|(armed, _)| *armed == seq) {
                return;
            }
            // Detach rather than abort: this is the task currently running
            timers.remove(&instance);
        }

        let current = self
            .store
            .get(user_id)
            .await
            .is_some_and(|s| s.instance_id == instance && s.prompt_seq == seq);
        if current {
            tracing::info!(user_id = %user_id, instance = %instance, "Prompt timed out");
            self.terminate(user_id, instance, Stage::TimedOut).await;
        }
    }

    async fn step(&self, session: &mut Session, action: UserAction) -> Result<Step> {
        match action {
            UserAction::Cancel => return Ok(Step::Finish(Stage::Cancelled)),
            UserAction::Close => return Ok(Step::Finish(Stage::Closed)),
            UserAction::MainMenu | UserAction::StartAnother => {
                let prompt = self.menu(session);
                self.present(session, prompt).await?;
            }
            UserAction::OpenSettings => {
                session.reset_draft();
                self.move_to(session, Stage::Initial);
                let prompt = prompts::settings(&session.settings);
                self.present(session, prompt).await?;
            }
            UserAction::UpdateSettings(settings) => self.update_settings(session, settings).await?,
            UserAction::StartUpload => {
                session.reset_draft();
                self.move_to(session, Stage::AwaitingUpload);
                self.present(session, prompts::upload()).await?;
            }
            UserAction::StartPaste => {
                session.reset_draft();
                self.move_to(session, Stage::AwaitingPaste);
                self.present(session, prompts::paste()).await?;
            }
            UserAction::StartManual => {
                session.reset_draft();
                session.manual = ManualEntry::start(self.options.manual_fields.clone());
                self.move_to(session, Stage::ManualEntry);
                let prompt = prompts::manual_field(session);
                self.present(session, prompt).await?;
            }
            UserAction::EditLast => self.edit_last(session).await?,
            UserAction::DeleteLast => self.delete_last(session).await?,
            UserAction::Upload { bytes, url, filename } => {
                self.collect_upload(session, &bytes, ScreenshotAttachment { url, filename })
                    .await?
            }
            UserAction::Paste(text) => self.collect_paste(session, &text).await?,
            UserAction::Input(text) if session.stage == Stage::ManualEntry => {
                self.manual_input(session, &text).await?
            }
            UserAction::Input(text) => self.edit_input(session, &text).await?,
            UserAction::Back => match session.stage {
                Stage::ManualEntry => return self.manual_back(session).await,
                Stage::EditingFields => self.edit_back(session).await?,
                _ => {
                    let prompt = self.menu(session);
                    self.present(session, prompt).await?;
                }
            },
            UserAction::Accept | UserAction::Retry => self.submit(session).await?,
            UserAction::Edit => {
                let base = session.draft_run.clone();
                self.begin_edit(session, base).await?;
            }
            UserAction::SelectRunType(run_type) => {
                session.draft_run.run_type = run_type;
                let prompt = prompts::review(session);
                self.present(session, prompt).await?;
            }
            UserAction::SelectFields(fields) => self.select_edit_fields(session, fields).await?,
            UserAction::Share => self.share(session).await?,
            UserAction::EditSubmitted => match session.last_submitted.clone() {
                Some(run) => {
                    session.editing_run_id = run.run_id.clone();
                    self.begin_edit(session, run).await?;
                }
                None => {
                    let prompt = prompts::post_submit(session).warning("There is no submitted run to edit.");
                    self.present(session, prompt).await?;
                }
            },
        }
        Ok(Step::Continue)
    }

    fn move_to(&self, session: &mut Session, stage: Stage) {
        if session.stage == stage {
            return;
        }
        let transition = session.transition_to(stage, self.store.now());
        tracing::debug!(
            user_id = %session.user_id,
            instance = %transition.instance,
            from = ?transition.old_stage,
            to = ?transition.new_stage,
            "Stage transition"
        );
    }

    /// Reset to the entry menu and build its prompt
    fn menu(&self, session: &mut Session) -> Prompt {
        session.reset_draft();
        self.move_to(session, Stage::Initial);
        prompts::main_menu(session)
    }

    async fn present(&self, session: &mut Session, prompt: Prompt) -> Result<()> {
        session.prompt_seq += 1;
        self.arm_timer(&session.user_id, session.instance_id, session.prompt_seq);
        self.renderer
            .render(&session.user_id, session.instance_id, prompt)
            .await
            .map_err(|e| FlowError::Render(e.to_string()))
    }

    /// Render outside any session
    async fn render_detached(&self, user_id: &str, instance: FlowInstanceId, prompt: Prompt) -> Result<()> {
        self.renderer
            .render(user_id, instance, prompt)
            .await
            .map_err(|e| FlowError::Render(e.to_string()))
    }

    fn arm_timer(&self, user_id: &str, instance: FlowInstanceId, seq: u64) {
        let engine = self.me.clone();
        let user_id = user_id.to_string();
        let timeout = self.options.prompt_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(engine) = engine.upgrade() {
                engine.on_timeout(&user_id, instance, seq).await;
            }
        });
        if let Some((_, previous)) = self.lock_timers().insert(instance, (seq, handle)) {
            previous.abort();
        }
    }

    /// Drop the instance's subscription and pending timer
    fn release(&self, instance: FlowInstanceId) {
        let subscription = self.lock_subscriptions().remove(&instance);
        if let Some(subscription) = subscription {
            subscription.close();
        }
        let timer = self.lock_timers().remove(&instance);
        if let Some((_, handle)) = timer {
            handle.abort();
        }
    }

    fn lock_subscriptions(&self) -> MutexGuard<'_, HashMap<FlowInstanceId, Subscription<UserAction>>> {
        self.subscriptions.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_timers(&self) -> MutexGuard<'_, HashMap<FlowInstanceId, (u64, JoinHandle<()>)>> {
        self.timers.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn normalize_options(settings: &UserSettings) -> NormalizeOptions {
        NormalizeOptions {
            decimal_separator: settings.decimal_separator,
            default_run_type: settings.default_run_type,
        }
    }

    /// Load run history into the session if it is not cached yet
    async fn ensure_history(&self, session: &mut Session) {
        if session.cached_run_history.is_some() {
            return;
        }
        match self.backend.list_runs(&session.user_id).await {
            Ok(history) => session.cached_run_history = Some(history),
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, error = %e, "Could not load run history");
            }
        }
    }

    async fn collect_upload(&self, session: &mut Session, bytes: &[u8], screenshot: ScreenshotAttachment) -> Result<()> {
        match self.extractor.extract(bytes, &session.settings.scan_language).await {
            Ok(fields) => {
                tracing::info!(
                    user_id = %session.user_id,
                    filename = %screenshot.filename,
                    fields = fields.len(),
                    "Screenshot extracted"
                );
                session.screenshot = Some(screenshot);
                self.collected(session, &fields).await
            }
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, error = %e, "Screenshot extraction failed");
                let prompt = prompts::upload().warning(format!(
                    "Could not read that screenshot ({}). Try another image, or go back and paste the report.",
                    e
                ));
                self.present(session, prompt).await
            }
        }
    }

    async fn collect_paste(&self, session: &mut Session, text: &str) -> Result<()> {
        let fields = parse_pasted_report(text);
        if fields.is_empty() {
            let prompt = prompts::paste().warning("No run details found in that text. Paste the whole battle report.");
            return self.present(session, prompt).await;
        }
        self.collected(session, &fields).await
    }

    async fn collected(&self, session: &mut Session, fields: &Map<String, Value>) -> Result<()> {
        let options = Self::normalize_options(&session.settings);
        let mut run = normalize_incoming_with(fields, &Map::new(), &options);
        run.stamp_capture_time(self.store.now(), session.settings.utc_offset());
        session.draft_run = run;
        self.after_collection(session).await
    }

    async fn manual_input(&self, session: &mut Session, text: &str) -> Result<()> {
        match session.manual.record(text) {
            ManualStep::Prompt(_) => {
                let prompt = prompts::manual_field(session);
                self.present(session, prompt).await
            }
            ManualStep::Complete => {
                let mut run = RunRecord::draft(session.settings.default_run_type);
                session.manual.apply_to(&mut run, session.settings.decimal_separator);
                run.stamp_capture_time(self.store.now(), session.settings.utc_offset());
                session.draft_run = run;
                self.after_collection(session).await
            }
        }
    }

    async fn manual_back(&self, session: &mut Session) -> Result<Step> {
        match session.manual.back() {
            ManualBack::Exit => Ok(Step::Finish(Stage::Cancelled)),
            ManualBack::Prompt(_) => {
                let prompt = prompts::manual_field(session);
                self.present(session, prompt).await?;
                Ok(Step::Continue)
            }
        }
    }

    /// Duplicate check, then review
    async fn after_collection(&self, session: &mut Session) -> Result<()> {
        session.editing_run_id = None;
        session.is_duplicate_run = false;
        session.original_run = None;
        session.changed_fields.clear();

        if session.settings.auto_detect_duplicates {
            self.ensure_history(session).await;
            let matched = session
                .cached_run_history
                .as_ref()
                .map(|history| find_duplicate(&session.draft_run, &history.runs));
            if let Some(found) = matched.filter(|m| m.is_duplicate) {
                tracing::info!(
                    user_id = %session.user_id,
                    matched_run_id = ?found.matched_run_id,
                    "Duplicate run detected"
                );
                session.is_duplicate_run = true;
                session.editing_run_id = found.matched_run_id;
            }
        }
        self.enter_review(session, true).await
    }

    async fn enter_review(&self, session: &mut Session, allow_auto_accept: bool) -> Result<()> {
        self.move_to(session, Stage::ReviewingData);
        if allow_auto_accept && !session.settings.confirm_before_submit {
            tracing::debug!(user_id = %session.user_id, "Confirmation disabled, submitting directly");
            return self.submit(session).await;
        }
        let prompt = prompts::review(session);
        self.present(session, prompt).await
    }

    async fn begin_edit(&self, session: &mut Session, base: RunRecord) -> Result<()> {
        session.original_run = Some(base.clone());
        session.draft_run = base;
        session.edit = EditPass::begin();
        session.changed_fields.clear();
        self.move_to(session, Stage::EditingFields);
        let prompt = prompts::edit_select(session);
        self.present(session, prompt).await
    }

    async fn select_edit_fields(&self, session: &mut Session, fields: Vec<RunField>) -> Result<()> {
        if !session.edit.is_selecting() {
            let prompt = prompts::for_session(session).notice("Finish the current field first, or go back.");
            return self.present(session, prompt).await;
        }
        match session.edit.select(fields) {
            EditStep::Prompt(_) => {
                let prompt = prompts::edit_field(session);
                self.present(session, prompt).await
            }
            EditStep::Complete => {
                if let Some(original) = session.original_run.take() {
                    session.draft_run = original;
                }
                self.enter_review(session, false).await
            }
        }
    }

    async fn edit_input(&self, session: &mut Session, text: &str) -> Result<()> {
        if session.edit.is_selecting() {
            let prompt = prompts::edit_select(session).notice("Choose the fields to change first.");
            return self.present(session, prompt).await;
        }
        match session.edit.record(text) {
            EditStep::Prompt(_) => {
                let prompt = prompts::edit_field(session);
                self.present(session, prompt).await
            }
            EditStep::Complete => self.finish_edit(session).await,
        }
    }

    async fn edit_back(&self, session: &mut Session) -> Result<()> {
        match session.edit.back() {
            EditBack::ExitToReview => {
                if let Some(original) = session.original_run.take() {
                    session.draft_run = original;
                }
                self.enter_review(session, false).await
            }
            EditBack::SelectFields => {
                let prompt = prompts::edit_select(session);
                self.present(session, prompt).await
            }
            EditBack::Prompt(_) => {
                let prompt = prompts::edit_field(session);
                self.present(session, prompt).await
            }
        }
    }

    async fn finish_edit(&self, session: &mut Session) -> Result<()> {
        let base = session
            .original_run
            .take()
            .unwrap_or_else(|| session.draft_run.clone());
        let (merged, changed) = merge_edits(&base, session.edit.pending(), session.settings.decimal_separator);
        tracing::info!(
            user_id = %session.user_id,
            changed = ?changed,
            "Edit pass complete"
        );
        session.draft_run = merged;
        session.changed_fields = changed;
        session.edit = EditPass::default();
        self.enter_review(session, true).await
    }

    async fn submit(&self, session: &mut Session) -> Result<()> {
        self.move_to(session, Stage::Submitting);
        let user_id = session.user_id.clone();

        let outcome = match session.editing_run_id.clone() {
            Some(run_id) => self
                .backend
                .update_run(&user_id, &run_id, &session.draft_run)
                .await
                .map(|_| (run_id, false)),
            None => self
                .backend
                .insert_run(&user_id, &session.draft_run)
                .await
                .map(|run_id| (run_id, true)),
        };

        let (run_id, inserted) = match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Submission failed"
                );
                session.last_error = Some(e.to_string());
                let prompt = prompts::submit_failed(session);
                return self.present(session, prompt).await;
            }
        };

        tracing::info!(user_id = %user_id, run_id = %run_id, inserted, "Run submitted");
        session.draft_run.run_id = Some(run_id);
        let submitted = session.draft_run.clone();
        self.refresh_history(session, &submitted).await;

        session.last_submitted = Some(submitted);
        session.last_error = None;
        session.editing_run_id = None;
        session.is_duplicate_run = false;
        session.original_run = None;
        session.changed_fields.clear();

        let total = session.cached_run_history.as_ref().map_or(0, RunHistory::total);
        self.notify_run_count(&user_id, total);

        self.move_to(session, Stage::PostSubmit);
        let notice = if inserted { "Run logged." } else { "Run updated." };
        let prompt = prompts::post_submit(session).notice(notice);
        self.present(session, prompt).await
    }

    /// Re-fetch history after a mutation, falling back to a local update
    async fn refresh_history(&self, session: &mut Session, submitted: &RunRecord) {
        match self.backend.list_runs(&session.user_id).await {
            Ok(history) => session.cached_run_history = Some(history),
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, error = %e, "History refresh failed, updating cache locally");
                session
                    .cached_run_history
                    .get_or_insert_with(RunHistory::default)
                    .record_submission(submitted.clone());
            }
        }
    }

    fn notify_run_count(&self, user_id: &str, total: usize) {
        let notifier = Arc::clone(&self.notifier);
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = notifier.run_count_changed(&user_id, total).await {
                tracing::warn!(user_id = %user_id, error = %e, "Role notification failed");
            }
        });
    }

    async fn edit_last(&self, session: &mut Session) -> Result<()> {
        self.ensure_history(session).await;
        let last = session
            .cached_run_history
            .as_ref()
            .and_then(|history| history.last_run.clone());
        match last {
            Some(run) => {
                session.reset_draft();
                session.editing_run_id = run.run_id.clone();
                self.begin_edit(session, run).await
            }
            None => {
                let prompt = self.menu(session).notice("You have no logged runs yet.");
                self.present(session, prompt).await
            }
        }
    }

    async fn delete_last(&self, session: &mut Session) -> Result<()> {
        self.ensure_history(session).await;
        let last_id = session
            .cached_run_history
            .as_ref()
            .and_then(|history| history.last_run.as_ref())
            .and_then(|run| run.run_id.clone());

        let Some(run_id) = last_id else {
            let prompt = self.menu(session).notice("You have no logged runs to delete.");
            return self.present(session, prompt).await;
        };

        let user_id = session.user_id.clone();
        let prompt = match self.backend.delete_run(&user_id, &run_id).await {
            Ok(()) => {
                tracing::info!(user_id = %user_id, run_id = %run_id, "Deleted last run");
                match self.backend.list_runs(&user_id).await {
                    Ok(history) => session.cached_run_history = Some(history),
                    Err(e) => {
                        tracing::warn!(user_id = %user_id, error = %e, "History refresh failed, updating cache locally");
                        if let Some(history) = session.cached_run_history.as_mut() {
                            history.remove(&run_id);
                        }
                    }
                }
                let total = session.cached_run_history.as_ref().map_or(0, RunHistory::total);
                self.notify_run_count(&user_id, total);
                self.menu(session).notice("Deleted your last run.")
            }
            Err(e) => {
                tracing::warn!(user_id = %user_id, run_id = %run_id, error = %e, "Delete failed");
                self.menu(session).warning(format!("Could not delete your last run: {}", e))
            }
        };
        self.present(session, prompt).await
    }

    async fn update_settings(&self, session: &mut Session, settings: UserSettings) -> Result<()> {
        let prompt = match self.backend.save_user_settings(&session.user_id, &settings).await {
            Ok(()) => {
                tracing::info!(user_id = %session.user_id, "Settings saved");
                session.settings = settings;
                prompts::settings(&session.settings).notice("Settings saved.")
            }
            Err(e) => {
                tracing::warn!(user_id = %session.user_id, error = %e, "Saving settings failed");
                prompts::settings(&session.settings).warning(format!("Could not save settings: {}", e))
            }
        };
        self.present(session, prompt).await
    }

    async fn share(&self, session: &mut Session) -> Result<()> {
        let prompt = match &session.last_submitted {
            Some(run) => {
                let text = share_text(&session.user_id, run, &session.settings);
                tracing::info!(user_id = %session.user_id, run_id = ?run.run_id, "Run shared");
                prompts::post_submit(session).body(text).notice("Shared.")
            }
            None => prompts::post_submit(session).warning("There is no submitted run to share."),
        };
        self.present(session, prompt).await
    }
}

/// Bus subscriber that feeds one instance's events into the engine
struct EngineHandler {
    engine: Weak<FlowEngine>,
}

#[async_trait]
impl FlowHandler<UserAction> for EngineHandler {
    async fn on_navigate(&self, instance: FlowInstanceId, user_id: &str, target: NavigateTarget) -> anyhow::Result<()> {
        if let Some(engine) = self.engine.upgrade() {
            engine.navigate(instance, user_id, target).await?;
        }
        Ok(())
    }

    async fn on_dispatch(&self, instance: FlowInstanceId, user_id: &str, action: UserAction) -> anyhow::Result<()> {
        if let Some(engine) = self.engine.upgrade() {
            engine.handle_action(instance, user_id, action).await?;
        }
        Ok(())
    }

    async fn on_error(&self, instance: FlowInstanceId, fault: &FlowFault) {
        if let Some(engine) = self.engine.upgrade() {
            engine.abort(instance, fault).await;
        }
    }
}
