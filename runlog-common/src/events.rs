//! Flow event dispatch
//!
//! Every top-level command invocation is a flow instance with its own set of
//! subscribers. UI-originated actions are published as typed [`FlowEvent`]s on
//! one of three channels:
//!
//! - `Navigate`: coarse moves (main menu, cancel, open settings)
//! - `Dispatch`: a specific user action for the flow handler
//! - `Error`: a handler failure converted into a notification
//!
//! Subscriptions are guards: dropping a [`Subscription`] (or calling
//! [`Subscription::close`]) removes the listener, so a finished flow cannot
//! leave handlers behind.
//!
//! Each subscriber gets its own worker task. Events reach a subscriber in
//! publish order, one at a time, while different subscribers run
//! independently. A handler returning an error or panicking does not affect
//! other subscribers; the failure is re-published as an `Error` event for the
//! instance.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Identifier of one flow instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowInstanceId(Uuid);

impl FlowInstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FlowInstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse-grained navigation requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavigateTarget {
    MainMenu,
    Cancel,
    OpenSettings,
}

/// A handler failure reported on the `Error` channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowFault {
    pub user_id: Option<String>,
    pub message: String,
    /// Whether the handler panicked rather than returning an error
    pub panicked: bool,
}

/// Event published for one flow instance
#[derive(Debug, Clone)]
pub enum FlowEvent<A> {
    Navigate { user_id: String, target: NavigateTarget },
    Dispatch { user_id: String, action: A },
    Error(FlowFault),
}

impl<A> FlowEvent<A> {
    fn user_id(&self) -> Option<&str> {
        match self {
            FlowEvent::Navigate { user_id, .. } | FlowEvent::Dispatch { user_id, .. } => Some(user_id),
            FlowEvent::Error(fault) => fault.user_id.as_deref(),
        }
    }

    fn channel(&self) -> &'static str {
        match self {
            FlowEvent::Navigate { .. } => "navigate",
            FlowEvent::Dispatch { .. } => "dispatch",
            FlowEvent::Error(_) => "error",
        }
    }
}

/// Subscriber for one flow instance's events
#[async_trait]
pub trait FlowHandler<A>: Send + Sync + 'static
where
    A: Send + 'static,
{
    async fn on_navigate(&self, instance: FlowInstanceId, user_id: &str, target: NavigateTarget) -> anyhow::Result<()>;

    async fn on_dispatch(&self, instance: FlowInstanceId, user_id: &str, action: A) -> anyhow::Result<()>;

    /// Called for faults from any subscriber of the instance; failures here are only logged
    async fn on_error(&self, instance: FlowInstanceId, fault: &FlowFault);
}

struct SubscriberEntry<A> {
    id: u64,
    tx: mpsc::UnboundedSender<FlowEvent<A>>,
}

struct BusInner<A> {
    table: Mutex<HashMap<FlowInstanceId, Vec<SubscriberEntry<A>>>>,
    next_id: AtomicU64,
}

/// Process-wide dispatch table keyed by flow instance
///
/// Cheap to clone; clones share the same table.
pub struct DispatchBus<A> {
    inner: Arc<BusInner<A>>,
}

impl<A> Clone for DispatchBus<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A> Default for DispatchBus<A>
where
    A: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A> DispatchBus<A>
where
    A: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                table: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `handler` for `instance`
    ///
    /// Must be called inside a tokio runtime; the subscriber's worker task is
    /// spawned here and ends when the subscription is closed.
    pub fn subscribe(&self, instance: FlowInstanceId, handler: Arc<dyn FlowHandler<A>>) -> Subscription<A> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.lock_table()
            .entry(instance)
            .or_default()
            .push(SubscriberEntry { id, tx });

        tokio::spawn(run_subscriber(Arc::downgrade(&self.inner), instance, handler, rx));

        tracing::debug!(instance = %instance, subscriber = id, "Flow subscriber registered");

        Subscription {
            instance,
            id,
            bus: Arc::downgrade(&self.inner),
            closed: AtomicBool::new(false),
        }
    }

    /// Queue an event for every subscriber of `instance`
    ///
    /// Returns immediately with the number of subscribers reached.
    pub fn publish(&self, instance: FlowInstanceId, event: FlowEvent<A>) -> usize {
        publish_to(&self.inner, instance, event)
    }

    pub fn navigate(&self, instance: FlowInstanceId, user_id: impl Into<String>, target: NavigateTarget) -> usize {
        self.publish(
            instance,
            FlowEvent::Navigate {
                user_id: user_id.into(),
                target,
            },
        )
    }

    pub fn dispatch(&self, instance: FlowInstanceId, user_id: impl Into<String>, action: A) -> usize {
        self.publish(
            instance,
            FlowEvent::Dispatch {
                user_id: user_id.into(),
                action,
            },
        )
    }

    /// Live subscribers of one instance
    pub fn subscriber_count(&self, instance: FlowInstanceId) -> usize {
        self.lock_table().get(&instance).map_or(0, Vec::len)
    }

    /// Instances with at least one live subscriber
    pub fn instance_count(&self) -> usize {
        self.lock_table().len()
    }

    fn lock_table(&self) -> std::sync::MutexGuard<'_, HashMap<FlowInstanceId, Vec<SubscriberEntry<A>>>> {
        lock_table(&self.inner)
    }
}

fn lock_table<A>(inner: &BusInner<A>) -> std::sync::MutexGuard<'_, HashMap<FlowInstanceId, Vec<SubscriberEntry<A>>>> {
    // A poisoned table only means a panic happened mid-insert; the map itself is still usable
    inner.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn publish_to<A: Clone>(inner: &BusInner<A>, instance: FlowInstanceId, event: FlowEvent<A>) -> usize {
    let table = lock_table(inner);
    let Some(subscribers) = table.get(&instance) else {
        tracing::debug!(instance = %instance, channel = event.channel(), "No subscribers for flow event");
        return 0;
    };
    subscribers
        .iter()
        .filter(|s| s.tx.send(event.clone()).is_ok())
        .count()
}

async fn deliver<A: Send + 'static>(
    handler: Arc<dyn FlowHandler<A>>,
    instance: FlowInstanceId,
    event: FlowEvent<A>,
) -> anyhow::Result<()> {
    match event {
        FlowEvent::Navigate { user_id, target } => handler.on_navigate(instance, &user_id, target).await,
        FlowEvent::Dispatch { user_id, action } => handler.on_dispatch(instance, &user_id, action).await,
        FlowEvent::Error(fault) => {
            handler.on_error(instance, &fault).await;
            Ok(())
        }
    }
}

async fn run_subscriber<A>(
    bus: Weak<BusInner<A>>,
    instance: FlowInstanceId,
    handler: Arc<dyn FlowHandler<A>>,
    mut rx: mpsc::UnboundedReceiver<FlowEvent<A>>,
) where
    A: Clone + Send + Sync + 'static,
{
    while let Some(event) = rx.recv().await {
        let channel = event.channel();
        let user_id = event.user_id().map(str::to_string);

        // Run on its own task so a panic is contained to this event
        let outcome = tokio::spawn(deliver(Arc::clone(&handler), instance, event)).await;

        let fault = match outcome {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => FlowFault {
                user_id,
                message: format!("{:#}", e),
                panicked: false,
            },
            Err(e) if e.is_panic() => FlowFault {
                user_id,
                message: "flow handler panicked".to_string(),
                panicked: true,
            },
            Err(_) => continue,
        };

        if channel == "error" {
            tracing::error!(instance = %instance, error = %fault.message, "Flow error handler failed");
            continue;
        }

        tracing::warn!(
            instance = %instance,
            channel,
            error = %fault.message,
            panicked = fault.panicked,
            "Flow handler failed"
        );
        match bus.upgrade() {
            Some(inner) => {
                publish_to(&inner, instance, FlowEvent::Error(fault));
            }
            None => break,
        }
    }
    tracing::debug!(instance = %instance, "Flow subscriber stopped");
}

/// Live registration of one handler; unsubscribes on drop
pub struct Subscription<A> {
    instance: FlowInstanceId,
    id: u64,
    bus: Weak<BusInner<A>>,
    closed: AtomicBool,
}

impl<A> Subscription<A> {
    pub fn instance(&self) -> FlowInstanceId {
        self.instance
    }

    /// Remove the handler; safe to call more than once
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(inner) = self.bus.upgrade() else {
            return;
        };
        let mut table = lock_table(&inner);
        if let Some(subscribers) = table.get_mut(&self.instance) {
            subscribers.retain(|s| s.id != self.id);
            if subscribers.is_empty() {
                table.remove(&self.instance);
            }
        }
        tracing::debug!(instance = %self.instance, subscriber = self.id, "Flow subscriber removed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<A> Drop for Subscription<A> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        fail_on: Option<u32>,
        panic_on: Option<u32>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl FlowHandler<u32> for Recorder {
        async fn on_navigate(&self, _: FlowInstanceId, user_id: &str, target: NavigateTarget) -> anyhow::Result<()> {
            self.seen.lock().unwrap().push(format!("nav:{user_id}:{target:?}"));
            Ok(())
        }

        async fn on_dispatch(&self, _: FlowInstanceId, _: &str, action: u32) -> anyhow::Result<()> {
            if self.panic_on == Some(action) {
                panic!("boom");
            }
            if self.fail_on == Some(action) {
                anyhow::bail!("bad action {action}");
            }
            // Later events must not overtake earlier ones
            tokio::time::sleep(Duration::from_millis(u64::from(5 - action.min(5)))).await;
            self.seen.lock().unwrap().push(format!("act:{action}"));
            Ok(())
        }

        async fn on_error(&self, _: FlowInstanceId, fault: &FlowFault) {
            self.seen.lock().unwrap().push(format!("err:{}", fault.panicked));
        }
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let bus = DispatchBus::<u32>::new();
        let instance = FlowInstanceId::new();
        let rec = Arc::new(Recorder::default());
        let _sub = bus.subscribe(instance, rec.clone());

        for n in 1..=4 {
            assert_eq!(bus.dispatch(instance, "u1", n), 1);
        }
        bus.navigate(instance, "u1", NavigateTarget::MainMenu);

        wait_until(|| rec.seen().len() == 5).await;
        assert_eq!(rec.seen(), vec!["act:1", "act:2", "act:3", "act:4", "nav:u1:MainMenu"]);
    }

    #[tokio::test]
    async fn test_failure_becomes_error_event_for_all_subscribers() {
        let bus = DispatchBus::<u32>::new();
        let instance = FlowInstanceId::new();
        let failing = Arc::new(Recorder {
            fail_on: Some(7),
            ..Default::default()
        });
        let healthy = Arc::new(Recorder::default());
        let _a = bus.subscribe(instance, failing.clone());
        let _b = bus.subscribe(instance, healthy.clone());

        bus.dispatch(instance, "u1", 7);

        wait_until(|| healthy.seen().len() == 2 && failing.seen().len() == 1).await;
        assert_eq!(healthy.seen(), vec!["act:7", "err:false"]);
        assert_eq!(failing.seen(), vec!["err:false"]);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let bus = DispatchBus::<u32>::new();
        let instance = FlowInstanceId::new();
        let rec = Arc::new(Recorder {
            panic_on: Some(3),
            ..Default::default()
        });
        let _sub = bus.subscribe(instance, rec.clone());

        bus.dispatch(instance, "u1", 3);
        bus.dispatch(instance, "u1", 4);

        // The error event is queued behind the already-published action
        wait_until(|| rec.seen().len() == 2).await;
        assert_eq!(rec.seen(), vec!["act:4", "err:true"]);
    }

    #[tokio::test]
    async fn test_dropping_subscription_unsubscribes() {
        let bus = DispatchBus::<u32>::new();
        let instance = FlowInstanceId::new();
        let rec = Arc::new(Recorder::default());
        let sub = bus.subscribe(instance, rec.clone());
        assert_eq!(bus.subscriber_count(instance), 1);

        sub.close();
        sub.close();
        assert!(sub.is_closed());
        assert_eq!(bus.subscriber_count(instance), 0);
        assert_eq!(bus.instance_count(), 0);
        assert_eq!(bus.dispatch(instance, "u1", 1), 0);

        let other = bus.subscribe(instance, rec.clone());
        drop(other);
        assert_eq!(bus.subscriber_count(instance), 0);
    }

    #[tokio::test]
    async fn test_instances_are_isolated() {
        let bus = DispatchBus::<u32>::new();
        let (a, b) = (FlowInstanceId::new(), FlowInstanceId::new());
        let rec_a = Arc::new(Recorder::default());
        let rec_b = Arc::new(Recorder::default());
        let _sa = bus.subscribe(a, rec_a.clone());
        let _sb = bus.subscribe(b, rec_b.clone());

        bus.dispatch(a, "u1", 1);
        wait_until(|| rec_a.seen().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rec_b.seen().is_empty());
    }
}
