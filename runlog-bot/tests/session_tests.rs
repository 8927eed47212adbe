//! Session store eviction and ownership tests

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use runlog_bot::flow::Stage;
use runlog_bot::session::{ManualClock, Session, SessionStore};
use runlog_common::events::FlowInstanceId;
use runlog_common::UserSettings;

const IDLE: Duration = Duration::from_secs(3600);

fn fixture() -> (Arc<ManualClock>, SessionStore) {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
    let store = SessionStore::new(IDLE, clock.clone());
    (clock, store)
}

fn session(store: &SessionStore, user_id: &str) -> Session {
    Session::new(user_id, FlowInstanceId::new(), UserSettings::default(), store.now())
}

/// Session created at t=0 is swept at idle + 1s but not at idle - 1s
#[tokio::test]
async fn test_sweep_respects_idle_threshold() {
    let (_clock, store) = fixture();
    let t0 = store.now();
    store.set(session(&store, "ana")).await;

    let early = t0 + chrono::Duration::seconds(3599);
    assert!(store.sweep(early).await.is_empty());
    assert!(store.get("ana").await.is_some());

    let late = t0 + chrono::Duration::seconds(3601);
    let evicted = store.sweep(late).await;
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].user_id, "ana");
    assert!(store.get("ana").await.is_none());
}

#[tokio::test]
async fn test_touch_keeps_session_alive() {
    let (clock, store) = fixture();
    store.set(session(&store, "ana")).await;
    store.set(session(&store, "bob")).await;

    clock.advance(chrono::Duration::minutes(50));
    assert!(store.touch("ana").await);
    assert!(!store.touch("nobody").await);

    clock.advance(chrono::Duration::minutes(20));
    let evicted = store.sweep(store.now()).await;
    assert_eq!(evicted.len(), 1);
    assert_eq!(evicted[0].user_id, "bob");
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_commit_refuses_replaced_session() {
    let (_clock, store) = fixture();
    let mut stale = session(&store, "ana");
    store.set(stale.clone()).await;

    let fresh = session(&store, "ana");
    let replaced = store.set(fresh.clone()).await;
    assert_eq!(replaced.map(|s| s.instance_id), Some(stale.instance_id));

    stale.stage = Stage::PostSubmit;
    assert!(!store.commit(stale.clone()).await);
    assert!(store.remove_instance("ana", stale.instance_id).await.is_none());

    let current = store.get("ana").await.unwrap();
    assert_eq!(current.instance_id, fresh.instance_id);
    assert_eq!(current.stage, Stage::Initial);
    assert_eq!(
        store.find_instance(fresh.instance_id).await.map(|s| s.user_id),
        Some("ana".to_string())
    );
}

#[tokio::test]
async fn test_snapshot_is_ordered_by_user() {
    let (_clock, store) = fixture();
    for user in ["cy", "ana", "bob"] {
        store.set(session(&store, user)).await;
    }
    let users: Vec<String> = store.snapshot().await.into_iter().map(|s| s.user_id).collect();
    assert_eq!(users, vec!["ana", "bob", "cy"]);
}
