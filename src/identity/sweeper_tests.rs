use super::*;
use crate::error::AuthError;
use crate::identity::credentials::{BasicAccount, Credentials};
use crate::identity::session::{MemorySessionStore, Session};

fn issue(store: &MemorySessionStore, login: &str, ttl: Duration) -> Session {
    let creds = Arc::new(Credentials::new(1, login, "h"));
    let s = Session::issue(Arc::new(BasicAccount { id: 1 }), creds, ttl, false).unwrap();
    store.create(s.clone()).unwrap();
    s
}

#[test]
fn sweep_removes_only_expired() {
    let store = MemorySessionStore::new();
    let short = issue(&store, "short", Duration::from_millis(1));
    let long = issue(&store, "long", Duration::from_secs(3600));
    std::thread::sleep(Duration::from_millis(5));

    let removed = sweep_expired(&store, Utc::now(), &StepGate::open()).unwrap();
    assert_eq!(removed, 1);
    assert!(store.invoke(short.id()).is_err());
    assert!(store.invoke(long.id()).is_ok());
}

#[test]
fn sweep_at_exact_expiry_revokes() {
    let store = MemorySessionStore::new();
    let s = issue(&store, "edge", Duration::from_secs(60));
    let removed = sweep_expired(&store, s.expires_at(), &StepGate::open()).unwrap();
    assert_eq!(removed, 1);
}

#[test]
fn sweep_on_empty_store_is_noop() {
    let store = MemorySessionStore::new();
    assert_eq!(sweep_expired(&store, Utc::now(), &StepGate::open()).unwrap(), 0);
}

#[test]
fn closed_gate_stops_the_sweep() {
    let store = MemorySessionStore::new();
    issue(&store, "a", Duration::from_millis(1));
    std::thread::sleep(Duration::from_millis(5));
    let gate = StepGate::open();
    gate.cancel();
    assert_eq!(sweep_expired(&store, Utc::now(), &gate).unwrap_err(), AuthError::Cancelled);
    assert_eq!(store.count(), 1);
}

#[test]
fn tick_budget_leaves_margin() {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    assert_eq!(
        ExpirySweeper::new(store.clone(), Duration::from_secs(10)).tick_budget(),
        Duration::from_millis(9900)
    );
    assert_eq!(ExpirySweeper::new(store, Duration::from_millis(100)).tick_budget(), Duration::from_millis(50));
}

#[tokio::test]
async fn background_sweeper_revokes_and_stops() {
    let store = Arc::new(MemorySessionStore::new());
    let expired = issue(&store, "gone", Duration::from_millis(10));
    let live = issue(&store, "kept", Duration::from_secs(3600));

    let shutdown = CancellationToken::new();
    let handle = ExpirySweeper::new(store.clone(), Duration::from_millis(50)).spawn(shutdown.clone());

    let mut swept = false;
    for _ in 0..40 {
        tokio::time::sleep(Duration::from_millis(25)).await;
        if store.invoke(expired.id()).is_err() {
            swept = true;
            break;
        }
    }
    assert!(swept, "expired session survived the sweeper");
    assert!(store.invoke(live.id()).is_ok());

    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn extreme_intervals_are_clamped() {
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    assert_eq!(ExpirySweeper::new(store.clone(), Duration::MAX).interval(), MAX_DURATION);
    assert_eq!(ExpirySweeper::new(store.clone(), Duration::ZERO).interval(), Duration::from_millis(1));

    // arming the ticker with the largest interval must not panic
    let shutdown = CancellationToken::new();
    let handle = ExpirySweeper::new(store, Duration::MAX).spawn(shutdown.clone());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!handle.is_finished());
    shutdown.cancel();
    tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
}
