use goalsync_core::db::open_db_in_memory;
use goalsync_core::{
    EntityKind, InMemoryRemoteStore, LocalStore, NetworkMonitor, Profile, Record,
    SqliteLocalStore, SyncConfig, SyncEngine, SyncScheduler, SyncState, User,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    local: Arc<SqliteLocalStore>,
    remote: Arc<InMemoryRemoteStore>,
    network: Arc<NetworkMonitor>,
    scheduler: SyncScheduler,
}

fn test_config() -> SyncConfig {
    SyncConfig {
        debounce_ms: 30,
        initial_backoff_ms: 10,
        max_backoff_ms: 40,
        ..SyncConfig::default()
    }
}

fn harness(remote: InMemoryRemoteStore, network_up: bool) -> Harness {
    harness_with(test_config(), remote, network_up)
}

fn harness_with(config: SyncConfig, remote: InMemoryRemoteStore, network_up: bool) -> Harness {
    let local = Arc::new(SqliteLocalStore::try_new(open_db_in_memory().unwrap()).unwrap());
    let remote = Arc::new(remote);
    let network = Arc::new(NetworkMonitor::new(network_up));
    let engine = Arc::new(SyncEngine::new(local.clone(), remote.clone(), &config));
    let scheduler = SyncScheduler::new(engine, network.clone(), &config, Handle::current());

    local
        .upsert(&Record::from(User::with_id("u1", "Ada", "ada@example.com")))
        .unwrap();
    local
        .upsert(&Record::from(Profile::new("u1", "Work", "")))
        .unwrap();

    Harness {
        local,
        remote,
        network,
        scheduler,
    }
}

async fn wait_for_state(rx: &mut watch::Receiver<SyncState>, expected: SyncState) {
    tokio::time::timeout(WAIT, rx.wait_for(|state| *state == expected))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {expected:?}"))
        .unwrap();
}

#[tokio::test]
async fn requests_before_start_coalesce_into_one_pass() {
    let h = harness(InMemoryRemoteStore::new(), true);
    let mut state = h.scheduler.subscribe("u1");

    h.scheduler.request_sync("u1");
    h.scheduler.request_sync("u1");
    wait_for_state(&mut state, SyncState::Done).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.scheduler.passes_started("u1"), 1);
    assert!(h
        .local
        .get_unsynced(EntityKind::Profile, "u1")
        .unwrap()
        .is_empty());
    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn jobs_wait_for_the_network() {
    let h = harness(InMemoryRemoteStore::new(), false);
    let mut state = h.scheduler.subscribe("u1");

    h.scheduler.request_sync("u1");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.scheduler.passes_started("u1"), 0);
    assert_eq!(h.scheduler.status("u1"), SyncState::Pending);
    assert!(h.remote.calls().is_empty());

    h.network.set_available(true);
    wait_for_state(&mut state, SyncState::Done).await;
    assert_eq!(h.scheduler.passes_started("u1"), 1);
    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn retryable_failures_stop_after_three_attempts() {
    let h = harness(InMemoryRemoteStore::new(), true);
    h.remote.set_available(false);
    let mut state = h.scheduler.subscribe("u1");

    h.scheduler.request_sync("u1");
    wait_for_state(&mut state, SyncState::Failed).await;
    assert_eq!(h.scheduler.passes_started("u1"), 3);
    assert_eq!(
        h.local.get_unsynced(EntityKind::Profile, "u1").unwrap().len(),
        1
    );

    // Failure is not sticky.
    h.remote.set_available(true);
    h.scheduler.request_sync("u1");
    wait_for_state(&mut state, SyncState::Done).await;
    assert_eq!(h.scheduler.passes_started("u1"), 4);
    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn request_during_backoff_restarts_the_attempt_count() {
    let config = SyncConfig {
        initial_backoff_ms: 200,
        max_backoff_ms: 400,
        ..test_config()
    };
    let h = harness_with(config, InMemoryRemoteStore::new(), true);
    h.remote.set_available(false);
    let mut state = h.scheduler.subscribe("u1");

    h.scheduler.request_sync("u1");
    wait_for_state(&mut state, SyncState::Retrying { attempt: 2 }).await;
    assert_eq!(h.scheduler.passes_started("u1"), 1);

    h.scheduler.request_sync("u1");
    assert_eq!(h.scheduler.status("u1"), SyncState::Pending);
    wait_for_state(&mut state, SyncState::Failed).await;
    assert_eq!(h.scheduler.passes_started("u1"), 4);
    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn request_during_a_pass_cancels_it_and_runs_again() {
    let remote = InMemoryRemoteStore::new().with_latency(Duration::from_millis(100));
    let h = harness(remote, true);
    let mut state = h.scheduler.subscribe("u1");

    h.scheduler.request_sync("u1");
    wait_for_state(&mut state, SyncState::Pushing).await;
    h.scheduler.request_sync("u1");
    // The running pass keeps its phase until it observes the cancellation.
    assert!(matches!(
        h.scheduler.status("u1"),
        SyncState::Pushing | SyncState::Pulling
    ));
    wait_for_state(&mut state, SyncState::Done).await;

    assert_eq!(h.scheduler.passes_started("u1"), 2);
    assert!(h
        .local
        .get_unsynced(EntityKind::Profile, "u1")
        .unwrap()
        .is_empty());
    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn users_are_scheduled_independently() {
    let h = harness(InMemoryRemoteStore::new(), true);
    h.local
        .upsert(&Record::from(User::with_id("u2", "Bob", "bob@example.com")))
        .unwrap();
    let mut first = h.scheduler.subscribe("u1");
    let mut second = h.scheduler.subscribe("u2");

    h.scheduler.request_sync("u1");
    h.scheduler.request_sync("u2");
    wait_for_state(&mut first, SyncState::Done).await;
    wait_for_state(&mut second, SyncState::Done).await;

    assert_eq!(h.scheduler.passes_started("u1"), 1);
    assert_eq!(h.scheduler.passes_started("u2"), 1);
    assert_eq!(h.scheduler.status("nobody"), SyncState::Idle);
    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn shutdown_rejects_new_requests() {
    let h = harness(InMemoryRemoteStore::new(), true);
    let mut state = h.scheduler.subscribe("u1");
    h.scheduler.request_sync("u1");
    wait_for_state(&mut state, SyncState::Done).await;

    h.scheduler.shutdown().await;
    h.scheduler.request_sync("u1");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.scheduler.passes_started("u1"), 1);
    assert_eq!(h.scheduler.status("u1"), SyncState::Done);
}
