//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire the core against a SQLite replica and an in-memory remote store.
//! - Run one offline edit followed by a scheduled sync and print the result.
//!
//! Set `GOALSYNC_LOG_DIR` to an absolute directory to enable file logging and
//! `GOALSYNC_DB` to a file path to keep the local replica on disk.

use goalsync_core::{
    ChangeTracker, GoalService, InMemoryRemoteStore, LocalStore, LogConfig, NetworkMonitor,
    ProfileService, RemoteStore, SqliteLocalStore, SyncConfig, SyncEngine, SyncScheduler,
    SyncState, TaskService, UserService,
};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

const LOG_DIR_ENV: &str = "GOALSYNC_LOG_DIR";
const DB_PATH_ENV: &str = "GOALSYNC_DB";
const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    if let Ok(log_dir) = std::env::var(LOG_DIR_ENV) {
        goalsync_core::init_logging(&LogConfig::new(
            goalsync_core::default_log_level(),
            log_dir,
        ))?;
    }

    let config = SyncConfig {
        debounce_ms: 50,
        initial_backoff_ms: 200,
        ..SyncConfig::default()
    };
    config.validate()?;

    let conn = match std::env::var(DB_PATH_ENV) {
        Ok(path) => goalsync_core::db::open_db(path)?,
        Err(_) => goalsync_core::db::open_db_in_memory()?,
    };
    let store: Arc<dyn LocalStore> = Arc::new(SqliteLocalStore::try_new(conn)?);
    let remote = Arc::new(InMemoryRemoteStore::new());
    let remote_store: Arc<dyn RemoteStore> = remote.clone();
    let network = Arc::new(NetworkMonitor::new(false));

    let engine = Arc::new(SyncEngine::new(Arc::clone(&store), remote_store, &config));
    let scheduler = SyncScheduler::new(
        engine,
        Arc::clone(&network),
        &config,
        tokio::runtime::Handle::current(),
    );
    let tracker = Arc::new(ChangeTracker::new(
        Arc::clone(&store),
        Arc::new(scheduler.clone()),
    ));

    let users = UserService::new(Arc::clone(&store), Arc::clone(&tracker));
    let profiles = ProfileService::new(Arc::clone(&store), Arc::clone(&tracker));
    let goals = GoalService::new(Arc::clone(&store), Arc::clone(&tracker));
    let tasks = TaskService::new(Arc::clone(&store), Arc::clone(&tracker));

    // Edits made while offline stay local and queue one coalesced sync.
    let user = users.create_user("Demo", "demo@example.com")?;
    let profile = profiles.create_profile(&user.id, "Work", "day job")?;
    let goal = goals.create_goal(&profile.id, "Ship v1", "first public release")?;
    tasks.create_task(&goal.id, "Write changelog", "")?;
    println!(
        "goalsync offline goal_synced={} state={:?}",
        goal.meta.is_synced,
        scheduler.status(&user.id)
    );

    let mut state = scheduler.subscribe(&user.id);
    network.set_available(true);
    tokio::time::timeout(
        SYNC_TIMEOUT,
        state.wait_for(|state| matches!(state, SyncState::Done | SyncState::Failed)),
    )
    .await??;

    let synced = goals.get_goal(&goal.id)?.map(|goal| goal.meta.is_synced);
    println!(
        "goalsync online state={:?} passes={} remote_writes={} goal_synced={:?}",
        scheduler.status(&user.id),
        scheduler.passes_started(&user.id),
        remote.write_count(),
        synced
    );
    println!("goalsync_core version={}", goalsync_core::core_version());

    scheduler.shutdown().await;
    Ok(())
}
