//! Offline-first goal planning core.
//! Local writes land in SQLite first; per-user sync passes reconcile the
//! replica with a remote document store.

pub mod clock;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod remote;
pub mod repo;
pub mod service;
pub mod sync;

pub use config::{ConfigError, LogConfig, SyncConfig, MAX_SYNC_ATTEMPTS};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{EntityId, EntityKind, Status, SyncMeta, ValidationError};
pub use model::goal::{Goal, GoalWithTasks};
pub use model::profile::Profile;
pub use model::record::Record;
pub use model::task::Task;
pub use model::user::User;
pub use remote::memory::{InMemoryRemoteStore, RemoteCall};
pub use remote::{RemoteError, RemoteResult, RemoteStore};
pub use repo::local_store::{ApplyOutcome, LocalStore, RepoError, RepoResult, SkipReason};
pub use repo::observe::GoalObserver;
pub use repo::sqlite_store::SqliteLocalStore;
pub use service::goal_service::GoalService;
pub use service::profile_service::ProfileService;
pub use service::task_service::TaskService;
pub use service::user_service::UserService;
pub use service::{ServiceError, ServiceResult};
pub use sync::cancel::CancelSignal;
pub use sync::change_tracker::{ChangeTracker, SyncRequester};
pub use sync::engine::{PassReport, SyncEngine, SyncError, SyncOutcome, SyncState};
pub use sync::network::NetworkMonitor;
pub use sync::scheduler::SyncScheduler;

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
