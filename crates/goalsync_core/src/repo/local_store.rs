//! Local store contract shared by services, the change tracker and the engine.
//!
//! # Responsibility
//! - Define CRUD and sync-support operations over the four entity kinds.
//! - Define the semantic error type returned by store implementations.
//!
//! # Invariants
//! - Read paths hide tombstones unless `include_deleted` is requested.
//! - `upsert` always marks the row dirty; only `apply_pulled` and
//!   `mark_synced` ever produce `is_synced=true`.
//! - `hard_delete` only removes rows that are already tombstoned.
//! - Synced rows carry the remote store's write time, so low-water-marks
//!   never mix in the local clock.

use crate::db::DbError;
use crate::model::entity::{EntityId, EntityKind, ValidationError};
use crate::model::goal::{Goal, GoalWithTasks};
use crate::model::profile::Profile;
use crate::model::record::Record;
use crate::model::task::Task;
use crate::model::user::User;
use std::error::Error;
use std::fmt::{Display, Formatter};
use tokio::sync::watch;

pub type RepoResult<T> = Result<T, RepoError>;

/// Errors returned by local store implementations.
#[derive(Debug)]
pub enum RepoError {
    Validation(ValidationError),
    Db(DbError),
    /// Target row (or required live parent) does not exist or is tombstoned.
    NotFound { kind: EntityKind, id: EntityId },
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// A previous store call panicked while holding the connection.
    LockPoisoned,
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "local store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::LockPoisoned => write!(f, "local store connection lock is poisoned"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ValidationError> for RepoError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Result of writing one pulled remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Inserted,
    Updated,
    Skipped(SkipReason),
}

/// Why a pulled record was not written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Local row is a tombstone awaiting push; tombstones are never resurrected.
    LocalTombstone,
    /// Local row has an unpushed edit at least as new as the remote write.
    LocalNewer,
    /// Local row is already synced at the same remote write time.
    UpToDate,
    /// Parent row is missing or tombstoned locally.
    ParentMissing,
}

/// One step of an ownership chain as read from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerLink {
    pub kind: EntityKind,
    pub id: EntityId,
    pub parent_id: Option<EntityId>,
    pub is_deleted: bool,
}

/// Durable local replica of users, profiles, goals and tasks.
pub trait LocalStore: Send + Sync {
    /// Inserts or replaces a record by id as a local mutation.
    ///
    /// Stamps `updated_at=now`, `is_synced=false`, `is_deleted=false` and
    /// returns the stored record.
    ///
    /// # Errors
    /// - `Validation` when the record is invalid.
    /// - `NotFound` when the parent is missing/tombstoned or the row itself
    ///   is tombstoned.
    fn upsert(&self, record: &Record) -> RepoResult<Record>;

    /// Writes a record pulled from the remote store, preserving its
    /// `updated_at` and marking it synced.
    ///
    /// A synced local row takes the remote copy whenever the write times
    /// differ; only a dirty row is compared by last-writer-wins.
    fn apply_pulled(&self, record: &Record) -> RepoResult<ApplyOutcome>;

    fn get(&self, kind: EntityKind, id: &str, include_deleted: bool) -> RepoResult<Option<Record>>;

    /// Lists live rows of `kind` whose parent is `parent_id`.
    fn list_children(&self, kind: EntityKind, parent_id: &str) -> RepoResult<Vec<Record>>;

    /// Tombstones the row and all of its live descendants.
    ///
    /// Idempotent for rows that are already tombstoned.
    fn soft_delete(&self, kind: EntityKind, id: &str) -> RepoResult<()>;

    /// Physically removes one tombstoned row. Returns whether a row was removed.
    fn hard_delete(&self, kind: EntityKind, id: &str) -> RepoResult<bool>;

    /// Dirty rows of `kind` (live and tombstoned) inside the user's tree.
    fn get_unsynced(&self, kind: EntityKind, user_id: &str) -> RepoResult<Vec<Record>>;

    /// Marks the row synced if it still carries `pushed_updated_at`, adopting
    /// `remote_updated_at` (the server write time) as its `updated_at`.
    ///
    /// Returns `false` when the row changed after it was read for push.
    fn mark_synced(
        &self,
        kind: EntityKind,
        id: &str,
        pushed_updated_at: i64,
        remote_updated_at: i64,
    ) -> RepoResult<bool>;

    /// Maximum `updated_at` among synced rows of `kind` under `scope_id`.
    fn last_update_time(&self, kind: EntityKind, scope_id: &str) -> RepoResult<Option<i64>>;

    /// Reads the entity and its ancestors in one consistent snapshot,
    /// starting from the entity itself. Stops at the first missing row.
    fn ownership_snapshot(&self, kind: EntityKind, id: &str) -> RepoResult<Vec<OwnerLink>>;

    /// Live goals of a profile with their live tasks, in display order.
    fn goals_with_tasks(&self, profile_id: &str) -> RepoResult<Vec<GoalWithTasks>>;

    /// Revision counter bumped after every write that touched rows.
    fn subscribe(&self) -> watch::Receiver<u64>;

    fn get_user(&self, id: &str) -> RepoResult<Option<User>> {
        Ok(match self.get(EntityKind::User, id, false)? {
            Some(Record::User(user)) => Some(user),
            _ => None,
        })
    }

    fn get_profile(&self, id: &str) -> RepoResult<Option<Profile>> {
        Ok(match self.get(EntityKind::Profile, id, false)? {
            Some(Record::Profile(profile)) => Some(profile),
            _ => None,
        })
    }

    fn get_goal(&self, id: &str) -> RepoResult<Option<Goal>> {
        Ok(match self.get(EntityKind::Goal, id, false)? {
            Some(Record::Goal(goal)) => Some(goal),
            _ => None,
        })
    }

    fn get_task(&self, id: &str) -> RepoResult<Option<Task>> {
        Ok(match self.get(EntityKind::Task, id, false)? {
            Some(Record::Task(task)) => Some(task),
            _ => None,
        })
    }
}
