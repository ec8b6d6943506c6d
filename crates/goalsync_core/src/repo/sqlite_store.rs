//! SQLite implementation of the local store.
//!
//! # Responsibility
//! - Keep SQL details for the four entity tables inside one boundary.
//! - Enforce envelope rules (stamping, tombstones, last-writer-wins on pull).
//! - Publish a revision bump after every committed write that touched rows.
//!
//! # Invariants
//! - Every multi-statement operation runs inside one transaction.
//! - A local edit stamps `updated_at` strictly above the row's previous value.
//! - Synced rows hold the remote write time, adopted on push acknowledgement
//!   or pull.
//! - Goal and task listings are ordered by
//!   `status ASC, priority ASC, sort_order ASC, updated_at DESC, id ASC`.

use crate::clock::{Clock, MonotonicClock};
use crate::db::migrations::{current_user_version, latest_version};
use crate::model::entity::{EntityKind, Status, SyncMeta};
use crate::model::goal::{Goal, GoalWithTasks};
use crate::model::profile::Profile;
use crate::model::record::Record;
use crate::model::task::Task;
use crate::model::user::User;
use crate::repo::local_store::{
    ApplyOutcome, LocalStore, OwnerLink, RepoError, RepoResult, SkipReason,
};
use log::debug;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

const USER_COLUMNS: &str = "e.id AS id, e.name AS name, e.email AS email, \
    e.updated_at AS updated_at, e.is_synced AS is_synced, e.is_deleted AS is_deleted";

const PROFILE_COLUMNS: &str = "e.id AS id, e.user_id AS parent_id, e.title AS title, \
    e.description AS description, e.updated_at AS updated_at, \
    e.is_synced AS is_synced, e.is_deleted AS is_deleted";

const GOAL_COLUMNS: &str = "e.id AS id, e.profile_id AS parent_id, e.title AS title, \
    e.description AS description, e.status AS status, e.priority AS priority, \
    e.sort_order AS sort_order, e.start_date AS start_date, e.target_date AS target_date, \
    e.updated_at AS updated_at, e.is_synced AS is_synced, e.is_deleted AS is_deleted";

const TASK_COLUMNS: &str = "e.id AS id, e.goal_id AS parent_id, e.title AS title, \
    e.description AS description, e.status AS status, e.priority AS priority, \
    e.sort_order AS sort_order, e.start_date AS start_date, e.target_date AS target_date, \
    e.updated_at AS updated_at, e.is_synced AS is_synced, e.is_deleted AS is_deleted";

const PLAN_ORDER: &str =
    "e.status ASC, e.priority ASC, e.sort_order ASC, e.updated_at DESC, e.id ASC";
const PROFILE_ORDER: &str = "e.updated_at DESC, e.id ASC";

const INSERT_USER: &str = "INSERT INTO users (id, name, email, updated_at, is_synced, is_deleted)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6);";
const UPDATE_USER: &str = "UPDATE users
     SET name = ?2, email = ?3, updated_at = ?4, is_synced = ?5, is_deleted = ?6
     WHERE id = ?1;";

const INSERT_PROFILE: &str = "INSERT INTO profiles (
        id, user_id, title, description, updated_at, is_synced, is_deleted
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);";
const UPDATE_PROFILE: &str = "UPDATE profiles
     SET user_id = ?2, title = ?3, description = ?4, updated_at = ?5,
         is_synced = ?6, is_deleted = ?7
     WHERE id = ?1;";

const INSERT_GOAL: &str = "INSERT INTO goals (
        id, profile_id, title, description, status, priority, sort_order,
        start_date, target_date, updated_at, is_synced, is_deleted
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);";
const UPDATE_GOAL: &str = "UPDATE goals
     SET profile_id = ?2, title = ?3, description = ?4, status = ?5, priority = ?6,
         sort_order = ?7, start_date = ?8, target_date = ?9, updated_at = ?10,
         is_synced = ?11, is_deleted = ?12
     WHERE id = ?1;";

const INSERT_TASK: &str = "INSERT INTO tasks (
        id, goal_id, title, description, status, priority, sort_order,
        start_date, target_date, updated_at, is_synced, is_deleted
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12);";
const UPDATE_TASK: &str = "UPDATE tasks
     SET goal_id = ?2, title = ?3, description = ?4, status = ?5, priority = ?6,
         sort_order = ?7, start_date = ?8, target_date = ?9, updated_at = ?10,
         is_synced = ?11, is_deleted = ?12
     WHERE id = ?1;";

/// Envelope columns of an existing row.
#[derive(Debug, Clone, Copy)]
struct RowState {
    updated_at: i64,
    is_synced: bool,
    is_deleted: bool,
}

/// SQLite-backed local store.
///
/// The connection is guarded by a mutex so the store can be shared between
/// the command services and concurrently running sync passes.
pub struct SqliteLocalStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
    changes: watch::Sender<u64>,
}

impl SqliteLocalStore {
    /// Wraps a migrated connection using a fresh monotonic clock.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema is not at the latest version.
    pub fn try_new(conn: Connection) -> RepoResult<Self> {
        Self::with_clock(conn, Arc::new(MonotonicClock::new()))
    }

    /// Wraps a migrated connection using a caller-supplied clock.
    pub fn with_clock(conn: Connection, clock: Arc<dyn Clock>) -> RepoResult<Self> {
        let actual_version = current_user_version(&conn)?;
        let expected_version = latest_version();
        if actual_version != expected_version {
            return Err(RepoError::UninitializedConnection {
                expected_version,
                actual_version,
            });
        }

        let (changes, _) = watch::channel(0);
        Ok(Self {
            conn: Mutex::new(conn),
            clock,
            changes,
        })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> RepoResult<T>) -> RepoResult<T> {
        let mut guard = self.conn.lock().map_err(|_| RepoError::LockPoisoned)?;
        f(&mut guard)
    }

    fn notify_changed(&self) {
        self.changes
            .send_modify(|revision| *revision = revision.wrapping_add(1));
    }

    fn tombstone_tree(&self, conn: &Connection, kind: EntityKind, id: &str) -> RepoResult<usize> {
        let mut changed = 0;
        if let Some(child_kind) = kind.child_kind() {
            for child_id in live_child_ids(conn, child_kind, id)? {
                changed += self.tombstone_tree(conn, child_kind, &child_id)?;
            }
        }

        changed += conn.execute(
            &format!(
                "UPDATE {}
                 SET is_deleted = 1, is_synced = 0, updated_at = MAX(updated_at + 1, ?2)
                 WHERE id = ?1 AND is_deleted = 0;",
                table_name(kind)
            ),
            params![id, self.clock.now_ms()],
        )?;
        Ok(changed)
    }
}

impl LocalStore for SqliteLocalStore {
    fn upsert(&self, record: &Record) -> RepoResult<Record> {
        record.validate()?;

        let stored = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            ensure_live_parent(&tx, record)?;

            let existing = row_state(&tx, record.kind(), record.id())?;
            if existing.is_some_and(|state| state.is_deleted) {
                return Err(RepoError::NotFound {
                    kind: record.kind(),
                    id: record.id().to_string(),
                });
            }

            let floor = existing.map_or(i64::MIN, |state| state.updated_at.saturating_add(1));
            let mut stored = record.clone();
            *stored.meta_mut() = SyncMeta {
                updated_at: self.clock.now_ms().max(floor),
                is_synced: false,
                is_deleted: false,
            };
            write_row(&tx, &stored, existing.is_some())?;
            tx.commit()?;
            Ok(stored)
        })?;

        debug!(
            "event=local_upsert module=store status=ok kind={} id={}",
            stored.kind(),
            stored.id()
        );
        self.notify_changed();
        Ok(stored)
    }

    fn apply_pulled(&self, record: &Record) -> RepoResult<ApplyOutcome> {
        record.validate()?;

        let outcome = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            if !parent_is_live(&tx, record)? {
                return Ok(ApplyOutcome::Skipped(SkipReason::ParentMissing));
            }

            let remote_at = record.updated_at();
            let existing = row_state(&tx, record.kind(), record.id())?;
            let outcome = match existing {
                Some(state) if state.is_deleted => ApplyOutcome::Skipped(SkipReason::LocalTombstone),
                // Dirty rows compare across clocks; ties keep the local edit.
                Some(state) if !state.is_synced && state.updated_at >= remote_at => {
                    ApplyOutcome::Skipped(SkipReason::LocalNewer)
                }
                Some(state) if state.is_synced && state.updated_at == remote_at => {
                    ApplyOutcome::Skipped(SkipReason::UpToDate)
                }
                Some(_) => ApplyOutcome::Updated,
                None => ApplyOutcome::Inserted,
            };

            if matches!(outcome, ApplyOutcome::Inserted | ApplyOutcome::Updated) {
                let mut stored = record.clone();
                *stored.meta_mut() = SyncMeta {
                    updated_at: remote_at,
                    is_synced: true,
                    is_deleted: false,
                };
                write_row(&tx, &stored, existing.is_some())?;
                tx.commit()?;
            }
            Ok(outcome)
        })?;

        if matches!(outcome, ApplyOutcome::Inserted | ApplyOutcome::Updated) {
            self.notify_changed();
        }
        Ok(outcome)
    }

    fn get(&self, kind: EntityKind, id: &str, include_deleted: bool) -> RepoResult<Option<Record>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{} WHERE e.id = ?1 AND (?2 = 1 OR e.is_deleted = 0);",
                select_sql(kind)
            ))?;
            let mut rows = stmt.query(params![id, bool_to_int(include_deleted)])?;
            match rows.next()? {
                Some(row) => Ok(Some(parse_record(kind, row)?)),
                None => Ok(None),
            }
        })
    }

    fn list_children(&self, kind: EntityKind, parent_id: &str) -> RepoResult<Vec<Record>> {
        let parent_column = parent_column(kind).ok_or_else(|| {
            RepoError::InvalidData(format!("{kind} records have no parent to list by"))
        })?;
        let order = if kind == EntityKind::Profile {
            PROFILE_ORDER
        } else {
            PLAN_ORDER
        };

        self.with_conn(|conn| {
            query_records(
                conn,
                kind,
                &format!(
                    "{} WHERE e.{parent_column} = ?1 AND e.is_deleted = 0 ORDER BY {order};",
                    select_sql(kind)
                ),
                parent_id,
            )
        })
    }

    fn soft_delete(&self, kind: EntityKind, id: &str) -> RepoResult<()> {
        let changed = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let state = row_state(&tx, kind, id)?.ok_or_else(|| RepoError::NotFound {
                kind,
                id: id.to_string(),
            })?;
            if state.is_deleted {
                return Ok(0);
            }
            let changed = self.tombstone_tree(&tx, kind, id)?;
            tx.commit()?;
            Ok(changed)
        })?;

        if changed > 0 {
            debug!(
                "event=local_soft_delete module=store status=ok kind={} id={} rows={}",
                kind, id, changed
            );
            self.notify_changed();
        }
        Ok(())
    }

    fn hard_delete(&self, kind: EntityKind, id: &str) -> RepoResult<bool> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                &format!(
                    "DELETE FROM {} WHERE id = ?1 AND is_deleted = 1;",
                    table_name(kind)
                ),
                [id],
            )?)
        })?;

        if changed > 0 {
            self.notify_changed();
        }
        Ok(changed > 0)
    }

    fn get_unsynced(&self, kind: EntityKind, user_id: &str) -> RepoResult<Vec<Record>> {
        let scope = match kind {
            EntityKind::User => "WHERE e.id = ?1",
            EntityKind::Profile => "WHERE e.user_id = ?1",
            EntityKind::Goal => "JOIN profiles p ON p.id = e.profile_id WHERE p.user_id = ?1",
            EntityKind::Task => {
                "JOIN goals g ON g.id = e.goal_id
                 JOIN profiles p ON p.id = g.profile_id
                 WHERE p.user_id = ?1"
            }
        };

        self.with_conn(|conn| {
            query_records(
                conn,
                kind,
                &format!(
                    "{} {scope} AND e.is_synced = 0 ORDER BY e.updated_at ASC, e.id ASC;",
                    select_sql(kind)
                ),
                user_id,
            )
        })
    }

    fn mark_synced(
        &self,
        kind: EntityKind,
        id: &str,
        pushed_updated_at: i64,
        remote_updated_at: i64,
    ) -> RepoResult<bool> {
        let changed = self.with_conn(|conn| {
            Ok(conn.execute(
                &format!(
                    "UPDATE {} SET is_synced = 1, updated_at = ?3
                     WHERE id = ?1 AND updated_at = ?2 AND is_synced = 0;",
                    table_name(kind)
                ),
                params![id, pushed_updated_at, remote_updated_at],
            )?)
        })?;

        if changed > 0 {
            self.notify_changed();
        }
        Ok(changed > 0)
    }

    fn last_update_time(&self, kind: EntityKind, scope_id: &str) -> RepoResult<Option<i64>> {
        let scope_column = parent_column(kind).unwrap_or("id");
        self.with_conn(|conn| {
            Ok(conn.query_row(
                &format!(
                    "SELECT MAX(updated_at) FROM {} WHERE {scope_column} = ?1 AND is_synced = 1;",
                    table_name(kind)
                ),
                [scope_id],
                |row| row.get::<_, Option<i64>>(0),
            )?)
        })
    }

    fn ownership_snapshot(&self, kind: EntityKind, id: &str) -> RepoResult<Vec<OwnerLink>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut chain = Vec::new();
            let mut cursor = Some((kind, id.to_string()));

            while let Some((kind, id)) = cursor.take() {
                let sql = match parent_column(kind) {
                    Some(column) => format!(
                        "SELECT {column}, is_deleted FROM {} WHERE id = ?1;",
                        table_name(kind)
                    ),
                    None => format!(
                        "SELECT NULL, is_deleted FROM {} WHERE id = ?1;",
                        table_name(kind)
                    ),
                };
                let found = tx
                    .query_row(&sql, [id.as_str()], |row| {
                        Ok((row.get::<_, Option<String>>(0)?, row.get::<_, i64>(1)?))
                    })
                    .optional()?;
                let Some((parent_id, is_deleted)) = found else {
                    break;
                };

                cursor = match (kind.parent_kind(), parent_id.as_ref()) {
                    (Some(parent_kind), Some(parent_id)) => Some((parent_kind, parent_id.clone())),
                    _ => None,
                };
                chain.push(OwnerLink {
                    kind,
                    id,
                    parent_id,
                    is_deleted: int_to_bool(is_deleted, "is_deleted")?,
                });
            }

            tx.commit()?;
            Ok(chain)
        })
    }

    fn goals_with_tasks(&self, profile_id: &str) -> RepoResult<Vec<GoalWithTasks>> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let goals = query_records(
                &tx,
                EntityKind::Goal,
                &format!(
                    "{} WHERE e.profile_id = ?1 AND e.is_deleted = 0 ORDER BY {PLAN_ORDER};",
                    select_sql(EntityKind::Goal)
                ),
                profile_id,
            )?;

            let task_sql = format!(
                "{} WHERE e.goal_id = ?1 AND e.is_deleted = 0 ORDER BY {PLAN_ORDER};",
                select_sql(EntityKind::Task)
            );
            let mut aggregates = Vec::with_capacity(goals.len());
            for record in goals {
                let Record::Goal(goal) = record else {
                    continue;
                };
                let tasks = query_records(&tx, EntityKind::Task, &task_sql, &goal.id)?
                    .into_iter()
                    .filter_map(|record| match record {
                        Record::Task(task) => Some(task),
                        _ => None,
                    })
                    .collect();
                aggregates.push(GoalWithTasks { goal, tasks });
            }

            tx.commit()?;
            Ok(aggregates)
        })
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }
}

fn table_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User => "users",
        EntityKind::Profile => "profiles",
        EntityKind::Goal => "goals",
        EntityKind::Task => "tasks",
    }
}

fn parent_column(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::User => None,
        EntityKind::Profile => Some("user_id"),
        EntityKind::Goal => Some("profile_id"),
        EntityKind::Task => Some("goal_id"),
    }
}

fn select_sql(kind: EntityKind) -> String {
    let columns = match kind {
        EntityKind::User => USER_COLUMNS,
        EntityKind::Profile => PROFILE_COLUMNS,
        EntityKind::Goal => GOAL_COLUMNS,
        EntityKind::Task => TASK_COLUMNS,
    };
    format!("SELECT {columns} FROM {} e", table_name(kind))
}

fn query_records(
    conn: &Connection,
    kind: EntityKind,
    sql: &str,
    bind: &str,
) -> RepoResult<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([bind])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        records.push(parse_record(kind, row)?);
    }
    Ok(records)
}

fn row_state(conn: &Connection, kind: EntityKind, id: &str) -> RepoResult<Option<RowState>> {
    let raw = conn
        .query_row(
            &format!(
                "SELECT updated_at, is_synced, is_deleted FROM {} WHERE id = ?1;",
                table_name(kind)
            ),
            [id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            },
        )
        .optional()?;

    raw.map(|(updated_at, is_synced, is_deleted)| {
        Ok(RowState {
            updated_at,
            is_synced: int_to_bool(is_synced, "is_synced")?,
            is_deleted: int_to_bool(is_deleted, "is_deleted")?,
        })
    })
    .transpose()
}

fn ensure_live_parent(conn: &Connection, record: &Record) -> RepoResult<()> {
    if parent_is_live(conn, record)? {
        return Ok(());
    }
    match (record.kind().parent_kind(), record.parent_id()) {
        (Some(kind), Some(id)) => Err(RepoError::NotFound {
            kind,
            id: id.to_string(),
        }),
        _ => Ok(()),
    }
}

/// Users have no parent and always pass.
fn parent_is_live(conn: &Connection, record: &Record) -> RepoResult<bool> {
    let (Some(parent_kind), Some(parent_id)) = (record.kind().parent_kind(), record.parent_id())
    else {
        return Ok(true);
    };

    let live: i64 = conn.query_row(
        &format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1 AND is_deleted = 0);",
            table_name(parent_kind)
        ),
        [parent_id],
        |row| row.get(0),
    )?;
    Ok(live == 1)
}

fn live_child_ids(conn: &Connection, kind: EntityKind, parent_id: &str) -> RepoResult<Vec<String>> {
    let Some(column) = parent_column(kind) else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE {column} = ?1 AND is_deleted = 0;",
        table_name(kind)
    ))?;
    let ids = stmt
        .query_map([parent_id], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

fn write_row(conn: &Connection, record: &Record, exists: bool) -> RepoResult<()> {
    match record {
        Record::User(user) => conn.execute(
            if exists { UPDATE_USER } else { INSERT_USER },
            params![
                user.id,
                user.name,
                user.email,
                user.meta.updated_at,
                bool_to_int(user.meta.is_synced),
                bool_to_int(user.meta.is_deleted),
            ],
        )?,
        Record::Profile(profile) => conn.execute(
            if exists { UPDATE_PROFILE } else { INSERT_PROFILE },
            params![
                profile.id,
                profile.user_id,
                profile.title,
                profile.description,
                profile.meta.updated_at,
                bool_to_int(profile.meta.is_synced),
                bool_to_int(profile.meta.is_deleted),
            ],
        )?,
        Record::Goal(goal) => conn.execute(
            if exists { UPDATE_GOAL } else { INSERT_GOAL },
            params![
                goal.id,
                goal.profile_id,
                goal.title,
                goal.description,
                status_to_db(goal.status),
                goal.priority,
                goal.sort_order,
                goal.start_date,
                goal.target_date,
                goal.meta.updated_at,
                bool_to_int(goal.meta.is_synced),
                bool_to_int(goal.meta.is_deleted),
            ],
        )?,
        Record::Task(task) => conn.execute(
            if exists { UPDATE_TASK } else { INSERT_TASK },
            params![
                task.id,
                task.goal_id,
                task.title,
                task.description,
                status_to_db(task.status),
                task.priority,
                task.sort_order,
                task.start_date,
                task.target_date,
                task.meta.updated_at,
                bool_to_int(task.meta.is_synced),
                bool_to_int(task.meta.is_deleted),
            ],
        )?,
    };
    Ok(())
}

fn parse_record(kind: EntityKind, row: &Row<'_>) -> RepoResult<Record> {
    let meta = SyncMeta {
        updated_at: row.get("updated_at")?,
        is_synced: int_to_bool(row.get("is_synced")?, "is_synced")?,
        is_deleted: int_to_bool(row.get("is_deleted")?, "is_deleted")?,
    };

    let record = match kind {
        EntityKind::User => Record::User(User {
            id: row.get("id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            meta,
        }),
        EntityKind::Profile => Record::Profile(Profile {
            id: row.get("id")?,
            user_id: row.get("parent_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            meta,
        }),
        EntityKind::Goal => Record::Goal(Goal {
            id: row.get("id")?,
            profile_id: row.get("parent_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            status: parse_status(row.get("status")?)?,
            priority: row.get("priority")?,
            sort_order: row.get("sort_order")?,
            start_date: row.get("start_date")?,
            target_date: row.get("target_date")?,
            meta,
        }),
        EntityKind::Task => Record::Task(Task {
            id: row.get("id")?,
            goal_id: row.get("parent_id")?,
            title: row.get("title")?,
            description: row.get("description")?,
            status: parse_status(row.get("status")?)?,
            priority: row.get("priority")?,
            sort_order: row.get("sort_order")?,
            start_date: row.get("start_date")?,
            target_date: row.get("target_date")?,
            meta,
        }),
    };
    Ok(record)
}

fn status_to_db(status: Status) -> i64 {
    match status {
        Status::Open => 0,
        Status::Closed => 1,
    }
}

fn parse_status(value: i64) -> RepoResult<Status> {
    match value {
        0 => Ok(Status::Open),
        1 => Ok(Status::Closed),
        other => Err(RepoError::InvalidData(format!(
            "invalid status value `{other}`"
        ))),
    }
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid {column} value `{other}`"
        ))),
    }
}
