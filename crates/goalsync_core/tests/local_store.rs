use goalsync_core::db::open_db_in_memory;
use goalsync_core::{
    ApplyOutcome, EntityKind, Goal, GoalObserver, LocalStore, Profile, Record, RepoError,
    SkipReason, SqliteLocalStore, Status, Task, User,
};
use std::sync::Arc;
use std::time::Duration;

fn store() -> Arc<SqliteLocalStore> {
    Arc::new(SqliteLocalStore::try_new(open_db_in_memory().unwrap()).unwrap())
}

/// Seeds u1 -> p1 -> g1 -> t1 as local (dirty) writes.
fn seed_tree(store: &SqliteLocalStore) {
    store
        .upsert(&Record::from(User::with_id("u1", "Ada", "ada@example.com")))
        .unwrap();
    store.upsert(&Record::from(profile("p1", "u1"))).unwrap();
    store.upsert(&Record::from(goal("g1", "p1", "Ship v1"))).unwrap();
    store
        .upsert(&Record::from(task("t1", "g1", "Write changelog")))
        .unwrap();
}

fn profile(id: &str, user_id: &str) -> Profile {
    let mut profile = Profile::new(user_id, "Work", "");
    profile.id = id.to_string();
    profile
}

fn goal(id: &str, profile_id: &str, title: &str) -> Goal {
    let mut goal = Goal::new(profile_id, title, "");
    goal.id = id.to_string();
    goal
}

fn task(id: &str, goal_id: &str, title: &str) -> Task {
    let mut task = Task::new(goal_id, title, "");
    task.id = id.to_string();
    task
}

#[test]
fn upsert_marks_rows_dirty_and_advances_updated_at() {
    let store = store();
    seed_tree(&store);

    let first = store.get_goal("g1").unwrap().unwrap();
    assert!(!first.meta.is_synced);
    assert!(!first.meta.is_deleted);

    let mut edited = first.clone();
    edited.title = "Ship v1.1".to_string();
    let stored = store.upsert(&Record::from(edited)).unwrap();
    assert!(stored.updated_at() > first.meta.updated_at);
    assert!(!stored.meta().is_synced);
}

#[test]
fn upsert_requires_a_live_parent() {
    let store = store();
    let err = store
        .upsert(&Record::from(goal("g1", "missing", "Orphan")))
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::NotFound {
            kind: EntityKind::Profile,
            ..
        }
    ));

    let err = store
        .upsert(&Record::from(goal("g2", "p1", "   ")))
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn soft_delete_cascades_to_descendants() {
    let store = store();
    seed_tree(&store);

    store.soft_delete(EntityKind::Profile, "p1").unwrap();

    assert!(store.get_profile("p1").unwrap().is_none());
    assert!(store.get_goal("g1").unwrap().is_none());
    assert!(store.get_task("t1").unwrap().is_none());

    let tombstone = store.get(EntityKind::Task, "t1", true).unwrap().unwrap();
    assert!(tombstone.is_deleted());
    assert!(!tombstone.meta().is_synced);

    let unsynced_tasks = store.get_unsynced(EntityKind::Task, "u1").unwrap();
    assert_eq!(unsynced_tasks.len(), 1);
    assert!(unsynced_tasks[0].is_deleted());

    // Tombstones are never resurrected by local writes.
    let err = store
        .upsert(&Record::from(goal("g1", "p1", "Back again")))
        .unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));

    // Deleting twice is a no-op.
    store.soft_delete(EntityKind::Profile, "p1").unwrap();
}

#[test]
fn hard_delete_only_removes_tombstones() {
    let store = store();
    seed_tree(&store);

    assert!(!store.hard_delete(EntityKind::Task, "t1").unwrap());
    store.soft_delete(EntityKind::Task, "t1").unwrap();
    assert!(store.hard_delete(EntityKind::Task, "t1").unwrap());
    assert!(store.get(EntityKind::Task, "t1", true).unwrap().is_none());
}

#[test]
fn mark_synced_is_conditional_on_the_pushed_timestamp() {
    let store = store();
    seed_tree(&store);
    let pushed = store.get_goal("g1").unwrap().unwrap();

    let mut edited = pushed.clone();
    edited.priority = 3;
    store.upsert(&Record::from(edited)).unwrap();

    assert!(!store
        .mark_synced(EntityKind::Goal, "g1", pushed.meta.updated_at, 42)
        .unwrap());
    assert!(!store.get_goal("g1").unwrap().unwrap().meta.is_synced);

    let current = store.get_goal("g1").unwrap().unwrap();
    assert!(store
        .mark_synced(EntityKind::Goal, "g1", current.meta.updated_at, 42)
        .unwrap());
    let synced = store.get_goal("g1").unwrap().unwrap();
    assert!(synced.meta.is_synced);
    assert_eq!(synced.meta.updated_at, 42);
    assert!(store.get_unsynced(EntityKind::Goal, "u1").unwrap().is_empty());
    assert_eq!(
        store.last_update_time(EntityKind::Goal, "p1").unwrap(),
        Some(42)
    );
}

#[test]
fn synced_rows_take_the_remote_copy_whatever_the_clock_order() {
    let store = store();
    seed_tree(&store);
    let local = store.get_goal("g1").unwrap().unwrap();
    let server_at = local.meta.updated_at - 60_000;
    assert!(store
        .mark_synced(EntityKind::Goal, "g1", local.meta.updated_at, server_at)
        .unwrap());

    let mut remote = local.clone();
    remote.title = "Edited elsewhere".to_string();
    remote.meta.updated_at = server_at + 5;
    assert_eq!(
        store.apply_pulled(&Record::from(remote)).unwrap(),
        ApplyOutcome::Updated
    );
    let stored = store.get_goal("g1").unwrap().unwrap();
    assert_eq!(stored.title, "Edited elsewhere");
    assert_eq!(stored.meta.updated_at, server_at + 5);

    // A dirty row still keeps an edit that is newer than the remote write.
    let mut edited = stored.clone();
    edited.title = "Local edit".to_string();
    let edited = store.upsert(&Record::from(edited)).unwrap();
    let mut stale = stored;
    stale.meta.updated_at = edited.updated_at() - 1;
    assert_eq!(
        store.apply_pulled(&Record::from(stale)).unwrap(),
        ApplyOutcome::Skipped(SkipReason::LocalNewer)
    );
    assert_eq!(store.get_goal("g1").unwrap().unwrap().title, "Local edit");
}

#[test]
fn apply_pulled_follows_last_writer_wins() {
    let store = store();
    seed_tree(&store);
    let local = store.get_goal("g1").unwrap().unwrap();

    let mut older = local.clone();
    older.title = "Stale".to_string();
    older.meta.updated_at = local.meta.updated_at - 1;
    assert_eq!(
        store.apply_pulled(&Record::from(older)).unwrap(),
        ApplyOutcome::Skipped(SkipReason::LocalNewer)
    );

    let mut newer = local.clone();
    newer.title = "From another device".to_string();
    newer.meta.updated_at = local.meta.updated_at + 1_000;
    assert_eq!(
        store.apply_pulled(&Record::from(newer.clone())).unwrap(),
        ApplyOutcome::Updated
    );
    let stored = store.get_goal("g1").unwrap().unwrap();
    assert_eq!(stored.title, "From another device");
    assert_eq!(stored.meta.updated_at, newer.meta.updated_at);
    assert!(stored.meta.is_synced);

    assert_eq!(
        store.apply_pulled(&Record::from(newer)).unwrap(),
        ApplyOutcome::Skipped(SkipReason::UpToDate)
    );
}

#[test]
fn apply_pulled_never_resurrects_or_orphans() {
    let store = store();
    seed_tree(&store);
    let local = store.get_task("t1").unwrap().unwrap();
    store.soft_delete(EntityKind::Task, "t1").unwrap();

    let mut remote = local.clone();
    remote.meta.updated_at = local.meta.updated_at + 10_000;
    assert_eq!(
        store.apply_pulled(&Record::from(remote)).unwrap(),
        ApplyOutcome::Skipped(SkipReason::LocalTombstone)
    );

    let mut orphan = task("t9", "missing-goal", "Orphan");
    orphan.meta.updated_at = 5;
    assert_eq!(
        store.apply_pulled(&Record::from(orphan)).unwrap(),
        ApplyOutcome::Skipped(SkipReason::ParentMissing)
    );
}

#[test]
fn last_update_time_only_counts_synced_rows() {
    let store = store();
    seed_tree(&store);
    assert_eq!(store.last_update_time(EntityKind::Goal, "p1").unwrap(), None);

    let mut pulled = goal("g2", "p1", "Pulled");
    pulled.meta.updated_at = 1_000;
    assert_eq!(
        store.apply_pulled(&Record::from(pulled)).unwrap(),
        ApplyOutcome::Inserted
    );
    assert_eq!(
        store.last_update_time(EntityKind::Goal, "p1").unwrap(),
        Some(1_000)
    );
    assert_eq!(store.last_update_time(EntityKind::Goal, "p2").unwrap(), None);
}

#[test]
fn unsynced_rows_are_scoped_to_one_user() {
    let store = store();
    seed_tree(&store);
    store
        .upsert(&Record::from(User::with_id("u2", "Bob", "bob@example.com")))
        .unwrap();
    store.upsert(&Record::from(profile("p2", "u2"))).unwrap();
    store.upsert(&Record::from(goal("g2", "p2", "Other"))).unwrap();

    let goals = store.get_unsynced(EntityKind::Goal, "u1").unwrap();
    assert_eq!(
        goals.iter().map(Record::id).collect::<Vec<_>>(),
        vec!["g1"]
    );
    let tasks = store.get_unsynced(EntityKind::Task, "u2").unwrap();
    assert!(tasks.is_empty());
}

#[test]
fn goals_with_tasks_use_plan_ordering() {
    let store = store();
    seed_tree(&store);

    let mut closed = goal("g-closed", "p1", "Done already");
    closed.status = Status::Closed;
    store.upsert(&Record::from(closed)).unwrap();

    let mut urgent = goal("g-urgent", "p1", "Urgent");
    urgent.priority = -1;
    store.upsert(&Record::from(urgent)).unwrap();

    let mut later = task("t2", "g1", "Later");
    later.sort_order = 5;
    store.upsert(&Record::from(later)).unwrap();

    let snapshot = store.goals_with_tasks("p1").unwrap();
    let goal_ids = snapshot
        .iter()
        .map(|entry| entry.goal.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(goal_ids, vec!["g-urgent", "g1", "g-closed"]);

    let task_ids = snapshot[1]
        .tasks
        .iter()
        .map(|task| task.id.as_str())
        .collect::<Vec<_>>();
    assert_eq!(task_ids, vec!["t1", "t2"]);
}

#[test]
fn ownership_snapshot_walks_to_the_user() {
    let store = store();
    seed_tree(&store);

    let chain = store.ownership_snapshot(EntityKind::Task, "t1").unwrap();
    let kinds = chain.iter().map(|link| link.kind).collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            EntityKind::Task,
            EntityKind::Goal,
            EntityKind::Profile,
            EntityKind::User
        ]
    );
    assert_eq!(chain[3].id, "u1");
    assert!(store
        .ownership_snapshot(EntityKind::Task, "missing")
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn observer_emits_distinct_snapshots_without_tombstones() {
    let store = store();
    seed_tree(&store);
    let shared: Arc<dyn LocalStore> = store.clone();
    let mut observer = GoalObserver::new(shared, "p1");

    let initial = observer.next().await.unwrap().unwrap();
    assert_eq!(initial.len(), 1);
    assert_eq!(initial[0].tasks.len(), 1);

    store.soft_delete(EntityKind::Goal, "g1").unwrap();
    let after_delete = tokio::time::timeout(Duration::from_secs(1), observer.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(after_delete.is_empty());

    store.upsert(&Record::from(goal("g2", "p1", "Next"))).unwrap();
    let after_create = tokio::time::timeout(Duration::from_secs(1), observer.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(after_create.len(), 1);
    assert_eq!(after_create[0].goal.id, "g2");
}
