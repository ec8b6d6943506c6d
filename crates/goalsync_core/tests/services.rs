use goalsync_core::db::open_db_in_memory;
use goalsync_core::{
    ChangeTracker, EntityKind, GoalService, InMemoryRemoteStore, LocalStore, NetworkMonitor,
    ProfileService, ServiceError, SqliteLocalStore, Status, SyncConfig, SyncEngine,
    SyncRequester, SyncScheduler, SyncState, TaskService, UserService, ValidationError,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct RecordingRequester {
    requests: Mutex<Vec<String>>,
}

impl RecordingRequester {
    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl SyncRequester for RecordingRequester {
    fn request_sync(&self, user_id: &str) {
        self.requests.lock().unwrap().push(user_id.to_string());
    }
}

struct Services {
    store: Arc<dyn LocalStore>,
    users: UserService,
    profiles: ProfileService,
    goals: GoalService,
    tasks: TaskService,
}

fn services(requester: Arc<dyn SyncRequester>) -> Services {
    let store: Arc<dyn LocalStore> =
        Arc::new(SqliteLocalStore::try_new(open_db_in_memory().unwrap()).unwrap());
    let tracker = Arc::new(ChangeTracker::new(store.clone(), requester));
    Services {
        users: UserService::new(store.clone(), tracker.clone()),
        profiles: ProfileService::new(store.clone(), tracker.clone()),
        goals: GoalService::new(store.clone(), tracker.clone()),
        tasks: TaskService::new(store.clone(), tracker),
        store,
    }
}

#[test]
fn blank_input_is_rejected_before_the_store() {
    let requester = Arc::new(RecordingRequester::default());
    let s = services(requester.clone());

    let err = s.users.create_user("  ", "ada@example.com").unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::BlankName)
    ));

    let user = s.users.create_user("Ada", "ada@example.com").unwrap();
    let profile = s.profiles.create_profile(&user.id, "Work", "").unwrap();
    let err = s.goals.create_goal(&profile.id, "   ", "").unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::BlankTitle)
    ));
    assert!(s.store.list_children(EntityKind::Goal, &profile.id).unwrap().is_empty());
}

#[test]
fn missing_targets_surface_as_not_found() {
    let s = services(Arc::new(RecordingRequester::default()));

    let err = s.goals.create_goal("no-profile", "Ship v1", "").unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NotFound {
            kind: EntityKind::Profile,
            ..
        }
    ));

    let err = s.goals.update_status("no-goal", Status::Closed).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::NotFound {
            kind: EntityKind::Goal,
            ..
        }
    ));

    let err = s.tasks.delete_task("no-task").unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
}

#[test]
fn every_mutation_requests_a_sync_for_the_owning_user() {
    let requester = Arc::new(RecordingRequester::default());
    let s = services(requester.clone());

    let user = s.users.create_user("Ada", "ada@example.com").unwrap();
    let profile = s.profiles.create_profile(&user.id, "Work", "").unwrap();
    let goal = s.goals.create_goal(&profile.id, " Ship v1 ", "").unwrap();
    assert_eq!(goal.title, "Ship v1");
    assert!(!goal.meta.is_synced);

    let task = s.tasks.create_task(&goal.id, "Write changelog", "").unwrap();
    let closed = s.tasks.update_status(&task.id, Status::Closed).unwrap();
    assert_eq!(closed.status, Status::Closed);
    s.goals.update_priority(&goal.id, 2).unwrap();
    s.goals.update_order(&goal.id, 7).unwrap();

    let requests = requester.requests();
    assert_eq!(requests.len(), 7);
    assert!(requests.iter().all(|user_id| *user_id == user.id));

    assert_eq!(s.goals.trigger_sync(&profile.id), Some(user.id.clone()));
    assert_eq!(s.tasks.trigger_sync(&goal.id), Some(user.id.clone()));
    assert_eq!(s.profiles.trigger_sync(&user.id), Some(user.id.clone()));
    assert_eq!(s.goals.trigger_sync("unknown-profile"), None);
}

#[test]
fn full_updates_replace_content_and_deletes_hide_rows() {
    let s = services(Arc::new(RecordingRequester::default()));
    let user = s.users.create_user("Ada", "ada@example.com").unwrap();
    let profile = s.profiles.create_profile(&user.id, "Work", "").unwrap();
    let goal = s.goals.create_goal(&profile.id, "Ship v1", "").unwrap();
    s.tasks.create_task(&goal.id, "Write changelog", "").unwrap();

    let mut edited = goal.clone();
    edited.title = "  Ship v1.0  ".to_string();
    edited.description = "first public release".to_string();
    let updated = s.goals.update_goal(edited).unwrap();
    assert_eq!(updated.id, goal.id);
    assert_eq!(updated.title, "Ship v1.0");
    assert!(updated.meta.updated_at > goal.meta.updated_at);

    let mut renamed = profile.clone();
    renamed.title = "Job".to_string();
    s.profiles.update_profile(renamed).unwrap();
    assert_eq!(s.profiles.list_profiles(&user.id).unwrap()[0].title, "Job");

    s.goals.delete_goal(&goal.id).unwrap();
    assert!(s.goals.get_goal(&goal.id).unwrap().is_none());
    assert!(s.store.goals_with_tasks(&profile.id).unwrap().is_empty());

    let err = s.goals.update_goal(updated).unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
}

#[tokio::test]
async fn service_writes_reach_the_remote_through_the_scheduler() {
    let config = SyncConfig {
        debounce_ms: 20,
        ..SyncConfig::default()
    };
    let store: Arc<dyn LocalStore> =
        Arc::new(SqliteLocalStore::try_new(open_db_in_memory().unwrap()).unwrap());
    let remote = Arc::new(InMemoryRemoteStore::new());
    let engine = Arc::new(SyncEngine::new(store.clone(), remote.clone(), &config));
    let scheduler = SyncScheduler::new(
        engine,
        Arc::new(NetworkMonitor::new(true)),
        &config,
        tokio::runtime::Handle::current(),
    );
    let tracker = Arc::new(ChangeTracker::new(
        store.clone(),
        Arc::new(scheduler.clone()),
    ));
    let users = UserService::new(store.clone(), tracker.clone());
    let profiles = ProfileService::new(store.clone(), tracker.clone());
    let goals = GoalService::new(store.clone(), tracker);

    let user = users.create_user("Ada", "ada@example.com").unwrap();
    let mut state = scheduler.subscribe(&user.id);
    let profile = profiles.create_profile(&user.id, "Work", "").unwrap();
    let goal = goals.create_goal(&profile.id, "Ship v1", "").unwrap();

    let mut observer = goals.observe(&profile.id);
    let first = observer.next().await.unwrap().unwrap();
    assert_eq!(first.len(), 1);

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|state| *state == SyncState::Done),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(scheduler.passes_started(&user.id), 1);
    assert!(goals.get_goal(&goal.id).unwrap().unwrap().meta.is_synced);
    assert!(remote.document(EntityKind::Goal, &goal.id).is_some());
    scheduler.shutdown().await;
}
