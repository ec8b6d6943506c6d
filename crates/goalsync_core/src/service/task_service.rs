//! Task use-case service.

use crate::model::entity::{EntityKind, Status};
use crate::model::record::Record;
use crate::model::task::Task;
use crate::repo::local_store::LocalStore;
use crate::service::{into_entity, normalize_title, not_found, ServiceResult};
use crate::sync::change_tracker::ChangeTracker;
use std::sync::Arc;

pub struct TaskService {
    store: Arc<dyn LocalStore>,
    tracker: Arc<ChangeTracker>,
}

impl TaskService {
    pub fn new(store: Arc<dyn LocalStore>, tracker: Arc<ChangeTracker>) -> Self {
        Self { store, tracker }
    }

    pub fn create_task(&self, goal_id: &str, title: &str, description: &str) -> ServiceResult<Task> {
        let title = normalize_title(title)?;
        self.save(Task::new(goal_id, title, description))
    }

    pub fn update_task(&self, task: Task) -> ServiceResult<Task> {
        let mut task = task;
        task.title = normalize_title(&task.title)?;
        task.validate()?;
        if self.store.get_task(&task.id)?.is_none() {
            return Err(not_found(EntityKind::Task, &task.id));
        }
        self.save(task)
    }

    pub fn update_status(&self, id: &str, status: Status) -> ServiceResult<Task> {
        self.modify(id, |task| task.status = status)
    }

    pub fn update_priority(&self, id: &str, priority: i32) -> ServiceResult<Task> {
        self.modify(id, |task| task.priority = priority)
    }

    pub fn update_order(&self, id: &str, sort_order: i64) -> ServiceResult<Task> {
        self.modify(id, |task| task.sort_order = sort_order)
    }

    pub fn delete_task(&self, id: &str) -> ServiceResult<()> {
        self.store.soft_delete(EntityKind::Task, id)?;
        self.tracker.track(EntityKind::Task, id);
        Ok(())
    }

    pub fn get_task(&self, id: &str) -> ServiceResult<Option<Task>> {
        Ok(self.store.get_task(id)?)
    }

    /// Requests a sync of the user owning `goal_id`.
    pub fn trigger_sync(&self, goal_id: &str) -> Option<String> {
        self.tracker.track(EntityKind::Goal, goal_id)
    }

    fn modify(&self, id: &str, change: impl FnOnce(&mut Task)) -> ServiceResult<Task> {
        let mut task = self
            .store
            .get_task(id)?
            .ok_or_else(|| not_found(EntityKind::Task, id))?;
        change(&mut task);
        self.save(task)
    }

    fn save(&self, task: Task) -> ServiceResult<Task> {
        let stored = self.store.upsert(&Record::from(task))?;
        let stored: Task = into_entity(stored, EntityKind::Task)?;
        self.tracker.track(EntityKind::Task, &stored.id);
        Ok(stored)
    }
}
