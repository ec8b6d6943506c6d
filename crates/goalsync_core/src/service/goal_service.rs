//! Goal use-case service.
//!
//! # Responsibility
//! - Create, edit, reorder and delete goals inside a profile.
//! - Expose the live goal-with-tasks stream for a profile.
//!
//! # Invariants
//! - Partial updates (`status`, `priority`, `order`) read the current live
//!   row and replace it whole.
//! - Deleting a goal tombstones its tasks.

use crate::model::entity::{EntityKind, Status};
use crate::model::goal::Goal;
use crate::model::record::Record;
use crate::repo::local_store::LocalStore;
use crate::repo::observe::GoalObserver;
use crate::service::{into_entity, normalize_title, not_found, ServiceResult};
use crate::sync::change_tracker::ChangeTracker;
use std::sync::Arc;

pub struct GoalService {
    store: Arc<dyn LocalStore>,
    tracker: Arc<ChangeTracker>,
}

impl GoalService {
    pub fn new(store: Arc<dyn LocalStore>, tracker: Arc<ChangeTracker>) -> Self {
        Self { store, tracker }
    }

    /// Creates an open goal with a generated id.
    ///
    /// # Errors
    /// - `Validation` for a blank title or profile id.
    /// - `NotFound` when the profile is missing or deleted.
    pub fn create_goal(
        &self,
        profile_id: &str,
        title: &str,
        description: &str,
    ) -> ServiceResult<Goal> {
        let title = normalize_title(title)?;
        self.save(Goal::new(profile_id, title, description))
    }

    /// Full replacement of an existing live goal.
    pub fn update_goal(&self, goal: Goal) -> ServiceResult<Goal> {
        let mut goal = goal;
        goal.title = normalize_title(&goal.title)?;
        goal.validate()?;
        if self.store.get_goal(&goal.id)?.is_none() {
            return Err(not_found(EntityKind::Goal, &goal.id));
        }
        self.save(goal)
    }

    pub fn update_status(&self, id: &str, status: Status) -> ServiceResult<Goal> {
        self.modify(id, |goal| goal.status = status)
    }

    pub fn update_priority(&self, id: &str, priority: i32) -> ServiceResult<Goal> {
        self.modify(id, |goal| goal.priority = priority)
    }

    pub fn update_order(&self, id: &str, sort_order: i64) -> ServiceResult<Goal> {
        self.modify(id, |goal| goal.sort_order = sort_order)
    }

    pub fn delete_goal(&self, id: &str) -> ServiceResult<()> {
        self.store.soft_delete(EntityKind::Goal, id)?;
        self.tracker.track(EntityKind::Goal, id);
        Ok(())
    }

    pub fn get_goal(&self, id: &str) -> ServiceResult<Option<Goal>> {
        Ok(self.store.get_goal(id)?)
    }

    /// Live goals of `profile_id` with their tasks, re-emitted on change.
    pub fn observe(&self, profile_id: &str) -> GoalObserver {
        GoalObserver::new(Arc::clone(&self.store), profile_id)
    }

    /// Requests a sync of the user owning `profile_id`.
    pub fn trigger_sync(&self, profile_id: &str) -> Option<String> {
        self.tracker.track(EntityKind::Profile, profile_id)
    }

    fn modify(&self, id: &str, change: impl FnOnce(&mut Goal)) -> ServiceResult<Goal> {
        let mut goal = self
            .store
            .get_goal(id)?
            .ok_or_else(|| not_found(EntityKind::Goal, id))?;
        change(&mut goal);
        self.save(goal)
    }

    fn save(&self, goal: Goal) -> ServiceResult<Goal> {
        let stored = self.store.upsert(&Record::from(goal))?;
        let stored: Goal = into_entity(stored, EntityKind::Goal)?;
        self.tracker.track(EntityKind::Goal, &stored.id);
        Ok(stored)
    }
}
