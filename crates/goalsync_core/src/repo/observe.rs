//! Live goal-with-tasks read stream for one profile.
//!
//! # Invariants
//! - The first `next()` returns the current snapshot without waiting.
//! - Later calls wait for a store revision bump and only return when the
//!   snapshot differs from the last one returned.
//! - Tombstoned goals and tasks never appear in a snapshot.

use crate::model::goal::GoalWithTasks;
use crate::repo::local_store::{LocalStore, RepoResult};
use std::sync::Arc;
use tokio::sync::watch;

/// Continuously updated view of `goals_with_tasks(profile_id)`.
pub struct GoalObserver {
    store: Arc<dyn LocalStore>,
    profile_id: String,
    changes: watch::Receiver<u64>,
    last: Option<Vec<GoalWithTasks>>,
}

impl GoalObserver {
    pub fn new(store: Arc<dyn LocalStore>, profile_id: impl Into<String>) -> Self {
        let changes = store.subscribe();
        Self {
            store,
            profile_id: profile_id.into(),
            changes,
            last: None,
        }
    }

    pub fn profile_id(&self) -> &str {
        &self.profile_id
    }

    /// Waits for the next distinct snapshot.
    ///
    /// Returns `None` only if the store's change channel closes. The observer
    /// holds the store it reads from, so `SqliteLocalStore` never ends the
    /// stream.
    pub async fn next(&mut self) -> Option<RepoResult<Vec<GoalWithTasks>>> {
        if self.last.is_none() {
            self.changes.borrow_and_update();
            return Some(self.refresh());
        }

        loop {
            if self.changes.changed().await.is_err() {
                return None;
            }
            self.changes.borrow_and_update();

            match self.store.goals_with_tasks(&self.profile_id) {
                Ok(snapshot) if self.last.as_ref() == Some(&snapshot) => continue,
                Ok(snapshot) => {
                    self.last = Some(snapshot.clone());
                    return Some(Ok(snapshot));
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }

    fn refresh(&mut self) -> RepoResult<Vec<GoalWithTasks>> {
        let snapshot = self.store.goals_with_tasks(&self.profile_id)?;
        self.last = Some(snapshot.clone());
        Ok(snapshot)
    }
}
