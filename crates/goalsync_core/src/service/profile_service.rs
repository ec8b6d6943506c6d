//! Profile use-case service.
//!
//! # Invariants
//! - Profile lists are sorted by `updated_at DESC, id ASC`.
//! - Deleting a profile tombstones its goals and tasks in the same write.

use crate::model::entity::EntityKind;
use crate::model::profile::Profile;
use crate::model::record::Record;
use crate::repo::local_store::LocalStore;
use crate::service::{into_entity, normalize_title, not_found, ServiceResult};
use crate::sync::change_tracker::ChangeTracker;
use std::sync::Arc;

pub struct ProfileService {
    store: Arc<dyn LocalStore>,
    tracker: Arc<ChangeTracker>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn LocalStore>, tracker: Arc<ChangeTracker>) -> Self {
        Self { store, tracker }
    }

    pub fn create_profile(
        &self,
        user_id: &str,
        title: &str,
        description: &str,
    ) -> ServiceResult<Profile> {
        let title = normalize_title(title)?;
        let profile = Profile::new(user_id, title, description);
        self.save(&profile)
    }

    /// Replaces every mutable field of an existing live profile.
    pub fn update_profile(&self, profile: Profile) -> ServiceResult<Profile> {
        let mut profile = profile;
        profile.title = normalize_title(&profile.title)?;
        if self.store.get_profile(&profile.id)?.is_none() {
            return Err(not_found(EntityKind::Profile, &profile.id));
        }
        self.save(&profile)
    }

    pub fn delete_profile(&self, id: &str) -> ServiceResult<()> {
        self.store.soft_delete(EntityKind::Profile, id)?;
        self.tracker.track(EntityKind::Profile, id);
        Ok(())
    }

    pub fn get_profile(&self, id: &str) -> ServiceResult<Option<Profile>> {
        Ok(self.store.get_profile(id)?)
    }

    pub fn list_profiles(&self, user_id: &str) -> ServiceResult<Vec<Profile>> {
        self.store
            .list_children(EntityKind::Profile, user_id)?
            .into_iter()
            .map(|record| into_entity(record, EntityKind::Profile))
            .collect()
    }

    /// Requests a sync of `user_id`'s tree. Returns the scheduled user.
    pub fn trigger_sync(&self, user_id: &str) -> Option<String> {
        self.tracker.track(EntityKind::User, user_id)
    }

    fn save(&self, profile: &Profile) -> ServiceResult<Profile> {
        let stored = self.store.upsert(&Record::from(profile.clone()))?;
        let stored: Profile = into_entity(stored, EntityKind::Profile)?;
        self.tracker.track(EntityKind::Profile, &stored.id);
        Ok(stored)
    }
}
