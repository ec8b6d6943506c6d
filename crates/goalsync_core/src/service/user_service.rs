//! User registration on this device.

use crate::model::entity::{EntityKind, ValidationError};
use crate::model::record::Record;
use crate::model::user::User;
use crate::repo::local_store::LocalStore;
use crate::service::{into_entity, ServiceResult};
use crate::sync::change_tracker::ChangeTracker;
use std::sync::Arc;

pub struct UserService {
    store: Arc<dyn LocalStore>,
    tracker: Arc<ChangeTracker>,
}

impl UserService {
    pub fn new(store: Arc<dyn LocalStore>, tracker: Arc<ChangeTracker>) -> Self {
        Self { store, tracker }
    }

    /// Creates the root user of an ownership tree.
    pub fn create_user(&self, name: &str, email: &str) -> ServiceResult<User> {
        let name = name.trim();
        let email = email.trim();
        if name.is_empty() {
            return Err(ValidationError::BlankName.into());
        }
        if email.is_empty() {
            return Err(ValidationError::BlankEmail.into());
        }

        let stored = self.store.upsert(&Record::from(User::new(name, email)))?;
        let user: User = into_entity(stored, EntityKind::User)?;
        self.tracker.track(EntityKind::User, &user.id);
        Ok(user)
    }

    pub fn get_user(&self, id: &str) -> ServiceResult<Option<User>> {
        Ok(self.store.get_user(id)?)
    }
}
