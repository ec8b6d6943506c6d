//! User entity, root of ownership.

use crate::model::entity::{new_entity_id, require_id, EntityId, SyncMeta, ValidationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: EntityId,
    pub name: String,
    pub email: String,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

impl User {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self::with_id(new_entity_id(), name, email)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: email.into(),
            meta: SyncMeta::dirty(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_id(&self.id)?;
        if self.name.trim().is_empty() {
            return Err(ValidationError::BlankName);
        }
        if self.email.trim().is_empty() {
            return Err(ValidationError::BlankEmail);
        }
        Ok(())
    }
}
