//! Profile entity, owned by one user.

use crate::model::entity::{
    new_entity_id, require_id, require_parent, require_title, EntityId, EntityKind, SyncMeta,
    ValidationError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: EntityId,
    pub user_id: EntityId,
    pub title: String,
    pub description: String,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

impl Profile {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            user_id: user_id.into(),
            title: title.into(),
            description: description.into(),
            meta: SyncMeta::dirty(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_id(&self.id)?;
        require_parent(EntityKind::Profile, &self.user_id)?;
        require_title(&self.title)
    }
}
