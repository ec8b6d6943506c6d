//! Task entity, owned by one goal.

use crate::model::entity::{
    new_entity_id, require_date_range, require_id, require_parent, require_title, EntityId,
    EntityKind, Status, SyncMeta, ValidationError,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: EntityId,
    pub goal_id: EntityId,
    pub title: String,
    pub description: String,
    pub status: Status,
    pub priority: i32,
    #[serde(rename = "order")]
    pub sort_order: i64,
    pub start_date: Option<i64>,
    pub target_date: Option<i64>,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

impl Task {
    pub fn new(
        goal_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            goal_id: goal_id.into(),
            title: title.into(),
            description: description.into(),
            status: Status::Open,
            priority: 0,
            sort_order: 0,
            start_date: None,
            target_date: None,
            meta: SyncMeta::dirty(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require_id(&self.id)?;
        require_parent(EntityKind::Task, &self.goal_id)?;
        require_title(&self.title)?;
        require_date_range(self.start_date, self.target_date)
    }
}
