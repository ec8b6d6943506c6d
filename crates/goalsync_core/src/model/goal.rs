//! Goal entity and the goal-with-tasks read aggregate.

use crate::model::entity::{
    new_entity_id, require_date_range, require_id, require_parent, require_title, EntityId,
    EntityKind, Status, SyncMeta, ValidationError,
};
use crate::model::task::Task;
use serde::{Deserialize, Serialize};

/// Goal owned by one profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub id: EntityId,
    pub profile_id: EntityId,
    pub title: String,
    pub description: String,
    pub status: Status,
    /// Lower is more urgent.
    pub priority: i32,
    /// Manual ordering key.
    #[serde(rename = "order")]
    pub sort_order: i64,
    pub start_date: Option<i64>,
    pub target_date: Option<i64>,
    #[serde(flatten)]
    pub meta: SyncMeta,
}

impl Goal {
    /// Creates an open goal with default priority and ordering.
    pub fn new(
        profile_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: new_entity_id(),
            profile_id: profile_id.into(),
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
        require_parent(EntityKind::Goal, &self.profile_id)?;
        require_title(&self.title)?;
        require_date_range(self.start_date, self.target_date)
    }
}

/// Live read model consumed by the UI: one goal and its visible tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalWithTasks {
    pub goal: Goal,
    pub tasks: Vec<Task>,
}
