//! Shared envelope types for every synchronized entity.
//!
//! # Invariants
//! - `is_synced=false` immediately after any local mutation.
//! - `updated_at` is the pull low-water-mark and never regresses.
//! - A tombstone (`is_deleted=true`) is never resurrected.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque client-generated identifier.
pub type EntityId = String;

/// Generates a fresh entity id.
pub fn new_entity_id() -> EntityId {
    Uuid::new_v4().to_string()
}

/// The four record kinds stored locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Profile,
    Goal,
    Task,
}

impl EntityKind {
    /// Kinds exchanged with the remote store, parents first.
    pub const SYNC_ORDER: [EntityKind; 3] = [EntityKind::Profile, EntityKind::Goal, EntityKind::Task];

    /// Kind of the owning parent, `None` for the root.
    pub fn parent_kind(self) -> Option<EntityKind> {
        match self {
            Self::User => None,
            Self::Profile => Some(Self::User),
            Self::Goal => Some(Self::Profile),
            Self::Task => Some(Self::Goal),
        }
    }

    /// Kind of direct children, `None` for leaves.
    pub fn child_kind(self) -> Option<EntityKind> {
        match self {
            Self::User => Some(Self::Profile),
            Self::Profile => Some(Self::Goal),
            Self::Goal => Some(Self::Task),
            Self::Task => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Profile => "profile",
            Self::Goal => "goal",
            Self::Task => "task",
        }
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sync bookkeeping carried by every entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// Epoch milliseconds of the last mutation.
    pub updated_at: i64,
    /// True iff the last-known remote state equals local state.
    #[serde(default)]
    pub is_synced: bool,
    /// Soft-delete tombstone marker.
    #[serde(default)]
    pub is_deleted: bool,
}

impl SyncMeta {
    /// Envelope of a freshly created, not yet stamped record.
    pub fn dirty() -> Self {
        Self {
            updated_at: 0,
            is_synced: false,
            is_deleted: false,
        }
    }
}

impl Default for SyncMeta {
    fn default() -> Self {
        Self::dirty()
    }
}

/// Two-state completion flag for goals and tasks.
///
/// Persisted as `0` (open) / `1` (closed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Open,
    Closed,
}

impl Status {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Validation errors raised at the command boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    BlankId,
    BlankParentId(EntityKind),
    BlankTitle,
    BlankName,
    BlankEmail,
    InvalidDateRange { start_date: i64, target_date: i64 },
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId => write!(f, "id must not be blank"),
            Self::BlankParentId(kind) => write!(f, "{kind} parent id must not be blank"),
            Self::BlankTitle => write!(f, "title must not be blank"),
            Self::BlankName => write!(f, "name must not be blank"),
            Self::BlankEmail => write!(f, "email must not be blank"),
            Self::InvalidDateRange {
                start_date,
                target_date,
            } => write!(
                f,
                "target_date ({target_date}) must not be earlier than start_date ({start_date})"
            ),
        }
    }
}

impl Error for ValidationError {}

pub(crate) fn require_id(id: &str) -> Result<(), ValidationError> {
    if id.trim().is_empty() {
        return Err(ValidationError::BlankId);
    }
    Ok(())
}

pub(crate) fn require_parent(kind: EntityKind, parent_id: &str) -> Result<(), ValidationError> {
    if parent_id.trim().is_empty() {
        return Err(ValidationError::BlankParentId(kind));
    }
    Ok(())
}

pub(crate) fn require_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        return Err(ValidationError::BlankTitle);
    }
    Ok(())
}

pub(crate) fn require_date_range(
    start_date: Option<i64>,
    target_date: Option<i64>,
) -> Result<(), ValidationError> {
    if let (Some(start_date), Some(target_date)) = (start_date, target_date) {
        if target_date < start_date {
            return Err(ValidationError::InvalidDateRange {
                start_date,
                target_date,
            });
        }
    }
    Ok(())
}
