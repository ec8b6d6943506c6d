//! Kind-tagged union over the four entity structs.
//!
//! Stores and the sync engine move records around without caring which
//! concrete kind they hold; this type carries the kind alongside the data.

use crate::model::entity::{EntityKind, SyncMeta, ValidationError};
use crate::model::goal::Goal;
use crate::model::profile::Profile;
use crate::model::task::Task;
use crate::model::user::User;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    User(User),
    Profile(Profile),
    Goal(Goal),
    Task(Task),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::User(_) => EntityKind::User,
            Self::Profile(_) => EntityKind::Profile,
            Self::Goal(_) => EntityKind::Goal,
            Self::Task(_) => EntityKind::Task,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::User(user) => &user.id,
            Self::Profile(profile) => &profile.id,
            Self::Goal(goal) => &goal.id,
            Self::Task(task) => &task.id,
        }
    }

    /// Id of the owning parent; `None` for users.
    pub fn parent_id(&self) -> Option<&str> {
        match self {
            Self::User(_) => None,
            Self::Profile(profile) => Some(&profile.user_id),
            Self::Goal(goal) => Some(&goal.profile_id),
            Self::Task(task) => Some(&task.goal_id),
        }
    }

    pub fn meta(&self) -> &SyncMeta {
        match self {
            Self::User(user) => &user.meta,
            Self::Profile(profile) => &profile.meta,
            Self::Goal(goal) => &goal.meta,
            Self::Task(task) => &task.meta,
        }
    }

    pub fn meta_mut(&mut self) -> &mut SyncMeta {
        match self {
            Self::User(user) => &mut user.meta,
            Self::Profile(profile) => &mut profile.meta,
            Self::Goal(goal) => &mut goal.meta,
            Self::Task(task) => &mut task.meta,
        }
    }

    pub fn updated_at(&self) -> i64 {
        self.meta().updated_at
    }

    pub fn is_deleted(&self) -> bool {
        self.meta().is_deleted
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::User(user) => user.validate(),
            Self::Profile(profile) => profile.validate(),
            Self::Goal(goal) => goal.validate(),
            Self::Task(task) => task.validate(),
        }
    }

    /// Returns whether both records hold the same user-visible content,
    /// ignoring the sync envelope.
    pub fn same_content(&self, other: &Record) -> bool {
        let mut left = self.clone();
        let mut right = other.clone();
        *left.meta_mut() = SyncMeta::dirty();
        *right.meta_mut() = SyncMeta::dirty();
        left == right
    }
}

impl From<User> for Record {
    fn from(value: User) -> Self {
        Self::User(value)
    }
}

impl From<Profile> for Record {
    fn from(value: Profile) -> Self {
        Self::Profile(value)
    }
}

impl From<Goal> for Record {
    fn from(value: Goal) -> Self {
        Self::Goal(value)
    }
}

impl From<Task> for Record {
    fn from(value: Task) -> Self {
        Self::Task(value)
    }
}

macro_rules! impl_try_from_record {
    ($variant:ident, $ty:ty) => {
        impl TryFrom<Record> for $ty {
            /// Hands back the record unchanged when the kind differs.
            type Error = Record;

            fn try_from(value: Record) -> Result<Self, Self::Error> {
                match value {
                    Record::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }
    };
}

impl_try_from_record!(User, User);
impl_try_from_record!(Profile, Profile);
impl_try_from_record!(Goal, Goal);
impl_try_from_record!(Task, Task);
