//! Command services called by the UI collaborator.
//!
//! # Responsibility
//! - Validate commands before they reach the local store.
//! - Write locally, then hand the mutation to the change tracker.
//!
//! # Invariants
//! - Validation and not-found failures are returned synchronously.
//! - Sync is fire-and-forget; no service call waits for a pass.

pub mod goal_service;
pub mod profile_service;
pub mod task_service;
pub mod user_service;

use crate::model::entity::{EntityId, EntityKind, ValidationError};
use crate::model::record::Record;
use crate::repo::local_store::RepoError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug)]
pub enum ServiceError {
    Validation(ValidationError),
    NotFound { kind: EntityKind, id: EntityId },
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Repo(err) => Some(err),
            Self::NotFound { .. } => None,
        }
    }
}

impl From<ValidationError> for ServiceError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Validation(err) => Self::Validation(err),
            RepoError::NotFound { kind, id } => Self::NotFound { kind, id },
            other => Self::Repo(other),
        }
    }
}

/// Trims a title; blank titles are rejected.
pub(crate) fn normalize_title(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankTitle);
    }
    Ok(trimmed.to_string())
}

/// Narrows a stored record back to its concrete entity type.
pub(crate) fn into_entity<T: TryFrom<Record, Error = Record>>(
    record: Record,
    expected: EntityKind,
) -> ServiceResult<T> {
    T::try_from(record).map_err(|other| {
        ServiceError::Repo(RepoError::InvalidData(format!(
            "expected {expected} record, store returned {}",
            other.kind()
        )))
    })
}

pub(crate) fn not_found(kind: EntityKind, id: &str) -> ServiceError {
    ServiceError::NotFound {
        kind,
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_title, ServiceError};
    use crate::model::entity::{EntityKind, ValidationError};
    use crate::repo::local_store::RepoError;

    #[test]
    fn titles_are_trimmed_and_blank_rejected() {
        assert_eq!(normalize_title("  Ship v1 "), Ok("Ship v1".to_string()));
        assert_eq!(normalize_title(" \t"), Err(ValidationError::BlankTitle));
    }

    #[test]
    fn repo_not_found_maps_to_service_not_found() {
        let err = ServiceError::from(RepoError::NotFound {
            kind: EntityKind::Goal,
            id: "g1".to_string(),
        });
        assert!(matches!(
            err,
            ServiceError::NotFound {
                kind: EntityKind::Goal,
                ..
            }
        ));
    }
}
