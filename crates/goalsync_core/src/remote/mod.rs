//! Remote authoritative store contract.
//!
//! # Responsibility
//! - Define the document-style operations the sync engine needs.
//! - Define transport errors surfaced by remote implementations.
//!
//! # Invariants
//! - Every operation is a network call and may fail.
//! - Every `RemoteError` is retryable; rejection is not distinguished from
//!   transient failure.
//! - `updated_at` on returned records is the remote store's own write time.

pub mod document;
pub mod memory;

use crate::model::entity::EntityKind;
use crate::model::record::Record;
use async_trait::async_trait;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RemoteResult<T> = Result<T, RemoteError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport or connectivity failure.
    Unavailable(String),
    /// The remote store refused the operation.
    Rejected(String),
    /// A document could not be encoded or decoded.
    Codec(String),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        true
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "remote store unavailable: {message}"),
            Self::Rejected(message) => write!(f, "remote store rejected request: {message}"),
            Self::Codec(message) => write!(f, "remote document codec error: {message}"),
        }
    }
}

impl Error for RemoteError {}

impl From<serde_json::Error> for RemoteError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value.to_string())
    }
}

/// Document store keyed by record id, one collection per entity kind.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Full upsert of one record; the remote assigns `updated_at`.
    ///
    /// Returns the server write time given to the stored document.
    async fn put(&self, record: &Record) -> RemoteResult<i64>;

    async fn delete(&self, kind: EntityKind, id: &str) -> RemoteResult<()>;

    async fn get(&self, kind: EntityKind, id: &str) -> RemoteResult<Option<Record>>;

    /// Records of `kind` under `scope_id` with `updated_at > after`,
    /// oldest first.
    async fn query_updated_after(
        &self,
        kind: EntityKind,
        scope_id: &str,
        after: i64,
    ) -> RemoteResult<Vec<Record>>;
}
