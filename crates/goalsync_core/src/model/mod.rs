//! Domain model for the user → profile → goal → task ownership tree.
//!
//! # Responsibility
//! - Define the four synchronized entity kinds and their shared envelope.
//! - Provide validation that runs before any record reaches a store.
//!
//! # Invariants
//! - Every entity is identified by a stable client-generated string id.
//! - Deletion is a soft-delete tombstone until the remote store acknowledges it.
//! - Each non-root entity names exactly one parent at creation time.

pub mod entity;
pub mod goal;
pub mod profile;
pub mod record;
pub mod task;
pub mod user;
