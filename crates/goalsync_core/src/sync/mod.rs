//! Synchronization between the local replica and the remote store.
//!
//! # Responsibility
//! - Resolve which user a local mutation belongs to (`change_tracker`).
//! - Coalesce, gate and retry per-user sync requests (`scheduler`).
//! - Execute one push-then-pull pass over the ownership tree (`engine`).
//!
//! # Invariants
//! - At most one pass per user is in flight.
//! - Kinds are exchanged parents first; concurrency only happens within a kind.

pub mod cancel;
pub mod change_tracker;
pub mod engine;
pub mod network;
pub mod retry;
pub mod scheduler;
