//! Local store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the local store contract used by services and the sync engine.
//! - Isolate SQLite query details from service/sync orchestration.
//! - Provide the live read stream the UI collaborator observes.
//!
//! # Invariants
//! - Store writes validate records before persistence.
//! - Store APIs return semantic errors (`NotFound`) in addition to DB errors.

pub mod local_store;
pub mod observe;
pub mod sqlite_store;
