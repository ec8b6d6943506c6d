//! Maps local mutations to the user whose tree must be re-synchronized.
//!
//! # Responsibility
//! - Walk Task -> Goal -> Profile -> User over one ownership snapshot.
//! - Forward the resolved user id to the sync requester.
//!
//! # Invariants
//! - Resolution never touches the remote store and never blocks on sync.
//! - Tombstoned links still resolve; a deleted record must sync its deletion.
//! - A chain that stops before reaching a user resolves to `None`.

use crate::model::entity::{EntityId, EntityKind};
use crate::repo::local_store::{LocalStore, OwnerLink, RepoResult};
use log::{debug, warn};
use std::sync::Arc;

/// Sink for per-user sync requests; implemented by the scheduler.
pub trait SyncRequester: Send + Sync {
    fn request_sync(&self, user_id: &str);
}

pub struct ChangeTracker {
    store: Arc<dyn LocalStore>,
    requester: Arc<dyn SyncRequester>,
}

impl ChangeTracker {
    pub fn new(store: Arc<dyn LocalStore>, requester: Arc<dyn SyncRequester>) -> Self {
        Self { store, requester }
    }

    /// Returns the owning user id of `(kind, id)`, or `None` when any link
    /// of the chain is missing locally.
    pub fn resolve_sync_scope(&self, kind: EntityKind, id: &str) -> RepoResult<Option<EntityId>> {
        let chain = self.store.ownership_snapshot(kind, id)?;
        Ok(owning_user(kind, &chain))
    }

    /// Requests a sync for the owner of `(kind, id)`.
    ///
    /// Unresolvable scopes and store failures are logged and skipped; the
    /// caller's local write has already succeeded.
    pub fn track(&self, kind: EntityKind, id: &str) -> Option<EntityId> {
        match self.resolve_sync_scope(kind, id) {
            Ok(Some(user_id)) => {
                debug!(
                    "event=sync_track module=tracker status=ok kind={} id={} user_id={}",
                    kind, id, user_id
                );
                self.requester.request_sync(&user_id);
                Some(user_id)
            }
            Ok(None) => {
                debug!(
                    "event=sync_track module=tracker status=skipped kind={} id={} reason=scope_unresolved",
                    kind, id
                );
                None
            }
            Err(err) => {
                warn!(
                    "event=sync_track module=tracker status=error kind={} id={} error={}",
                    kind, id, err
                );
                None
            }
        }
    }
}

fn owning_user(kind: EntityKind, chain: &[OwnerLink]) -> Option<EntityId> {
    let mut expected = Some(kind);
    for link in chain {
        if Some(link.kind) != expected {
            return None;
        }
        if link.kind == EntityKind::User {
            return Some(link.id.clone());
        }
        expected = link.kind.parent_kind();
    }
    None
}
