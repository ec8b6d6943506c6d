//! In-process document store standing in for the remote backend.
//!
//! # Responsibility
//! - Hold JSON documents per collection with server-assigned timestamps.
//! - Enforce parent references the way the real backend's rules do.
//! - Record every call and allow connectivity/failure injection for tests
//!   and offline demos.
//!
//! # Invariants
//! - A put of a goal whose profile document is absent is rejected; likewise a
//!   task whose goal document is absent.
//! - Every successful put gets a server `updatedAt` newer than any earlier one.
//! - Calls are recorded before availability checks, so failed attempts show
//!   up in the call log.

use crate::clock::{Clock, MonotonicClock};
use crate::model::entity::EntityKind;
use crate::model::record::Record;
use crate::remote::document::{self, UPDATED_AT_KEY};
use crate::remote::{RemoteError, RemoteResult, RemoteStore};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type Document = Map<String, Value>;

/// One recorded remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Put { kind: EntityKind, id: String },
    Delete { kind: EntityKind, id: String },
    Get { kind: EntityKind, id: String },
    Query { kind: EntityKind, scope_id: String, after: i64 },
}

impl RemoteCall {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Put { .. } | Self::Delete { .. })
    }
}

#[derive(Default)]
struct RemoteState {
    collections: HashMap<EntityKind, BTreeMap<String, Document>>,
    calls: Vec<RemoteCall>,
    offline: bool,
    fail_next: usize,
}

impl RemoteState {
    fn collection(&self, kind: EntityKind) -> Option<&BTreeMap<String, Document>> {
        self.collections.get(&kind)
    }

    fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.collection(kind)
            .is_some_and(|documents| documents.contains_key(id))
    }

    /// Records the call, then applies connectivity and injected failures.
    fn admit(&mut self, call: RemoteCall) -> RemoteResult<()> {
        self.calls.push(call);
        if self.offline {
            return Err(RemoteError::Unavailable("remote store is offline".to_string()));
        }
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(RemoteError::Unavailable("injected transport failure".to_string()));
        }
        Ok(())
    }
}

/// Remote store kept entirely in memory.
pub struct InMemoryRemoteStore {
    state: Mutex<RemoteState>,
    clock: Arc<dyn Clock>,
    latency: Option<Duration>,
}

impl Default for InMemoryRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Uses `clock` as the server write-time source.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
            clock,
            latency: None,
        }
    }

    /// Delays every call by `latency` before it is served.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.lock().offline = !available;
    }

    /// Fails the next `count` calls with `RemoteError::Unavailable`.
    pub fn fail_next(&self, count: usize) {
        self.lock().fail_next = count;
    }

    /// Stores a record as written by another device at `record.updated_at`.
    ///
    /// Bypasses parent checks and the call log.
    pub fn seed(&self, record: &Record) -> RemoteResult<()> {
        let doc = document::encode(record)?;
        self.lock()
            .collections
            .entry(record.kind())
            .or_default()
            .insert(record.id().to_string(), doc);
        Ok(())
    }

    /// Reads a stored record without recording a call.
    pub fn document(&self, kind: EntityKind, id: &str) -> Option<Record> {
        let state = self.lock();
        let doc = state.collection(kind)?.get(id)?;
        document::decode(kind, doc).ok()
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.lock().collection(kind).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.lock()
            .collections
            .values()
            .all(|documents| documents.is_empty())
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().calls.iter().filter(|call| call.is_write()).count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn lock(&self) -> MutexGuard<'_, RemoteState> {
        // A panic while holding the lock leaves plain data behind; keep serving.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn put(&self, record: &Record) -> RemoteResult<i64> {
        self.simulate_latency().await;
        let kind = record.kind();
        let mut state = self.lock();
        state.admit(RemoteCall::Put {
            kind,
            id: record.id().to_string(),
        })?;

        if record.id().trim().is_empty() {
            return Err(RemoteError::Rejected(format!("{kind} id must not be blank")));
        }
        if let (Some(parent_kind), Some(parent_id)) = (kind.parent_kind(), record.parent_id()) {
            if parent_kind != EntityKind::User && !state.contains(parent_kind, parent_id) {
                return Err(RemoteError::Rejected(format!(
                    "{kind} {} references unknown {parent_kind} {parent_id}",
                    record.id()
                )));
            }
        }

        let mut doc = document::encode(record)?;
        let written_at = self.clock.now_ms();
        doc.insert(UPDATED_AT_KEY.to_string(), Value::from(written_at));
        state
            .collections
            .entry(kind)
            .or_default()
            .insert(record.id().to_string(), doc);
        Ok(written_at)
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> RemoteResult<()> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.admit(RemoteCall::Delete {
            kind,
            id: id.to_string(),
        })?;
        if let Some(documents) = state.collections.get_mut(&kind) {
            documents.remove(id);
        }
        Ok(())
    }

    async fn get(&self, kind: EntityKind, id: &str) -> RemoteResult<Option<Record>> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.admit(RemoteCall::Get {
            kind,
            id: id.to_string(),
        })?;
        state
            .collection(kind)
            .and_then(|documents| documents.get(id))
            .map(|doc| document::decode(kind, doc))
            .transpose()
    }

    async fn query_updated_after(
        &self,
        kind: EntityKind,
        scope_id: &str,
        after: i64,
    ) -> RemoteResult<Vec<Record>> {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.admit(RemoteCall::Query {
            kind,
            scope_id: scope_id.to_string(),
            after,
        })?;

        let Some(documents) = state.collection(kind) else {
            return Ok(Vec::new());
        };
        let mut matching = documents
            .values()
            .filter(|doc| document::scope_id(kind, doc) == Some(scope_id))
            .filter(|doc| document::updated_at(doc).is_some_and(|at| at > after))
            .collect::<Vec<_>>();
        matching.sort_by_key(|doc| document::updated_at(doc));
        matching
            .into_iter()
            .map(|doc| document::decode(kind, doc))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryRemoteStore, RemoteCall};
    use crate::clock::MonotonicClock;
    use crate::model::entity::EntityKind;
    use crate::model::goal::Goal;
    use crate::model::profile::Profile;
    use crate::model::record::Record;
    use crate::remote::{RemoteError, RemoteStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn rejects_goal_before_its_profile() {
        let remote = InMemoryRemoteStore::new();
        let profile = Profile::new("u1", "Work", "");
        let goal = Goal::new(profile.id.clone(), "Ship v1", "");

        let err = remote
            .put(&Record::from(goal.clone()))
            .await
            .expect_err("goal without profile should be rejected");
        assert!(matches!(err, RemoteError::Rejected(_)));

        remote.put(&Record::from(profile)).await.expect("profile put");
        remote.put(&Record::from(goal)).await.expect("goal put");
        assert_eq!(remote.len(EntityKind::Goal), 1);
    }

    #[tokio::test]
    async fn server_assigns_write_time() {
        let remote = InMemoryRemoteStore::with_clock(Arc::new(MonotonicClock::starting_after(5_000)));
        let mut profile = Profile::new("u1", "Work", "");
        profile.meta.updated_at = 1;

        let written_at = remote.put(&Record::from(profile.clone())).await.expect("put");
        let stored = remote
            .document(EntityKind::Profile, &profile.id)
            .expect("stored profile");
        assert!(written_at > 5_000);
        assert_eq!(stored.updated_at(), written_at);
    }

    #[tokio::test]
    async fn query_is_strictly_after_and_scoped() {
        let remote = InMemoryRemoteStore::new();
        for (title, at) in [("a", 1_000), ("b", 1_001), ("c", 2_000)] {
            let mut goal = Goal::new("p1", title, "");
            goal.meta.updated_at = at;
            remote.seed(&Record::from(goal)).expect("seed");
        }
        let mut other = Goal::new("p2", "other", "");
        other.meta.updated_at = 5_000;
        remote.seed(&Record::from(other)).expect("seed");

        let records = remote
            .query_updated_after(EntityKind::Goal, "p1", 1_000)
            .await
            .expect("query");
        let stamps = records.iter().map(Record::updated_at).collect::<Vec<_>>();
        assert_eq!(stamps, vec![1_001, 2_000]);
        assert_eq!(
            remote.calls(),
            vec![RemoteCall::Query {
                kind: EntityKind::Goal,
                scope_id: "p1".to_string(),
                after: 1_000,
            }]
        );
    }

    #[tokio::test]
    async fn injected_failures_are_recorded_and_then_clear() {
        let remote = InMemoryRemoteStore::new();
        remote.fail_next(1);
        let profile = Record::from(Profile::new("u1", "Work", ""));

        assert!(matches!(
            remote.put(&profile).await,
            Err(RemoteError::Unavailable(_))
        ));
        remote.put(&profile).await.expect("second put should succeed");
        assert_eq!(remote.write_count(), 2);
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let remote = InMemoryRemoteStore::new();
        remote.set_available(false);
        assert!(remote.get(EntityKind::Goal, "g1").await.is_err());
        remote.set_available(true);
        assert_eq!(remote.get(EntityKind::Goal, "g1").await, Ok(None));
    }
}
