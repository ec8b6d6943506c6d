//! One push-then-pull synchronization pass for a user.
//!
//! # Responsibility
//! - Push dirty local rows: puts parents first, tombstones children first.
//! - Pull remote changes top-down from the per-parent low-water-mark.
//! - Classify failures into retry, permanent failure or cancellation.
//!
//! # Invariants
//! - A row is marked synced or hard-deleted only after its own remote call
//!   succeeded.
//! - The first failing record stops the pass.
//! - Unsynced rows and low-water-marks are read fresh at the start of each
//!   phase; edits made during a pass are left for the next one.
//! - Cancellation is observed before every remote call.
//! - Puts run Profile -> Goal -> Task; tombstone deletes run Task -> Goal ->
//!   Profile after every put, so no remote or local parent disappears while a
//!   child still references it.
//! - Acknowledged puts record the server write time, so pull low-water-marks
//!   are always server timestamps.

use crate::config::SyncConfig;
use crate::model::entity::{EntityId, EntityKind};
use crate::model::record::Record;
use crate::remote::{RemoteError, RemoteStore};
use crate::repo::local_store::{ApplyOutcome, LocalStore, RepoError};
use crate::sync::cancel::CancelSignal;
use crate::sync::retry::RetryPolicy;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Push,
    Pull,
}

impl SyncPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Push => "push",
            Self::Pull => "pull",
        }
    }
}

/// Observable per-user sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncState {
    #[default]
    Idle,
    /// A request is queued and waiting for debounce or network.
    Pending,
    Pushing,
    Pulling,
    /// Waiting to start attempt number `attempt`.
    Retrying { attempt: u32 },
    Done,
    Failed,
}

/// Receives phase transitions from a running pass.
pub trait SyncStateSink: Send + Sync {
    fn publish(&self, state: SyncState);
}

impl SyncStateSink for watch::Sender<SyncState> {
    fn publish(&self, state: SyncState) {
        self.send_replace(state);
    }
}

impl SyncStateSink for () {
    fn publish(&self, _state: SyncState) {}
}

#[derive(Debug)]
pub enum SyncError {
    /// The user row is missing locally; nothing can be scoped.
    UnknownUser(EntityId),
    Local { phase: SyncPhase, source: RepoError },
    Remote { phase: SyncPhase, source: RemoteError },
    Cancelled,
}

impl SyncError {
    /// Only remote failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownUser(user_id) => write!(f, "user not found locally: {user_id}"),
            Self::Local { phase, source } => {
                write!(f, "local store failed during {}: {source}", phase.as_str())
            }
            Self::Remote { phase, source } => {
                write!(f, "remote store failed during {}: {source}", phase.as_str())
            }
            Self::Cancelled => write!(f, "sync pass was cancelled"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Local { source, .. } => Some(source),
            Self::Remote { source, .. } => Some(source),
            _ => None,
        }
    }
}

type SyncResult<T> = Result<T, SyncError>;

/// Counters for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Live rows put remotely.
    pub pushed: usize,
    /// Tombstones deleted remotely and purged locally.
    pub deleted: usize,
    /// Remote rows written locally.
    pub pulled: usize,
    /// Remote rows ignored by last-writer-wins or missing parents.
    pub skipped: usize,
}

/// What the scheduler should do after one attempt.
#[derive(Debug)]
pub enum SyncOutcome {
    Done(PassReport),
    Retry(SyncError),
    Failed(SyncError),
    Cancelled,
}

pub struct SyncEngine {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    retry: RetryPolicy,
    pull_concurrency: usize,
}

impl SyncEngine {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            local,
            remote,
            retry: config.retry_policy(),
            pull_concurrency: config.pull_concurrency.max(1),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Runs attempt number `attempt` and maps its result for the scheduler.
    pub async fn execute(
        &self,
        user_id: &str,
        attempt: u32,
        cancel: &CancelSignal,
        sink: &dyn SyncStateSink,
    ) -> SyncOutcome {
        info!(
            "event=sync_pass module=sync status=start user_id={} attempt={}",
            user_id, attempt
        );

        match self.run_pass(user_id, cancel, sink).await {
            Ok(report) => {
                info!(
                    "event=sync_pass module=sync status=ok user_id={} attempt={} pushed={} deleted={} pulled={} skipped={}",
                    user_id, attempt, report.pushed, report.deleted, report.pulled, report.skipped
                );
                SyncOutcome::Done(report)
            }
            Err(SyncError::Cancelled) => {
                info!(
                    "event=sync_pass module=sync status=cancelled user_id={} attempt={}",
                    user_id, attempt
                );
                SyncOutcome::Cancelled
            }
            Err(err) if err.is_retryable() && self.retry.allows_retry_after(attempt) => {
                warn!(
                    "event=sync_pass module=sync status=retry user_id={} attempt={} error={}",
                    user_id, attempt, err
                );
                SyncOutcome::Retry(err)
            }
            Err(err) => {
                error!(
                    "event=sync_pass module=sync status=error user_id={} attempt={} error={}",
                    user_id, attempt, err
                );
                SyncOutcome::Failed(err)
            }
        }
    }

    /// Pushes then pulls the user's whole tree once.
    ///
    /// # Errors
    /// - `UnknownUser` when the user row is missing locally.
    /// - `Local`/`Remote` for the first failing store call.
    /// - `Cancelled` when `cancel` fired before a remote call.
    pub async fn run_pass(
        &self,
        user_id: &str,
        cancel: &CancelSignal,
        sink: &dyn SyncStateSink,
    ) -> SyncResult<PassReport> {
        let user = self
            .local
            .get_user(user_id)
            .map_err(|source| local_error(SyncPhase::Push, source))?;
        if user.is_none() {
            return Err(SyncError::UnknownUser(user_id.to_string()));
        }

        let mut report = PassReport::default();
        sink.publish(SyncState::Pushing);
        self.push(user_id, cancel, &mut report).await?;
        sink.publish(SyncState::Pulling);
        self.pull(user_id, cancel, &mut report).await?;
        Ok(report)
    }

    async fn push(
        &self,
        user_id: &str,
        cancel: &CancelSignal,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        let mut batches = Vec::with_capacity(EntityKind::SYNC_ORDER.len());
        for kind in EntityKind::SYNC_ORDER {
            let records = self
                .local
                .get_unsynced(kind, user_id)
                .map_err(|source| local_error(SyncPhase::Push, source))?;
            batches.push((kind, records));
        }

        // Parents must exist remotely before their children are put.
        for (kind, records) in &batches {
            for record in records.iter().filter(|record| !record.is_deleted()) {
                ensure_not_cancelled(cancel)?;
                let written_at = self
                    .remote
                    .put(record)
                    .await
                    .map_err(|source| remote_error(SyncPhase::Push, source))?;

                let marked = self
                    .local
                    .mark_synced(*kind, record.id(), record.updated_at(), written_at)
                    .map_err(|source| local_error(SyncPhase::Push, source))?;
                if !marked {
                    debug!(
                        "event=sync_push module=sync status=superseded kind={} id={}",
                        kind,
                        record.id()
                    );
                }
                report.pushed += 1;
            }
        }

        // Children go first so no parent row is purged while still referenced.
        for (kind, records) in batches.iter().rev() {
            for record in records.iter().filter(|record| record.is_deleted()) {
                ensure_not_cancelled(cancel)?;
                self.remote
                    .delete(*kind, record.id())
                    .await
                    .map_err(|source| remote_error(SyncPhase::Push, source))?;
                self.local
                    .hard_delete(*kind, record.id())
                    .map_err(|source| local_error(SyncPhase::Push, source))?;
                report.deleted += 1;
            }
        }
        Ok(())
    }

    async fn pull(
        &self,
        user_id: &str,
        cancel: &CancelSignal,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        self.pull_kind(EntityKind::Profile, vec![user_id.to_string()], cancel, report)
            .await?;

        let profile_ids = self.live_child_ids(EntityKind::Profile, &[user_id.to_string()])?;
        self.pull_kind(EntityKind::Goal, profile_ids.clone(), cancel, report)
            .await?;

        let goal_ids = self.live_child_ids(EntityKind::Goal, &profile_ids)?;
        self.pull_kind(EntityKind::Task, goal_ids, cancel, report)
            .await
    }

    /// Queries every parent scope of `kind` with bounded concurrency, then
    /// applies the results.
    async fn pull_kind(
        &self,
        kind: EntityKind,
        scope_ids: Vec<EntityId>,
        cancel: &CancelSignal,
        report: &mut PassReport,
    ) -> SyncResult<()> {
        if scope_ids.is_empty() {
            return Ok(());
        }

        let mut queries = Vec::with_capacity(scope_ids.len());
        for scope_id in scope_ids {
            let after = self
                .local
                .last_update_time(kind, &scope_id)
                .map_err(|source| local_error(SyncPhase::Pull, source))?
                .unwrap_or(0);
            queries.push((scope_id, after));
        }

        let batches: Vec<Vec<Record>> = stream::iter(queries)
            .map(|(scope_id, after)| async move {
                ensure_not_cancelled(cancel)?;
                self.remote
                    .query_updated_after(kind, &scope_id, after)
                    .await
                    .map_err(|source| remote_error(SyncPhase::Pull, source))
            })
            .buffer_unordered(self.pull_concurrency)
            .try_collect()
            .await?;

        for record in batches.into_iter().flatten() {
            let outcome = self
                .local
                .apply_pulled(&record)
                .map_err(|source| local_error(SyncPhase::Pull, source))?;
            match outcome {
                ApplyOutcome::Inserted | ApplyOutcome::Updated => report.pulled += 1,
                ApplyOutcome::Skipped(reason) => {
                    debug!(
                        "event=sync_pull module=sync status=skipped kind={} id={} reason={:?}",
                        kind,
                        record.id(),
                        reason
                    );
                    report.skipped += 1;
                }
            }
        }
        Ok(())
    }

    fn live_child_ids(&self, kind: EntityKind, parent_ids: &[EntityId]) -> SyncResult<Vec<EntityId>> {
        let mut ids = Vec::new();
        for parent_id in parent_ids {
            let children = self
                .local
                .list_children(kind, parent_id)
                .map_err(|source| local_error(SyncPhase::Pull, source))?;
            ids.extend(children.iter().map(|record| record.id().to_string()));
        }
        Ok(ids)
    }
}

fn ensure_not_cancelled(cancel: &CancelSignal) -> SyncResult<()> {
    if cancel.is_cancelled() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}

fn local_error(phase: SyncPhase, source: RepoError) -> SyncError {
    SyncError::Local { phase, source }
}

fn remote_error(phase: SyncPhase, source: RemoteError) -> SyncError {
    SyncError::Remote { phase, source }
}

#[cfg(test)]
mod tests {
    use super::{SyncError, SyncPhase};
    use crate::remote::RemoteError;
    use crate::repo::local_store::RepoError;

    #[test]
    fn only_remote_failures_are_retryable() {
        let remote = SyncError::Remote {
            phase: SyncPhase::Push,
            source: RemoteError::Rejected("permission denied".to_string()),
        };
        assert!(remote.is_retryable());

        let local = SyncError::Local {
            phase: SyncPhase::Pull,
            source: RepoError::LockPoisoned,
        };
        assert!(!local.is_retryable());
        assert!(!SyncError::UnknownUser("u1".to_string()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }
}
