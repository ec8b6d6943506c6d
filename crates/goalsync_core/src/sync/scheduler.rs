//! Per-user sync job scheduling.
//!
//! # Responsibility
//! - Coalesce requests per user behind a debounce window.
//! - Hold jobs until the network is available.
//! - Retry retryable failures with backoff, at most `max_attempts` times.
//!
//! # Invariants
//! - One worker task per user; never two passes for the same user at once.
//! - A request during a pass cancels it cooperatively and a fresh pass
//!   follows; a request during backoff restarts the attempt count.
//! - Failure is not sticky: later requests run normally.
//! - While a pass is in flight only the worker publishes state, so observers
//!   see `Pushing`/`Pulling` followed by the attempt's settled state.
//! - Workers are not evicted: each user ever requested keeps one parked task
//!   until `shutdown`.

use crate::config::SyncConfig;
use crate::sync::cancel::CancelSignal;
use crate::sync::change_tracker::SyncRequester;
use crate::sync::engine::{SyncEngine, SyncOutcome, SyncState, SyncStateSink};
use crate::sync::network::NetworkMonitor;
use crate::sync::retry::RetryPolicy;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Schedules sync passes on a caller-supplied runtime.
///
/// Cloning yields another handle to the same scheduler. Workers live until
/// `shutdown` is awaited.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    engine: Arc<SyncEngine>,
    network: Arc<NetworkMonitor>,
    debounce: Duration,
    retry: RetryPolicy,
    runtime: Handle,
    workers: Mutex<HashMap<String, WorkerSlot>>,
    stopping: AtomicBool,
    shutdown: watch::Sender<bool>,
}

struct WorkerSlot {
    shared: Arc<UserWorker>,
    handle: Option<JoinHandle<()>>,
}

/// State shared between `request_sync` callers and one user's worker task.
struct UserWorker {
    user_id: String,
    requests: watch::Sender<u64>,
    state: watch::Sender<SyncState>,
    in_flight: Mutex<Option<CancelSignal>>,
    passes_started: AtomicU64,
}

impl UserWorker {
    fn in_flight(&self) -> MutexGuard<'_, Option<CancelSignal>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

enum JobEnd {
    Finished,
    Restart,
    Shutdown,
}

impl SyncScheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        network: Arc<NetworkMonitor>,
        config: &SyncConfig,
        runtime: Handle,
    ) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(SchedulerInner {
                engine,
                network,
                debounce: config.debounce(),
                retry: config.retry_policy(),
                runtime,
                workers: Mutex::new(HashMap::new()),
                stopping: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Queues a sync for `user_id`, coalescing with any queued request.
    pub fn request_sync(&self, user_id: &str) {
        if self.inner.stopping.load(Ordering::Acquire) {
            warn!(
                "event=sync_request module=scheduler status=rejected user_id={} reason=shutdown",
                user_id
            );
            return;
        }

        let worker = self.inner.worker(user_id);
        worker
            .requests
            .send_modify(|generation| *generation = generation.wrapping_add(1));
        // Held across the publish so it cannot interleave with a pass starting.
        let in_flight = worker.in_flight();
        match in_flight.as_ref() {
            Some(cancel) => {
                cancel.cancel();
                debug!(
                    "event=sync_request module=scheduler status=superseded user_id={}",
                    user_id
                );
            }
            None => {
                worker.state.publish(SyncState::Pending);
            }
        }
        drop(in_flight);
        debug!(
            "event=sync_request module=scheduler status=queued user_id={}",
            user_id
        );
    }

    pub fn status(&self, user_id: &str) -> SyncState {
        self.inner
            .existing_worker(user_id)
            .map_or(SyncState::Idle, |worker| *worker.state.borrow())
    }

    /// Watches `user_id`'s state; usable before the first request.
    pub fn subscribe(&self, user_id: &str) -> watch::Receiver<SyncState> {
        self.inner.worker(user_id).state.subscribe()
    }

    /// Number of passes started for `user_id`, retries included.
    pub fn passes_started(&self, user_id: &str) -> u64 {
        self.inner
            .existing_worker(user_id)
            .map_or(0, |worker| worker.passes_started.load(Ordering::Acquire))
    }

    /// Stops every worker, cancelling in-flight passes, and waits for them.
    pub async fn shutdown(&self) {
        self.inner.stopping.store(true, Ordering::Release);
        self.inner.shutdown.send_replace(true);

        let handles = {
            let mut workers = self.inner.lock_workers();
            workers
                .values_mut()
                .filter_map(|slot| {
                    if let Some(cancel) = slot.shared.in_flight().as_ref() {
                        cancel.cancel();
                    }
                    slot.handle.take()
                })
                .collect::<Vec<_>>()
        };

        for handle in handles {
            if let Err(err) = handle.await {
                warn!(
                    "event=sync_shutdown module=scheduler status=error error={}",
                    err
                );
            }
        }
        info!("event=sync_shutdown module=scheduler status=ok");
    }
}

impl SyncRequester for SyncScheduler {
    fn request_sync(&self, user_id: &str) {
        SyncScheduler::request_sync(self, user_id);
    }
}

impl SchedulerInner {
    fn lock_workers(&self) -> MutexGuard<'_, HashMap<String, WorkerSlot>> {
        self.workers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn existing_worker(&self, user_id: &str) -> Option<Arc<UserWorker>> {
        self.lock_workers()
            .get(user_id)
            .map(|slot| Arc::clone(&slot.shared))
    }

    /// Returns the user's worker, spawning it on first use.
    fn worker(self: &Arc<Self>, user_id: &str) -> Arc<UserWorker> {
        let mut workers = self.lock_workers();
        if let Some(slot) = workers.get(user_id) {
            return Arc::clone(&slot.shared);
        }

        let (requests, requests_rx) = watch::channel(0u64);
        let (state, _) = watch::channel(SyncState::Idle);
        let shared = Arc::new(UserWorker {
            user_id: user_id.to_string(),
            requests,
            state,
            in_flight: Mutex::new(None),
            passes_started: AtomicU64::new(0),
        });
        let handle = self.runtime.spawn(run_worker(
            Arc::clone(self),
            Arc::clone(&shared),
            requests_rx,
            self.shutdown.subscribe(),
        ));
        workers.insert(
            user_id.to_string(),
            WorkerSlot {
                shared: Arc::clone(&shared),
                handle: Some(handle),
            },
        );
        shared
    }
}

async fn run_worker(
    inner: Arc<SchedulerInner>,
    worker: Arc<UserWorker>,
    mut requests: watch::Receiver<u64>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = requests.changed() => {
                if changed.is_err() {
                    return;
                }
            }
            _ = stop_requested(&mut shutdown) => return,
        }

        loop {
            match run_job(&inner, &worker, &mut requests, &mut shutdown).await {
                JobEnd::Shutdown => return,
                JobEnd::Restart => continue,
                JobEnd::Finished => {}
            }
            // Requests that arrived while the last attempt ran need a new pass.
            if requests.has_changed().unwrap_or(false) {
                continue;
            }
            break;
        }
    }
}

/// Debounces, waits for the network and runs attempts until the job ends.
async fn run_job(
    inner: &SchedulerInner,
    worker: &UserWorker,
    requests: &mut watch::Receiver<u64>,
    shutdown: &mut watch::Receiver<bool>,
) -> JobEnd {
    worker.state.publish(SyncState::Pending);
    loop {
        requests.borrow_and_update();
        tokio::select! {
            _ = tokio::time::sleep(inner.debounce) => break,
            changed = requests.changed() => {
                if changed.is_err() {
                    return JobEnd::Shutdown;
                }
            }
            _ = stop_requested(shutdown) => return JobEnd::Shutdown,
        }
    }

    let mut attempt = 1;
    loop {
        if !inner.network.is_available() {
            debug!(
                "event=sync_job module=scheduler status=waiting_network user_id={}",
                worker.user_id
            );
            tokio::select! {
                _ = inner.network.wait_until_available() => {}
                _ = stop_requested(shutdown) => return JobEnd::Shutdown,
            }
        }
        requests.borrow_and_update();

        let cancel = CancelSignal::new();
        *worker.in_flight() = Some(cancel.clone());
        worker.passes_started.fetch_add(1, Ordering::AcqRel);
        let outcome = inner
            .engine
            .execute(&worker.user_id, attempt, &cancel, &worker.state)
            .await;
        settle(inner, worker, &outcome, attempt);

        match outcome {
            SyncOutcome::Done(_) | SyncOutcome::Failed(_) => return JobEnd::Finished,
            SyncOutcome::Cancelled => {
                if inner.stopping.load(Ordering::Acquire) {
                    return JobEnd::Shutdown;
                }
                return JobEnd::Restart;
            }
            SyncOutcome::Retry(_) => {
                let delay = inner.retry.backoff_for(attempt);
                attempt += 1;
                debug!(
                    "event=sync_job module=scheduler status=backoff user_id={} next_attempt={} delay_ms={}",
                    worker.user_id,
                    attempt,
                    delay.as_millis()
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    changed = requests.changed() => {
                        if changed.is_err() {
                            return JobEnd::Shutdown;
                        }
                        return JobEnd::Restart;
                    }
                    _ = stop_requested(shutdown) => return JobEnd::Shutdown,
                }
            }
        }
    }
}

/// Clears the in-flight slot and publishes the attempt's settled state in one
/// critical section with `request_sync`.
fn settle(inner: &SchedulerInner, worker: &UserWorker, outcome: &SyncOutcome, attempt: u32) {
    let settled = match outcome {
        SyncOutcome::Done(_) => Some(SyncState::Done),
        SyncOutcome::Failed(_) => Some(SyncState::Failed),
        SyncOutcome::Cancelled if inner.stopping.load(Ordering::Acquire) => None,
        SyncOutcome::Cancelled => Some(SyncState::Pending),
        SyncOutcome::Retry(_) => Some(SyncState::Retrying {
            attempt: attempt + 1,
        }),
    };

    let mut in_flight = worker.in_flight();
    *in_flight = None;
    if let Some(state) = settled {
        worker.state.publish(state);
    }
}

/// Resolves once shutdown has been signalled.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
