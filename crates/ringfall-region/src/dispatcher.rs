//! Region workers and the dispatcher that feeds them.
//!
//! Every region is an actor: one Tokio task draining one bounded mpsc
//! channel. Submitting work never blocks the caller; the result comes
//! back on a oneshot channel wrapped in a [`Dispatch`].

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use ringfall_model::Location;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::{DispatchError, RegionKey};

tokio::task_local! {
    static CURRENT_REGION: RegionKey;
}

/// The region whose worker is running the caller, or `None` when called
/// from anywhere else (a global task, a command handler).
pub fn current_region() -> Option<RegionKey> {
    CURRENT_REGION.try_with(|key| key.clone()).ok()
}

type Job = Box<dyn FnOnce() + Send + 'static>;

// ---------------------------------------------------------------------------
// RegionConfig
// ---------------------------------------------------------------------------

/// Partitioning and queueing settings.
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Regions are `2^region_shift` blocks wide. Default: 7 (128 blocks).
    pub region_shift: u32,
    /// Jobs a region may have queued before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            region_shift: 7,
            queue_capacity: 256,
        }
    }
}

impl RegionConfig {
    /// Largest accepted shift (regions of 65 536 blocks).
    pub const MAX_SHIFT: u32 = 16;

    pub fn validated(mut self) -> Self {
        if self.region_shift > Self::MAX_SHIFT {
            warn!(
                shift = self.region_shift,
                max = Self::MAX_SHIFT,
                "region_shift exceeds maximum, clamping"
            );
            self.region_shift = Self::MAX_SHIFT;
        }
        if self.queue_capacity == 0 {
            warn!("queue_capacity of 0 is unusable, using 1");
            self.queue_capacity = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

enum Pending<T> {
    Queued(oneshot::Receiver<T>),
    Rejected(DispatchError),
}

/// The eventual result of a job sent to a region.
///
/// Dropping a `Dispatch` does not cancel the job; it only discards the
/// result. Use [`then`](Self::then) to continue once the job has run.
#[must_use = "use `then`, `wait`, or `detach` to decide what happens after the job runs"]
pub struct Dispatch<T> {
    region: RegionKey,
    pending: Pending<T>,
    runtime: Handle,
}

impl<T: Send + 'static> Dispatch<T> {
    /// The region the job was sent to.
    pub fn region(&self) -> &RegionKey {
        &self.region
    }

    /// `true` if the job was refused at submission.
    pub fn is_rejected(&self) -> bool {
        matches!(self.pending, Pending::Rejected(_))
    }

    /// Waits for the job to complete.
    pub async fn wait(self) -> Result<T, DispatchError> {
        match self.pending {
            Pending::Queued(rx) => rx.await.map_err(|_| DispatchError::Dropped(self.region)),
            Pending::Rejected(err) => Err(err),
        }
    }

    /// Runs `f` with the job's result once the job has completed.
    ///
    /// The continuation runs in the global domain, not in the region. To
    /// touch another location it must dispatch again. When the job was
    /// refused or dropped the continuation is skipped.
    pub fn then<F>(self, f: F)
    where
        F: FnOnce(T) + Send + 'static,
    {
        let runtime = self.runtime.clone();
        runtime.spawn(async move {
            let region = self.region.clone();
            match self.wait().await {
                Ok(value) => f(value),
                Err(DispatchError::Dropped(_)) => {
                    warn!(%region, "dispatched job dropped, skipping continuation");
                }
                Err(err) => {
                    debug!(%region, error = %err, "dispatch refused, skipping continuation");
                }
            }
        });
    }

    /// Fire and forget.
    pub fn detach(self) {}
}

// ---------------------------------------------------------------------------
// RegionDispatcher
// ---------------------------------------------------------------------------

struct Inner {
    config: RegionConfig,
    workers: DashMap<RegionKey, mpsc::Sender<Job>>,
    runtime: Handle,
    closed: AtomicBool,
    dropped: AtomicU64,
}

/// Routes jobs to the worker that owns a location's region.
///
/// Cheap to clone. Workers are spawned lazily on first use of a region.
#[derive(Clone)]
pub struct RegionDispatcher {
    inner: Arc<Inner>,
}

impl RegionDispatcher {
    /// Creates a dispatcher bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(config: RegionConfig) -> Self {
        Self::with_runtime(Handle::current(), config)
    }

    pub fn with_runtime(runtime: Handle, config: RegionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: config.validated(),
                workers: DashMap::new(),
                runtime,
                closed: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// The region that owns `at`.
    pub fn key_of(&self, at: &Location) -> RegionKey {
        RegionKey::of(at, self.inner.config.region_shift)
    }

    /// `true` if the caller is running on the worker that owns `at`.
    pub fn owns_current(&self, at: &Location) -> bool {
        current_region().is_some_and(|key| key == self.key_of(at))
    }

    /// Sends `f` to the worker owning `at`.
    ///
    /// Never blocks. If the region cannot accept the job it is logged and
    /// dropped and the returned [`Dispatch`] is already rejected.
    pub fn execute<F, T>(&self, at: &Location, f: F) -> Dispatch<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let region = self.key_of(at);
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            let _ = tx.send(f());
        });

        let pending = match self.submit(&region, job) {
            Ok(()) => Pending::Queued(rx),
            Err(err) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(%region, error = %err, "region dispatch failed, job dropped");
                Pending::Rejected(err)
            }
        };

        Dispatch {
            region,
            pending,
            runtime: self.inner.runtime.clone(),
        }
    }

    /// Number of regions that currently have a worker.
    pub fn worker_count(&self) -> usize {
        self.inner.workers.len()
    }

    /// Jobs refused since the dispatcher was created.
    pub fn dropped_jobs(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Stops accepting jobs and lets every worker drain and exit.
    pub fn shutdown(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            let workers = self.inner.workers.len();
            self.inner.workers.clear();
            debug!(workers, "region dispatcher shut down");
        }
    }

    fn submit(&self, region: &RegionKey, job: Job) -> Result<(), DispatchError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(DispatchError::Closed(region.clone()));
        }

        let sender = self
            .inner
            .workers
            .entry(region.clone())
            .or_insert_with(|| self.spawn_worker(region.clone()))
            .clone();

        match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(DispatchError::Saturated(region.clone())),
            Err(TrySendError::Closed(_)) => {
                self.inner.workers.remove(region);
                Err(DispatchError::Closed(region.clone()))
            }
        }
    }

    fn spawn_worker(&self, region: RegionKey) -> mpsc::Sender<Job> {
        let (tx, rx) = mpsc::channel(self.inner.config.queue_capacity);
        self.inner.runtime.spawn(run_worker(region, rx));
        tx
    }
}

/// Drains one region's queue until every sender is gone.
async fn run_worker(region: RegionKey, mut jobs: mpsc::Receiver<Job>) {
    debug!(%region, "region worker started");

    while let Some(job) = jobs.recv().await {
        let outcome = CURRENT_REGION.sync_scope(region.clone(), || catch_unwind(AssertUnwindSafe(job)));
        if outcome.is_err() {
            error!(%region, "region job panicked");
        }
    }

    debug!(%region, "region worker stopped");
}
