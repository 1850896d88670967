//! The global task scheduler.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::runtime::Handle;
use tokio::time::{self, Instant};
use tracing::{trace, warn};

use crate::task::TaskState;
use crate::{SchedulerConfig, TaskFlow, TaskHandle, Ticks};

/// Counters describing scheduler activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerMetrics {
    /// Tasks ever spawned.
    pub spawned: u64,
    /// Tasks whose future is still alive (sleeping or running).
    pub live: u64,
    /// Callback invocations across all tasks.
    pub invocations: u64,
}

#[derive(Debug, Default)]
struct Counters {
    spawned: AtomicU64,
    live: AtomicU64,
    invocations: AtomicU64,
}

/// Decrements the live counter and marks the task finished when the task
/// future ends, including when it is aborted.
struct LiveGuard {
    state: Arc<TaskState>,
    counters: Arc<Counters>,
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.state.mark_finished();
        self.counters.live.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Spawns global (location-independent) tasks on the Tokio runtime.
///
/// Cheap to clone; clones share the runtime handle and metrics.
#[derive(Clone)]
pub struct Scheduler {
    config: Arc<SchedulerConfig>,
    runtime: Handle,
    counters: Arc<Counters>,
}

impl Scheduler {
    /// Creates a scheduler bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_runtime(Handle::current(), config)
    }

    /// Creates a scheduler that spawns onto the given runtime.
    pub fn with_runtime(runtime: Handle, config: SchedulerConfig) -> Self {
        Self {
            config: Arc::new(config.validated()),
            runtime,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs `f` once after `delay`.
    pub fn run_later<F>(&self, delay: Ticks, f: F) -> TaskHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let (state, guard) = self.register();
        let handle = TaskHandle::new(Arc::clone(&state));
        let wait = self.config.duration_of(delay);
        let counters = Arc::clone(&self.counters);

        let join = self.runtime.spawn(async move {
            let _guard = guard;
            time::sleep(wait).await;
            if state.is_cancelled() {
                return;
            }
            counters.invocations.fetch_add(1, Ordering::Relaxed);
            f();
        });
        handle.attach(join.abort_handle());
        handle
    }

    /// Runs `f` after `initial`, then every `period`, until it returns
    /// [`TaskFlow::Stop`] or the handle is cancelled.
    ///
    /// A zero period is raised to one tick.
    pub fn run_timer<F>(&self, initial: Ticks, period: Ticks, mut f: F) -> TaskHandle
    where
        F: FnMut() -> TaskFlow + Send + 'static,
    {
        let period = if period.is_zero() {
            warn!("repeating task with zero period, using one tick");
            Ticks::ONE
        } else {
            period
        };

        let (state, guard) = self.register();
        let handle = TaskHandle::new(Arc::clone(&state));
        let start = Instant::now() + self.config.duration_of(initial);
        let every = self.config.duration_of(period);
        let policy = self.config.policy;
        let counters = Arc::clone(&self.counters);

        let join = self.runtime.spawn(async move {
            let _guard = guard;
            let mut interval = time::interval_at(start, every);
            interval.set_missed_tick_behavior(policy.into());
            let mut runs = 0u64;
            loop {
                interval.tick().await;
                if state.is_cancelled() {
                    break;
                }
                runs += 1;
                counters.invocations.fetch_add(1, Ordering::Relaxed);
                if f() == TaskFlow::Stop {
                    trace!(runs, "repeating task stopped itself");
                    break;
                }
            }
        });
        handle.attach(join.abort_handle());
        handle
    }

    /// Runs a one-off future in the global domain without a handle.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future);
    }

    /// Snapshot of scheduler counters.
    pub fn metrics(&self) -> SchedulerMetrics {
        SchedulerMetrics {
            spawned: self.counters.spawned.load(Ordering::Acquire),
            live: self.counters.live.load(Ordering::Acquire),
            invocations: self.counters.invocations.load(Ordering::Acquire),
        }
    }

    fn register(&self) -> (Arc<TaskState>, LiveGuard) {
        let state = TaskState::new();
        self.counters.spawned.fetch_add(1, Ordering::AcqRel);
        self.counters.live.fetch_add(1, Ordering::AcqRel);
        let guard = LiveGuard {
            state: Arc::clone(&state),
            counters: Arc::clone(&self.counters),
        };
        (state, guard)
    }
}
