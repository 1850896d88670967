//! Task handles and handle sets.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::task::AbortHandle;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Returned by a repeating task's callback to keep or end the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFlow {
    Continue,
    Stop,
}

/// Shared bookkeeping between a spawned task and its handles.
#[derive(Debug)]
pub(crate) struct TaskState {
    id: u64,
    cancelled: AtomicBool,
    finished: AtomicBool,
    abort: OnceLock<AbortHandle>,
}

impl TaskState {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed),
            cancelled: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            abort: OnceLock::new(),
        })
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub(crate) fn attach(&self, abort: AbortHandle) {
        let _ = self.abort.set(abort);
        // Cancelled before the abort handle existed.
        if self.is_cancelled() {
            if let Some(handle) = self.abort.get() {
                handle.abort();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// TaskHandle
// ---------------------------------------------------------------------------

/// Handle to a scheduled task. Cheap to clone.
///
/// [`cancel`](Self::cancel) is synchronous: once it returns, the task's
/// callback will not be started again. A callback that is already running
/// on another worker finishes its current invocation.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(state: Arc<TaskState>) -> Self {
        Self { state }
    }

    pub(crate) fn attach(&self, abort: AbortHandle) {
        self.state.attach(abort);
    }

    /// Unique id of the underlying task.
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Cancels the task. Idempotent.
    pub fn cancel(&self) {
        if !self.state.cancelled.swap(true, Ordering::AcqRel) {
            if let Some(abort) = self.state.abort.get() {
                abort.abort();
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// `true` once the task ran to completion or stopped itself.
    pub fn is_finished(&self) -> bool {
        self.state.finished.load(Ordering::Acquire)
    }

    /// `true` while the task may still invoke its callback.
    pub fn is_active(&self) -> bool {
        !self.is_cancelled() && !self.is_finished()
    }
}

// ---------------------------------------------------------------------------
// TaskSet
// ---------------------------------------------------------------------------

/// A list of task handles owned by one component and cancelled together.
///
/// Safe to share between threads; adding and cancelling may race freely.
#[derive(Debug, Default)]
pub struct TaskSet {
    handles: Mutex<Vec<TaskHandle>>,
}

impl TaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handle, dropping handles that are no longer active.
    pub fn track(&self, handle: TaskHandle) {
        let mut handles = self.handles.lock();
        handles.retain(TaskHandle::is_active);
        handles.push(handle);
    }

    /// Cancels every tracked task and empties the set.
    ///
    /// Returns how many tasks were still active.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<TaskHandle> = std::mem::take(&mut *self.handles.lock());
        let mut active = 0;
        for handle in drained {
            if handle.is_active() {
                active += 1;
            }
            handle.cancel();
        }
        active
    }

    /// Number of tracked tasks that are still active.
    pub fn active(&self) -> usize {
        self.handles.lock().iter().filter(|h| h.is_active()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.active() == 0
    }
}
