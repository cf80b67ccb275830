#![forbid(unsafe_code)]

//! Cooperative scheduling for deferred engine work.
//!
//! The engine never spawns work on its own. Everything deferred (the
//! debounced persistence write, validator retry polling, the post-init
//! settle tick) goes through a [`Scheduler`] handed in by the host.
//!
//! Two implementations:
//!
//! - [`VirtualScheduler`]: virtual clock, tasks run only when the test
//!   advances time. Fully deterministic.
//! - [`TimerScheduler`]: a background timer thread with a condvar-based
//!   stop signal, for hosts without their own timer facility.
//!
//! Every scheduled task is paired with a cancellable [`TaskHandle`]; a
//! cancelled task is dropped unrun. Handles do not cancel on drop;
//! cancellation is an explicit lifecycle act, matching listener disposal.

use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Handle to one scheduled task.
#[derive(Clone, Debug)]
pub struct TaskHandle {
    id: u64,
    cancelled: Arc<AtomicBool>,
}

impl TaskHandle {
    fn new(id: u64) -> Self {
        Self {
            id,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the task. Safe to call after the task has already run.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether the task was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Scheduler-assigned task id, for logging.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Deferred-work scheduler with a millisecond clock.
pub trait Scheduler: Send + Sync {
    /// Run `task` after `delay`, unless the returned handle is cancelled
    /// first. A zero delay defers to the next tick, never runs inline.
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle;

    /// Current time in milliseconds, for stamping persisted snapshots.
    fn now_millis(&self) -> u64;
}

// ─────────────────────────────────────────────────────────────────────────────
// Virtual scheduler
// ─────────────────────────────────────────────────────────────────────────────

struct VirtualEntry {
    due_ms: u64,
    seq: u64,
    handle: TaskHandle,
    task: Task,
}

struct VirtualInner {
    now_ms: u64,
    next_seq: u64,
    queue: Vec<VirtualEntry>,
}

/// Deterministic scheduler driven by manual time advance.
///
/// Tasks run in due-time order (insertion order among equals), on the
/// caller's thread, inside [`advance`](Self::advance). A task may schedule
/// further tasks; those run in the same advance if they fall due within it.
pub struct VirtualScheduler {
    inner: Mutex<VirtualInner>,
    next_id: AtomicU64,
}

impl VirtualScheduler {
    /// Create a virtual scheduler at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(VirtualInner {
                now_ms: 0,
                next_seq: 0,
                queue: Vec::new(),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    /// Advance virtual time, running every task that falls due.
    pub fn advance(&self, delta: Duration) {
        let target = {
            let mut inner = self.inner.lock().unwrap();
            inner.now_ms += delta.as_millis() as u64;
            inner.now_ms
        };
        // Pop one due task at a time; running it outside the lock lets it
        // schedule (or cancel) more work without deadlocking.
        loop {
            let next = {
                let mut inner = self.inner.lock().unwrap();
                let due_idx = inner
                    .queue
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.due_ms <= target)
                    .min_by_key(|(_, e)| (e.due_ms, e.seq))
                    .map(|(i, _)| i);
                due_idx.map(|i| inner.queue.swap_remove(i))
            };
            match next {
                Some(entry) => {
                    if !entry.handle.is_cancelled() {
                        (entry.task)();
                    }
                }
                None => break,
            }
        }
    }

    /// Number of tasks still queued (cancelled ones included until due).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.lock().unwrap().queue.len()
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut inner = self.inner.lock().unwrap();
        let due_ms = inner.now_ms + delay.as_millis() as u64;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.queue.push(VirtualEntry {
            due_ms,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }

    fn now_millis(&self) -> u64 {
        self.inner.lock().unwrap().now_ms
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Timer scheduler
// ─────────────────────────────────────────────────────────────────────────────

struct TimerEntry {
    due: Instant,
    seq: u64,
    handle: TaskHandle,
    task: Task,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; reverse so the earliest entry surfaces.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct TimerShared {
    queue: Mutex<TimerState>,
    wakeup: Condvar,
}

struct TimerState {
    entries: BinaryHeap<TimerEntry>,
    next_seq: u64,
    stopped: bool,
}

/// Thread-backed scheduler for hosts without their own timers.
///
/// One worker thread sleeps until the earliest due task, runs it, and goes
/// back to sleep. Dropping the scheduler stops the worker; queued tasks
/// that have not fired are dropped unrun.
pub struct TimerScheduler {
    shared: Arc<TimerShared>,
    worker: Option<thread::JoinHandle<()>>,
    next_id: AtomicU64,
}

impl TimerScheduler {
    /// Create the scheduler and start its worker thread.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(TimerShared {
            queue: Mutex::new(TimerState {
                entries: BinaryHeap::new(),
                next_seq: 0,
                stopped: false,
            }),
            wakeup: Condvar::new(),
        });
        let worker_shared = shared.clone();
        let worker = thread::spawn(move || Self::run_worker(&worker_shared));
        Self {
            shared,
            worker: Some(worker),
            next_id: AtomicU64::new(1),
        }
    }

    fn run_worker(shared: &TimerShared) {
        let mut state = shared.queue.lock().unwrap();
        loop {
            if state.stopped {
                return;
            }
            let now = Instant::now();
            let next_due = state.entries.peek().map(|e| e.due);
            match next_due {
                Some(due) if due <= now => {
                    let entry = state.entries.pop().expect("peeked entry present");
                    drop(state);
                    if !entry.handle.is_cancelled() {
                        (entry.task)();
                    }
                    state = shared.queue.lock().unwrap();
                }
                Some(due) => {
                    let (guard, _timeout) = shared
                        .wakeup
                        .wait_timeout(state, due.saturating_duration_since(now))
                        .unwrap();
                    state = guard;
                }
                None => {
                    state = shared.wakeup.wait(state).unwrap();
                }
            }
        }
    }
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for TimerScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut state = self.shared.queue.lock().unwrap();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.push(TimerEntry {
            due: Instant::now() + delay,
            seq,
            handle: handle.clone(),
            task,
        });
        drop(state);
        self.shared.wakeup.notify_all();
        handle
    }

    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        {
            let mut state = self.shared.queue.lock().unwrap();
            state.stopped = true;
        }
        self.shared.wakeup.notify_all();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
