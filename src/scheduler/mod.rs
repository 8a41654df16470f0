//! Clock and timer abstractions.
//!
//! # Responsibilities
//! - Supply the current time to components that stamp records
//! - Schedule one-shot timer callbacks (batch interval ticks, report window)
//! - Allow cancellation on handler disposal
//!
//! # Design Decisions
//! - Timer-driven control flow goes through the `Scheduler` trait so the
//!   batching state machine is unit-testable without a real clock
//! - `TokioScheduler` backs production; `ManualScheduler` backs tests with a
//!   virtual clock advanced explicitly
//! - Callbacks return futures; a fired timer is awaited to completion before
//!   the next due timer runs, which keeps tick handling cooperative

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use futures::future::BoxFuture;

/// Identifier of a scheduled timer, used for cancellation.
pub type TimerId = u64;

/// A deferred unit of work run when a timer fires.
pub type TimerTask = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// One-shot timer scheduling.
pub trait Scheduler: Send + Sync {
    /// Schedule `task` to run once after `delay`. Returns an id for `cancel`.
    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerId;

    /// Cancel a pending timer. Cancelling an already-fired timer is a no-op.
    fn cancel(&self, id: TimerId);
}

/// Wall clock.
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Scheduler backed by tokio timers.
#[derive(Default)]
pub struct TokioScheduler {
    next_id: AtomicU64,
    handles: DashMap<TimerId, tokio::task::JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task().await;
        });
        self.handles.insert(id, handle);
        id
    }

    fn cancel(&self, id: TimerId) {
        if let Some((_, handle)) = self.handles.remove(&id) {
            handle.abort();
        }
    }
}

/// Virtual clock whose time only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

struct PendingTimer {
    id: TimerId,
    due_millis: u64,
    task: TimerTask,
}

/// Deterministic scheduler driven by a [`ManualClock`].
///
/// `advance_to` moves the clock forward and fires every due timer in due
/// order, awaiting each task before the next, so tests observe the same
/// cooperative interleaving the tokio scheduler provides.
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    next_id: AtomicU64,
    pending: Mutex<Vec<PendingTimer>>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            next_id: AtomicU64::new(0),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Advance the clock to `millis`, firing every timer due on the way.
    ///
    /// The clock is stepped to each timer's due time before its task runs,
    /// so tasks that reschedule (interval ticks) observe the time they were
    /// due at, not the advance target. Tasks scheduled by a fired task are
    /// themselves eligible within the same call.
    pub async fn advance_to(&self, millis: u64) {
        loop {
            let next = {
                let mut pending = self.pending.lock().expect("scheduler mutex poisoned");
                // Earliest due timer first; insertion order breaks ties.
                let due = pending
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| t.due_millis <= millis)
                    .min_by_key(|(_, t)| t.due_millis)
                    .map(|(i, _)| i);
                due.map(|i| pending.remove(i))
            };
            match next {
                Some(timer) => {
                    if timer.due_millis > self.clock.now_millis() {
                        self.clock.set(timer.due_millis);
                    }
                    (timer.task)().await;
                }
                None => break,
            }
        }
        if millis > self.clock.now_millis() {
            self.clock.set(millis);
        }
    }

    /// Number of timers still pending. Useful for asserting that a closed
    /// report window stopped rescheduling.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().expect("scheduler mutex poisoned").len()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule_once(&self, delay: Duration, task: TimerTask) -> TimerId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let due_millis = self.clock.now_millis() + delay.as_millis() as u64;
        self.pending
            .lock()
            .expect("scheduler mutex poisoned")
            .push(PendingTimer {
                id,
                due_millis,
                task,
            });
        id
    }

    fn cancel(&self, id: TimerId) {
        self.pending
            .lock()
            .expect("scheduler mutex poisoned")
            .retain(|t| t.id != id);
    }
}
