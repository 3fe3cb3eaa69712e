//! Free-list of reusable task objects.
//!
//! Tasks live in numbered slots. The pool keeps a ticket per active slot
//! (generation, source, cancellation token) under a single lock; that lock
//! is also what cancellation takes, so a cancel can never hit a slot that has
//! already moved on to a different request.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::task::{Task, TaskHandle};
use crate::models::{ImageSource, RequestIdentity};

struct Ticket {
    source: ImageSource,
    cancel: CancellationToken,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    active: Option<Ticket>,
}

#[derive(Default)]
struct Slots {
    idle: Vec<Task>,
    slots: Vec<Slot>,
}

/// Snapshot of pool occupancy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Slots ever created
    pub slots: usize,
    /// Tasks waiting for reuse
    pub idle: usize,
    /// Tasks bound to a request
    pub active: usize,
}

/// Thread-safe task pool.
#[derive(Default)]
pub struct TaskPool {
    inner: Mutex<Slots>,
}

impl TaskPool {
    /// Create a pool with `capacity` idle tasks ready.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Slots::default();
        for slot in 0..capacity {
            slots.slots.push(Slot::default());
            slots.idle.push(Task::new(slot));
        }
        // Reuse low slot numbers first
        slots.idle.reverse();
        Self {
            inner: Mutex::new(slots),
        }
    }

    /// Take an idle task (or create one) and bind it to `identity`.
    ///
    /// The returned task is in `TaskNone`; the caller decides where it enters
    /// the state machine.
    pub fn acquire(&self, identity: RequestIdentity) -> Task {
        let mut inner = self.inner.lock();

        let mut task = match inner.idle.pop() {
            Some(task) => task,
            None => {
                let slot = inner.slots.len();
                inner.slots.push(Slot::default());
                tracing::trace!(slot, "Growing task pool");
                Task::new(slot)
            }
        };

        let slot = &mut inner.slots[task.handle().slot];
        slot.generation += 1;
        let cancel = CancellationToken::new();
        slot.active = Some(Ticket {
            source: identity.source.clone(),
            cancel: cancel.clone(),
        });
        task.activate(slot.generation, identity, cancel);
        task
    }

    /// Reset a task and make it available again.
    pub fn recycle(&self, mut task: Task) {
        task.reset();
        let mut inner = self.inner.lock();
        let slot = task.handle().slot;
        if let Some(entry) = inner.slots.get_mut(slot) {
            entry.active = None;
        }
        inner.idle.push(task);
    }

    /// Cancel the activation named by `handle` if it is still serving
    /// `source`. Returns whether a task was signalled.
    pub fn cancel(&self, handle: TaskHandle, source: &ImageSource) -> bool {
        let inner = self.inner.lock();
        let Some(slot) = inner.slots.get(handle.slot) else {
            return false;
        };
        match &slot.active {
            Some(ticket) if slot.generation == handle.generation && &ticket.source == source => {
                ticket.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Cancel every active task. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let inner = self.inner.lock();
        let mut count = 0;
        for ticket in inner.slots.iter().filter_map(|s| s.active.as_ref()) {
            if !ticket.cancel.is_cancelled() {
                ticket.cancel.cancel();
                count += 1;
            }
        }
        count
    }

    /// Whether `handle` still names the live activation of its slot.
    pub fn is_current(&self, handle: TaskHandle) -> bool {
        let inner = self.inner.lock();
        inner
            .slots
            .get(handle.slot)
            .is_some_and(|s| s.generation == handle.generation && s.active.is_some())
    }

    /// Occupancy snapshot.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock();
        PoolStats {
            slots: inner.slots.len(),
            idle: inner.idle.len(),
            active: inner.slots.iter().filter(|s| s.active.is_some()).count(),
        }
    }
}
