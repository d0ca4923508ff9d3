//! Concurrency budget for transfer workers.
//!
//! A semaphore caps the total number of spawned workers; an atomic counter
//! tracks how many of them serve today's partition. Backlog workers are
//! additionally gated so they cannot eat into the slots reserved for
//! today. When no slot is granted the caller runs the transfer inline in
//! its own task, which is the backpressure mechanism: there is never an
//! unbounded queue of pending transfers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Process-wide transfer worker budget.
#[derive(Debug)]
pub struct TransferBudget {
    max_workers: usize,
    reserved_priority: usize,
    permits: Arc<Semaphore>,
    priority_active: Arc<AtomicUsize>,
}

impl TransferBudget {
    /// `reserved_priority` must not exceed `max_workers`; config
    /// validation guarantees this before the daemon starts.
    pub fn new(max_workers: usize, reserved_priority: usize) -> Self {
        Self {
            max_workers,
            reserved_priority,
            permits: Arc::new(Semaphore::new(max_workers)),
            priority_active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Try to claim a slot for a spawned worker.
    ///
    /// A priority (today) worker needs only a free permit. A backlog
    /// worker is additionally refused while the active priority workers
    /// have claimed the capacity not set aside for them. The priority
    /// gate is advisory; the semaphore alone enforces the hard cap.
    pub fn try_acquire(&self, priority: bool) -> Option<WorkerSlot> {
        if !priority && self.priority_active.load(Ordering::Acquire) >= self.backlog_cap() {
            return None;
        }

        let permit = self.permits.clone().try_acquire_owned().ok()?;
        Some(WorkerSlot::new(
            Some(permit),
            priority,
            &self.priority_active,
        ))
    }

    /// Account for a transfer that runs inline in the caller's task.
    ///
    /// Inline transfers hold no permit (none was available), but a
    /// priority one still raises the counter so backlog spawns keep
    /// yielding while today's partition is under pressure.
    pub fn inline_slot(&self, priority: bool) -> WorkerSlot {
        WorkerSlot::new(None, priority, &self.priority_active)
    }

    fn backlog_cap(&self) -> usize {
        self.max_workers - self.reserved_priority
    }

    /// Spawned workers currently holding a permit.
    pub fn active_workers(&self) -> usize {
        self.max_workers - self.permits.available_permits()
    }

    pub fn active_priority_workers(&self) -> usize {
        self.priority_active.load(Ordering::Acquire)
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

/// A claimed budget slot. Dropping it releases the permit and, for
/// priority work, decrements the priority counter — on every worker exit
/// path, including panics.
pub struct WorkerSlot {
    _permit: Option<OwnedSemaphorePermit>,
    priority: bool,
    priority_active: Arc<AtomicUsize>,
}

impl WorkerSlot {
    fn new(
        permit: Option<OwnedSemaphorePermit>,
        priority: bool,
        priority_active: &Arc<AtomicUsize>,
    ) -> Self {
        if priority {
            priority_active.fetch_add(1, Ordering::AcqRel);
        }
        Self {
            _permit: permit,
            priority,
            priority_active: priority_active.clone(),
        }
    }
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        if self.priority {
            self.priority_active.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
