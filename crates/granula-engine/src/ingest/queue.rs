//! Priority task queue
//!
//! Ready-to-run chunk tasks ordered by priority (highest first) and, within a
//! priority band, by enqueue sequence (oldest first). A retried chunk is
//! enqueued again with a fresh sequence, so it queues behind work of the same
//! priority that arrived in the meantime.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Identifies the chunk a task refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkRef {
    pub chunk_id: Uuid,
    pub file_id: Uuid,
    pub ordinal: u32,
}

/// An enqueued chunk reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    pub chunk: ChunkRef,
    pub priority: i32,
    /// Assigned at enqueue time, strictly increasing per queue
    pub sequence: u64,
}

impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Task {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: higher priority wins, then lower sequence
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Unbounded priority queue shared by the planner, the retry controller and
/// the worker pool
#[derive(Debug, Default)]
pub struct PriorityTaskQueue {
    heap: Mutex<BinaryHeap<Task>>,
    notify: Notify,
    sequence: AtomicU64,
    closed: AtomicBool,
}

impl PriorityTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task and wake one waiting worker
    ///
    /// Returns the sequence number assigned to the task.
    pub fn enqueue(&self, chunk: ChunkRef, priority: i32) -> EngineResult<u64> {
        if self.is_closed() {
            return Err(EngineError::QueueClosed);
        }

        let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Task {
                chunk,
                priority,
                sequence,
            });
        self.notify.notify_one();
        Ok(sequence)
    }

    /// Wait for the next task
    ///
    /// Suspends until a task is available. Returns `None` once the queue is
    /// closed; tasks still held at that point stay queued in the store.
    pub async fn dequeue(&self) -> Option<Task> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a concurrent enqueue or close
            // cannot slip between the check and the wait
            notified.as_mut().enable();

            if self.is_closed() {
                return None;
            }
            if let Some(task) = self.try_dequeue() {
                return Some(task);
            }

            notified.await;
        }
    }

    /// Pop the best task without waiting
    pub fn try_dequeue(&self) -> Option<Task> {
        self.heap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    /// Stop handing out tasks and release every waiting worker
    pub fn close(&self) {
        self.closed.store(true, AtomicOrdering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(AtomicOrdering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.heap
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
