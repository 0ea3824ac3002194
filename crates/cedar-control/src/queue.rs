//! Bounded FIFO task queue
//!
//! Submissions respect the capacity bound; requeues do not, because they
//! are work the fleet already accepted and must not drop. `pop` parks on a
//! `Notify` rather than spinning, and wakes promptly on push or close.

use cedar_types::{FleetError, Result, TaskEnvelope};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Bounded in-memory task queue.
pub struct TaskQueue {
    capacity: usize,
    items: Mutex<VecDeque<TaskEnvelope>>,
    notify: Notify,
    closed: AtomicBool,
}

impl TaskQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue a newly submitted task, respecting the capacity bound.
    pub fn push(&self, task: TaskEnvelope) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(FleetError::ShuttingDown);
        }
        {
            let mut items = self.items.lock().unwrap();
            if items.len() >= self.capacity {
                return Err(FleetError::QueueFull {
                    limit: self.capacity,
                });
            }
            items.push_back(task);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Put a task back at the front, preserving FIFO order.
    ///
    /// Used when no agent was available; bypasses the capacity bound.
    pub fn requeue_front(&self, task: TaskEnvelope) {
        self.items.lock().unwrap().push_front(task);
        self.notify.notify_one();
    }

    /// Re-enqueue a retry copy at the back. Bypasses the capacity bound.
    pub fn requeue_back(&self, task: TaskEnvelope) {
        self.items.lock().unwrap().push_back(task);
        self.notify.notify_one();
    }

    /// Take the next task, waiting until one arrives.
    ///
    /// Returns `None` once the queue is closed and empty.
    pub async fn pop(&self) -> Option<TaskEnvelope> {
        loop {
            {
                let mut items = self.items.lock().unwrap();
                if let Some(task) = items.pop_front() {
                    return Some(task);
                }
                if self.closed.load(Ordering::SeqCst) {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Stop accepting submissions. Queued tasks remain poppable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of tasks waiting.
    pub fn depth(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    /// Remove and return everything still queued.
    pub fn drain(&self) -> Vec<TaskEnvelope> {
        self.items.lock().unwrap().drain(..).collect()
    }
}
