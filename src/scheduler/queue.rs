//! Bounded job queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

use super::priority::{Priority, PriorityQueue};
use crate::jobs::{JobId, JobInput};

/// Configuration for the job queue.
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    pub max_pending: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self { max_pending: 64 }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("job queue is full ({capacity} pending)")]
    QueueFull { capacity: usize },

    #[error("job queue is closed")]
    Closed,
}

/// A job waiting for a worker.
pub struct QueuedJob {
    pub id: JobId,
    pub input: JobInput,
    pub priority: Priority,
    pub enqueued_at: Instant,
    pub cancel: CancellationToken,
}

impl QueuedJob {
    pub fn new(id: JobId, input: JobInput, priority: Priority, cancel: CancellationToken) -> Self {
        Self {
            id,
            input,
            priority,
            enqueued_at: Instant::now(),
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for QueuedJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedJob")
            .field("id", &self.id)
            .field("kind", &self.input.kind())
            .field("priority", &self.priority)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Thread-safe job queue with priority support.
pub struct JobQueue {
    queue: Mutex<PriorityQueue<QueuedJob>>,
    config: JobQueueConfig,
    /// Wakes workers when jobs arrive or the queue closes.
    notify: Notify,
    closed: AtomicBool,
}

impl JobQueue {
    pub fn new(config: JobQueueConfig) -> Self {
        Self {
            queue: Mutex::new(PriorityQueue::new()),
            config,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn capacity(&self) -> usize {
        self.config.max_pending
    }

    /// Enqueue a job. Returns its position at insertion time.
    pub async fn enqueue(&self, job: QueuedJob) -> Result<usize, QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let mut queue = self.queue.lock().await;
        if queue.len() >= self.config.max_pending {
            return Err(QueueError::QueueFull {
                capacity: self.config.max_pending,
            });
        }
        let position = queue.len();
        let priority = job.priority;
        queue.push(job, priority);
        drop(queue);

        self.notify.notify_one();
        Ok(position)
    }

    /// Put a job back after a transient failure. Ignores the capacity limit
    /// since the job already held a slot.
    pub async fn requeue(&self, job: QueuedJob) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        let priority = job.priority;
        self.queue.lock().await.push(job, priority);
        self.notify.notify_one();
        Ok(())
    }

    /// Cancel a pending job by id and free its slot. Returns true if it was
    /// queued.
    pub async fn cancel(&self, id: &JobId) -> bool {
        let mut queue = self.queue.lock().await;
        let removed = queue.remove_where(|job| {
            if job.id != *id {
                return false;
            }
            job.cancel.cancel();
            true
        });
        removed > 0
    }

    /// Dequeue the highest priority job, skipping cancelled ones.
    pub async fn dequeue(&self) -> Option<QueuedJob> {
        let mut queue = self.queue.lock().await;
        loop {
            let job = queue.pop()?;
            if job.is_cancelled() {
                tracing::debug!(job_id = %job.id, "skipping cancelled job");
                continue;
            }
            return Some(job);
        }
    }

    /// Wait for work then dequeue. Returns None once the queue is closed.
    pub async fn wait_and_dequeue(&self) -> Option<QueuedJob> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_closed() {
                return None;
            }
            if let Some(job) = self.dequeue().await {
                return Some(job);
            }
            notified.await;
        }
    }

    /// Stop accepting jobs and wake every waiting worker.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drop every queued job, cancelling each. Returns their ids.
    pub async fn drain(&self) -> Vec<JobId> {
        let mut queue = self.queue.lock().await;
        let mut ids = Vec::with_capacity(queue.len());
        while let Some(job) = queue.pop() {
            job.cancel.cancel();
            ids.push(job.id);
        }
        ids
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
