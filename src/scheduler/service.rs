//! Admission and lookup of jobs on behalf of the gateway.

use std::sync::Arc;

use thiserror::Error;

use super::priority::Priority;
use super::queue::{JobQueue, QueueError, QueuedJob};
use crate::jobs::{JobId, JobInput, JobRecord, JobStore, StoreError};
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("service is shutting down")]
    ShuttingDown,
}

/// Front door of the scheduler.
pub struct Scheduler {
    queue: Arc<JobQueue>,
    store: Arc<JobStore>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl Scheduler {
    pub fn new(queue: Arc<JobQueue>, store: Arc<JobStore>, shutdown: Arc<ShutdownCoordinator>) -> Self {
        Self { queue, store, shutdown }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Record a job and queue it. The returned record is `queued`.
    pub async fn submit(&self, input: JobInput, priority: Priority) -> Result<JobRecord, SubmitError> {
        let kind = input.kind();
        if !self.shutdown.is_accepting() {
            telemetry::record_job_rejected(kind, "shutting_down");
            return Err(SubmitError::ShuttingDown);
        }

        let id = JobId::new();
        let cancel = self.shutdown.root_token().child_token();
        let record = JobRecord::new(id, input.request_id, kind);
        self.store.insert(record.clone(), cancel.clone());

        match self.queue.enqueue(QueuedJob::new(id, input, priority, cancel)).await {
            Ok(position) => {
                tracing::info!(job_id = %id, operation = %kind, %priority, position, "job queued");
                telemetry::record_job_submitted(kind);
                Ok(record)
            }
            Err(e) => {
                self.store.remove(&id);
                let reason = match e {
                    QueueError::QueueFull { .. } => "queue_full",
                    QueueError::Closed => "closed",
                };
                telemetry::record_job_rejected(kind, reason);
                Err(e.into())
            }
        }
    }

    pub fn status(&self, id: &JobId) -> Option<JobRecord> {
        self.store.get(id)
    }

    /// Cancel a queued or running job.
    pub async fn cancel(&self, id: &JobId) -> Result<JobRecord, StoreError> {
        let record = self.store.cancel(id)?;
        self.queue.cancel(id).await;
        tracing::info!(job_id = %id, "job cancelled");
        Ok(record)
    }

    /// Stop admitting jobs and cancel everything still queued.
    pub async fn close(&self) -> usize {
        self.queue.close();
        let dropped = self.queue.drain().await;
        for id in &dropped {
            if let Err(e) = self.store.cancel(id) {
                tracing::debug!(job_id = %id, error = %e, "queued job already settled");
            }
        }
        dropped.len()
    }
}
