//! Inference scheduler: job queue, worker pool and housekeeping.

mod janitor;
mod priority;
mod queue;
mod service;
mod worker;

pub use janitor::{Janitor, JanitorSettings, SweepReport};
pub use priority::{Priority, PriorityQueue};
pub use queue::{JobQueue, JobQueueConfig, QueueError, QueuedJob};
pub use service::{Scheduler, SubmitError};
pub use worker::{spawn_worker, spawn_workers, WorkerContext, WorkerSettings};
