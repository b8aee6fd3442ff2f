//! Worker loops: dequeue jobs, lease pipelines, run the recipe, record the
//! outcome.
//!
//! One worker exists per accelerator concurrency slot, so the worker count
//! bounds how many generations run at once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::queue::{JobQueue, QueueError, QueuedJob};
use crate::jobs::{JobRecord, JobStatus, JobStore, OperationKind};
use crate::models::ModelRegistry;
use crate::pipeline::{JobExecutor, JobOutput, PipelineError};
use crate::shutdown::ShutdownCoordinator;
use crate::storage;
use crate::telemetry::{self, JobSpan, SpanExt};

/// Per-job execution policy.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub job_timeout: Duration,
    /// Total attempts for jobs failing with transient errors.
    pub max_attempts: u32,
    /// Prefix of public output URLs.
    pub api_base_url: String,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(600),
            max_attempts: 2,
            api_base_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Everything a worker touches.
pub struct WorkerContext {
    pub queue: Arc<JobQueue>,
    pub store: Arc<JobStore>,
    pub registry: Arc<ModelRegistry>,
    pub executor: Arc<JobExecutor>,
    pub shutdown: Arc<ShutdownCoordinator>,
    pub settings: WorkerSettings,
}

enum Outcome {
    Succeeded(JobOutput),
    Failed(PipelineError),
    TimedOut,
    Cancelled,
}

/// Spawn `count` workers. Each exits when `stop` fires or the queue closes.
pub fn spawn_workers(ctx: Arc<WorkerContext>, count: usize, stop: CancellationToken) -> Vec<JoinHandle<()>> {
    (0..count.max(1))
        .map(|index| spawn_worker(Arc::clone(&ctx), index, stop.clone()))
        .collect()
}

pub fn spawn_worker(ctx: Arc<WorkerContext>, index: usize, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        worker_loop(&ctx, index, stop).await;
    })
}

async fn worker_loop(ctx: &WorkerContext, index: usize, stop: CancellationToken) {
    tracing::debug!(worker = index, "worker started");
    loop {
        tokio::select! {
            biased;
            () = stop.cancelled() => {
                tracing::info!(worker = index, "worker: shutdown signal received");
                break;
            }
            job = ctx.queue.wait_and_dequeue() => match job {
                Some(job) => run_job(ctx, index, job).await,
                None => {
                    tracing::info!(worker = index, "worker: queue closed");
                    break;
                }
            }
        }
    }
}

async fn run_job(ctx: &WorkerContext, worker: usize, job: QueuedJob) {
    let kind = job.input.kind();
    let record = match ctx.store.mark_running(&job.id) {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!(job_id = %job.id, error = %e, "job no longer runnable");
            return;
        }
    };
    let _guard = ctx.shutdown.track();
    telemetry::record_queue_wait(kind, job.enqueued_at.elapsed());

    let span = JobSpan::new(&job.id, kind, worker);
    span.record("attempt", record.attempts);

    let started = Instant::now();
    let outcome = execute(ctx, &job).instrument(span.clone()).await;
    span.record("duration_ms", started.elapsed().as_millis() as u64);

    let finish = async {
        match outcome {
            Outcome::Succeeded(output) => {
                span.record_result::<_, PipelineError>(&Ok(()));
                let url = storage::output_url(&ctx.settings.api_base_url, &output.file_name);
                match ctx.store.mark_succeeded(&job.id, output.output_path, url) {
                    Ok(_) => {
                        tracing::info!("generation succeeded");
                        telemetry::record_job_finished(kind, JobStatus::Succeeded.as_str(), started.elapsed());
                    }
                    Err(e) => tracing::warn!(error = %e, "could not record success"),
                }
            }
            Outcome::Failed(error) => {
                span.record_result::<(), _>(&Err(&error));
                handle_failure(ctx, job, &record, error, started).await;
            }
            Outcome::TimedOut => {
                let message = format!(
                    "generation timed out after {}s",
                    ctx.settings.job_timeout.as_secs()
                );
                span.record_result::<(), _>(&Err(&message));
                tracing::error!("{message}");
                finish_failed(ctx, &record, kind, message, started);
            }
            Outcome::Cancelled => {
                span.record("status", "cancelled");
                // Cancelled through the API: already recorded. Cancelled by
                // shutdown: still running in the store.
                if ctx.store.get(&job.id).is_some_and(|r| r.status == JobStatus::Running) {
                    if let Err(e) = ctx.store.cancel(&job.id) {
                        tracing::warn!(error = %e, "could not record cancellation");
                    }
                }
                tracing::info!("generation cancelled");
                telemetry::record_job_finished(kind, JobStatus::Cancelled.as_str(), started.elapsed());
            }
        }
    };
    finish.instrument(span.clone()).await;
}

async fn execute(ctx: &WorkerContext, job: &QueuedJob) -> Outcome {
    let work = async {
        let lease = ctx.registry.acquire_for(job.input.kind()).await?;
        tracing::debug!(pipelines = ?lease.pipelines(), "pipelines leased");
        ctx.executor.execute(&job.input, &lease).await
    };

    tokio::select! {
        biased;
        () = job.cancel.cancelled() => Outcome::Cancelled,
        result = tokio::time::timeout(ctx.settings.job_timeout, work) => match result {
            Ok(Ok(output)) => Outcome::Succeeded(output),
            Ok(Err(e)) => Outcome::Failed(e),
            Err(_) => Outcome::TimedOut,
        },
    }
}

async fn handle_failure(
    ctx: &WorkerContext,
    job: QueuedJob,
    record: &JobRecord,
    error: PipelineError,
    started: Instant,
) {
    let kind = job.input.kind();
    let message = error.to_string();

    if error.is_transient() && record.attempts < ctx.settings.max_attempts {
        tracing::warn!(
            job_id = %job.id,
            attempt = record.attempts,
            max_attempts = ctx.settings.max_attempts,
            error = %message,
            "transient failure, requeueing"
        );
        if let Err(e) = ctx.store.mark_requeued(&job.id, &message) {
            tracing::warn!(job_id = %job.id, error = %e, "could not requeue job");
            return;
        }
        let id = job.id;
        match ctx.queue.requeue(job).await {
            Ok(()) => telemetry::record_job_retry(kind),
            Err(QueueError::Closed) | Err(QueueError::QueueFull { .. }) => {
                if let Err(e) = ctx.store.cancel(&id) {
                    tracing::warn!(job_id = %id, error = %e, "could not record cancellation");
                }
                telemetry::record_job_finished(kind, JobStatus::Cancelled.as_str(), started.elapsed());
            }
        }
        return;
    }

    tracing::error!(job_id = %job.id, error = %message, "generation failed");
    finish_failed(ctx, record, kind, message, started);
}

fn finish_failed(ctx: &WorkerContext, record: &JobRecord, kind: OperationKind, message: String, started: Instant) {
    match ctx.store.mark_failed(&record.id, message) {
        Ok(_) => telemetry::record_job_finished(kind, JobStatus::Failed.as_str(), started.elapsed()),
        Err(e) => tracing::warn!(job_id = %record.id, error = %e, "could not record failure"),
    }
}
