//! Metric emission through the `metrics` facade.
//!
//! No exporter is installed by the library; the binary or an embedding
//! application decides where the values go.

use std::time::Duration;

use ::metrics::{counter, gauge, histogram};

use crate::jobs::{OperationKind, StatusCounts};

pub fn record_job_submitted(kind: OperationKind) {
    counter!("img2img_jobs_submitted_total", "operation" => kind.as_str()).increment(1);
}

pub fn record_job_rejected(kind: OperationKind, reason: &'static str) {
    counter!(
        "img2img_jobs_rejected_total",
        "operation" => kind.as_str(),
        "reason" => reason
    )
    .increment(1);
}

/// Terminal outcome of a job. `outcome` is a job status name.
pub fn record_job_finished(kind: OperationKind, outcome: &'static str, duration: Duration) {
    counter!(
        "img2img_jobs_finished_total",
        "operation" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("img2img_job_duration_seconds", "operation" => kind.as_str())
        .record(duration.as_secs_f64());
}

pub fn record_job_retry(kind: OperationKind) {
    counter!("img2img_job_retries_total", "operation" => kind.as_str()).increment(1);
}

pub fn record_queue_wait(kind: OperationKind, wait: Duration) {
    histogram!("img2img_queue_wait_seconds", "operation" => kind.as_str())
        .record(wait.as_secs_f64());
}

pub fn record_queue_depth(depth: usize) {
    gauge!("img2img_queue_depth").set(depth as f64);
}

pub fn record_job_counts(counts: &StatusCounts) {
    gauge!("img2img_jobs", "status" => "queued").set(counts.queued as f64);
    gauge!("img2img_jobs", "status" => "running").set(counts.running as f64);
    gauge!("img2img_jobs", "status" => "succeeded").set(counts.succeeded as f64);
    gauge!("img2img_jobs", "status" => "failed").set(counts.failed as f64);
    gauge!("img2img_jobs", "status" => "cancelled").set(counts.cancelled as f64);
}

pub fn record_accelerator_memory(allocated_bytes: usize) {
    gauge!("img2img_accelerator_memory_bytes").set(allocated_bytes as f64);
}

pub fn record_pipeline_load(pipeline: &str, took: Duration) {
    counter!("img2img_pipeline_loads_total", "pipeline" => pipeline.to_string()).increment(1);
    histogram!("img2img_pipeline_load_seconds", "pipeline" => pipeline.to_string())
        .record(took.as_secs_f64());
}

pub fn record_pipeline_eviction(pipeline: &str) {
    counter!("img2img_pipeline_evictions_total", "pipeline" => pipeline.to_string()).increment(1);
}
