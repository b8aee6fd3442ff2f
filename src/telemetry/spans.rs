//! Span helpers for generation jobs.

use tracing::{info_span, Span};

use crate::jobs::{JobId, OperationKind};

/// Extension trait for adding context to spans.
pub trait SpanExt {
    /// Record the result of an operation into the span.
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display;
}

impl SpanExt for Span {
    fn record_result<T, E>(&self, result: &Result<T, E>)
    where
        E: std::fmt::Display,
    {
        match result {
            Ok(_) => {
                self.record("status", "ok");
            }
            Err(e) => {
                self.record("status", "error");
                self.record("error.message", e.to_string().as_str());
            }
        }
    }
}

/// Factory for per-job spans.
pub struct JobSpan;

impl JobSpan {
    /// `status`, `error.message`, `attempt` and `duration_ms` are filled in
    /// as the job runs.
    pub fn new(job_id: &JobId, kind: OperationKind, worker: usize) -> Span {
        info_span!(
            "generation_job",
            job_id = %job_id,
            operation = kind.as_str(),
            worker,
            attempt = tracing::field::Empty,
            status = tracing::field::Empty,
            error.message = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        )
    }
}
