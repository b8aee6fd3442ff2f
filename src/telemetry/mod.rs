//! Telemetry: structured logging, job spans and metrics.

mod logging;
mod metrics;
mod spans;

pub use logging::{build_filter, init_logging, LogConfig, LogError, LogFormat};
pub use self::metrics::{
    record_accelerator_memory, record_job_counts, record_job_finished, record_job_rejected,
    record_job_retry, record_job_submitted, record_pipeline_eviction, record_pipeline_load,
    record_queue_depth, record_queue_wait,
};
pub use spans::{JobSpan, SpanExt};
