//! Response bodies.

use serde::{Deserialize, Serialize};

use crate::jobs::{JobRecord, JobStatus};
use crate::models::PipelineStatus;

/// Returned by every submission endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageResponse {
    pub message: String,
    pub output_url: String,
    pub task_id: String,
    /// Seconds spent handling the submission.
    pub processing_time: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusResponse {
    pub task_id: String,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<f64>,
}

impl From<JobRecord> for TaskStatusResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            task_id: record.id.to_string(),
            status: record.status,
            output_url: record.output_url,
            error: record.error,
            created_at: record.created_at,
            completed_at: record.completed_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub model_id: String,
    pub memory_bytes: usize,
    pub loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<PipelineStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub pipelines: Vec<ModelInfo>,
    pub memory_used_bytes: usize,
    pub memory_capacity_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{JobId, OperationKind};
    use uuid::Uuid;

    #[test]
    fn queued_status_omits_absent_fields() {
        let record = JobRecord::new(JobId::new(), Uuid::new_v4(), OperationKind::Inpainting);
        let json = serde_json::to_value(TaskStatusResponse::from(record)).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj["status"], "queued");
        assert!(!obj.contains_key("output_url"));
        assert!(!obj.contains_key("error"));
        assert!(!obj.contains_key("completed_at"));
        assert!(obj.contains_key("created_at"));
    }
}
