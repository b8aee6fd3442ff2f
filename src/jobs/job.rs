//! Generation job types and the job status state machine.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public identifier of a generation job (the `task_id` in the HTTP API).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Which generation operation a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationKind {
    PopulatedRedesign,
    EmptyRedesign,
    Inpainting,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PopulatedRedesign => "populated-redesign",
            Self::EmptyRedesign => "empty-redesign",
            Self::Inpainting => "inpainting",
        }
    }

    pub fn all() -> [OperationKind; 3] {
        [Self::PopulatedRedesign, Self::EmptyRedesign, Self::Inpainting]
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation-specific parameters accepted by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub enum JobParams {
    PopulatedRedesign {
        style: String,
        room_type: String,
        color_palette: Option<String>,
    },
    EmptyRedesign {
        style: String,
        room_type: String,
        furniture: Vec<String>,
        color_palette: Option<String>,
    },
    Inpainting {
        prompt: String,
        strength: f32,
        mask_path: PathBuf,
    },
}

impl JobParams {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::PopulatedRedesign { .. } => OperationKind::PopulatedRedesign,
            Self::EmptyRedesign { .. } => OperationKind::EmptyRedesign,
            Self::Inpainting { .. } => OperationKind::Inpainting,
        }
    }
}

/// Everything a worker needs to execute a job.
#[derive(Debug, Clone)]
pub struct JobInput {
    /// Identifier used for the job's file names.
    pub request_id: Uuid,
    /// Persisted input image.
    pub image_path: PathBuf,
    pub params: JobParams,
}

impl JobInput {
    pub fn kind(&self) -> OperationKind {
        self.params.kind()
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, Queued)
                | (Queued, Cancelled)
                | (Running, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seconds since the Unix epoch with millisecond precision.
pub fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
