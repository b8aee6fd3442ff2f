//! Health check support.
//!
//! Provides liveness, readiness, and full health report capabilities
//! for load balancers and orchestrators.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::jobs::StatusCounts;
use crate::shutdown::ShutdownState;

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Point-in-time inputs gathered from the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthInputs {
    pub shutdown_state: ShutdownState,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub pipelines_loaded: usize,
    pub memory_used_bytes: usize,
    pub memory_capacity_bytes: usize,
    pub jobs: StatusCounts,
}

/// Detailed health report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub state: HealthState,
    pub ready: bool,
    pub accepting_requests: bool,
    pub pipelines_loaded: usize,
    pub memory_used_bytes: usize,
    pub memory_capacity_bytes: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub jobs_running: usize,
    pub uptime_secs: u64,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Queue fill ratio (0..=1) at which the service reports degraded.
    pub degraded_queue_ratio: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_queue_ratio: 0.9,
        }
    }
}

/// Aggregates health information from runtime components.
pub struct HealthChecker {
    config: HealthConfig,
    start_time: Instant,
}

impl HealthChecker {
    pub fn new(config: HealthConfig) -> Self {
        Self {
            config,
            start_time: Instant::now(),
        }
    }

    /// Check liveness: process is responsive.
    pub fn is_alive(&self) -> bool {
        true
    }

    /// Check readiness: accepting traffic and the queue has room.
    pub fn is_ready(&self, inputs: &HealthInputs) -> bool {
        inputs.shutdown_state == ShutdownState::Running && inputs.queue_depth < inputs.queue_capacity
    }

    pub fn report(&self, inputs: &HealthInputs) -> HealthReport {
        HealthReport {
            state: self.compute_state(inputs),
            ready: self.is_ready(inputs),
            accepting_requests: inputs.shutdown_state == ShutdownState::Running,
            pipelines_loaded: inputs.pipelines_loaded,
            memory_used_bytes: inputs.memory_used_bytes,
            memory_capacity_bytes: inputs.memory_capacity_bytes,
            queue_depth: inputs.queue_depth,
            queue_capacity: inputs.queue_capacity,
            jobs_running: inputs.jobs.running,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    fn compute_state(&self, inputs: &HealthInputs) -> HealthState {
        if inputs.shutdown_state != ShutdownState::Running {
            return HealthState::Unhealthy;
        }
        let capacity = inputs.queue_capacity.max(1) as f64;
        if inputs.queue_depth as f64 / capacity >= self.config.degraded_queue_ratio {
            return HealthState::Degraded;
        }
        HealthState::Healthy
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(HealthConfig::default())
    }
}
