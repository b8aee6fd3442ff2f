//! Health reporting from a live runtime.

mod common;

use std::time::Duration;

use common::{png_bytes, start, start_with, wait_status, wait_terminal, BackendMode};
use img2img_core::health::HealthState;
use img2img_core::jobs::{JobInput, JobParams, JobStatus};
use img2img_core::memory::GIB;
use img2img_core::scheduler::Priority;
use img2img_core::shutdown::ShutdownState;
use uuid::Uuid;

async fn empty_room(h: &common::Harness) -> JobInput {
    let request_id = Uuid::new_v4();
    let image_path = h.runtime.images.input_path(&request_id);
    tokio::fs::write(&image_path, png_bytes(256, 256)).await.unwrap();
    JobInput {
        request_id,
        image_path,
        params: JobParams::EmptyRedesign {
            style: "modern".into(),
            room_type: "bedroom".into(),
            furniture: vec![],
            color_palette: None,
        },
    }
}

#[tokio::test]
async fn test_fresh_runtime_is_healthy_and_ready() {
    let h = start(BackendMode::Succeed).await;
    let inputs = h.runtime.health_inputs().await;

    assert!(h.runtime.health.is_alive());
    assert!(h.runtime.health.is_ready(&inputs));
    let report = h.runtime.health.report(&inputs);
    assert_eq!(report.state, HealthState::Healthy);
    assert!(report.accepting_requests);
    assert_eq!(report.pipelines_loaded, 0);
    assert_eq!(report.memory_used_bytes, 0);
    assert_eq!(report.memory_capacity_bytes, 40 * GIB);
}

#[tokio::test]
async fn test_report_reflects_loaded_pipelines() {
    let h = start(BackendMode::Succeed).await;
    let input = empty_room(&h).await;
    let record = h.runtime.scheduler.submit(input, Priority::Normal).await.unwrap();
    wait_terminal(&h.runtime.store, &record.id).await;

    let report = h.runtime.health.report(&h.runtime.health_inputs().await);
    assert_eq!(report.pipelines_loaded, 1);
    assert_eq!(report.memory_used_bytes, 16 * GIB);
    assert_eq!(report.jobs_running, 0);
}

#[tokio::test]
async fn test_full_queue_is_degraded_and_not_ready() {
    let h = start_with(BackendMode::Sleep(Duration::from_secs(2)), |c| c.queue.max_pending = 1).await;
    let running = h.runtime.scheduler.submit(empty_room(&h).await, Priority::Normal).await.unwrap();
    wait_status(&h.runtime.store, &running.id, JobStatus::Running).await;
    h.runtime.scheduler.submit(empty_room(&h).await, Priority::Normal).await.unwrap();

    let inputs = h.runtime.health_inputs().await;
    assert_eq!(inputs.queue_depth, 1);
    assert!(!h.runtime.health.is_ready(&inputs));
    let report = h.runtime.health.report(&inputs);
    assert_eq!(report.state, HealthState::Degraded);
    assert_eq!(report.jobs_running, 1);
}

#[tokio::test]
async fn test_unhealthy_after_shutdown() {
    let h = start(BackendMode::Succeed).await;
    h.runtime.shutdown().await;

    let inputs = h.runtime.health_inputs().await;
    assert_eq!(inputs.shutdown_state, ShutdownState::Stopped);
    assert!(!h.runtime.health.is_ready(&inputs));
    assert_eq!(h.runtime.health.report(&inputs).state, HealthState::Unhealthy);
}
