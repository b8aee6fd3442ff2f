//! HTTP gateway tests driven through the router without a socket.

mod common;

use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use common::{png_bytes, start, BackendMode, Harness};
use img2img_core::api::{self, AppState, ValidationRules, INTERNAL_ERROR_MESSAGE};

const BOUNDARY: &str = "img2img-test-boundary";
const BASE_URL: &str = "http://testserver";

enum Part<'a> {
    Text(&'a str, &'a str),
    File(&'a str, &'a str, Vec<u8>),
    /// Raw bytes sent without a file name.
    Bytes(&'a str, Vec<u8>),
}

fn multipart(parts: Vec<Part<'_>>) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match part {
            Part::Text(name, value) => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
                );
            }
            Part::Bytes(name, bytes) => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
                body.extend_from_slice(&bytes);
                body.extend_from_slice(b"\r\n");
            }
            Part::File(name, file_name, bytes) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: image/png\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(&bytes);
                body.extend_from_slice(b"\r\n");
            }
        }
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn app(h: &Harness) -> Router {
    let state = AppState::new(h.runtime.clone(), ValidationRules::default(), BASE_URL);
    api::router(state, "/api/v1")
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, body)
}

async fn post_form(app: &Router, path: &str, parts: Vec<Part<'_>>) -> (StatusCode, Value) {
    let request = Request::post(path)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(multipart(parts)))
        .unwrap();
    send(app, request).await
}

async fn get(app: &Router, path: &str) -> (StatusCode, Value) {
    send(app, Request::get(path).body(Body::empty()).unwrap()).await
}

async fn wait_for_status(app: &Router, task_id: &str, wanted: &str) -> Value {
    for _ in 0..300 {
        let (status, body) = get(app, &format!("/api/v1/tasks/{task_id}")).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == wanted {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("task {task_id} never reached {wanted}");
}

#[tokio::test]
async fn populated_redesign_is_accepted_and_completes() {
    let h = start(BackendMode::Succeed).await;
    let app = app(&h);

    let (status, body) = post_form(
        &app,
        "/api/v1/redesign/populated",
        vec![
            Part::File("file", "room.png", png_bytes(512, 384)),
            Part::Text("style", "Scandinavian"),
            Part::Text("room_type", "living room"),
            Part::Text("color_palette", "white and light oak"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Room redesign processing started");
    let task_id = body["task_id"].as_str().unwrap().to_string();
    let output_url = body["output_url"].as_str().unwrap().to_string();
    assert!(output_url.starts_with("http://testserver/data/outputs/"));
    assert!(output_url.ends_with("_output.png"));
    assert!(body["processing_time"].as_f64().unwrap() >= 0.0);

    let done = wait_for_status(&app, &task_id, "succeeded").await;
    assert_eq!(done["output_url"], output_url.as_str());
    assert!(done["completed_at"].as_f64().is_some());

    // The finished image is served from the data directory.
    let path = output_url.trim_start_matches(BASE_URL);
    let response = app
        .clone()
        .oneshot(Request::get(path).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_redesign_accepts_furniture_list() {
    let h = start(BackendMode::Succeed).await;
    let app = app(&h);

    let (status, body) = post_form(
        &app,
        "/api/v1/redesign/empty",
        vec![
            Part::File("file", "empty.png", png_bytes(300, 300)),
            Part::Text("style", "industrial"),
            Part::Text("room_type", "office"),
            Part::Text("furniture", "desk, chair"),
            Part::Text("furniture", "bookshelf"),
            Part::Text("priority", "high"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let task_id = body["task_id"].as_str().unwrap();
    wait_for_status(&app, task_id, "succeeded").await;
}

#[tokio::test]
async fn invalid_style_is_rejected() {
    let h = start(BackendMode::Succeed).await;
    let (status, body) = post_form(
        &app(&h),
        "/api/v1/redesign/populated",
        vec![
            Part::File("file", "room.png", png_bytes(512, 512)),
            Part::Text("style", "vaporwave"),
            Part::Text("room_type", "bedroom"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().starts_with("Invalid style. Allowed styles are:"));
    assert!(h.runtime.store.is_empty());
}

#[tokio::test]
async fn missing_fields_are_unprocessable() {
    let h = start(BackendMode::Succeed).await;
    let (status, body) = post_form(
        &app(&h),
        "/api/v1/redesign/populated",
        vec![Part::Text("style", "modern")],
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let detail: Vec<&str> = body["detail"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(detail, vec!["file: field required", "room_type: field required"]);
}

fn details(body: &Value) -> Vec<&str> {
    body["detail"].as_array().unwrap().iter().filter_map(Value::as_str).collect()
}

#[tokio::test]
async fn file_without_file_name_is_unprocessable() {
    let h = start(BackendMode::Succeed).await;
    let (status, body) = post_form(
        &app(&h),
        "/api/v1/redesign/populated",
        vec![
            Part::Bytes("file", png_bytes(512, 384)),
            Part::Text("style", "modern"),
            Part::Text("room_type", "bedroom"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(details(&body), vec!["file: expected an uploaded file"]);
}

#[tokio::test]
async fn non_multipart_body_lists_missing_fields() {
    let h = start(BackendMode::Succeed).await;
    let request = Request::post("/api/v1/inpainting")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&app(&h), request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(
        details(&body),
        vec!["file: field required", "mask: field required", "prompt: field required"]
    );
}

#[tokio::test]
async fn tiny_image_is_rejected() {
    let h = start(BackendMode::Succeed).await;
    let (status, body) = post_form(
        &app(&h),
        "/api/v1/redesign/populated",
        vec![
            Part::File("file", "thumb.png", png_bytes(64, 64)),
            Part::Text("style", "modern"),
            Part::Text("room_type", "bedroom"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Image dimensions too small. Minimum size is 256x256 pixels.");
}

#[tokio::test]
async fn inpainting_mask_must_match_image() {
    let h = start(BackendMode::Succeed).await;
    let (status, body) = post_form(
        &app(&h),
        "/api/v1/inpainting",
        vec![
            Part::File("file", "room.png", png_bytes(512, 512)),
            Part::File("mask", "mask.png", png_bytes(256, 256)),
            Part::Text("prompt", "a potted fern"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].as_str().unwrap().contains("do not match"));
}

#[tokio::test]
async fn inpainting_is_accepted() {
    let h = start(BackendMode::Succeed).await;
    let app = app(&h);
    let (status, body) = post_form(
        &app,
        "/api/v1/inpainting",
        vec![
            Part::File("file", "room.png", png_bytes(512, 512)),
            Part::File("mask", "mask.png", png_bytes(512, 512)),
            Part::Text("prompt", "a potted fern"),
            Part::Text("strength", "0.5"),
        ],
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["message"], "Inpainting processing started");
    wait_for_status(&app, body["task_id"].as_str().unwrap(), "succeeded").await;
    assert_eq!(h.backend.requests.lock()[0].strength, Some(0.5));
}

#[tokio::test]
async fn out_of_range_strength_is_rejected() {
    let h = start(BackendMode::Succeed).await;
    let (status, _) = post_form(
        &app(&h),
        "/api/v1/inpainting",
        vec![
            Part::File("file", "room.png", png_bytes(512, 512)),
            Part::File("mask", "mask.png", png_bytes(512, 512)),
            Part::Text("prompt", "a potted fern"),
            Part::Text("strength", "1.5"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let h = start(BackendMode::Succeed).await;
    let app = app(&h);

    let id = uuid::Uuid::new_v4();
    let (status, body) = get(&app, &format!("/api/v1/tasks/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["detail"], format!("Task with ID {id} not found"));

    let (status, _) = get(&app, "/api/v1/tasks/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn finished_task_cannot_be_cancelled() {
    let h = start(BackendMode::Succeed).await;
    let app = app(&h);
    let (_, body) = post_form(
        &app,
        "/api/v1/redesign/empty",
        vec![
            Part::File("file", "empty.png", png_bytes(300, 300)),
            Part::Text("style", "modern"),
            Part::Text("room_type", "bedroom"),
        ],
    )
    .await;
    let task_id = body["task_id"].as_str().unwrap().to_string();
    wait_for_status(&app, &task_id, "succeeded").await;

    let request = Request::delete(format!("/api/v1/tasks/{task_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["detail"], format!("Task with ID {task_id} is already succeeded"));
}

#[tokio::test]
async fn running_task_can_be_cancelled() {
    let h = start(BackendMode::Sleep(Duration::from_secs(5))).await;
    let app = app(&h);
    let (_, body) = post_form(
        &app,
        "/api/v1/redesign/empty",
        vec![
            Part::File("file", "empty.png", png_bytes(300, 300)),
            Part::Text("style", "modern"),
            Part::Text("room_type", "bedroom"),
        ],
    )
    .await;
    let task_id = body["task_id"].as_str().unwrap().to_string();
    wait_for_status(&app, &task_id, "running").await;

    let request = Request::delete(format!("/api/v1/tasks/{task_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn submissions_rejected_after_shutdown() {
    let h = start(BackendMode::Succeed).await;
    let app = app(&h);
    h.runtime.shutdown().await;

    let (status, body) = post_form(
        &app,
        "/api/v1/redesign/empty",
        vec![
            Part::File("file", "empty.png", png_bytes(300, 300)),
            Part::Text("style", "modern"),
            Part::Text("room_type", "bedroom"),
        ],
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "The service is shutting down.");
    assert_ne!(body["detail"], INTERNAL_ERROR_MESSAGE);

    // The rejected upload is not left behind.
    let mut inputs = tokio::fs::read_dir(h.runtime.images.inputs_dir()).await.unwrap();
    assert!(inputs.next_entry().await.unwrap().is_none());

    let (status, report) = get(&app, "/health/ready").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(report["state"], "unhealthy");
}

#[tokio::test]
async fn health_endpoints() {
    let h = start(BackendMode::Succeed).await;
    let app = app(&h);

    let (status, body) = get(&app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "status": "healthy" }));

    let (status, body) = get(&app, "/health/live").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".into()));

    let (status, body) = get(&app, "/health/ready").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);
}

#[tokio::test]
async fn models_lists_catalog() {
    let h = start(BackendMode::Succeed).await;
    let (status, body) = get(&app(&h), "/api/v1/models").await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["pipelines"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["name"].as_str())
        .collect();
    assert_eq!(names, vec!["florence-2", "flux-canny", "flux-fill"]);
    assert!(body["pipelines"][0]["loaded"] == false);
}
