//! HTTP surface tests
//!
//! Exercise the router in-process with `tower::ServiceExt::oneshot`:
//! status-code mapping, `{"error": ...}` bodies, and multipart uploads.

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use intelicad_common::FakeLlmClient;
use intelicadd::config::Config;
use intelicadd::prompts::{ROLE_GENERATION, ROLE_INTENT, ROLE_REASONING};
use intelicadd::server::{router, AppState};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "intelicad-test-boundary";

fn app(dir: &TempDir) -> Router {
    let client = FakeLlmClient::always("{}")
        .with_route(
            ROLE_INTENT,
            r#"{"design_intent": {"primary_goal": "lighter"}, "part_classification": "enclosure"}"#,
        )
        .with_route(ROLE_REASONING, "shell it")
        .with_route(
            ROLE_GENERATION,
            r#"{"operations": [{"type": "shell_body", "params": {"wall_thickness": 2}}]}"#,
        );
    let mut config = Config::default();
    config.storage.dir = dir.path().to_path_buf();
    let state = Arc::new(AppState::from_config(&config, Arc::new(client)));
    router(state, config.server.max_upload_bytes)
}

fn multipart(fields: &[(&str, Option<&str>, &str)]) -> Body {
    let mut body = String::new();
    for (name, file_name, value) in fields {
        body.push_str(&format!("--{}\r\n", BOUNDARY));
        match file_name {
            Some(file_name) => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                name, file_name
            )),
            None => body.push_str(&format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                name
            )),
        }
        body.push_str(value);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    Body::from(body)
}

fn multipart_request(uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(body)
        .unwrap()
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let dir = TempDir::new().unwrap();
    let (status, body) = send(&app(&dir), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["jobs"], 0);
}

#[tokio::test]
async fn test_unknown_job_is_404_with_error_body() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let (status, body) = send(&app, get("/job-status/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("missing"));

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/jobs/missing/claim", json!({"stage": "analysis"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, get("/download/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_without_file_is_400() {
    let dir = TempDir::new().unwrap();
    let body = multipart(&[("text_command", None, "make it lighter")]);
    let (status, body) = send(&app(&dir), multipart_request("/submit-job/", body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("file"));
}

#[tokio::test]
async fn test_malformed_json_body_is_400_with_error_body() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let broken = Request::builder()
        .method(Method::POST)
        .uri("/jobs/any/claim")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"stage\": "))
        .unwrap();
    let (status, body) = send(&app, broken).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/retry-failed/any", json!({"execution_results": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let untyped = Request::builder()
        .method(Method::POST)
        .uri("/jobs/any/analysis")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(&app, untyped).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_full_flow_over_http() {
    let dir = TempDir::new().unwrap();
    let app = app(&dir);

    let body = multipart(&[
        ("text_command", None, "make it lighter"),
        ("file", Some("box.f3d"), "original"),
    ]);
    let (status, submitted) = send(&app, multipart_request("/submit-job/", body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(submitted["phase"], "pending_analysis");
    let id = submitted["job_id"].as_str().unwrap().to_string();

    let (_, poll) = send(&app, get("/poll-jobs/")).await;
    assert!(poll["awaiting_analysis"].get(&id).is_some());

    let claim = json!({"stage": "analysis"});
    let (status, _) = send(&app, json_request(Method::POST, &format!("/jobs/{}/claim", id), claim.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, json_request(Method::POST, &format!("/jobs/{}/claim", id), claim)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let analysis = json!({"current_mass": 150.5, "bounding_box": {"x": 100, "y": 50, "z": 30}});
    let (status, refined) = send(
        &app,
        json_request(Method::POST, &format!("/jobs/{}/analysis", id), analysis.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refined["refined_operations"][0]["type"], "shell_body");

    let (status, _) = send(
        &app,
        json_request(Method::POST, &format!("/jobs/{}/analysis", id), analysis),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, retry) = send(
        &app,
        json_request(
            Method::POST,
            &format!("/retry-failed/{}", id),
            json!({"execution_results": []}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(retry["count"], 0);

    let (status, _) = send(&app, get(&format!("/download/{}", id))).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let body = multipart(&[
        ("file", Some("box_modified.f3d"), "modified"),
        ("summary", None, "1/1 operations"),
    ]);
    let (status, done) = send(&app, multipart_request(&format!("/complete-job/{}", id), body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");

    let response = app
        .clone()
        .oneshot(get(&format!("/download/{}", id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"modified");

    let (_, snapshot) = send(&app, get(&format!("/job-status/{}", id))).await;
    assert_eq!(snapshot["phase"], "completed");
    assert_eq!(snapshot["text_command"], "make it lighter");
}
