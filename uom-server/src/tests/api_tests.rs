use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use base64::Engine;
use serde_json::{json, Value};
use tower::ServiceExt;

use super::test_utils::{build_test_state, build_test_state_with_security_response};
use crate::routes::create_api_router;

fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    use std::io::{Cursor, Write};
    let mut buffer = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(Cursor::new(&mut buffer));
        let options: zip::write::FileOptions<()> =
            zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, content) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    buffer
}

#[tokio::test]
async fn sandbox_first_enqueues_an_inline_upload_and_the_job_completes() {
    let state = build_test_state();
    let app = create_api_router().with_state(state.clone());

    let content = b64(b"hello world");
    let request = Request::builder()
        .method("POST")
        .uri("/v1/process/sandbox-first")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "filename": "notes.txt",
                "content_base64": content,
                "user_id": "user-1",
                "org_id": "org-1",
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["outcome"], "enqueued");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let app = create_api_router().with_state(state);
    let request = Request::builder()
        .uri(format!("/v1/jobs/{job_id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["job_id"], job_id);
    assert!(matches!(body["status"].as_str().unwrap(), "completed" | "blocked" | "review_queued"));
}

#[tokio::test]
async fn sandbox_first_short_circuits_a_youtube_url_without_creating_a_job() {
    let state = build_test_state();
    let app = create_api_router().with_state(state.clone());

    let request = Request::builder()
        .method("POST")
        .uri("/v1/process/sandbox-first")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "url": "https://youtu.be/dQw4w9WgXcQ" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["outcome"], "short_circuited");
    assert_eq!(body["target"], "videoagent");

    let stats = state.orchestrator.stats().await;
    assert_eq!(stats.total_jobs, 0);
}

#[tokio::test]
async fn sandbox_first_rejects_a_request_with_neither_url_nor_content() {
    let state = build_test_state();
    let app = create_api_router().with_state(state);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/process/sandbox-first")
        .header("content-type", "application/json")
        .body(Body::from(json!({}).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn get_job_404s_for_an_unknown_id() {
    let state = build_test_state();
    let app = create_api_router().with_state(state);

    let request = Request::builder()
        .uri(format!("/v1/jobs/{}", uuid::Uuid::now_v7()))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn orchestrator_stats_reports_submitted_jobs() {
    let state = build_test_state();
    let app = create_api_router().with_state(state.clone());

    let content = b64(b"payload");
    let request = Request::builder()
        .method("POST")
        .uri("/v1/process/sandbox-first")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "filename": "a.bin", "content_base64": content }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let app = create_api_router().with_state(state);
    let request = Request::builder().uri("/v1/orchestrator/stats").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["total_jobs"], 1);
    assert_eq!(body["max_concurrent_jobs"], 10);
}

#[tokio::test]
async fn sandbox_first_fans_out_a_zip_archive_into_one_job_per_entry() {
    let state = build_test_state();
    let app = create_api_router().with_state(state.clone());

    let bytes = build_zip(&[("a.pdf", b"%PDF-1.7 a"), ("b.pdf", b"%PDF-1.7 b"), ("c.pdf", b"%PDF-1.7 c")]);
    let request = Request::builder()
        .method("POST")
        .uri("/v1/process/sandbox-first")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "filename": "bundle.zip", "content_base64": b64(&bytes) }).to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["outcome"], "fanned_out");
    assert_eq!(body["job_ids"].as_array().unwrap().len(), 3);

    let stats = state.orchestrator.stats().await;
    assert_eq!(stats.total_jobs, 3);
}

/// A security decision of `Escalate` must not terminate the job the way
/// `Block`/`Review` do -- it still runs to completion.
#[tokio::test]
async fn escalated_security_decision_falls_through_to_completion() {
    let state = build_test_state_with_security_response(json!({
        "action": "Escalate",
        "reason": "unusual but not clearly malicious",
        "review_queue": null,
        "expires_at": null,
        "notify_users": [],
    }));
    let app = create_api_router().with_state(state.clone());

    let content = b64(b"hello world");
    let request = Request::builder()
        .method("POST")
        .uri("/v1/process/sandbox-first")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "filename": "notes.txt", "content_base64": content }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let app = create_api_router().with_state(state);
    let request = Request::builder().uri(format!("/v1/jobs/{job_id}")).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn stream_subscribed_after_completion_immediately_replays_the_terminal_event() {
    let state = build_test_state();
    let app = create_api_router().with_state(state.clone());

    let content = b64(b"hello world");
    let request = Request::builder()
        .method("POST")
        .uri("/v1/process/sandbox-first")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "filename": "notes.txt", "content_base64": content }).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let body = body_json(response).await;
    let job_id = body["job_id"].as_str().unwrap().to_string();

    // Give the job time to run to completion before anyone subscribes --
    // the broadcast channel's terminal event is long gone by the time the
    // stream endpoint is hit.
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let app = create_api_router().with_state(state);
    let request = Request::builder().uri(format!("/v1/jobs/{job_id}/stream")).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = body_text(response).await;
    assert!(text.contains("event: complete") || text.contains("event:complete"));
}

#[tokio::test]
async fn stream_404s_for_an_unknown_job() {
    let state = build_test_state();
    let app = create_api_router().with_state(state);

    let request = Request::builder()
        .uri(format!("/v1/jobs/{}/stream", uuid::Uuid::now_v7()))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
