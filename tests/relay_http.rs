mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::Path;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use genmedia_relay::error::{AppError, ErrorKind};
use genmedia_relay::job::SubmissionStatus;
use genmedia_relay::prompt::{GenerationParams, PromptCompiler, PromptInput};
use genmedia_relay::relay::{ChangeAction, JobPoller, JobSubmitter, RelayClient};
use serde_json::{json, Value};

use common::{bind, relay_credential, serve, RELAY_TOKEN};

type Seen = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

fn submit_route(seen: Seen, status: StatusCode, reply: Value) -> Router {
    Router::new().route(
        "/mj/submit/imagine",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let seen = seen.clone();
            let reply = reply.clone();
            async move {
                seen.lock().unwrap().push((headers, body));
                (status, Json(reply))
            }
        }),
    )
}

fn compiled(content: &str) -> genmedia_relay::prompt::CompiledPrompt {
    PromptCompiler::new()
        .compile(&PromptInput {
            content: content.into(),
            params: GenerationParams {
                model: Some("mj-v6".into()),
                ..Default::default()
            },
            mode: "photo".into(),
            ..Default::default()
        })
        .unwrap()
}

fn submitter() -> JobSubmitter {
    JobSubmitter::new(RelayClient::new(), Duration::from_secs(5))
}

#[tokio::test]
async fn submit_authenticates_and_maps_queued() {
    let seen: Seen = Arc::default();
    let (listener, base) = bind();
    serve(
        listener,
        submit_route(seen.clone(), StatusCode::OK, json!({"code": 22, "description": "queued", "result": "job-1"})),
    );

    let submission = submitter()
        .submit(&compiled("a red fox in snow"), &relay_credential(&base))
        .await
        .unwrap();
    assert_eq!(submission.job_id, "job-1");
    assert_eq!(submission.status, SubmissionStatus::Queued);

    let seen = seen.lock().unwrap();
    let (headers, body) = &seen[0];
    assert_eq!(headers["authorization"], format!("Bearer {}", RELAY_TOKEN).as_str());
    assert_eq!(headers["mj-api-secret"], RELAY_TOKEN);
    assert_eq!(body["prompt"], "a red fox in snow --v 6");
}

#[tokio::test]
async fn banned_prompt_is_a_status_not_an_error() {
    let (listener, base) = bind();
    serve(
        listener,
        submit_route(Arc::default(), StatusCode::OK, json!({"code": 24, "result": "abc"})),
    );
    let submission = submitter()
        .submit(&compiled("forbidden"), &relay_credential(&base))
        .await
        .unwrap();
    assert_eq!(submission.status, SubmissionStatus::BannedPrompt);
    assert_eq!(submission.job_id, "abc");
}

#[tokio::test]
async fn missing_result_is_a_protocol_error() {
    let (listener, base) = bind();
    serve(
        listener,
        submit_route(Arc::default(), StatusCode::OK, json!({"code": 1, "description": "ok"})),
    );
    let err = submitter()
        .submit(&compiled("a cat"), &relay_credential(&base))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingJobId { .. }));
    assert_eq!(err.kind(), ErrorKind::Protocol);
}

#[tokio::test]
async fn non_2xx_submission_carries_masked_token_and_body() {
    let (listener, base) = bind();
    serve(
        listener,
        submit_route(Arc::default(), StatusCode::UNAUTHORIZED, json!({"error": "bad secret"})),
    );
    let err = submitter()
        .submit(&compiled("a cat"), &relay_credential(&base))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    let rendered = err.to_string();
    assert!(rendered.contains("sk-r...6789"));
    assert!(rendered.contains("bad secret"));
    assert!(!rendered.contains(RELAY_TOKEN));
    assert!(matches!(err, AppError::Submission { status: 401, .. }));
}

#[tokio::test]
async fn stalled_relay_times_out_as_transport_failure() {
    let (listener, base) = bind();
    let app = Router::new().route(
        "/mj/submit/imagine",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(3)).await;
            Json(json!({"code": 1, "result": "late"}))
        }),
    );
    serve(listener, app);

    let err = JobSubmitter::new(RelayClient::new(), Duration::from_millis(200))
        .submit(&compiled("slow"), &relay_credential(&base))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(!err.to_string().contains(RELAY_TOKEN));
}

#[tokio::test]
async fn poll_normalises_artifacts() {
    let (listener, base) = bind();
    let app = Router::new().route(
        "/mj/task/:id/fetch",
        get(|Path(id): Path<String>| async move {
            Json(json!({
                "id": id,
                "status": "completed",
                "progress": "100%",
                "artifacts": [
                    {"url": "https://cdn.example/1.png", "mimeType": "image/png"},
                    {"url": 17},
                    {"url": "https://cdn.example/2.png"}
                ]
            }))
        }),
    );
    serve(listener, app);

    let result = JobPoller::new(RelayClient::new(), Duration::from_secs(5))
        .poll("job-7", &relay_credential(&base))
        .await
        .unwrap();
    assert_eq!(result.status.as_str(), "completed");
    assert_eq!(result.progress.as_deref(), Some("100%"));
    let urls: Vec<_> = result.artifacts.iter().map(|a| a.source_url.as_str()).collect();
    assert_eq!(urls, vec!["https://cdn.example/1.png", "https://cdn.example/2.png"]);
    assert!(result.artifacts.iter().all(|a| a.job_id == "job-7"));
}

#[tokio::test]
async fn poll_failure_is_a_status_error() {
    let (listener, base) = bind();
    let app = Router::new().route(
        "/mj/task/:id/fetch",
        get(|| async { (StatusCode::NOT_FOUND, "no such task") }),
    );
    serve(listener, app);

    let err = JobPoller::new(RelayClient::new(), Duration::from_secs(5))
        .poll("job-404", &relay_credential(&base))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Status { status: 404, .. }));
    assert_eq!(err.kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn upscale_posts_change_request() {
    let seen: Seen = Arc::default();
    let recorder = seen.clone();
    let (listener, base) = bind();
    let app = Router::new().route(
        "/mj/submit/change",
        post(move |headers: HeaderMap, Json(body): Json<Value>| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push((headers, body));
                Json(json!({"code": 1, "result": 991}))
            }
        }),
    );
    serve(listener, app);

    let submission = submitter()
        .change("job-1", ChangeAction::Upscale, 2, &relay_credential(&base))
        .await
        .unwrap();
    assert_eq!(submission.job_id, "991");
    assert_eq!(submission.status, SubmissionStatus::Submitted);
    let seen = seen.lock().unwrap();
    assert_eq!(&seen[0].1, &json!({"taskId": "job-1", "action": "UPSCALE", "index": 2}));
}
