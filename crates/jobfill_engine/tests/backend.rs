use std::time::Duration;

use jobfill_engine::{
    Backend, BackendSettings, FailureKind, GistRequest, ParsedResume, RequestData, RequestPayload,
    ReqwestBackend, ScoreRequest,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer) -> ReqwestBackend {
    ReqwestBackend::new(BackendSettings {
        base_url: server.uri(),
        ..BackendSettings::default()
    })
}

fn score_payload() -> RequestPayload {
    RequestPayload::ResumeScore(ScoreRequest {
        parsed_resume: ParsedResume {
            raw_text: "Rust, Tokio, Postgres".into(),
            filename: "jane.pdf".into(),
        },
        jd_url: "https://jobs.example.com/backend".into(),
    })
}

#[tokio::test]
async fn score_request_posts_resume_and_job_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resume-score"))
        .and(body_json(json!({
            "parsed_resume": {"raw_text": "Rust, Tokio, Postgres", "filename": "jane.pdf"},
            "jd_url": "https://jobs.example.com/backend"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "score": 72,
            "common_skills": ["Rust"],
            "missing_skills": ["Kubernetes"],
            "explanation": "Strong systems background."
        })))
        .mount(&server)
        .await;

    let data = backend_for(&server).call(&score_payload()).await.expect("call ok");
    let RequestData::Score(score) = data else {
        panic!("expected a score");
    };
    assert_eq!(score.score, 72.0);
    assert_eq!(score.missing_skills, vec!["Kubernetes"]);
    assert_eq!(score.explanation.as_deref(), Some("Strong systems background."));
}

#[tokio::test]
async fn gist_request_returns_answer_set() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get-gist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "answers": {"Email": "jane@example.com", "Country": "United States of America"}
        })))
        .mount(&server)
        .await;

    let payload = RequestPayload::GetGist(GistRequest {
        resume: "resume".into(),
        jd: "job".into(),
        labels: vec!["Email".into(), "Country".into()],
    });
    let data = backend_for(&server).call(&payload).await.expect("call ok");
    let RequestData::Answers(gist) = data else {
        panic!("expected answers");
    };
    assert_eq!(gist.answers.len(), 2);
    assert_eq!(gist.answers["Email"], "jane@example.com");
}

#[tokio::test]
async fn server_error_becomes_http_status_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resume-score"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let err = backend_for(&server)
        .call(&score_payload())
        .await
        .expect_err("should fail");
    assert_eq!(err.kind, FailureKind::HttpStatus(500));
    assert!(err.message.contains("500"));
}

#[tokio::test]
async fn oversized_response_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resume-score"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(2048)))
        .mount(&server)
        .await;

    let backend = ReqwestBackend::new(BackendSettings {
        base_url: server.uri(),
        max_bytes: 1024,
        ..BackendSettings::default()
    });
    let err = backend.call(&score_payload()).await.expect_err("too large");
    assert!(matches!(err.kind, FailureKind::TooLarge { max_bytes: 1024, .. }));
}

#[tokio::test]
async fn slow_server_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resume-score"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let backend = ReqwestBackend::new(BackendSettings {
        base_url: server.uri(),
        request_timeout: Duration::from_millis(50),
        ..BackendSettings::default()
    });
    let err = backend.call(&score_payload()).await.expect_err("timeout");
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn non_json_body_is_an_invalid_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resume-score"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = backend_for(&server)
        .call(&score_payload())
        .await
        .expect_err("invalid");
    assert_eq!(err.kind, FailureKind::InvalidResponse);
}

#[tokio::test]
async fn malformed_base_url_is_reported() {
    let backend = ReqwestBackend::new(BackendSettings {
        base_url: "not a url".into(),
        ..BackendSettings::default()
    });
    let err = backend.call(&score_payload()).await.expect_err("invalid url");
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}
