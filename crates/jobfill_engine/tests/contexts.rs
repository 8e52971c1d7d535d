use std::sync::Arc;

use jobfill_engine::{
    AgentMessage, AgentReply, BackendSettings, BackgroundController, MessageRouter,
    OrchestratorSettings, PageAgent, ParsedResume, RequestOrchestrator, ReqwestBackend,
    StateStore, StatusReply,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FORM: &str = r#"
<form>
  <label for="email">Email</label><input id="email" type="email">
  <label for="country">Country</label>
  <select id="country"><option value="">Select...</option><option>Canada</option><option>USA</option></select>
  <label for="cv">Resume</label><input id="cv" type="file">
</form>
"#;

fn controller(store: StateStore, server: &MockServer) -> BackgroundController {
    let backend = ReqwestBackend::new(BackendSettings {
        base_url: server.uri(),
        ..BackendSettings::default()
    });
    BackgroundController::new(RequestOrchestrator::new(
        store,
        Arc::new(backend),
        OrchestratorSettings::default(),
    ))
}

async fn store_with_resume() -> StateStore {
    let store = StateStore::in_memory();
    store
        .save_parsed_resume(&ParsedResume {
            raw_text: "Jane Doe, Rust engineer".into(),
            filename: "jane.pdf".into(),
        })
        .await
        .unwrap();
    store
}

#[tokio::test(flavor = "multi_thread")]
async fn check_generate_and_fill_across_contexts() {
    jobfill_logging::initialize_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/get-gist"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "answers": {"Email": "jane@example.com", "Country": "United States of America"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = store_with_resume().await;
    let (background, background_thread) = controller(store.clone(), &server).spawn();
    let url = Url::parse("https://boards.greenhouse.io/acme/jobs/7").unwrap();
    let (page, page_thread) = PageAgent::spawn(FORM.to_string(), Some(url));
    let router = MessageRouter {
        page: Some(page),
        background,
    };

    let AgentReply::PageChecked { report } = router.send(AgentMessage::CheckPage).await.unwrap()
    else {
        panic!("expected page report");
    };
    assert!(report.supported);
    let labels: Vec<String> = report
        .fields
        .iter()
        .map(|field| field.inferred_label.to_string())
        .collect();
    assert_eq!(labels, vec!["Email", "Country", "Resume"]);

    let reply = router
        .send(AgentMessage::GenerateAnswers {
            jd: "Backend engineer".into(),
            labels,
        })
        .await
        .unwrap();
    let AgentReply::AnswersGenerated { answers } = reply else {
        panic!("expected answers, got {reply:?}");
    };

    let reply = router
        .send(AgentMessage::RunAutofill {
            answers,
            resume_file: None,
            resume_text: None,
        })
        .await
        .unwrap();
    let AgentReply::AutofillDone { report } = reply else {
        panic!("expected fill report, got {reply:?}");
    };
    assert_eq!(report.filled, vec!["Email", "Country"]);
    assert_eq!(report.picker_opened, 1);

    drop(router);
    let snapshot = page_thread.join().unwrap();
    let values: Vec<Option<String>> = snapshot.into_iter().map(|control| control.value).collect();
    assert_eq!(
        values,
        vec![Some("jane@example.com".to_string()), Some("USA".to_string())]
    );
    background_thread.join().unwrap();
    assert!(store.request_records().await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn score_request_is_polled_to_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resume-score"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"score": 88})))
        .mount(&server)
        .await;

    let store = store_with_resume().await;
    let controller = controller(store.clone(), &server);
    let mut notices = controller.subscribe();

    let reply = controller
        .handle(AgentMessage::StartScoreRequest {
            jd_url: "https://jobs.example.com/42".into(),
        })
        .await;
    let AgentReply::RequestStarted { request_id, .. } = reply else {
        panic!("expected request start, got {reply:?}");
    };
    assert_eq!(notices.recv().await.unwrap().request_id, request_id);

    let first = controller
        .handle(AgentMessage::CheckRequestStatus { request_id })
        .await;
    assert!(matches!(
        first,
        AgentReply::RequestStatus {
            status: StatusReply::Complete { .. },
            ..
        }
    ));
    let second = controller
        .handle(AgentMessage::CheckRequestStatus { request_id })
        .await;
    assert_eq!(
        second,
        AgentReply::RequestStatus {
            request_id,
            status: StatusReply::NotFound
        }
    );
}

#[tokio::test]
async fn score_request_without_resume_is_refused() {
    let server = MockServer::start().await;
    let controller = controller(StateStore::in_memory(), &server);

    let reply = controller
        .handle(AgentMessage::StartScoreRequest {
            jd_url: "https://jobs.example.com/42".into(),
        })
        .await;
    assert!(matches!(reply, AgentReply::Failed { .. }));

    let reply = controller
        .handle(AgentMessage::StartScoreRequest {
            jd_url: "not a url".into(),
        })
        .await;
    let AgentReply::Failed { message } = reply else {
        panic!("expected failure");
    };
    assert!(message.contains("invalid job url"));
}
