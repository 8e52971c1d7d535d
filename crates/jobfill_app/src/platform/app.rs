use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use chrono::Utc;
use jobfill_core::{update, AppState, Msg, Phase, PollSettings};
use jobfill_engine::{
    BackgroundController, ControlSnapshot, MessageRouter, PageAgent, RequestNotice,
    RequestOrchestrator, ReqwestBackend, StateStore,
};
use jobfill_logging::{fill_debug, fill_info};
use tokio::sync::{broadcast, mpsc};
use url::Url;

use super::effects::EffectRunner;
use super::render::Renderer;
use crate::config::AppConfig;

const TICK_INTERVAL: Duration = Duration::from_millis(500);

pub fn build_controller(config: &AppConfig, store: StateStore) -> BackgroundController {
    let backend = ReqwestBackend::new(config.backend_settings());
    BackgroundController::new(RequestOrchestrator::new(
        store,
        Arc::new(backend),
        config.orchestrator_settings(),
    ))
}

/// The running execution contexts and the router that reaches them.
pub struct Contexts {
    pub store: StateStore,
    pub router: Arc<MessageRouter>,
    notices: broadcast::Receiver<RequestNotice>,
    background: thread::JoinHandle<()>,
    page: Option<thread::JoinHandle<Vec<ControlSnapshot>>>,
}

impl Contexts {
    /// Starts the background context and, given a document, the page agent.
    pub fn start(config: &AppConfig, store: StateStore, page: Option<(String, Option<Url>)>) -> Self {
        let controller = build_controller(config, store.clone());
        let notices = controller.subscribe();
        let (background_handle, background) = controller.spawn();
        let (page_handle, page) = match page {
            Some((html, url)) => {
                let (handle, join) = PageAgent::spawn(html, url);
                (Some(handle), Some(join))
            }
            None => (None, None),
        };
        Self {
            store,
            router: Arc::new(MessageRouter {
                page: page_handle,
                background: background_handle,
            }),
            notices,
            background,
            page,
        }
    }

    /// Closes every queue and waits for the contexts to wind down.
    /// Returns the controls the page agent changed, if one was running.
    pub async fn shutdown(self) -> anyhow::Result<Vec<ControlSnapshot>> {
        let Contexts {
            router,
            background,
            page,
            ..
        } = self;
        drop(router);
        tokio::task::spawn_blocking(move || {
            let snapshot = match page {
                Some(page) => page.join().map_err(|_| anyhow!("page agent panicked"))?,
                None => Vec::new(),
            };
            background
                .join()
                .map_err(|_| anyhow!("background context panicked"))?;
            Ok(snapshot)
        })
        .await
        .context("joining contexts")?
    }
}

/// Drives the controller until its request settles.
///
/// `initial` is applied first. If the controller is still idle once it has
/// been consumed there is nothing to wait for and the loop ends.
pub async fn run_controller(
    contexts: &Contexts,
    settings: PollSettings,
    initial: Vec<Msg>,
) -> AppState {
    let (msg_tx, mut msg_rx) = mpsc::unbounded_channel::<Msg>();
    let mut initial_left = initial.len();
    for msg in initial {
        let _ = msg_tx.send(msg);
    }

    let ticker = {
        let msg_tx = msg_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_INTERVAL);
            loop {
                interval.tick().await;
                if msg_tx.send(Msg::Tick { now: Utc::now() }).is_err() {
                    break;
                }
            }
        })
    };

    let forwarder = {
        let msg_tx = msg_tx.clone();
        let mut notices = contexts.notices.resubscribe();
        tokio::spawn(async move {
            loop {
                match notices.recv().await {
                    Ok(notice) => {
                        let request_id = notice.request_id.to_string();
                        if msg_tx.send(Msg::PushReceived { request_id }).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        fill_debug!("missed {} request notices", missed);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    let interrupt = {
        let msg_tx = msg_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                fill_info!("interrupted; cancelling");
                let _ = msg_tx.send(Msg::CancelClicked);
            }
        })
    };

    let mut runner = EffectRunner::new(contexts.router.clone(), contexts.store.clone(), msg_tx);
    let mut renderer = Renderer::default();
    let mut state = AppState::with_settings(settings);

    while let Some(msg) = msg_rx.recv().await {
        let (next, effects) = update(state, msg);
        state = next;
        if state.consume_dirty() {
            renderer.render(&state.view());
        }
        runner.enqueue(effects);

        initial_left = initial_left.saturating_sub(1);
        match state.phase() {
            Phase::Finished => break,
            Phase::Idle if initial_left == 0 => break,
            _ => {}
        }
    }
    renderer.clear();
    runner.drain().await;

    ticker.abort();
    forwarder.abort();
    interrupt.abort();
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobfill_core::Outcome;
    use jobfill_engine::ParsedResume;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings() -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
        }
    }

    async fn contexts_for(server: &MockServer) -> Contexts {
        let store = StateStore::in_memory();
        store
            .save_parsed_resume(&ParsedResume {
                raw_text: "Jane Doe, Rust".into(),
                filename: "jane.txt".into(),
            })
            .await
            .unwrap();
        let config = AppConfig {
            backend_url: server.uri(),
            ..AppConfig::default()
        };
        Contexts::start(&config, store, None)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn score_is_polled_to_an_outcome_and_persisted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resume-score"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "score": 77,
                "common_skills": ["Rust"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let contexts = contexts_for(&server).await;
        let store = contexts.store.clone();
        let state = run_controller(
            &contexts,
            settings(),
            vec![Msg::ScoreRequested {
                jd_url: "https://jobs.example.com/77".into(),
            }],
        )
        .await;
        contexts.shutdown().await.unwrap();

        let Some(Outcome::Score(summary)) = state.outcome() else {
            panic!("expected a score, got {:?}", state.outcome());
        };
        assert_eq!(summary.score, 77.0);
        let last = store.last_score().await.unwrap().unwrap();
        assert_eq!(last.jd_url, "https://jobs.example.com/77");
        assert_eq!(last.score.common_skills, vec!["Rust"]);
        assert!(store.request_records().await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn backend_error_ends_in_failed_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resume-score"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let contexts = contexts_for(&server).await;
        let state = run_controller(
            &contexts,
            settings(),
            vec![Msg::ScoreRequested {
                jd_url: "https://jobs.example.com/1".into(),
            }],
        )
        .await;
        contexts.shutdown().await.unwrap();

        let Some(Outcome::Failed(message)) = state.outcome() else {
            panic!("expected a failure, got {:?}", state.outcome());
        };
        assert!(message.contains("503"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn idle_controller_returns_without_waiting() {
        let server = MockServer::start().await;
        let contexts = contexts_for(&server).await;
        let state = run_controller(
            &contexts,
            settings(),
            vec![Msg::ScoreRequested {
                jd_url: "definitely not a url".into(),
            }],
        )
        .await;
        contexts.shutdown().await.unwrap();

        assert_eq!(state.phase(), Phase::Idle);
        assert!(state.view().last_error.unwrap().contains("invalid job url"));
    }
}
