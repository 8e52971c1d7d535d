use std::thread;

use jobfill_logging::ExecContext;
use tokio::sync::broadcast;
use url::Url;

use crate::backend::{GistRequest, RequestData, RequestPayload, ScoreRequest};
use crate::messages::{AgentMessage, AgentReply, ContextHandle, Envelope};
use crate::orchestrator::{RequestNotice, RequestOrchestrator, StatusReply};
use crate::record::RequestId;
use crate::store::StateStore;

pub const QUEUE_CAPACITY: usize = 16;

/// Message handler of the background context.
#[derive(Clone)]
pub struct BackgroundController {
    orchestrator: RequestOrchestrator,
}

impl BackgroundController {
    pub fn new(orchestrator: RequestOrchestrator) -> Self {
        Self { orchestrator }
    }

    pub fn orchestrator(&self) -> &RequestOrchestrator {
        &self.orchestrator
    }

    fn store(&self) -> &StateStore {
        self.orchestrator.store()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RequestNotice> {
        self.orchestrator.subscribe()
    }

    /// Startup work: a fresh context owns no in-flight calls, so every
    /// persisted request record is stale.
    pub async fn on_start(&self) {
        if let Err(err) = self.orchestrator.sweep().await {
            jobfill_logging::fill_error!("startup sweep failed: {}", err);
        }
    }

    pub async fn handle(&self, message: AgentMessage) -> AgentReply {
        jobfill_logging::fill_debug!("handling {}", message.name());
        match message {
            AgentMessage::StartScoreRequest { jd_url } => self.start_score(jd_url).await,
            AgentMessage::CheckRequestStatus { request_id } => self.check_status(request_id).await,
            AgentMessage::CancelRequest { request_id } => match self.orchestrator.cancel(request_id).await {
                Ok(existed) => AgentReply::RequestCancelled { request_id, existed },
                Err(err) => AgentReply::failed(err.to_string()),
            },
            AgentMessage::GenerateAnswers { jd, labels } => self.generate_answers(jd, labels).await,
            other @ (AgentMessage::CheckPage | AgentMessage::RunAutofill { .. }) => {
                AgentReply::failed(format!("{} is handled by the page agent", other.name()))
            }
        }
    }

    async fn start_score(&self, jd_url: String) -> AgentReply {
        if let Err(err) = Url::parse(jd_url.trim()) {
            return AgentReply::failed(format!("invalid job url '{jd_url}': {err}"));
        }
        let parsed_resume = match self.store().parsed_resume().await {
            Ok(Some(resume)) => resume,
            Ok(None) => return AgentReply::failed("no parsed resume stored; upload a resume first"),
            Err(err) => return AgentReply::failed(err.to_string()),
        };
        let payload = RequestPayload::ResumeScore(ScoreRequest {
            parsed_resume,
            jd_url: jd_url.trim().to_string(),
        });
        match self.orchestrator.submit(payload).await {
            Ok(submitted) => AgentReply::RequestStarted {
                request_id: submitted.request_id,
                started_at: submitted.started_at,
            },
            Err(err) => AgentReply::failed(err.to_string()),
        }
    }

    async fn check_status(&self, request_id: RequestId) -> AgentReply {
        match self.orchestrator.status(request_id).await {
            Ok(status) => AgentReply::RequestStatus { request_id, status },
            Err(err) => AgentReply::failed(err.to_string()),
        }
    }

    async fn generate_answers(&self, jd: String, labels: Vec<String>) -> AgentReply {
        let resume = match self.store().parsed_resume().await {
            Ok(Some(resume)) => resume.raw_text,
            Ok(None) => return AgentReply::failed("no parsed resume stored; upload a resume first"),
            Err(err) => return AgentReply::failed(err.to_string()),
        };
        let payload = RequestPayload::GetGist(GistRequest { resume, jd, labels });
        match self.orchestrator.submit_and_wait(payload).await {
            Ok(StatusReply::Complete {
                data: RequestData::Answers(gist),
                ..
            }) => AgentReply::AnswersGenerated {
                answers: gist.answers,
            },
            Ok(StatusReply::Error { error, .. }) => AgentReply::failed(error.message),
            Ok(other) => AgentReply::failed(format!("unexpected answer state: {other:?}")),
            Err(err) => AgentReply::failed(err.to_string()),
        }
    }

    /// Runs the controller on its own thread and returns the queue feeding it.
    ///
    /// Each envelope is handled on a separate task so a slow backend call
    /// never blocks status checks.
    pub fn spawn(self) -> (ContextHandle, thread::JoinHandle<()>) {
        let (handle, mut rx) = ContextHandle::channel("background", QUEUE_CAPACITY);
        let join = thread::spawn(move || {
            jobfill_logging::set_context(ExecContext::Background);
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    jobfill_logging::fill_error!("background runtime failed to start: {}", err);
                    return;
                }
            };
            runtime.block_on(async move {
                self.on_start().await;
                while let Some(envelope) = rx.recv().await {
                    let controller = self.clone();
                    tokio::spawn(async move {
                        let Envelope { message, reply } = envelope;
                        let answer = controller.handle(message).await;
                        if reply.send(answer).is_err() {
                            jobfill_logging::fill_debug!("sender went away before the reply");
                        }
                    });
                }
                jobfill_logging::fill_debug!("background queue closed");
            });
        });
        (handle, join)
    }
}
