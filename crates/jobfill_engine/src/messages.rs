//! Message contract between the foreground, background and page contexts.
//!
//! Each context drains an `mpsc` queue of [`Envelope`]s. The sender keeps a
//! `oneshot` receiver open until the handler replies, however long the
//! asynchronous work behind the reply takes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::fill::FillReport;
use crate::orchestrator::StatusReply;
use crate::record::RequestId;
use crate::types::{AnswerSet, FieldDescriptor, ResumeFilePayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextTarget {
    Page,
    Background,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentMessage {
    CheckPage,
    StartScoreRequest {
        jd_url: String,
    },
    CheckRequestStatus {
        request_id: RequestId,
    },
    CancelRequest {
        request_id: RequestId,
    },
    RunAutofill {
        answers: AnswerSet,
        #[serde(default)]
        resume_file: Option<ResumeFilePayload>,
        #[serde(default)]
        resume_text: Option<String>,
    },
    GenerateAnswers {
        jd: String,
        labels: Vec<String>,
    },
}

impl AgentMessage {
    pub fn target(&self) -> ContextTarget {
        match self {
            AgentMessage::CheckPage | AgentMessage::RunAutofill { .. } => ContextTarget::Page,
            _ => ContextTarget::Background,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentMessage::CheckPage => "check-page",
            AgentMessage::StartScoreRequest { .. } => "start-score-request",
            AgentMessage::CheckRequestStatus { .. } => "check-request-status",
            AgentMessage::CancelRequest { .. } => "cancel-request",
            AgentMessage::RunAutofill { .. } => "run-autofill",
            AgentMessage::GenerateAnswers { .. } => "generate-answers",
        }
    }
}

/// What the page agent found on the current document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageReport {
    pub supported: bool,
    #[serde(default)]
    pub url: Option<String>,
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentReply {
    PageChecked {
        report: PageReport,
    },
    RequestStarted {
        request_id: RequestId,
        started_at: DateTime<Utc>,
    },
    RequestStatus {
        request_id: RequestId,
        status: StatusReply,
    },
    RequestCancelled {
        request_id: RequestId,
        existed: bool,
    },
    AutofillDone {
        report: FillReport,
    },
    AnswersGenerated {
        answers: AnswerSet,
    },
    Failed {
        message: String,
    },
}

impl AgentReply {
    pub fn failed(message: impl Into<String>) -> Self {
        AgentReply::Failed {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("{0} context is not running")]
    ContextGone(&'static str),
    #[error("{0} context dropped the reply")]
    ReplyDropped(&'static str),
}

#[derive(Debug)]
pub struct Envelope {
    pub message: AgentMessage,
    pub reply: oneshot::Sender<AgentReply>,
}

/// Sending side of one context's queue.
#[derive(Debug, Clone)]
pub struct ContextHandle {
    name: &'static str,
    tx: mpsc::Sender<Envelope>,
}

impl ContextHandle {
    pub fn channel(name: &'static str, capacity: usize) -> (Self, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { name, tx }, rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn request(&self, message: AgentMessage) -> Result<AgentReply, BusError> {
        let (reply, rx) = oneshot::channel();
        jobfill_logging::fill_trace!("-> {} {}", self.name, message.name());
        self.tx
            .send(Envelope { message, reply })
            .await
            .map_err(|_| BusError::ContextGone(self.name))?;
        rx.await.map_err(|_| BusError::ReplyDropped(self.name))
    }
}

/// Routes each message to the context that handles it.
#[derive(Debug, Clone)]
pub struct MessageRouter {
    pub page: Option<ContextHandle>,
    pub background: ContextHandle,
}

impl MessageRouter {
    pub async fn send(&self, message: AgentMessage) -> Result<AgentReply, BusError> {
        match message.target() {
            ContextTarget::Background => self.background.request(message).await,
            ContextTarget::Page => match &self.page {
                Some(page) => page.request(message).await,
                None => Err(BusError::ContextGone("page")),
            },
        }
    }
}
