use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::RequestData;

/// Opaque id of one backend call. Serialized as a hyphenated UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    ResumeScore,
    GetGist,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::ResumeScore => write!(f, "resume-score"),
            RequestKind::GetGist => write!(f, "get-gist"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "kebab-case")]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    Timeout,
    Network,
    InvalidResponse,
    TooLarge { max_bytes: u64, actual: Option<u64> },
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::InvalidResponse => write!(f, "invalid response"),
            FailureKind::TooLarge { max_bytes, actual } => {
                write!(f, "response too large (max {max_bytes}, actual {actual:?})")
            }
        }
    }
}

/// Why a request ended in `Error`. The message is shown to the user as is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RequestFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(
            FailureKind::Timeout,
            format!("request timed out after {}s", after.as_secs()),
        )
    }
}

impl fmt::Display for RequestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Payload-derived facts kept next to the record for display and reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jd_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum RequestStatus {
    Processing,
    Complete {
        data: RequestData,
        completed_at: DateTime<Utc>,
    },
    Error {
        error: RequestFailure,
        completed_at: DateTime<Utc>,
    },
}

impl RequestStatus {
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Processing => "processing",
            RequestStatus::Complete { .. } => "complete",
            RequestStatus::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestStatus::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("request {request_id} is already {status}")]
    AlreadyTerminal {
        request_id: RequestId,
        status: &'static str,
    },
}

/// Durable lifecycle of one backend call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub context: RequestContext,
    #[serde(flatten)]
    pub status: RequestStatus,
}

impl RequestRecord {
    pub fn processing(kind: RequestKind, context: RequestContext, started_at: DateTime<Utc>) -> Self {
        Self {
            request_id: RequestId::new(),
            kind,
            started_at,
            context,
            status: RequestStatus::Processing,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn complete(self, data: RequestData, at: DateTime<Utc>) -> Result<Self, TransitionError> {
        self.finish(RequestStatus::Complete {
            data,
            completed_at: at,
        })
    }

    pub fn fail(self, error: RequestFailure, at: DateTime<Utc>) -> Result<Self, TransitionError> {
        self.finish(RequestStatus::Error {
            error,
            completed_at: at,
        })
    }

    fn finish(mut self, next: RequestStatus) -> Result<Self, TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                request_id: self.request_id,
                status: self.status.label(),
            });
        }
        self.status = next;
        Ok(self)
    }
}
