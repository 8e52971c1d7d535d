use chrono::{DateTime, Utc};

use crate::{LastScoreView, PendingRequest, ScoreSummary};

/// Result of one status check, as seen by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    NotFound,
    Processing,
    Score(ScoreSummary),
    /// Answers were generated; only their count matters here.
    Answers(usize),
    Failed(String),
}

impl PollStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollStatus::Processing)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Activation: whatever storage held when the controller opened.
    Restored {
        pending: Option<PendingRequest>,
        last_score: Option<LastScoreView>,
        now: DateTime<Utc>,
    },
    /// User asked for a score against a job description URL.
    ScoreRequested { jd_url: String },
    /// Background accepted the request and persisted its record.
    RequestStarted {
        request_id: String,
        started_at: DateTime<Utc>,
        jd_url: String,
    },
    /// Background refused to start the request.
    RequestRejected { message: String },
    /// Timer tick; drives polling and the local timeout.
    Tick { now: DateTime<Utc> },
    /// Reply to a status check.
    StatusReceived {
        request_id: String,
        status: PollStatus,
    },
    /// Status check could not be delivered; polling continues.
    StatusCheckFailed { request_id: String, message: String },
    /// Push notice that a request settled.
    PushReceived { request_id: String },
    CancelClicked,
    NoOp,
}
