use crate::ScoreSummary;

/// Side effects requested by [`crate::update`]; the runner performs them.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Ask the background context to start a score request.
    StartScore { jd_url: String },
    /// One status check for the active request.
    CheckStatus { request_id: String },
    /// User cancellation: remove the record and stop the call.
    CancelRequest { request_id: String },
    /// Local timeout: drop the record so a late result is discarded.
    DiscardRequest { request_id: String },
    /// Remember a completed score for the next activation.
    PersistLastScore { jd_url: String, score: ScoreSummary },
}
