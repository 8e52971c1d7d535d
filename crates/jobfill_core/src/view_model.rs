use crate::{LastScoreView, Outcome, Phase, RequestKind};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub phase: Phase,
    pub request_id: Option<String>,
    pub kind: Option<RequestKind>,
    pub jd_url: Option<String>,
    pub elapsed_secs: u64,
    /// `None` when no request is being polled.
    pub remaining_secs: Option<u64>,
    pub progress_percent: u8,
    pub outcome: Option<Outcome>,
    pub last_score: Option<LastScoreView>,
    pub last_error: Option<String>,
    pub dirty: bool,
}
