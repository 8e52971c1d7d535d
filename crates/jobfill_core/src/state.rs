use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::view_model::AppViewModel;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Waiting for the background context to accept a request.
    Starting,
    Polling,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Score,
    Answers,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreSummary {
    pub score: f64,
    pub common_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub explanation: Option<String>,
}

/// Last persisted score, shown until a new one replaces it.
#[derive(Debug, Clone, PartialEq)]
pub struct LastScoreView {
    pub jd_url: String,
    pub score: ScoreSummary,
}

/// A request record found in storage on activation.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub request_id: String,
    pub kind: RequestKind,
    pub started_at: DateTime<Utc>,
    pub jd_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Score(ScoreSummary),
    Answers(usize),
    Failed(String),
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ActiveRequest {
    pub(crate) request_id: String,
    pub(crate) kind: RequestKind,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) jd_url: Option<String>,
    pub(crate) last_check: Option<DateTime<Utc>>,
    pub(crate) check_in_flight: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    settings: PollSettings,
    phase: Phase,
    active: Option<ActiveRequest>,
    now: Option<DateTime<Utc>>,
    outcome: Option<Outcome>,
    last_score: Option<LastScoreView>,
    last_error: Option<String>,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: PollSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> PollSettings {
        self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn outcome(&self) -> Option<&Outcome> {
        self.outcome.as_ref()
    }

    pub fn active_request_id(&self) -> Option<&str> {
        self.active.as_ref().map(|active| active.request_id.as_str())
    }

    pub fn view(&self) -> AppViewModel {
        let elapsed = self.elapsed();
        let (elapsed_secs, remaining_secs, progress_percent) = match elapsed {
            Some(elapsed) => {
                let timeout = self.settings.timeout;
                let remaining = timeout.saturating_sub(elapsed);
                let percent = if timeout.is_zero() {
                    100
                } else {
                    ((elapsed.as_secs_f64() / timeout.as_secs_f64()) * 100.0).min(100.0) as u8
                };
                (elapsed.as_secs(), Some(remaining.as_secs()), percent)
            }
            None if self.phase == Phase::Finished => (0, None, 100),
            None => (0, None, 0),
        };

        AppViewModel {
            phase: self.phase,
            request_id: self.active_request_id().map(ToOwned::to_owned),
            kind: self.active.as_ref().map(|active| active.kind),
            jd_url: self.active.as_ref().and_then(|active| active.jd_url.clone()),
            elapsed_secs,
            remaining_secs,
            progress_percent,
            outcome: self.outcome.clone(),
            last_score: self.last_score.clone(),
            last_error: self.last_error.clone(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn active_mut(&mut self) -> Option<&mut ActiveRequest> {
        self.active.as_mut()
    }

    pub(crate) fn is_active(&self, request_id: &str) -> bool {
        self.phase == Phase::Polling && self.active_request_id() == Some(request_id)
    }

    pub(crate) fn set_now(&mut self, now: DateTime<Utc>) {
        self.now = Some(now);
    }

    pub(crate) fn set_last_score(&mut self, last: Option<LastScoreView>) {
        self.last_score = last;
    }

    pub(crate) fn begin_start(&mut self) {
        self.phase = Phase::Starting;
        self.active = None;
        self.outcome = None;
        self.last_error = None;
    }

    pub(crate) fn begin_polling(
        &mut self,
        request_id: String,
        kind: RequestKind,
        started_at: DateTime<Utc>,
        jd_url: Option<String>,
    ) {
        self.phase = Phase::Polling;
        self.outcome = None;
        self.last_error = None;
        self.active = Some(ActiveRequest {
            request_id,
            kind,
            started_at,
            jd_url,
            last_check: None,
            check_in_flight: false,
        });
    }

    /// Moves to `Finished` and forgets the active request.
    pub(crate) fn finish(&mut self, outcome: Outcome) -> Option<ActiveRequest> {
        self.phase = Phase::Finished;
        if let Outcome::Failed(message) = &outcome {
            self.last_error = Some(message.clone());
        }
        if matches!(outcome, Outcome::TimedOut) {
            self.last_error = Some("request timed out".to_string());
        }
        self.outcome = Some(outcome);
        self.active.take()
    }

    pub(crate) fn record_error(&mut self, message: String) {
        self.last_error = Some(message);
    }

    /// Time since the active request started, as of the last tick.
    pub(crate) fn elapsed(&self) -> Option<Duration> {
        let active = self.active.as_ref()?;
        let now = self.now?;
        Some((now - active.started_at).to_std().unwrap_or(Duration::ZERO))
    }
}
