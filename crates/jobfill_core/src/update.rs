use chrono::{DateTime, Utc};
use url::Url;

use crate::{AppState, Effect, LastScoreView, Msg, Outcome, Phase, PollStatus, RequestKind};

pub const VANISHED_MESSAGE: &str = "request no longer exists";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::Restored {
            pending,
            last_score,
            now,
        } => {
            state.set_now(now);
            state.set_last_score(last_score);
            state.mark_dirty();
            match pending {
                Some(pending) if state.phase() == Phase::Idle => {
                    state.begin_polling(
                        pending.request_id,
                        pending.kind,
                        pending.started_at,
                        pending.jd_url,
                    );
                    poll_if_due(&mut state, now)
                }
                _ => Vec::new(),
            }
        }
        Msg::ScoreRequested { jd_url } => {
            if matches!(state.phase(), Phase::Starting | Phase::Polling) {
                return (state, Vec::new());
            }
            let jd_url = jd_url.trim();
            state.mark_dirty();
            match Url::parse(jd_url) {
                Ok(_) => {
                    state.begin_start();
                    vec![Effect::StartScore {
                        jd_url: jd_url.to_string(),
                    }]
                }
                Err(err) => {
                    state.record_error(format!("invalid job url '{jd_url}': {err}"));
                    Vec::new()
                }
            }
        }
        Msg::RequestStarted {
            request_id,
            started_at,
            jd_url,
        } => {
            if state.phase() != Phase::Starting {
                // Nobody is waiting for this request any more.
                return (state, vec![Effect::CancelRequest { request_id }]);
            }
            state.begin_polling(request_id, RequestKind::Score, started_at, Some(jd_url));
            state.mark_dirty();
            Vec::new()
        }
        Msg::RequestRejected { message } => {
            if state.phase() == Phase::Starting {
                state.finish(Outcome::Failed(message));
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::Tick { now } => tick(&mut state, now),
        Msg::StatusReceived { request_id, status } => {
            if !state.is_active(&request_id) {
                return (state, Vec::new());
            }
            if let Some(active) = state.active_mut() {
                active.check_in_flight = false;
            }
            reconcile(&mut state, status)
        }
        Msg::StatusCheckFailed {
            request_id,
            message,
        } => {
            if state.is_active(&request_id) {
                if let Some(active) = state.active_mut() {
                    active.check_in_flight = false;
                }
                state.record_error(message);
                state.mark_dirty();
            }
            Vec::new()
        }
        Msg::PushReceived { request_id } => {
            if !state.is_active(&request_id) {
                return (state, Vec::new());
            }
            match state.active_mut() {
                Some(active) if !active.check_in_flight => {
                    active.check_in_flight = true;
                    vec![Effect::CheckStatus { request_id }]
                }
                _ => Vec::new(),
            }
        }
        Msg::CancelClicked => match state.phase() {
            Phase::Polling => {
                let cancelled = state.finish(Outcome::Cancelled);
                state.mark_dirty();
                cancelled
                    .map(|active| {
                        vec![Effect::CancelRequest {
                            request_id: active.request_id,
                        }]
                    })
                    .unwrap_or_default()
            }
            Phase::Starting => {
                state.finish(Outcome::Cancelled);
                state.mark_dirty();
                Vec::new()
            }
            Phase::Idle | Phase::Finished => Vec::new(),
        },
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn tick(state: &mut AppState, now: DateTime<Utc>) -> Vec<Effect> {
    state.set_now(now);
    if state.phase() != Phase::Polling {
        return Vec::new();
    }
    state.mark_dirty();

    let timeout = state.settings().timeout;
    if state.elapsed().is_some_and(|elapsed| elapsed >= timeout) {
        return state
            .finish(Outcome::TimedOut)
            .map(|active| {
                vec![Effect::DiscardRequest {
                    request_id: active.request_id,
                }]
            })
            .unwrap_or_default();
    }
    poll_if_due(state, now)
}

fn poll_if_due(state: &mut AppState, now: DateTime<Utc>) -> Vec<Effect> {
    let interval = state.settings().poll_interval;
    let Some(active) = state.active_mut() else {
        return Vec::new();
    };
    if active.check_in_flight {
        return Vec::new();
    }
    let due = match active.last_check {
        None => true,
        Some(last) => (now - last).to_std().is_ok_and(|since| since >= interval),
    };
    if !due {
        return Vec::new();
    }
    active.last_check = Some(now);
    active.check_in_flight = true;
    vec![Effect::CheckStatus {
        request_id: active.request_id.clone(),
    }]
}

/// Applies a status reply for the active request. Terminal replies end polling,
/// so a second terminal reply for the same id is never reconciled.
fn reconcile(state: &mut AppState, status: PollStatus) -> Vec<Effect> {
    let outcome = match status {
        PollStatus::Processing => return Vec::new(),
        PollStatus::NotFound => Outcome::Failed(VANISHED_MESSAGE.to_string()),
        PollStatus::Failed(message) => Outcome::Failed(message),
        PollStatus::Answers(count) => Outcome::Answers(count),
        PollStatus::Score(summary) => Outcome::Score(summary),
    };
    state.mark_dirty();
    let finished = state.finish(outcome.clone());

    match outcome {
        Outcome::Score(score) => {
            let jd_url = finished
                .and_then(|active| active.jd_url)
                .unwrap_or_default();
            state.set_last_score(Some(LastScoreView {
                jd_url: jd_url.clone(),
                score: score.clone(),
            }));
            vec![Effect::PersistLastScore { jd_url, score }]
        }
        _ => Vec::new(),
    }
}
