use std::sync::Once;

use chrono::{DateTime, Utc};
use jobfill_core::{update, AppState, Effect, Msg, Outcome, Phase, PollStatus};
use pretty_assertions::assert_eq;

const JD_URL: &str = "https://jobs.example.com/42";

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(jobfill_logging::initialize_for_tests);
}

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("valid timestamp")
}

/// Idle -> Starting -> Polling for request "r1" started at t=0.
fn polling() -> AppState {
    let (state, effects) = update(
        AppState::new(),
        Msg::ScoreRequested {
            jd_url: format!("  {JD_URL} "),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::StartScore {
            jd_url: JD_URL.to_string()
        }]
    );
    assert_eq!(state.phase(), Phase::Starting);

    let (state, effects) = update(
        state,
        Msg::RequestStarted {
            request_id: "r1".into(),
            started_at: at(0),
            jd_url: JD_URL.into(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Polling);
    state
}

fn check_r1() -> Vec<Effect> {
    vec![Effect::CheckStatus {
        request_id: "r1".into(),
    }]
}

#[test]
fn invalid_job_url_is_rejected_locally() {
    init_logging();
    let (mut state, effects) = update(
        AppState::new(),
        Msg::ScoreRequested {
            jd_url: "not a url".into(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Idle);
    assert!(state.view().last_error.unwrap().contains("invalid job url"));
    assert!(state.consume_dirty());
}

#[test]
fn second_request_while_polling_is_ignored() {
    init_logging();
    let (state, effects) = update(
        polling(),
        Msg::ScoreRequested {
            jd_url: JD_URL.into(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.active_request_id(), Some("r1"));
}

#[test]
fn status_is_checked_once_per_interval() {
    init_logging();
    let (state, effects) = update(polling(), Msg::Tick { now: at(0) });
    assert_eq!(effects, check_r1());

    // Check still in flight: no second check.
    let (state, effects) = update(state, Msg::Tick { now: at(3) });
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::StatusReceived {
            request_id: "r1".into(),
            status: PollStatus::Processing,
        },
    );
    assert!(effects.is_empty());

    // Last check was at t=0, so t=1 is too early and t=2 is due.
    let (state, effects) = update(state, Msg::Tick { now: at(1) });
    assert!(effects.is_empty());
    let (state, effects) = update(state, Msg::Tick { now: at(2) });
    assert_eq!(effects, check_r1());

    let view = state.view();
    assert_eq!(view.elapsed_secs, 2);
    assert_eq!(view.remaining_secs, Some(118));
    assert_eq!(view.progress_percent, 1);
}

#[test]
fn local_timeout_discards_the_record() {
    init_logging();
    let (state, _) = update(polling(), Msg::Tick { now: at(0) });
    let (state, _) = update(
        state,
        Msg::StatusReceived {
            request_id: "r1".into(),
            status: PollStatus::Processing,
        },
    );

    let (state, effects) = update(state, Msg::Tick { now: at(119) });
    assert_eq!(effects, check_r1());
    let (mut state, effects) = update(state, Msg::Tick { now: at(121) });

    assert_eq!(
        effects,
        vec![Effect::DiscardRequest {
            request_id: "r1".into()
        }]
    );
    assert_eq!(state.phase(), Phase::Finished);
    assert_eq!(state.outcome(), Some(&Outcome::TimedOut));
    assert_eq!(state.view().progress_percent, 100);
    assert!(state.consume_dirty());

    // The in-flight reply arriving late is ignored.
    let (next, effects) = update(
        state.clone(),
        Msg::StatusReceived {
            request_id: "r1".into(),
            status: PollStatus::Failed("late".into()),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(next, state);
}

#[test]
fn cancel_while_polling_emits_cancel_effect() {
    init_logging();
    let (state, effects) = update(polling(), Msg::CancelClicked);

    assert_eq!(
        effects,
        vec![Effect::CancelRequest {
            request_id: "r1".into()
        }]
    );
    assert_eq!(state.outcome(), Some(&Outcome::Cancelled));
    assert_eq!(state.active_request_id(), None);

    let (_, effects) = update(state, Msg::CancelClicked);
    assert!(effects.is_empty());
}

#[test]
fn request_started_after_cancel_is_cancelled_again() {
    init_logging();
    let (state, _) = update(
        AppState::new(),
        Msg::ScoreRequested {
            jd_url: JD_URL.into(),
        },
    );
    let (state, effects) = update(state, Msg::CancelClicked);
    assert!(effects.is_empty());

    let (state, effects) = update(
        state,
        Msg::RequestStarted {
            request_id: "r9".into(),
            started_at: at(0),
            jd_url: JD_URL.into(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::CancelRequest {
            request_id: "r9".into()
        }]
    );
    assert_eq!(state.phase(), Phase::Finished);
}

#[test]
fn rejected_start_is_a_failure() {
    init_logging();
    let (state, _) = update(
        AppState::new(),
        Msg::ScoreRequested {
            jd_url: JD_URL.into(),
        },
    );
    let (state, effects) = update(
        state,
        Msg::RequestRejected {
            message: "no parsed resume stored".into(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(
        state.outcome(),
        Some(&Outcome::Failed("no parsed resume stored".into()))
    );
}

#[test]
fn failed_status_check_keeps_polling() {
    init_logging();
    let (state, _) = update(polling(), Msg::Tick { now: at(0) });
    let (state, effects) = update(
        state,
        Msg::StatusCheckFailed {
            request_id: "r1".into(),
            message: "background context is not running".into(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.phase(), Phase::Polling);

    let (state, effects) = update(state, Msg::Tick { now: at(2) });
    assert_eq!(effects, check_r1());
    assert!(state.view().last_error.is_some());
}
