use chrono::{DateTime, Utc};
use jobfill_core::{
    update, AppState, Effect, LastScoreView, Msg, Outcome, PendingRequest, Phase, PollStatus,
    RequestKind, ScoreSummary, VANISHED_MESSAGE,
};
use pretty_assertions::assert_eq;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("valid timestamp")
}

fn summary(score: f64) -> ScoreSummary {
    ScoreSummary {
        score,
        common_skills: vec!["Rust".into()],
        missing_skills: vec!["Go".into()],
        explanation: None,
    }
}

fn restored_polling(id: &str, started: i64, now: i64) -> (AppState, Vec<Effect>) {
    update(
        AppState::new(),
        Msg::Restored {
            pending: Some(PendingRequest {
                request_id: id.into(),
                kind: RequestKind::Score,
                started_at: at(started),
                jd_url: Some("https://jobs.example.com/7".into()),
            }),
            last_score: None,
            now: at(now),
        },
    )
}

#[test]
fn restored_request_resumes_with_original_start_time() {
    let (state, effects) = restored_polling("r1", 0, 30);

    assert_eq!(
        effects,
        vec![Effect::CheckStatus {
            request_id: "r1".into()
        }]
    );
    let view = state.view();
    assert_eq!(view.phase, Phase::Polling);
    assert_eq!(view.kind, Some(RequestKind::Score));
    assert_eq!(view.elapsed_secs, 30);
    assert_eq!(view.remaining_secs, Some(90));
    assert_eq!(view.progress_percent, 25);
}

#[test]
fn score_is_reconciled_exactly_once() {
    let (state, _) = restored_polling("r1", 0, 5);
    let (mut state, effects) = update(
        state,
        Msg::StatusReceived {
            request_id: "r1".into(),
            status: PollStatus::Score(summary(77.0)),
        },
    );

    assert_eq!(
        effects,
        vec![Effect::PersistLastScore {
            jd_url: "https://jobs.example.com/7".into(),
            score: summary(77.0),
        }]
    );
    assert_eq!(state.outcome(), Some(&Outcome::Score(summary(77.0))));
    assert_eq!(
        state.view().last_score,
        Some(LastScoreView {
            jd_url: "https://jobs.example.com/7".into(),
            score: summary(77.0),
        })
    );
    assert!(state.consume_dirty());

    // Push arriving after the poll already reconciled.
    let (state, effects) = update(
        state,
        Msg::PushReceived {
            request_id: "r1".into(),
        },
    );
    assert!(effects.is_empty());
    let (mut state, effects) = update(
        state,
        Msg::StatusReceived {
            request_id: "r1".into(),
            status: PollStatus::Score(summary(10.0)),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.outcome(), Some(&Outcome::Score(summary(77.0))));
    assert!(!state.consume_dirty());
}

#[test]
fn push_triggers_an_immediate_check() {
    let (state, _) = restored_polling("r1", 0, 5);
    let (state, _) = update(
        state,
        Msg::StatusReceived {
            request_id: "r1".into(),
            status: PollStatus::Processing,
        },
    );

    let (state, effects) = update(
        state,
        Msg::PushReceived {
            request_id: "r1".into(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::CheckStatus {
            request_id: "r1".into()
        }]
    );

    // A push for some other request is not ours to reconcile.
    let (_, effects) = update(
        state,
        Msg::PushReceived {
            request_id: "other".into(),
        },
    );
    assert!(effects.is_empty());
}

#[test]
fn vanished_record_is_a_failure() {
    let (state, _) = restored_polling("r1", 0, 5);
    let (state, effects) = update(
        state,
        Msg::StatusReceived {
            request_id: "r1".into(),
            status: PollStatus::NotFound,
        },
    );
    assert!(effects.is_empty());
    assert_eq!(
        state.outcome(),
        Some(&Outcome::Failed(VANISHED_MESSAGE.into()))
    );
    assert_eq!(state.view().last_error.as_deref(), Some(VANISHED_MESSAGE));
}

#[test]
fn backend_error_message_is_surfaced_verbatim() {
    let (state, _) = restored_polling("r1", 0, 5);
    let (state, _) = update(
        state,
        Msg::StatusReceived {
            request_id: "r1".into(),
            status: PollStatus::Failed("http status 502: 502 Bad Gateway".into()),
        },
    );
    assert_eq!(
        state.view().last_error.as_deref(),
        Some("http status 502: 502 Bad Gateway")
    );
}
