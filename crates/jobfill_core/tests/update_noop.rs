use chrono::DateTime;
use jobfill_core::{update, AppState, Msg, Phase};

#[test]
fn idle_controller_ignores_noise() {
    let state = AppState::new();
    let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    for msg in [
        Msg::NoOp,
        Msg::Tick { now },
        Msg::CancelClicked,
        Msg::PushReceived {
            request_id: "stray".into(),
        },
    ] {
        let (mut next, effects) = update(state.clone(), msg);
        assert!(effects.is_empty());
        assert_eq!(next.phase(), Phase::Idle);
        assert!(!next.consume_dirty());
    }
}
