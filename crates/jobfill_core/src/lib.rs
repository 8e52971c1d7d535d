//! Jobfill core: the polling controller as a pure state machine, plus its view model.
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use effect::Effect;
pub use msg::{Msg, PollStatus};
pub use state::{
    AppState, Outcome, PendingRequest, Phase, PollSettings, RequestKind, ScoreSummary,
    LastScoreView, DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT,
};
pub use update::{update, VANISHED_MESSAGE};
pub use view_model::AppViewModel;
