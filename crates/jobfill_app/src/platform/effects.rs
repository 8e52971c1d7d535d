use std::sync::Arc;

use jobfill_core::{Effect, Msg, PollStatus, RequestKind as CoreKind, ScoreSummary};
use jobfill_engine::{
    AgentMessage, AgentReply, MessageRouter, RequestData, RequestId, RequestKind, RequestStatus,
    ScoreResult, StateStore, StatusReply,
};
use jobfill_logging::{fill_debug, fill_info, fill_warn};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::persistence;

/// Carries out controller effects and feeds their results back as messages.
pub struct EffectRunner {
    router: Arc<MessageRouter>,
    store: StateStore,
    msg_tx: mpsc::UnboundedSender<Msg>,
    tasks: JoinSet<()>,
}

impl EffectRunner {
    pub fn new(router: Arc<MessageRouter>, store: StateStore, msg_tx: mpsc::UnboundedSender<Msg>) -> Self {
        Self {
            router,
            store,
            msg_tx,
            tasks: JoinSet::new(),
        }
    }

    /// Waits for effects still in flight.
    pub async fn drain(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    pub fn enqueue(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartScore { jd_url } => {
                    fill_info!("StartScore jd_url={}", jd_url);
                    self.spawn_start(jd_url);
                }
                Effect::CheckStatus { request_id } => {
                    fill_debug!("CheckStatus request_id={}", request_id);
                    self.spawn_check(request_id);
                }
                Effect::CancelRequest { request_id } => {
                    fill_info!("CancelRequest request_id={}", request_id);
                    self.spawn_cancel(request_id);
                }
                Effect::DiscardRequest { request_id } => {
                    fill_warn!("request {} gave up locally; discarding it", request_id);
                    self.spawn_cancel(request_id);
                }
                Effect::PersistLastScore { jd_url, score } => {
                    let store = self.store.clone();
                    self.tasks.spawn(async move {
                        if let Err(err) = persistence::persist_last_score(&store, jd_url, &score).await {
                            fill_warn!("could not persist last score: {}", err);
                        }
                    });
                }
            }
        }
    }

    fn spawn_start(&mut self, jd_url: String) {
        let router = self.router.clone();
        let msg_tx = self.msg_tx.clone();
        self.tasks.spawn(async move {
            let reply = router
                .send(AgentMessage::StartScoreRequest {
                    jd_url: jd_url.clone(),
                })
                .await;
            let msg = match reply {
                Ok(AgentReply::RequestStarted {
                    request_id,
                    started_at,
                }) => Msg::RequestStarted {
                    request_id: request_id.to_string(),
                    started_at,
                    jd_url,
                },
                Ok(AgentReply::Failed { message }) => Msg::RequestRejected { message },
                Ok(other) => Msg::RequestRejected {
                    message: format!("unexpected reply to start: {other:?}"),
                },
                Err(err) => Msg::RequestRejected {
                    message: err.to_string(),
                },
            };
            let _ = msg_tx.send(msg);
        });
    }

    fn spawn_check(&mut self, request_id: String) {
        let router = self.router.clone();
        let msg_tx = self.msg_tx.clone();
        self.tasks.spawn(async move {
            let msg = match request_id.parse::<RequestId>() {
                Ok(id) => match router.send(AgentMessage::CheckRequestStatus { request_id: id }).await {
                    Ok(AgentReply::RequestStatus { status, .. }) => Msg::StatusReceived {
                        request_id,
                        status: map_status(status),
                    },
                    Ok(AgentReply::Failed { message }) => Msg::StatusCheckFailed {
                        request_id,
                        message,
                    },
                    Ok(other) => Msg::StatusCheckFailed {
                        request_id,
                        message: format!("unexpected reply to status check: {other:?}"),
                    },
                    Err(err) => Msg::StatusCheckFailed {
                        request_id,
                        message: err.to_string(),
                    },
                },
                Err(err) => Msg::StatusCheckFailed {
                    message: format!("malformed request id '{request_id}': {err}"),
                    request_id,
                },
            };
            let _ = msg_tx.send(msg);
        });
    }

    fn spawn_cancel(&mut self, request_id: String) {
        let Ok(id) = request_id.parse::<RequestId>() else {
            fill_warn!("cannot cancel malformed request id '{}'", request_id);
            return;
        };
        let router = self.router.clone();
        self.tasks.spawn(async move {
            match router.send(AgentMessage::CancelRequest { request_id: id }).await {
                Ok(AgentReply::RequestCancelled { existed, .. }) => {
                    fill_debug!("request {} cancelled (existed: {})", id, existed);
                }
                Ok(other) => fill_warn!("unexpected reply to cancel: {:?}", other),
                Err(err) => fill_warn!("cancel of {} not delivered: {}", id, err),
            }
        });
    }
}

pub fn map_status(status: StatusReply) -> PollStatus {
    match status {
        StatusReply::NotFound => PollStatus::NotFound,
        StatusReply::Processing { .. } => PollStatus::Processing,
        StatusReply::Complete { data, .. } => map_data(data),
        StatusReply::Error { error, .. } => PollStatus::Failed(error.message),
    }
}

/// Status of a stored record, read without going through a status check.
pub fn record_status(status: RequestStatus) -> PollStatus {
    match status {
        RequestStatus::Processing => PollStatus::Processing,
        RequestStatus::Complete { data, .. } => map_data(data),
        RequestStatus::Error { error, .. } => PollStatus::Failed(error.message),
    }
}

fn map_data(data: RequestData) -> PollStatus {
    match data {
        RequestData::Score(score) => PollStatus::Score(score_summary(&score)),
        RequestData::Answers(gist) => PollStatus::Answers(gist.answers.len()),
    }
}

pub fn core_kind(kind: RequestKind) -> CoreKind {
    match kind {
        RequestKind::ResumeScore => CoreKind::Score,
        RequestKind::GetGist => CoreKind::Answers,
    }
}

pub fn score_summary(score: &ScoreResult) -> ScoreSummary {
    ScoreSummary {
        score: score.score,
        common_skills: score.common_skills.clone(),
        missing_skills: score.missing_skills.clone(),
        explanation: score.explanation.clone(),
    }
}

pub fn score_result(summary: &ScoreSummary) -> ScoreResult {
    ScoreResult {
        score: summary.score,
        common_skills: summary.common_skills.clone(),
        missing_skills: summary.missing_skills.clone(),
        explanation: summary.explanation.clone(),
        ..ScoreResult::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobfill_engine::{FailureKind, GistAnswers, RequestFailure};
    use pretty_assertions::assert_eq;

    #[test]
    fn backend_failure_message_reaches_the_controller_verbatim() {
        let status = StatusReply::Error {
            error: RequestFailure::new(FailureKind::HttpStatus(502), "502 Bad Gateway"),
            completed_at: Utc::now(),
        };
        assert_eq!(map_status(status), PollStatus::Failed("502 Bad Gateway".into()));
    }

    #[test]
    fn answers_are_reported_by_count() {
        let status = StatusReply::Complete {
            data: RequestData::Answers(GistAnswers {
                answers: [
                    ("Email".to_string(), "a@b.c".to_string()),
                    ("Phone".to_string(), "555".to_string()),
                ]
                .into(),
            }),
            completed_at: Utc::now(),
        };
        assert_eq!(map_status(status), PollStatus::Answers(2));
        assert_eq!(map_status(StatusReply::NotFound), PollStatus::NotFound);
    }

    #[test]
    fn score_survives_the_summary_conversion() {
        let result = ScoreResult {
            score: 42.5,
            common_skills: vec!["Rust".into()],
            missing_skills: vec!["Go".into()],
            explanation: Some("close".into()),
            ..ScoreResult::default()
        };
        assert_eq!(score_result(&score_summary(&result)), result);
    }
}
