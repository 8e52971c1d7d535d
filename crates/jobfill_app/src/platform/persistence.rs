//! Bridges the state directory and the controller's activation message.

use chrono::{DateTime, Utc};
use jobfill_core::{LastScoreView, Msg, PendingRequest, ScoreSummary};
use jobfill_engine::{LastScore, RequestRecord, StateStore, StoreError};
use jobfill_logging::{fill_info, fill_warn};

use super::effects::{core_kind, record_status, score_result, score_summary};

/// Builds the messages that bring a fresh controller up to date with storage.
///
/// The most recent request record becomes the pending request. A record that
/// already settled is consumed here and its outcome queued right behind the
/// activation message.
pub async fn restore(store: &StateStore, now: DateTime<Utc>) -> Result<Vec<Msg>, StoreError> {
    let last_score = last_score_view(store).await?;
    let mut records = store.request_records().await?;
    let Some(record) = records.pop() else {
        return Ok(vec![Msg::Restored {
            pending: None,
            last_score,
            now,
        }]);
    };
    if !records.is_empty() {
        fill_warn!("{} older request record(s) ignored", records.len());
    }

    let request_id = record.request_id.to_string();
    let mut messages = vec![Msg::Restored {
        pending: Some(pending_request(&record)),
        last_score,
        now,
    }];
    if record.is_terminal() {
        if let Some(taken) = store.take_record(record.request_id).await? {
            fill_info!("request {} settled while nobody was watching", request_id);
            messages.push(Msg::StatusReceived {
                request_id,
                status: record_status(taken.status),
            });
        }
    }
    Ok(messages)
}

/// Activation message carrying only the last score, for flows that start their
/// own request.
pub async fn restore_last_score(
    store: &StateStore,
    now: DateTime<Utc>,
) -> Result<Msg, StoreError> {
    Ok(Msg::Restored {
        pending: None,
        last_score: last_score_view(store).await?,
        now,
    })
}

async fn last_score_view(store: &StateStore) -> Result<Option<LastScoreView>, StoreError> {
    Ok(store.last_score().await?.map(|last| LastScoreView {
        jd_url: last.jd_url,
        score: score_summary(&last.score),
    }))
}

pub async fn persist_last_score(
    store: &StateStore,
    jd_url: String,
    score: &ScoreSummary,
) -> Result<(), StoreError> {
    store
        .save_last_score(&LastScore {
            jd_url,
            score: score_result(score),
        })
        .await
}

fn pending_request(record: &RequestRecord) -> PendingRequest {
    PendingRequest {
        request_id: record.request_id.to_string(),
        kind: core_kind(record.kind),
        started_at: record.started_at,
        jd_url: record.context.jd_url.clone(),
    }
}
