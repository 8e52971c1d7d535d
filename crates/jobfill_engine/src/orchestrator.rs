//! Owns outbound backend calls and their persisted lifecycle.
//!
//! The store write is the commit point for every state change. Listeners on
//! the notice channel only learn that a request settled; they read the result
//! through [`RequestOrchestrator::status`] like any poller would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{Backend, RequestData, RequestPayload};
use crate::keepalive::{KeepAlive, DEFAULT_KEEPALIVE_INTERVAL};
use crate::record::{RequestFailure, RequestId, RequestKind, RequestRecord, RequestStatus};
use crate::store::{StateStore, StoreError};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub request_timeout: Duration,
    pub keepalive_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            request_timeout: REQUEST_TIMEOUT,
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
        }
    }
}

/// Answer to a status check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum StatusReply {
    NotFound,
    Processing {
        kind: RequestKind,
        started_at: DateTime<Utc>,
    },
    Complete {
        data: RequestData,
        completed_at: DateTime<Utc>,
    },
    Error {
        error: RequestFailure,
        completed_at: DateTime<Utc>,
    },
}

impl StatusReply {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StatusReply::Complete { .. } | StatusReply::Error { .. })
    }

    fn from_terminal(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Complete { data, completed_at } => {
                StatusReply::Complete { data, completed_at }
            }
            RequestStatus::Error { error, completed_at } => {
                StatusReply::Error { error, completed_at }
            }
            RequestStatus::Processing => StatusReply::NotFound,
        }
    }
}

/// Push notice sent after a terminal state was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestNotice {
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub succeeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Submitted {
    pub request_id: RequestId,
    pub started_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RequestOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    store: StateStore,
    backend: Arc<dyn Backend>,
    settings: OrchestratorSettings,
    active: Mutex<HashMap<RequestId, CancellationToken>>,
    notices: broadcast::Sender<RequestNotice>,
}

impl RequestOrchestrator {
    pub fn new(store: StateStore, backend: Arc<dyn Backend>, settings: OrchestratorSettings) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                store,
                backend,
                settings,
                active: Mutex::new(HashMap::new()),
                notices,
            }),
        }
    }

    pub fn store(&self) -> &StateStore {
        &self.inner.store
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RequestNotice> {
        self.inner.notices.subscribe()
    }

    /// Requests currently being executed by this orchestrator.
    pub fn active_count(&self) -> usize {
        self.inner.active.lock().map(|active| active.len()).unwrap_or(0)
    }

    /// Drops every persisted request record. Run once when the owning context starts.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        let removed = self.inner.store.purge_requests().await?;
        if removed > 0 {
            jobfill_logging::fill_info!("swept {} stale request records", removed);
        }
        Ok(removed)
    }

    /// Persists a `Processing` record and starts the call in the background.
    pub async fn submit(&self, payload: RequestPayload) -> Result<Submitted, StoreError> {
        let (submitted, _) = self.start(payload).await?;
        Ok(submitted)
    }

    /// Submits, waits for the call to settle, then consumes the record.
    pub async fn submit_and_wait(&self, payload: RequestPayload) -> Result<StatusReply, StoreError> {
        let (submitted, handle) = self.start(payload).await?;
        if let Err(err) = handle.await {
            jobfill_logging::fill_error!("request {} task failed: {}", submitted.request_id, err);
        }
        self.status(submitted.request_id).await
    }

    async fn start(
        &self,
        payload: RequestPayload,
    ) -> Result<(Submitted, JoinHandle<()>), StoreError> {
        let record = RequestRecord::processing(payload.kind(), payload.context(), Utc::now());
        self.inner.store.insert_record(&record).await?;

        let submitted = Submitted {
            request_id: record.request_id,
            started_at: record.started_at,
        };
        let keepalive = KeepAlive::start(
            self.inner.store.clone(),
            self.inner.settings.keepalive_interval,
        );
        if let Ok(mut active) = self.inner.active.lock() {
            active.insert(record.request_id, keepalive.token());
        }
        jobfill_logging::fill_info!("request {} ({}) started", record.request_id, record.kind);

        let inner = self.inner.clone();
        let handle = tokio::spawn(async move {
            inner.run(record, payload, keepalive).await;
        });
        Ok((submitted, handle))
    }

    /// Reads the state of a request. A terminal record is consumed by the read.
    pub async fn status(&self, id: RequestId) -> Result<StatusReply, StoreError> {
        let Some(record) = self.inner.store.record(id).await? else {
            return Ok(StatusReply::NotFound);
        };
        if !record.is_terminal() {
            return Ok(StatusReply::Processing {
                kind: record.kind,
                started_at: record.started_at,
            });
        }
        match self.inner.store.take_record(id).await? {
            Some(taken) if taken.is_terminal() => {
                jobfill_logging::fill_debug!("request {} consumed ({})", id, taken.status.label());
                Ok(StatusReply::from_terminal(taken.status))
            }
            _ => Ok(StatusReply::NotFound),
        }
    }

    /// Removes the record so any later result is discarded. Returns whether it existed.
    pub async fn cancel(&self, id: RequestId) -> Result<bool, StoreError> {
        let existed = self.inner.store.take_record(id).await?.is_some();
        if let Some(token) = self.inner.release(id) {
            token.cancel();
        }
        jobfill_logging::fill_info!("request {} cancelled (existed: {})", id, existed);
        Ok(existed)
    }
}

impl Inner {
    fn release(&self, id: RequestId) -> Option<CancellationToken> {
        self.active.lock().ok().and_then(|mut active| active.remove(&id))
    }

    async fn run(&self, record: RequestRecord, payload: RequestPayload, keepalive: KeepAlive) {
        let id = record.request_id;
        let kind = record.kind;
        let timeout = self.settings.request_timeout;

        let outcome = tokio::time::timeout(timeout, self.backend.call(&payload)).await;
        let now = Utc::now();
        let finished = match outcome {
            Ok(Ok(data)) => record.complete(data, now),
            Ok(Err(failure)) => record.fail(failure, now),
            Err(_) => record.fail(RequestFailure::timeout(timeout), now),
        };
        keepalive.stop();
        self.release(id);

        let finished = match finished {
            Ok(finished) => finished,
            Err(err) => {
                jobfill_logging::fill_error!("{}", err);
                return;
            }
        };
        let succeeded = matches!(finished.status, RequestStatus::Complete { .. });
        if let RequestStatus::Error { error, .. } = &finished.status {
            jobfill_logging::fill_warn!("request {} failed: {}", id, error);
        }

        match self.store.finish_record(&finished).await {
            Ok(true) => {
                jobfill_logging::fill_info!("request {} {}", id, finished.status.label());
                let _ = self.notices.send(RequestNotice {
                    request_id: id,
                    kind,
                    succeeded,
                });
            }
            Ok(false) => {
                jobfill_logging::fill_info!("request {} was cancelled; result discarded", id)
            }
            Err(err) => jobfill_logging::fill_error!("request {} not persisted: {}", id, err),
        }
    }
}
