//! Periodic liveness writes while a backend call is outstanding.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::store::StateStore;

pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Writes the `heartbeat` key every `interval` until stopped or dropped.
#[derive(Debug)]
pub struct KeepAlive {
    token: CancellationToken,
    beats: Arc<AtomicU64>,
}

impl KeepAlive {
    /// Must be called from inside a tokio runtime.
    pub fn start(store: StateStore, interval: Duration) -> Self {
        let token = CancellationToken::new();
        let beats = Arc::new(AtomicU64::new(0));

        let stop = token.clone();
        let counter = beats.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = store.touch_heartbeat(Utc::now()).await {
                            jobfill_logging::fill_warn!("heartbeat write failed: {}", err);
                        }
                        counter.fetch_add(1, Ordering::Relaxed);
                    }
                }
            }
        });

        Self { token, beats }
    }

    /// Token that stops this keep-alive when cancelled.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn stop(&self) {
        self.token.cancel();
    }
}

impl Drop for KeepAlive {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
