use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use jobfill_core::PollSettings;
use jobfill_engine::{BackendSettings, OrchestratorSettings, DEFAULT_BACKEND_URL};
use serde::Deserialize;
use thiserror::Error;

use crate::platform::logging::LogDestination;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub state_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub keepalive_interval_secs: u64,
    pub max_response_bytes: u64,
    pub log_destination: LogDestination,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            state_dir: PathBuf::from(".jobfill"),
            request_timeout_secs: 120,
            poll_interval_secs: 2,
            keepalive_interval_secs: 20,
            max_response_bytes: 5 * 1024 * 1024,
            log_destination: LogDestination::Terminal,
        }
    }
}

impl AppConfig {
    /// Reads `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        ron::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            base_url: self.backend_url.clone(),
            request_timeout: self.request_timeout(),
            max_bytes: self.max_response_bytes,
            ..BackendSettings::default()
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            request_timeout: self.request_timeout(),
            keepalive_interval: Duration::from_secs(self.keepalive_interval_secs.max(1)),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            timeout: self.request_timeout(),
        }
    }
}
