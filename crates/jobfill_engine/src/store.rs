//! Shared key-value store reachable from every execution context.
//!
//! Values are JSON documents. Individual operations are atomic; there are
//! no multi-key transactions and the last writer of a key wins.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::backend::ScoreResult;
use crate::persist::{AtomicFileWriter, DirLock, PersistError};
use crate::record::{RequestId, RequestRecord};
use crate::types::{ParsedResume, ResumeFilePayload};

pub const PARSED_RESUME_KEY: &str = "parsed-resume";
pub const RESUME_FILE_KEY: &str = "resume-file";
pub const LAST_SCORE_KEY: &str = "last-score";
pub const LAST_SCORE_URL_KEY: &str = "last-score-url";
pub const HEARTBEAT_KEY: &str = "heartbeat";
pub const REQUEST_KEY_PREFIX: &str = "request-";

const FILE_SUFFIX: &str = ".json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store key '{0}'")]
    InvalidKey(String),
    #[error("stored value for '{key}' is malformed: {source}")]
    Malformed {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("store task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Deletes `key` and returns what it held. Of several concurrent removers
    /// of the same key, exactly one receives `Some`.
    async fn remove(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Writes `value` only if `key` is currently present. Returns whether the
    /// write happened.
    async fn replace_existing(&self, key: &str, value: Value) -> Result<bool, StoreError>;

    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// In-process store, used by tests and single-process runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<String, Value>) -> T,
    ) -> Result<T, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(f(&mut entries))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        self.with_entries(|entries| entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        validate_key(key)?;
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, StoreError> {
        validate_key(key)?;
        self.with_entries(|entries| entries.remove(key))
    }

    async fn replace_existing(&self, key: &str, value: Value) -> Result<bool, StoreError> {
        validate_key(key)?;
        self.with_entries(|entries| match entries.get_mut(key) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        })
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.with_entries(|entries| entries.keys().cloned().collect())
    }
}

/// One `<key>.json` file per key inside a state directory.
///
/// Every operation holds the directory's lock file, so a check-then-write
/// such as `replace_existing` cannot interleave with a removal made by
/// another process. File work runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct FileStore {
    files: AtomicFileWriter,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            files: AtomicFileWriter::new(dir.into()),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        self.files.dir()
    }

    fn file_name(key: &str) -> Result<String, StoreError> {
        validate_key(key)?;
        Ok(format!("{key}{FILE_SUFFIX}"))
    }

    fn decode(key: &str, bytes: &[u8]) -> Result<Value, StoreError> {
        serde_json::from_slice(bytes).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })
    }

    fn encode(key: &str, value: &Value) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec_pretty(value).map_err(|source| StoreError::Malformed {
            key: key.to_string(),
            source,
        })
    }

    async fn locked<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&AtomicFileWriter) -> Result<T, StoreError> + Send + 'static,
    {
        let files = self.files.clone();
        tokio::task::spawn_blocking(move || {
            let _lock = DirLock::acquire(files.dir())?;
            op(&files)
        })
        .await
        .map_err(|err| StoreError::Task(err.to_string()))?
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let name = Self::file_name(key)?;
        let key = key.to_string();
        self.locked(move |files| {
            files
                .read(&name)?
                .map(|bytes| Self::decode(&key, &bytes))
                .transpose()
        })
        .await
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError> {
        let name = Self::file_name(key)?;
        let bytes = Self::encode(key, &value)?;
        self.locked(move |files| {
            files.write(&name, &bytes)?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let name = Self::file_name(key)?;
        let key = key.to_string();
        self.locked(move |files| {
            files
                .take(&name)?
                .map(|bytes| Self::decode(&key, &bytes))
                .transpose()
        })
        .await
    }

    async fn replace_existing(&self, key: &str, value: Value) -> Result<bool, StoreError> {
        let name = Self::file_name(key)?;
        let bytes = Self::encode(key, &value)?;
        self.locked(move |files| {
            if !files.exists(&name) {
                return Ok(false);
            }
            files.write(&name, &bytes)?;
            Ok(true)
        })
        .await
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        self.locked(|files| {
            let names = files.list(FILE_SUFFIX)?;
            Ok(names
                .into_iter()
                .filter_map(|name| name.strip_suffix(FILE_SUFFIX).map(ToOwned::to_owned))
                .filter(|key| validate_key(key).is_ok())
                .collect())
        })
        .await
    }
}

/// Most recent score shown to the user, with the job it was computed for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastScore {
    pub jd_url: String,
    pub score: ScoreResult,
}

/// Typed view over a [`KeyValueStore`] with the keys the agent uses.
#[derive(Clone)]
pub struct StateStore {
    inner: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore").finish_non_exhaustive()
    }
}

pub fn request_key(id: RequestId) -> String {
    format!("{REQUEST_KEY_PREFIX}{id}")
}

impl StateStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn on_disk(dir: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileStore::new(dir)))
    }

    pub fn raw(&self) -> &dyn KeyValueStore {
        self.inner.as_ref()
    }

    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        self.inner
            .get(key)
            .await?
            .map(|value| from_value(key, value))
            .transpose()
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        self.inner.set(key, to_value(key, value)?).await
    }

    pub async fn save_parsed_resume(&self, resume: &ParsedResume) -> Result<(), StoreError> {
        self.save(PARSED_RESUME_KEY, resume).await
    }

    pub async fn parsed_resume(&self) -> Result<Option<ParsedResume>, StoreError> {
        self.load(PARSED_RESUME_KEY).await
    }

    pub async fn save_resume_file(&self, file: &ResumeFilePayload) -> Result<(), StoreError> {
        self.save(RESUME_FILE_KEY, file).await
    }

    pub async fn resume_file(&self) -> Result<Option<ResumeFilePayload>, StoreError> {
        self.load(RESUME_FILE_KEY).await
    }

    pub async fn save_last_score(&self, last: &LastScore) -> Result<(), StoreError> {
        self.save(LAST_SCORE_KEY, &last.score).await?;
        self.save(LAST_SCORE_URL_KEY, &last.jd_url).await
    }

    pub async fn last_score(&self) -> Result<Option<LastScore>, StoreError> {
        let score: Option<ScoreResult> = self.load(LAST_SCORE_KEY).await?;
        let jd_url: Option<String> = self.load(LAST_SCORE_URL_KEY).await?;
        Ok(score.map(|score| LastScore {
            jd_url: jd_url.unwrap_or_default(),
            score,
        }))
    }

    pub async fn touch_heartbeat(&self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.save(HEARTBEAT_KEY, &at).await
    }

    pub async fn heartbeat(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.load(HEARTBEAT_KEY).await
    }

    pub async fn insert_record(&self, record: &RequestRecord) -> Result<(), StoreError> {
        self.save(&request_key(record.request_id), record).await
    }

    pub async fn record(&self, id: RequestId) -> Result<Option<RequestRecord>, StoreError> {
        self.load(&request_key(id)).await
    }

    /// Overwrites a record that still exists. `false` means it was removed
    /// (cancelled or consumed) and nothing was written.
    pub async fn finish_record(&self, record: &RequestRecord) -> Result<bool, StoreError> {
        let key = request_key(record.request_id);
        let value = to_value(&key, record)?;
        self.inner.replace_existing(&key, value).await
    }

    /// Removes the record and returns it; only one caller ever gets it.
    pub async fn take_record(&self, id: RequestId) -> Result<Option<RequestRecord>, StoreError> {
        let key = request_key(id);
        self.inner
            .remove(&key)
            .await?
            .map(|value| from_value(&key, value))
            .transpose()
    }

    pub async fn request_records(&self) -> Result<Vec<RequestRecord>, StoreError> {
        let mut records = Vec::new();
        for key in self.request_keys().await? {
            match self.load::<RequestRecord>(&key).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(err) => jobfill_logging::fill_warn!("ignoring unreadable {}: {}", key, err),
            }
        }
        records.sort_by_key(|record| record.started_at);
        Ok(records)
    }

    /// Deletes every request record. Returns how many were removed.
    pub async fn purge_requests(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        for key in self.request_keys().await? {
            if self.inner.remove(&key).await?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn request_keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .inner
            .keys()
            .await?
            .into_iter()
            .filter(|key| key.starts_with(REQUEST_KEY_PREFIX))
            .collect())
    }
}

fn from_value<T: DeserializeOwned>(key: &str, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

fn to_value<T: Serialize>(key: &str, value: &T) -> Result<Value, StoreError> {
    serde_json::to_value(value).map_err(|source| StoreError::Malformed {
        key: key.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn replace_existing_never_creates() {
        let store = MemoryStore::new();
        assert!(!store.replace_existing("a", json!(1)).await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), None);

        store.set("a", json!(1)).await.unwrap();
        assert!(store.replace_existing("a", json!(2)).await.unwrap());
        assert_eq!(store.get("a").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn remove_returns_the_value_once() {
        let store = MemoryStore::new();
        store.set("k", json!("v")).await.unwrap();
        assert_eq!(store.remove("k").await.unwrap(), Some(json!("v")));
        assert_eq!(store.remove("k").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn finish_racing_cancel_from_another_store_never_resurrects() {
        let dir = tempfile::TempDir::new().unwrap();
        let owner = FileStore::new(dir.path());
        let canceller = FileStore::new(dir.path());

        for round in 0..40 {
            owner.set("request-r", json!({"round": round, "status": "processing"})).await.unwrap();
            let (finished, cancelled) = tokio::join!(
                owner.replace_existing("request-r", json!({"round": round, "status": "complete"})),
                canceller.remove("request-r"),
            );
            let finished = finished.unwrap();
            let cancelled = cancelled.unwrap().expect("record existed before the race");
            assert_eq!(owner.get("request-r").await.unwrap(), None, "round {round}");
            if !finished {
                assert_eq!(cancelled["status"], "processing");
            }
        }
    }

    #[tokio::test]
    async fn file_store_keys_skip_the_lock_and_claimed_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileStore::new(dir.path());
        store.set("last-score", json!(1)).await.unwrap();
        store.set("request-a", json!(2)).await.unwrap();
        assert_eq!(store.remove("request-a").await.unwrap(), Some(json!(2)));

        assert!(dir.path().join(".lock").is_file());
        assert_eq!(store.keys().await.unwrap(), vec!["last-score"]);
        assert!(!store.replace_existing("request-a", json!(3)).await.unwrap());
    }

    #[tokio::test]
    async fn keys_reject_path_characters() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.set("../etc", json!(0)).await,
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(
            store.get("").await,
            Err(StoreError::InvalidKey(_))
        ));
    }
}
