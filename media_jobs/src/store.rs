//! Job state persisted as one JSON document.
//!
//! Every write lands in a sibling temp file that is then renamed over the
//! document, so readers always see a whole document. Read-modify-write
//! sequences are serialised by a process-wide lock.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::{JobState, PartialJobState};

/// File name of the progress document inside the download directory.
pub const PROGRESS_FILE_NAME: &str = ".progress.json";

/// How long an entry survives after its last update.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Entries stay raw JSON so one unreadable record never hides its neighbours.
type Document = BTreeMap<String, Value>;

/// Shared key -> state mapping used by job tasks and request handlers.
///
/// None of the operations fail: storage problems are logged and the caller
/// sees default state instead.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// State for `key`, or the queued record when there is none.
    async fn read(&self, key: &str) -> JobState;

    /// Merges `partial` into the record for `key` and stamps it with the current time.
    async fn merge(&self, key: &str, partial: &PartialJobState);

    /// Drops every entry older than the retention window.
    async fn cleanup(&self);
}

#[derive(Debug, Error)]
enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid progress document: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct JsonFileStore {
    path: PathBuf,
    tmp_path: PathBuf,
    retention: Duration,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");

        Self {
            path,
            tmp_path: PathBuf::from(tmp),
            retention: DEFAULT_RETENTION,
            write_lock: Mutex::new(()),
        }
    }

    /// Store backed by [`PROGRESS_FILE_NAME`] inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(PROGRESS_FILE_NAME))
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Document, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Document::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Decodes one entry; `None` when it does not match the job record shape.
    fn decode_entry(&self, key: &str, entry: Value) -> Option<JobState> {
        serde_json::from_value(entry)
            .map_err(|e| {
                tracing::warn!(path = %self.path.display(), key, error = %e, "ignoring malformed progress entry");
            })
            .ok()
    }

    async fn store(&self, doc: &Document) -> Result<(), StoreError> {
        let json = serde_json::to_vec(doc)?;

        let mut file = tokio::fs::File::create(&self.tmp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&self.tmp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for JsonFileStore {
    async fn read(&self, key: &str) -> JobState {
        match self.load().await {
            Ok(mut doc) => doc
                .remove(key)
                .and_then(|entry| self.decode_entry(key, entry))
                .unwrap_or_else(JobState::queued),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "progress read failed");
                JobState::queued()
            }
        }
    }

    async fn merge(&self, key: &str, partial: &PartialJobState) {
        let _guard = self.write_lock.lock().await;

        let mut doc = self.load().await.unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "discarding unreadable progress document");
            Document::new()
        });

        let mut state = doc
            .remove(key)
            .and_then(|entry| self.decode_entry(key, entry))
            .unwrap_or_default();
        state.apply(partial, Utc::now());

        let entry = match serde_json::to_value(&state) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "progress update not serializable");
                return;
            }
        };
        doc.insert(key.to_string(), entry);

        if let Err(e) = self.store(&doc).await {
            tracing::warn!(path = %self.path.display(), key, error = %e, "progress update failed");
        }
    }

    async fn cleanup(&self) {
        let _guard = self.write_lock.lock().await;

        let mut doc = match self.load().await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "progress cleanup skipped");
                return;
            }
        };

        let now = Utc::now().timestamp();
        let retention = i64::try_from(self.retention.as_secs()).unwrap_or(i64::MAX);
        let before = doc.len();
        doc.retain(|_, entry| {
            let updated = entry
                .get("timestamp")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            now.saturating_sub(updated) < retention
        });

        let removed = before - doc.len();
        if removed == 0 {
            return;
        }
        match self.store(&doc).await {
            Ok(()) => tracing::info!(removed, kept = doc.len(), "expired progress entries removed"),
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "progress cleanup failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_file_sits_next_to_document() {
        let store = JsonFileStore::in_dir(Path::new("/srv/dl"));
        assert_eq!(store.path(), Path::new("/srv/dl/.progress.json"));
        assert_eq!(store.tmp_path, Path::new("/srv/dl/.progress.json.tmp"));
    }

    #[tokio::test]
    async fn missing_document_reads_as_queued() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::in_dir(dir.path());
        assert_eq!(store.read("nope").await, JobState::queued());
    }
}
