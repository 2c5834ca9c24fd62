pub mod command;
pub mod key;
pub mod logging;
pub mod parser;
pub mod runner;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use command::{DownloadOptions, DownloaderConfig, MediaFormat};
pub use key::{derive_key, JobKey};
pub use parser::{parse_line, ParseContext};
pub use runner::{JobError, JobRunner};
pub use store::{JsonFileStore, ProgressStore, DEFAULT_RETENTION};

/// Lifecycle of a download job as seen by pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Starting,
    Downloading,
    Processing,
    Completed,
    Failed,
    Error,
}

impl JobStatus {
    /// Completed, failed and error are final; nothing updates a job after them.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Error)
    }

    fn carries_error(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Error)
    }
}

/// Latest known state of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobState {
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Unset only on the synthetic record handed out for unknown keys.
    #[serde(
        default,
        with = "chrono::serde::ts_seconds_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}

impl JobState {
    /// The record reported for a key nobody has written yet.
    pub fn queued() -> Self {
        Self::default()
    }

    /// Shallow-merges `partial` into this record and stamps it with `now`.
    pub fn apply(&mut self, partial: &PartialJobState, now: DateTime<Utc>) {
        if let Some(status) = partial.status {
            self.status = status;
        }
        if let Some(progress) = partial.progress {
            self.progress = progress;
        }
        if let Some(filename) = &partial.filename {
            self.filename = filename.clone();
        }
        if let Some(error) = &partial.error {
            self.error = error.clone();
        }
        if !self.status.carries_error() {
            self.error = None;
        }
        self.timestamp = Some(now);
    }
}

/// A set of field updates for a [`JobState`]. `None` leaves the field alone;
/// for the nullable fields `Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PartialJobState {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub filename: Option<Option<String>>,
    pub error: Option<Option<String>>,
}

impl PartialJobState {
    pub fn starting() -> Self {
        Self {
            status: Some(JobStatus::Starting),
            progress: Some(0.0),
            filename: Some(None),
            error: Some(None),
        }
    }

    pub fn downloading(progress: f64, filename: Option<String>) -> Self {
        Self {
            status: Some(JobStatus::Downloading),
            progress: Some(progress),
            filename: Some(filename),
            error: None,
        }
    }

    pub fn processing(filename: Option<String>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress: Some(99.0),
            filename: Some(filename),
            error: None,
        }
    }

    pub fn completed(filename: Option<String>) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(100.0),
            filename: Some(filename),
            error: Some(None),
        }
    }

    pub fn failed(progress: f64, filename: Option<String>, error: String) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            progress: Some(progress),
            filename: Some(filename),
            error: Some(Some(error)),
        }
    }

    pub fn errored(error: String) -> Self {
        Self {
            status: Some(JobStatus::Error),
            progress: Some(0.0),
            filename: Some(None),
            error: Some(Some(error)),
        }
    }
}
