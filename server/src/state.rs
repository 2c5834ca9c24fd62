use std::sync::Arc;

use media_jobs::{DownloaderConfig, JobRunner, ProgressStore};

use crate::config::Config;

// Shared by every handler: the progress store and the runner that writes to it.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ProgressStore>,
    pub runner: JobRunner,
}

impl AppState {
    pub fn new(store: Arc<dyn ProgressStore>, downloader: DownloaderConfig) -> Self {
        AppState {
            runner: JobRunner::new(store.clone(), downloader),
            store,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(config.progress_store()), config.downloader())
    }
}
