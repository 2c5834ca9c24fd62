use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::{header, HeaderValue, Method};
use media_jobs::{DownloaderConfig, JsonFileStore};
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_RETENTION_HOURS: u64 = 24;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} is not valid: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Server settings, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub download_dir: PathBuf,
    pub ytdlp_bin: PathBuf,
    pub client_url: Option<HeaderValue>,
    pub retention: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let bind_addr = var("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::Invalid {
                name: "BIND_ADDR",
                value: bind_addr.clone(),
            })?;

        let download_dir = var("DOWNLOAD_DIR").map(PathBuf::from).unwrap_or_else(|| {
            var("HOME")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("VideoDownloads")
        });

        let ytdlp_bin = var("YTDLP_BIN")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));

        let client_url = var("CLIENT_URL")
            .map(|url| {
                url.parse::<HeaderValue>().map_err(|_| ConfigError::Invalid {
                    name: "CLIENT_URL",
                    value: url.clone(),
                })
            })
            .transpose()?;

        let retention_secs = match var("PROGRESS_RETENTION_HOURS") {
            Some(v) => v
                .trim()
                .parse::<u64>()
                .ok()
                .and_then(|hours| hours.checked_mul(60 * 60))
                .ok_or_else(|| ConfigError::Invalid {
                    name: "PROGRESS_RETENTION_HOURS",
                    value: v.clone(),
                })?,
            None => DEFAULT_RETENTION_HOURS * 60 * 60,
        };

        Ok(Self {
            bind_addr,
            download_dir,
            ytdlp_bin,
            client_url,
            retention: Duration::from_secs(retention_secs),
        })
    }

    pub fn progress_store(&self) -> JsonFileStore {
        JsonFileStore::in_dir(&self.download_dir).with_retention(self.retention)
    }

    pub fn downloader(&self) -> DownloaderConfig {
        let mut downloader = DownloaderConfig::new(&self.download_dir);
        downloader.program = self.ytdlp_bin.clone();
        downloader
    }

    /// Single allowed origin when `CLIENT_URL` is set, any origin otherwise.
    pub fn cors_layer(&self) -> CorsLayer {
        let cors = CorsLayer::new()
            .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
            .allow_headers([header::CONTENT_TYPE]);

        match &self.client_url {
            Some(origin) => cors.allow_origin(origin.clone()),
            None => cors.allow_origin(Any),
        }
    }
}
