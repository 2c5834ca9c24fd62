//! Launches and supervises one downloader process per job.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, watch};

use crate::command::{DownloadOptions, DownloaderConfig};
use crate::parser::{parse_line, ParseContext};
use crate::store::ProgressStore;
use crate::{JobKey, JobState, PartialJobState};

#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("downloader {0} pipe unavailable")]
    MissingPipe(&'static str),
    #[error("failed waiting for downloader: {0}")]
    Wait(#[source] io::Error),
}

/// Starts download jobs and owns their child processes.
///
/// Cheap to clone; clones share the store, config and shutdown signal.
#[derive(Clone)]
pub struct JobRunner {
    inner: Arc<Inner>,
}

struct Inner {
    store: Arc<dyn ProgressStore>,
    config: DownloaderConfig,
    shutdown: watch::Sender<bool>,
    active: DashMap<u64, JobKey>,
    next_run: AtomicU64,
}

impl JobRunner {
    pub fn new(store: Arc<dyn ProgressStore>, config: DownloaderConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                store,
                config,
                shutdown,
                active: DashMap::new(),
                next_run: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.inner.config
    }

    /// Records `starting` for `key`, then runs the job on a detached task.
    ///
    /// A resubmitted key simply overwrites whatever an earlier run wrote;
    /// the earlier run is not cancelled.
    pub async fn start(&self, key: JobKey, url: String, options: DownloadOptions) {
        self.inner
            .store
            .merge(&key, &PartialJobState::starting())
            .await;

        let runner = self.clone();
        tokio::spawn(async move {
            runner.supervise(&key, &url, &options).await;
        });
    }

    /// Runs a job to its terminal state in the current task.
    pub async fn run(&self, key: &str, url: &str, options: &DownloadOptions) -> JobState {
        self.inner
            .store
            .merge(key, &PartialJobState::starting())
            .await;
        self.supervise(key, url, options).await;
        self.inner.store.read(key).await
    }

    /// Asks every running downloader to stop. Returns without waiting for them.
    pub fn shutdown(&self) {
        self.inner.shutdown.send_replace(true);
        let running = self.active_jobs();
        if running > 0 {
            tracing::info!(running, "signalled running downloads to stop");
        }
    }

    pub fn active_jobs(&self) -> usize {
        self.inner.active.len()
    }

    async fn supervise(&self, key: &str, url: &str, options: &DownloadOptions) {
        let terminal = match self.execute(key, url, options).await {
            Ok(update) => update,
            Err(e) => {
                tracing::error!(key, error = %e, "download job failed to run");
                PartialJobState::errored(e.to_string())
            }
        };
        tracing::info!(key, status = ?terminal.status, "download job finished");
        self.inner.store.merge(key, &terminal).await;
    }

    async fn execute(
        &self,
        key: &str,
        url: &str,
        options: &DownloadOptions,
    ) -> Result<PartialJobState, JobError> {
        let config = &self.inner.config;
        let mut child = Command::new(&config.program)
            .args(config.build_args(url, options))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| JobError::Spawn {
                program: config.program.display().to_string(),
                source,
            })?;
        let _active = ActiveRun::register(&self.inner, key);
        tracing::info!(key, url, pid = ?child.id(), "downloader started");

        let stdout = child.stdout.take().ok_or(JobError::MissingPipe("stdout"))?;
        let stderr = child.stderr.take().ok_or(JobError::MissingPipe("stderr"))?;

        let (tx, mut lines) = mpsc::unbounded_channel();
        tokio::spawn(forward_lines(stdout, tx.clone()));
        tokio::spawn(forward_lines(stderr, tx));

        let mut ctx = ParseContext::default();
        let mut stop = self.inner.shutdown.subscribe();
        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else { break };
                    let line = line.trim();
                    tracing::debug!(key, "{line}");
                    if let Some(update) = parse_line(line, &mut ctx) {
                        self.inner.store.merge(key, &update).await;
                    }
                }
                _ = stop_requested(&mut stop) => {
                    tracing::info!(key, "stopping downloader");
                    if let Err(e) = child.start_kill() {
                        tracing::warn!(key, error = %e, "could not signal downloader");
                    }
                    break;
                }
            }
        }

        let status = child.wait().await.map_err(JobError::Wait)?;
        Ok(if status.success() {
            PartialJobState::completed(ctx.filename)
        } else {
            PartialJobState::failed(ctx.last_progress, ctx.filename, exit_message(status))
        })
    }
}

/// Entry in the running-job table for as long as its child is alive.
struct ActiveRun<'a> {
    table: &'a DashMap<u64, JobKey>,
    id: u64,
}

impl<'a> ActiveRun<'a> {
    fn register(inner: &'a Inner, key: &str) -> Self {
        let id = inner.next_run.fetch_add(1, Ordering::Relaxed);
        inner.active.insert(id, key.to_string());
        Self {
            table: &inner.active,
            id,
        }
    }
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

/// Resolves once shutdown has been requested, including before this call.
async fn stop_requested(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sends each line of `reader` down `tx`, decoding invalid UTF-8 lossily.
async fn forward_lines<R>(reader: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if tx.send(String::from_utf8_lossy(&buf).into_owned()).is_err() {
                    break;
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "downloader output stream closed");
                break;
            }
        }
    }
}

fn exit_message(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("Process exited with code {code}"),
        None => "Process terminated by signal".to_string(),
    }
}
