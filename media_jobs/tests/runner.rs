//! Drives the job runner against a shell script standing in for the downloader.
#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use media_jobs::{
    DownloadOptions, DownloaderConfig, JobRunner, JobState, JobStatus, JsonFileStore,
    ProgressStore,
};
use tempfile::TempDir;

fn runner_for(temp: &TempDir, script: &str) -> (JobRunner, Arc<JsonFileStore>) {
    let script_path = temp.path().join("fake-downloader.sh");
    fs::write(&script_path, script).unwrap();

    let mut config = DownloaderConfig::new(temp.path());
    config.program = "/bin/sh".into();
    config.program_args = vec![script_path.into_os_string()];

    let store = Arc::new(JsonFileStore::in_dir(temp.path()));
    (JobRunner::new(store.clone(), config), store)
}

async fn wait_for<F>(store: &JsonFileStore, key: &str, done: F) -> JobState
where
    F: Fn(&JobState) -> bool,
{
    for _ in 0..200 {
        let state = store.read(key).await;
        if done(&state) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {key} never reached the expected state: {:?}", store.read(key).await);
}

#[tokio::test]
async fn successful_download_completes_with_filename() {
    let temp = TempDir::new().unwrap();
    let (runner, _store) = runner_for(
        &temp,
        r#"
echo "[youtube] abc: Downloading webpage"
echo "[download] Destination: /videos/movie.mp4"
echo "[download]  12.5% of 10.00MiB at 1.00MiB/s ETA 00:09"
echo "[download] 100% of 10.00MiB in 00:10"
echo "[Merger] Merging formats..."
echo "WARNING: noisy stderr line" >&2
exit 0
"#,
    );

    let state = runner
        .run("abc", "https://www.youtube.com/watch?v=abc", &DownloadOptions::default())
        .await;

    assert_eq!(state.status, JobStatus::Completed);
    assert_eq!(state.progress, 100.0);
    assert_eq!(state.filename.as_deref(), Some("/videos/movie.mp4"));
    assert!(state.error.is_none());
    assert_eq!(runner.active_jobs(), 0);
}

#[tokio::test]
async fn non_zero_exit_is_failed_with_last_progress() {
    let temp = TempDir::new().unwrap();
    let (runner, _store) = runner_for(
        &temp,
        r#"
echo "[download] Destination: part.webm"
echo "[download]  42.0% of 1.00MiB"
echo "ERROR: unable to download video data" >&2
exit 3
"#,
    );

    let state = runner
        .run("k", "https://x.test/v?x=1", &DownloadOptions::default())
        .await;

    assert_eq!(state.status, JobStatus::Failed);
    assert_eq!(state.progress, 42.0);
    assert_eq!(state.filename.as_deref(), Some("part.webm"));
    assert_eq!(state.error.as_deref(), Some("Process exited with code 3"));
}

#[tokio::test]
async fn spawn_failure_is_reported_as_error() {
    let temp = TempDir::new().unwrap();
    let mut config = DownloaderConfig::new(temp.path());
    config.program = temp.path().join("no-such-downloader");
    let store = Arc::new(JsonFileStore::in_dir(temp.path()));
    let runner = JobRunner::new(store.clone(), config);

    let state = runner
        .run("k", "https://x.test/v", &DownloadOptions::default())
        .await;

    assert_eq!(state.status, JobStatus::Error);
    assert_eq!(state.progress, 0.0);
    assert!(state.filename.is_none());
    assert!(state.error.unwrap().contains("failed to start"));
}

#[tokio::test]
async fn start_returns_before_the_job_finishes() {
    let temp = TempDir::new().unwrap();
    let (runner, store) = runner_for(
        &temp,
        r#"
echo "[download]  5.0% of 1.00MiB"
sleep 1
echo "[download] 100% of 1.00MiB"
"#,
    );

    runner
        .start("k".into(), "https://x.test/v".into(), DownloadOptions::default())
        .await;

    let first = store.read("k").await;
    assert!(matches!(
        first.status,
        JobStatus::Starting | JobStatus::Downloading
    ));

    let done = wait_for(&store, "k", |s| s.status.is_terminal()).await;
    assert_eq!(done.status, JobStatus::Completed);
}

#[tokio::test]
async fn resubmission_overwrites_previous_state() {
    let temp = TempDir::new().unwrap();
    let (runner, store) = runner_for(&temp, "exit 1\n");

    let failed = runner
        .run("same", "https://x.test/a", &DownloadOptions::default())
        .await;
    assert_eq!(failed.status, JobStatus::Failed);

    fs::write(temp.path().join("fake-downloader.sh"), "exit 0\n").unwrap();
    runner
        .start("same".into(), "https://x.test/a".into(), DownloadOptions::default())
        .await;

    assert!(store.read("same").await.error.is_none());
    let done = wait_for(&store, "same", |s| s.status == JobStatus::Completed).await;
    assert!(done.error.is_none());
}

#[tokio::test]
async fn shutdown_stops_running_downloader() {
    let temp = TempDir::new().unwrap();
    let (runner, store) = runner_for(
        &temp,
        r#"
echo "[download]  10.0% of 1.00MiB"
exec sleep 30
"#,
    );

    runner
        .start("k".into(), "https://x.test/v".into(), DownloadOptions::default())
        .await;
    wait_for(&store, "k", |s| s.status == JobStatus::Downloading).await;
    assert_eq!(runner.active_jobs(), 1);

    runner.shutdown();

    let state = wait_for(&store, "k", |s| s.status.is_terminal()).await;
    assert_eq!(state.status, JobStatus::Failed);
    assert_eq!(state.progress, 10.0);
    assert_eq!(state.error.as_deref(), Some("Process terminated by signal"));
}

#[test]
fn script_path_is_passed_before_downloader_args() {
    let temp = TempDir::new().unwrap();
    let (runner, _) = runner_for(&temp, "");
    let args = runner
        .config()
        .build_args("https://x.test/v", &DownloadOptions::default());
    assert_eq!(
        Path::new(&args[0]),
        temp.path().join("fake-downloader.sh")
    );
}
