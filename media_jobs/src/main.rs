use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use media_jobs::{
    derive_key, logging, DownloadOptions, DownloaderConfig, JobRunner, JobStatus, JsonFileStore,
    MediaFormat, ProgressStore,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Download one media URL and report its progress record", long_about = None)]
struct Args {
    /// URL to download
    #[arg(short, long)]
    url: String,

    /// Quality preset (2160p, 1440p, 1080p, 720p, 480p, 360p, best)
    #[arg(short, long, default_value = "best")]
    quality: String,

    /// Extract audio as mp3 instead of downloading video
    #[arg(short, long)]
    audio: bool,

    /// Directory for downloaded files and the progress document
    #[arg(short, long, env = "DOWNLOAD_DIR", default_value = ".")]
    download_dir: PathBuf,

    /// Downloader executable
    #[arg(long, env = "YTDLP_BIN", default_value = "yt-dlp")]
    ytdlp: PathBuf,

    /// Only print the job key derived from the URL
    #[arg(short, long)]
    key_only: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    logging::init_logging();

    let args = Args::parse();
    let key = derive_key(&args.url);
    println!("{key}");
    if args.key_only {
        return Ok(());
    }

    tokio::fs::create_dir_all(&args.download_dir).await?;
    let store = Arc::new(JsonFileStore::in_dir(&args.download_dir));
    store.cleanup().await;

    let mut config = DownloaderConfig::new(&args.download_dir);
    config.program = args.ytdlp;
    let options = DownloadOptions {
        quality: args.quality,
        format: if args.audio {
            MediaFormat::Audio
        } else {
            MediaFormat::Video
        },
    };

    let runner = JobRunner::new(store, config);
    let state = runner.run(&key, &args.url, &options).await;
    println!("{}", serde_json::to_string_pretty(&state)?);

    if state.status != JobStatus::Completed {
        std::process::exit(1);
    }
    Ok(())
}
