//! Argument list for the external downloader.

use std::ffi::OsString;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub const DEFAULT_QUALITY: &str = "best";

/// Format selectors per quality preset. Unknown names use `best`.
const QUALITY_PRESETS: &[(&str, &str)] = &[
    ("2160p", "bestvideo[height<=2160][vcodec^=avc1]+bestaudio/best[height<=2160]/bestvideo[height<=2160]+bestaudio/best[height<=2160]"),
    ("1440p", "bestvideo[height<=1440][vcodec^=avc1]+bestaudio/best[height<=1440]/bestvideo[height<=1440]+bestaudio/best[height<=1440]"),
    ("1080p", "bestvideo[height<=1080][vcodec^=avc1]+bestaudio/best[height<=1080]/bestvideo[height<=1080]+bestaudio/best[height<=1080]"),
    ("720p", "bestvideo[height<=720][vcodec^=avc1]+bestaudio/best[height<=720]/bestvideo[height<=720]+bestaudio/best[height<=720]"),
    ("480p", "bestvideo[height<=480]+bestaudio/best[height<=480]"),
    ("360p", "bestvideo[height<=360]+bestaudio/best[height<=360]"),
    ("best", "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best"),
    ("audio", "bestaudio/best"),
];

const VIDEO_TEMPLATE: &str = "%(title)s_[%(resolution)s].%(ext)s";
const AUDIO_TEMPLATE: &str = "%(title)s.%(ext)s";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Audio,
    /// Also what any unrecognised format name deserializes to.
    #[default]
    #[serde(other)]
    Video,
}

/// Per-job choices forwarded to the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadOptions {
    pub quality: String,
    pub format: MediaFormat,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY.to_string(),
            format: MediaFormat::Video,
        }
    }
}

/// How to launch the downloader and where it writes.
#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub program: PathBuf,
    /// Placed before the generated arguments, e.g. a script for an interpreter.
    pub program_args: Vec<OsString>,
    pub download_dir: PathBuf,
    pub insecure: bool,
    pub force_ipv4: bool,
}

impl DownloaderConfig {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: PathBuf::from("yt-dlp"),
            program_args: Vec::new(),
            download_dir: download_dir.into(),
            insecure: true,
            force_ipv4: true,
        }
    }

    /// Full argument list (after `program`) for downloading `url`.
    pub fn build_args(&self, url: &str, options: &DownloadOptions) -> Vec<OsString> {
        let (selector, template) = match options.format {
            MediaFormat::Audio => (format_selector("audio"), AUDIO_TEMPLATE),
            MediaFormat::Video => (format_selector(&options.quality), VIDEO_TEMPLATE),
        };

        let mut args = self.program_args.clone();
        args.extend(
            ["--newline", "--no-playlist", "-f", selector]
                .into_iter()
                .map(OsString::from),
        );

        match options.format {
            MediaFormat::Audio => args.extend(
                ["--extract-audio", "--audio-format", "mp3"]
                    .into_iter()
                    .map(OsString::from),
            ),
            MediaFormat::Video => args.extend(
                ["--merge-output-format", "mp4"]
                    .into_iter()
                    .map(OsString::from),
            ),
        }

        args.push("--output".into());
        args.push(self.download_dir.join(template).into_os_string());

        if self.insecure {
            args.push("--no-check-certificate".into());
        }
        if self.force_ipv4 {
            args.push("--force-ipv4".into());
        }

        args.push(url.into());
        args
    }
}

/// Format selector for a quality preset name.
pub fn format_selector(quality: &str) -> &'static str {
    QUALITY_PRESETS
        .iter()
        .find(|(name, _)| *name == quality)
        .or_else(|| QUALITY_PRESETS.iter().find(|(name, _)| *name == DEFAULT_QUALITY))
        .map(|(_, selector)| *selector)
        .unwrap_or("best")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.into_string().unwrap())
            .collect()
    }

    #[test]
    fn unknown_quality_uses_best() {
        assert_eq!(format_selector("8k"), format_selector("best"));
        assert_eq!(format_selector("360p"), "bestvideo[height<=360]+bestaudio/best[height<=360]");
    }

    #[test]
    fn video_args() {
        let cfg = DownloaderConfig::new("/dl");
        let opts = DownloadOptions {
            quality: "720p".into(),
            format: MediaFormat::Video,
        };
        let args = strings(cfg.build_args("https://x.test/v", &opts));

        assert_eq!(&args[..4], ["--newline", "--no-playlist", "-f", format_selector("720p")]);
        assert!(args.windows(2).any(|w| w == ["--merge-output-format", "mp4"]));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "--output" && w[1] == "/dl/%(title)s_[%(resolution)s].%(ext)s"));
        assert!(args.contains(&"--no-check-certificate".to_string()));
        assert!(args.contains(&"--force-ipv4".to_string()));
        assert_eq!(args.last().unwrap(), "https://x.test/v");
    }

    #[test]
    fn audio_args_ignore_quality() {
        let mut cfg = DownloaderConfig::new("/dl");
        cfg.insecure = false;
        cfg.force_ipv4 = false;
        let opts = DownloadOptions {
            quality: "1080p".into(),
            format: MediaFormat::Audio,
        };
        let args = strings(cfg.build_args("u", &opts));

        assert!(args.windows(2).any(|w| w == ["-f", "bestaudio/best"]));
        assert!(args.contains(&"--extract-audio".to_string()));
        assert!(args.contains(&"/dl/%(title)s.%(ext)s".to_string()));
        assert!(!args.contains(&"--no-check-certificate".to_string()));
        assert!(!args.contains(&"--force-ipv4".to_string()));
    }

    #[test]
    fn program_args_come_first() {
        let mut cfg = DownloaderConfig::new("/dl");
        cfg.program = "python3".into();
        cfg.program_args = vec!["-m".into(), "yt_dlp".into()];
        let args = strings(cfg.build_args("u", &DownloadOptions::default()));
        assert_eq!(&args[..3], ["-m", "yt_dlp", "--newline"]);
    }

    #[test]
    fn unknown_format_is_video() {
        let format: MediaFormat = serde_json::from_str(r#""webm""#).unwrap();
        assert_eq!(format, MediaFormat::Video);
        let format: MediaFormat = serde_json::from_str(r#""audio""#).unwrap();
        assert_eq!(format, MediaFormat::Audio);
    }
}
