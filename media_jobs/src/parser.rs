//! Classifies downloader output lines into job state updates.
//!
//! Pure string matching; nothing here touches a process or the store.

use crate::PartialJobState;

const DOWNLOAD_MARKER: &str = "[download]";
const DESTINATION_MARKER: &str = "Destination:";
const EXTRACT_AUDIO_MARKER: &str = "[ExtractAudio]";
const MERGER_MARKER: &str = "[Merger]";

/// Highest progress a downloading line may report; 100 is reserved for completion.
const DOWNLOAD_PROGRESS_CEILING: f64 = 99.9;
const PROCESSING_PROGRESS: f64 = 99.0;

/// What one job has learned from its output so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParseContext {
    pub last_progress: f64,
    pub filename: Option<String>,
}

/// Maps one output line to the update it implies, if any, and advances `ctx`.
///
/// Progress never goes backwards within a context: a lower percentage (for
/// example the audio stream starting after the video stream) reports the
/// last observed value instead.
pub fn parse_line(line: &str, ctx: &mut ParseContext) -> Option<PartialJobState> {
    if line.contains(DOWNLOAD_MARKER) && line.contains('%') {
        let percent = parse_percent(line)?;
        let progress = percent
            .clamp(0.0, DOWNLOAD_PROGRESS_CEILING)
            .max(ctx.last_progress);
        ctx.last_progress = progress;
        return Some(PartialJobState::downloading(progress, ctx.filename.clone()));
    }

    if let Some(idx) = line.rfind(DESTINATION_MARKER) {
        let name = line[idx + DESTINATION_MARKER.len()..].trim();
        if !name.is_empty() {
            ctx.filename = Some(name.to_string());
        }
        return Some(PartialJobState::downloading(
            ctx.last_progress,
            ctx.filename.clone(),
        ));
    }

    if line.contains(EXTRACT_AUDIO_MARKER) || line.contains(MERGER_MARKER) {
        ctx.last_progress = ctx.last_progress.max(PROCESSING_PROGRESS);
        return Some(PartialJobState::processing(ctx.filename.clone()));
    }

    None
}

/// Number directly in front of the first `%` that has one.
fn parse_percent(line: &str) -> Option<f64> {
    let bytes = line.as_bytes();

    for (pct_idx, _) in line.match_indices('%') {
        let mut start = pct_idx;
        while start > 0 && (bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.') {
            start -= 1;
        }
        if start == pct_idx {
            continue;
        }
        return line[start..pct_idx].parse::<f64>().ok().filter(|p| p.is_finite());
    }

    None
}
