use axum::extract::{rejection::JsonRejection, Path};
use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use media_jobs::command::DEFAULT_QUALITY;
use media_jobs::{derive_key, DownloadOptions, MediaFormat};
use serde::Deserialize;
use serde_json::json;

use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadPayload {
    #[serde(default)]
    pub video_url: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub format: MediaFormat,
}

/// POST /download
///
/// Bodies axum cannot decode get the same 400 with a JSON `error` as a missing URL.
pub async fn start_download(
    Extension(state): Extension<AppState>,
    payload: Result<Json<DownloadPayload>, JsonRejection>,
) -> impl IntoResponse {
    let payload = match payload {
        Ok(Json(payload)) => payload,
        Err(rejection) => {
            tracing::debug!(error = %rejection.body_text(), "download request rejected");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": rejection.body_text() })),
            );
        }
    };

    let video_url = payload
        .video_url
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();
    if video_url.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing video URL" })),
        );
    }

    let options = DownloadOptions {
        quality: payload
            .quality
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_QUALITY.to_string()),
        format: payload.format,
    };
    let video_key = derive_key(video_url);
    tracing::info!(key = %video_key, url = video_url, quality = %options.quality, "download requested");

    // Returns once `starting` is recorded; the download itself runs detached.
    state
        .runner
        .start(video_key.clone(), video_url.to_string(), options.clone())
        .await;

    (
        StatusCode::OK,
        Json(json!({
            "message": "Download started",
            "videoKey": video_key,
            "videoUrl": video_url,
            "quality": options.quality,
            "format": options.format,
        })),
    )
}

/// GET /progress/{jobKey}
pub async fn get_progress(
    Extension(state): Extension<AppState>,
    Path(job_key): Path<String>,
) -> impl IntoResponse {
    let job = state.store.read(&job_key).await;
    (StatusCode::OK, Json(job))
}

/// GET /
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
