use axum::routing::{get, post};
use axum::{Extension, Router};

use crate::handlers::download_handlers::{get_progress, health, start_download};
use crate::state::AppState;

pub fn download_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/download", post(start_download))
        .route("/progress/{jobKey}", get(get_progress))
        .layer(Extension(state))
}
