pub mod config;
pub mod handlers;
pub mod routes;
pub mod state;

use axum::Router;
use tower_http::cors::CorsLayer;

use routes::download::download_routes;
use state::AppState;

pub fn app(state: AppState, cors: CorsLayer) -> Router {
    Router::new().merge(download_routes(state)).layer(cors)
}
