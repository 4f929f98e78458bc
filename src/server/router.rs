use axum::http::Uri;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::core::errors::ApiError;
use crate::server::handlers::{config, health, ui};
use crate::server::ws::handler::ws_handler;
use crate::state::AppState;

/// Creates the application router.
///
/// - `/` serves the chat page
/// - `/health` and `/api/config` report server status
/// - `/ws` carries the chat session
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(ui::index))
        .route("/health", get(health::health))
        .route("/api/config", get(config::get_config))
        .route("/ws", get(ws_handler))
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn not_found(uri: Uri) -> ApiError {
    ApiError::NotFound(format!("no route for {}", uri.path()))
}
