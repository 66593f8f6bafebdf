//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{detect_humans, encode_image, encode_text, health, similarity};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    let max_body = state.config.max_body_bytes;

    Router::new()
        .route("/health", get(health))
        .route("/encode_image", post(encode_image))
        .route("/encode_text", post(encode_text))
        .route("/similarity", post(similarity))
        .route("/detect_humans", post(detect_humans))
        // Base64 images exceed axum's 2 MiB default; the tower-http limit applies instead.
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
