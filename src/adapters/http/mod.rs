pub mod error;
pub mod routes;
pub mod state;

use axum::{extract::DefaultBodyLimit, routing::{get, post}, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use crate::adapters::http::state::HttpState;

/// `max_upload_bytes = None` desactiva el límite de cuerpo de axum.
pub fn router(state: HttpState, max_upload_bytes: Option<usize>) -> Router {
    let body_limit = match max_upload_bytes {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    Router::new()
        .route("/predict", post(routes::predict))
        .route("/static/:filename", get(routes::serve_image))
        .route("/health", get(routes::health))
        .layer(body_limit)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
