use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use super::handlers;
use crate::state::AppState;

/// Create the main application router
///
/// The CORS layer answers OPTIONS preflights itself with origin `*`;
/// signaling handlers never see them. Unmatched paths fall through to
/// the static browser client.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let static_dir = state.config.web.static_dir.clone();

    Router::new()
        .route("/offer", post(handlers::create_offer))
        .route("/answer", post(handlers::apply_answer))
        .route("/healthz", get(handlers::health_check))
        .route("/status", get(handlers::status))
        .fallback_service(ServeDir::new(static_dir))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
