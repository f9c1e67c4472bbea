//! HTTP handlers for signaling and status

use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tracing::info;

use crate::error::Result;
use crate::state::AppState;
use crate::webrtc::{AnswerAck, AnswerRequest, OfferResponse};

/// `POST /offer`: build a session and return its SDP offer
pub async fn create_offer(State(state): State<Arc<AppState>>) -> Result<Json<OfferResponse>> {
    info!("Offer requested");
    let offer = state.registry.create_offer().await?;
    Ok(Json(offer))
}

/// `POST /answer`: apply the client answer to the current session
pub async fn apply_answer(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerAck>> {
    let ack = state.registry.apply_answer(request).await?;
    Ok(Json(ack))
}

/// `GET /healthz`
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /status`: session, relay and camera snapshot
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "sessions": state.registry.session_count().await,
        "current_session": state.registry.current_id().await,
        "relay_connected": state.relay.is_connected().await,
        "camera_ready": state.source.get_frames().is_ready(),
    }))
}
