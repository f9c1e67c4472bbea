//! Session registry
//!
//! Tracks every live session and designates one as current. The
//! signaling handshake is single-slot: a new offer supersedes the
//! previous current session but does not close it, so an HMD that is
//! still draining its old connection keeps working while the new one
//! negotiates.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::camera::FrameSource;
use crate::config::{CameraConfig, WebRtcConfig};
use crate::error::{AppError, Result};
use crate::relay::PoseRelay;

use super::session::{PoseForwarder, RigSession};
use super::signaling::{AnswerAck, AnswerRequest, OfferResponse};

#[derive(Default)]
struct Inner {
    current: Option<Arc<RigSession>>,
    live: Vec<Arc<RigSession>>,
}

/// Registry of HMD sessions
pub struct SessionRegistry {
    webrtc_config: WebRtcConfig,
    camera_config: CameraConfig,
    source: Arc<dyn FrameSource>,
    relay: Arc<PoseRelay>,
    inner: RwLock<Inner>,
}

impl SessionRegistry {
    pub fn new(
        webrtc_config: WebRtcConfig,
        camera_config: CameraConfig,
        source: Arc<dyn FrameSource>,
        relay: Arc<PoseRelay>,
    ) -> Self {
        Self {
            webrtc_config,
            camera_config,
            source,
            relay,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// Build a new session and return its offer
    ///
    /// On success the session becomes current and joins the live set; a
    /// failed build or offer registers nothing.
    pub async fn create_offer(&self) -> Result<OfferResponse> {
        let control = Arc::new(PoseForwarder::new(self.relay.clone()));
        let session = Arc::new(
            RigSession::new(
                &self.webrtc_config,
                &self.camera_config,
                self.source.clone(),
                control,
            )
            .await?,
        );

        let sdp = session.create_offer().await?;

        let mut inner = self.inner.write().await;
        if let Some(previous) = inner.current.replace(session.clone()) {
            info!(
                "Session {} superseded by {} (left open)",
                previous.id, session.id
            );
        }
        inner.live.push(session.clone());
        info!(
            "Session {} created, {} live session(s)",
            session.id,
            inner.live.len()
        );

        Ok(OfferResponse::new(sdp))
    }

    /// Apply the client's answer to the current session
    pub async fn apply_answer(&self, request: AnswerRequest) -> Result<AnswerAck> {
        let session = {
            let inner = self.inner.read().await;
            inner.current.clone().ok_or(AppError::NoActiveSession)?
        };

        session.apply_answer(request.sdp).await?;
        Ok(AnswerAck::ok())
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.live.len()
    }

    pub async fn current_id(&self) -> Option<Uuid> {
        self.inner.read().await.current.as_ref().map(|s| s.id)
    }

    /// Close every live session and forget all of them
    pub async fn close_all(&self) {
        let sessions = {
            let mut inner = self.inner.write().await;
            inner.current = None;
            std::mem::take(&mut inner.live)
        };

        if sessions.is_empty() {
            return;
        }

        info!("Closing {} session(s)", sessions.len());
        join_all(sessions.iter().map(|s| s.close())).await;

        for session in &sessions {
            if !session.is_closed() {
                warn!("Session {} did not close cleanly", session.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Resolution, SyntheticSource};

    fn registry() -> SessionRegistry {
        let source = Arc::new(SyntheticSource::new(Resolution::new(4, 4)));
        source.start().unwrap();
        SessionRegistry::new(
            WebRtcConfig::default(),
            CameraConfig::default(),
            source,
            Arc::new(PoseRelay::new()),
        )
    }

    #[tokio::test]
    async fn answer_without_offer_is_rejected() {
        let registry = registry();
        let result = registry
            .apply_answer(AnswerRequest {
                sdp: "v=0".to_string(),
                kind: "answer".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::NoActiveSession)));
    }

    #[tokio::test]
    async fn new_offer_supersedes_without_closing() {
        let registry = registry();

        registry.create_offer().await.unwrap();
        let first_id = registry.current_id().await.unwrap();

        registry.create_offer().await.unwrap();
        let second_id = registry.current_id().await.unwrap();

        assert_ne!(first_id, second_id);
        assert_eq!(registry.session_count().await, 2);

        // The superseded session is still live and not closed
        let inner = registry.inner.read().await;
        let first = inner.live.iter().find(|s| s.id == first_id).unwrap();
        assert!(!first.is_closed());
        drop(inner);

        registry.close_all().await;
    }

    #[tokio::test]
    async fn close_all_empties_the_registry() {
        let registry = registry();
        registry.create_offer().await.unwrap();
        registry.create_offer().await.unwrap();

        let sessions: Vec<_> = registry.inner.read().await.live.clone();
        registry.close_all().await;

        assert_eq!(registry.session_count().await, 0);
        assert!(registry.current_id().await.is_none());
        assert!(sessions.iter().all(|s| s.is_closed()));

        // Registry is back to the no-session state
        let result = registry
            .apply_answer(AnswerRequest {
                sdp: "v=0".to_string(),
                kind: "answer".to_string(),
            })
            .await;
        assert!(matches!(result, Err(AppError::NoActiveSession)));
    }
}
