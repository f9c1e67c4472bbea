//! Startup and shutdown sequencing
//!
//! Shutdown order matters: the relay closes first so the actuator stops
//! receiving the instant teardown begins, then the HMD sessions, then
//! the capture hardware. Teardown failures never abort later steps.

use std::sync::Arc;

use tracing::info;

use crate::error::Result;
use crate::state::AppState;

pub struct Lifecycle {
    state: Arc<AppState>,
}

impl Lifecycle {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Bring the subsystems up
    ///
    /// The camera must start; the relay connect is best-effort and a
    /// refused connection leaves pose forwarding disabled.
    pub async fn startup(&self) -> Result<()> {
        self.state.source.start()?;

        let relay_cfg = &self.state.config.relay;
        self.state
            .relay
            .connect(&relay_cfg.host, relay_cfg.port)
            .await;

        Ok(())
    }

    /// Tear everything down in order: relay, sessions, camera
    pub async fn shutdown(&self) {
        info!("Shutting down...");
        self.state.relay.close().await;
        self.state.registry.close_all().await;
        self.state.source.stop();
        info!("Shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Resolution, SyntheticSource};
    use crate::config::AppConfig;
    use crate::relay::PoseRelay;

    fn lifecycle_with_unreachable_relay() -> Lifecycle {
        let mut config = AppConfig::default();
        // Reserved port on loopback; connect will be refused
        config.relay.host = "127.0.0.1".to_string();
        config.relay.port = 1;

        let source = Arc::new(SyntheticSource::new(Resolution::new(4, 4)));
        Lifecycle::new(AppState::new(config, source, Arc::new(PoseRelay::new())))
    }

    #[tokio::test]
    async fn startup_survives_unreachable_relay() {
        let lifecycle = lifecycle_with_unreachable_relay();
        lifecycle.startup().await.unwrap();

        assert!(lifecycle.state.source.get_frames().is_ready());
        assert!(!lifecycle.state.relay.is_connected().await);

        lifecycle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_clears_sessions_and_relay() {
        let lifecycle = lifecycle_with_unreachable_relay();
        lifecycle.startup().await.unwrap();
        lifecycle.state.registry.create_offer().await.unwrap();

        lifecycle.shutdown().await;

        assert_eq!(lifecycle.state.registry.session_count().await, 0);
        assert!(!lifecycle.state.relay.is_connected().await);

        // A second shutdown is harmless
        lifecycle.shutdown().await;
    }
}
