use std::sync::Arc;

use crate::camera::FrameSource;
use crate::config::AppConfig;
use crate::relay::PoseRelay;
use crate::webrtc::SessionRegistry;

/// Application-wide state shared across handlers
pub struct AppState {
    /// Static configuration
    pub config: AppConfig,
    /// Stereo frame source
    pub source: Arc<dyn FrameSource>,
    /// Pose relay to the rig controller
    pub relay: Arc<PoseRelay>,
    /// HMD session registry
    pub registry: Arc<SessionRegistry>,
}

impl AppState {
    pub fn new(config: AppConfig, source: Arc<dyn FrameSource>, relay: Arc<PoseRelay>) -> Arc<Self> {
        let registry = Arc::new(SessionRegistry::new(
            config.webrtc.clone(),
            config.camera.clone(),
            source.clone(),
            relay.clone(),
        ));

        Arc::new(Self {
            config,
            source,
            relay,
            registry,
        })
    }
}
