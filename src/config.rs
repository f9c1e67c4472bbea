//! Application configuration
//!
//! Configuration is layered: built-in defaults, then an optional TOML
//! file, then CLI overrides applied in `main`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub web: WebConfig,
    pub camera: CameraConfig,
    pub relay: RelayConfig,
    pub webrtc: WebRtcConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Listen address
    pub bind_address: String,
    /// HTTP port
    pub port: u16,
    /// Directory with the browser client files
    pub static_dir: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            static_dir: "static".to_string(),
        }
    }
}

/// Stereo camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Left eye capture device
    pub left_device: String,
    /// Right eye capture device
    pub right_device: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target frame rate for outgoing tracks
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            left_device: "/dev/video0".to_string(),
            right_device: "/dev/video2".to_string(),
            width: 1280,
            height: 720,
            fps: 30,
        }
    }
}

/// Pose relay (rig controller) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Rig controller host
    pub host: String,
    /// Rig controller port
    pub port: u16,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: "192.168.1.138".to_string(),
            port: 9090,
        }
    }
}

/// WebRTC transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// STUN server URLs (empty = host candidates only)
    pub stun_servers: Vec<String>,
    /// RTP clock rate for video tracks
    pub clock_rate: u32,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![],
            clock_rate: 90000,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Config(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        toml::from_str(&raw).map_err(|e| AppError::Config(format!("Invalid config: {}", e)))
    }

    /// RTP ticks advanced per frame at the configured cadence
    pub fn ticks_per_frame(&self) -> u64 {
        (self.webrtc.clock_rate / self.camera.fps.max(1)) as u64
    }
}
