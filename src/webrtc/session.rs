//! WebRTC session for one HMD client
//!
//! A session owns the peer connection, both eye tracks and the pose
//! control channel. The server is the offerer: it creates the channel
//! and transceivers up front so the generated offer already describes
//! the full topology.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

use crate::camera::{Eye, FrameSource};
use crate::config::{CameraConfig, WebRtcConfig};
use crate::error::{AppError, Result};
use crate::relay::PoseRelay;

use super::track::EyeTrack;

/// Label of the control channel carrying pose messages
const CONTROL_CHANNEL: &str = "poseData";

/// Observer for control-channel events
#[async_trait]
pub trait ControlEvents: Send + Sync {
    async fn on_open(&self, channel: Arc<RTCDataChannel>);
    async fn on_message(&self, text: &str);
    async fn on_close(&self);
}

/// Forwards inbound pose messages to the relay, fire-and-forget
pub struct PoseForwarder {
    relay: Arc<PoseRelay>,
    channel: Mutex<Option<Arc<RTCDataChannel>>>,
}

impl PoseForwarder {
    pub fn new(relay: Arc<PoseRelay>) -> Self {
        Self {
            relay,
            channel: Mutex::new(None),
        }
    }

    pub async fn is_open(&self) -> bool {
        self.channel.lock().await.is_some()
    }
}

#[async_trait]
impl ControlEvents for PoseForwarder {
    async fn on_open(&self, channel: Arc<RTCDataChannel>) {
        info!("Control channel '{}' open", channel.label());
        *self.channel.lock().await = Some(channel.clone());

        // Best-effort ack so the client knows the pose path is live
        let ack = r#"{"type":"ack","status":"connected"}"#;
        if let Err(e) = channel.send_text(ack).await {
            debug!("Control channel ack failed: {}", e);
        }
    }

    async fn on_message(&self, text: &str) {
        self.relay.send(text).await;
    }

    async fn on_close(&self) {
        info!("Control channel closed");
        *self.channel.lock().await = None;
    }
}

/// One peer connection serving the stereo rig view
pub struct RigSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pc: Arc<RTCPeerConnection>,
    left: Arc<EyeTrack>,
    right: Arc<EyeTrack>,
    state_rx: watch::Receiver<RTCPeerConnectionState>,
    closed: AtomicBool,
}

impl RigSession {
    pub async fn new(
        webrtc_config: &WebRtcConfig,
        camera_config: &CameraConfig,
        source: Arc<dyn FrameSource>,
        control: Arc<dyn ControlEvents>,
    ) -> Result<Self> {
        let id = Uuid::new_v4();

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::MediaNegotiation(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(|e| {
            AppError::MediaNegotiation(format!("Failed to register interceptors: {}", e))
        })?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = webrtc_config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .collect();

        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(|e| {
                AppError::MediaNegotiation(format!("Failed to create peer connection: {}", e))
            })?,
        );

        let (state_tx, state_rx) = watch::channel(RTCPeerConnectionState::New);
        {
            let state_tx = state_tx.clone();
            pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                info!("Session {} connection state: {}", id, s);
                let _ = state_tx.send(s);
                Box::pin(async {})
            }));
        }

        let left = Arc::new(EyeTrack::new(Eye::Left, webrtc_config.clock_rate));
        let right = Arc::new(EyeTrack::new(Eye::Right, webrtc_config.clock_rate));

        let transceiver_init = || {
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Sendonly,
                send_encodings: vec![],
            })
        };
        for track in [&left, &right] {
            pc.add_transceiver_from_track(track.track_local(), transceiver_init())
                .await
                .map_err(|e| {
                    AppError::MediaNegotiation(format!("Failed to add eye track: {}", e))
                })?;
        }

        // Unordered retransmission makes no sense for pose updates; the
        // newest message always supersedes the older ones.
        let channel = pc
            .create_data_channel(
                CONTROL_CHANNEL,
                Some(RTCDataChannelInit {
                    ordered: Some(true),
                    max_retransmits: Some(0),
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| {
                AppError::MediaNegotiation(format!("Failed to create control channel: {}", e))
            })?;

        wire_control_channel(channel, control);

        // Start the eye pumps once media can actually flow
        {
            let left = left.clone();
            let right = right.clone();
            let source = source.clone();
            let clock_rate = webrtc_config.clock_rate;
            let fps = camera_config.fps;
            let mut state_rx = state_rx.clone();
            tokio::spawn(async move {
                while state_rx.changed().await.is_ok() {
                    if *state_rx.borrow() == RTCPeerConnectionState::Connected {
                        left.start_pump(source.clone(), clock_rate, fps);
                        right.start_pump(source.clone(), clock_rate, fps);
                        break;
                    }
                }
            });
        }

        Ok(Self {
            id,
            created_at: Utc::now(),
            pc,
            left,
            right,
            state_rx,
            closed: AtomicBool::new(false),
        })
    }

    /// Create the local offer and wait for ICE gathering to complete so
    /// the SDP already carries the host candidates.
    pub async fn create_offer(&self) -> Result<String> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(|e| AppError::MediaNegotiation(format!("Failed to create offer: {}", e)))?;

        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc.set_local_description(offer).await.map_err(|e| {
            AppError::MediaNegotiation(format!("Failed to set local description: {}", e))
        })?;
        let _ = gather_complete.recv().await;

        let local = self.pc.local_description().await.ok_or_else(|| {
            AppError::MediaNegotiation("Local description missing after gathering".to_string())
        })?;

        Ok(local.sdp)
    }

    /// Apply the client's answer
    pub async fn apply_answer(&self, sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp)
            .map_err(|e| AppError::MediaNegotiation(format!("Invalid SDP answer: {}", e)))?;

        self.pc.set_remote_description(answer).await.map_err(|e| {
            AppError::MediaNegotiation(format!("Failed to set remote description: {}", e))
        })?;

        info!("Session {} answer applied", self.id);
        Ok(())
    }

    pub fn connection_state(&self) -> RTCPeerConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the pumps and close the transport. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.left.stop();
        self.right.stop();

        if let Err(e) = self.pc.close().await {
            warn!("Session {} close failed: {}", self.id, e);
        } else {
            info!("Session {} closed", self.id);
        }
    }
}

fn wire_control_channel(channel: Arc<RTCDataChannel>, control: Arc<dyn ControlEvents>) {
    {
        let control = control.clone();
        let dc = channel.clone();
        channel.on_open(Box::new(move || {
            let control = control.clone();
            let dc = dc.clone();
            Box::pin(async move {
                control.on_open(dc).await;
            })
        }));
    }

    {
        let control = control.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let control = control.clone();
            Box::pin(async move {
                let text = String::from_utf8_lossy(&msg.data).into_owned();
                control.on_message(&text).await;
            })
        }));
    }

    channel.on_close(Box::new(move || {
        let control = control.clone();
        Box::pin(async move {
            control.on_close().await;
        })
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Resolution, SyntheticSource};
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::sync::mpsc;
    use tokio::time::timeout;
    use webrtc::data_channel::data_channel_state::RTCDataChannelState;

    fn test_source() -> Arc<SyntheticSource> {
        let source = Arc::new(SyntheticSource::new(Resolution::new(4, 4)));
        source.start().unwrap();
        source
    }

    #[tokio::test]
    async fn forwarder_sends_messages_to_relay() {
        let relay = Arc::new(PoseRelay::new());
        let (tx, mut rx) = tokio::io::duplex(256);
        relay.attach(Box::new(tx)).await;

        let forwarder = PoseForwarder::new(relay);
        forwarder.on_message(r#"{"type":"pose"}"#).await;

        let mut buf = vec![0u8; 64];
        let n = rx.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"{\"type\":\"pose\"}\n");
    }

    #[tokio::test]
    async fn forwarder_without_relay_sink_is_silent() {
        let forwarder = PoseForwarder::new(Arc::new(PoseRelay::new()));
        forwarder.on_message("ignored").await;
        assert!(!forwarder.is_open().await);
        forwarder.on_close().await;
    }

    #[tokio::test]
    async fn session_offer_describes_two_video_tracks() {
        let relay = Arc::new(PoseRelay::new());
        let control = Arc::new(PoseForwarder::new(relay));
        let session = RigSession::new(
            &WebRtcConfig::default(),
            &CameraConfig::default(),
            test_source(),
            control,
        )
        .await
        .unwrap();

        let sdp = session.create_offer().await.unwrap();
        assert_eq!(sdp.matches("m=video").count(), 2);
        assert!(sdp.contains("m=application"));

        session.close().await;
        assert!(session.is_closed());
        // close is idempotent
        session.close().await;
    }

    #[tokio::test]
    async fn channel_message_reaches_relay_sink() {
        let relay = Arc::new(PoseRelay::new());
        let (sink, mut sink_rx) = tokio::io::duplex(256);
        relay.attach(Box::new(sink)).await;

        let control = Arc::new(PoseForwarder::new(relay));
        let session = RigSession::new(
            &WebRtcConfig::default(),
            &CameraConfig::default(),
            test_source(),
            control,
        )
        .await
        .unwrap();
        let offer_sdp = session.create_offer().await.unwrap();

        // In-process HMD stand-in answering over loopback
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).unwrap();
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();
        let client = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();

        let (dc_tx, mut dc_rx) = mpsc::channel::<Arc<RTCDataChannel>>(1);
        let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(4);
        client.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let dc_tx = dc_tx.clone();
            let inbound_tx = inbound_tx.clone();
            Box::pin(async move {
                dc.on_message(Box::new(move |msg: DataChannelMessage| {
                    let inbound_tx = inbound_tx.clone();
                    Box::pin(async move {
                        let _ = inbound_tx
                            .send(String::from_utf8_lossy(&msg.data).into_owned())
                            .await;
                    })
                }));
                let _ = dc_tx.send(dc).await;
            })
        }));

        client
            .set_remote_description(RTCSessionDescription::offer(offer_sdp).unwrap())
            .await
            .unwrap();
        let answer = client.create_answer(None).await.unwrap();
        let mut gather = client.gathering_complete_promise().await;
        client.set_local_description(answer).await.unwrap();
        let _ = gather.recv().await;
        let answer_sdp = client.local_description().await.unwrap().sdp;

        session.apply_answer(answer_sdp).await.unwrap();

        let channel = timeout(Duration::from_secs(10), dc_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(channel.label(), "poseData");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while channel.ready_state() != RTCDataChannelState::Open {
            assert!(
                tokio::time::Instant::now() < deadline,
                "control channel never opened"
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        // Server acks the open before any pose traffic flows
        let ack = timeout(Duration::from_secs(10), inbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(ack.contains(r#""type":"ack""#));

        channel.send_text("ping").await.unwrap();

        // Exactly the channel payload plus the newline delimiter
        let mut buf = vec![0u8; 64];
        let n = timeout(Duration::from_secs(10), sink_rx.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..n], b"ping\n");

        session.close().await;
        client.close().await.unwrap();
    }

    #[tokio::test]
    async fn garbage_answer_is_a_negotiation_error() {
        let relay = Arc::new(PoseRelay::new());
        let control = Arc::new(PoseForwarder::new(relay));
        let session = RigSession::new(
            &WebRtcConfig::default(),
            &CameraConfig::default(),
            test_source(),
            control,
        )
        .await
        .unwrap();

        let result = session.apply_answer("not an sdp".to_string()).await;
        assert!(matches!(result, Err(AppError::MediaNegotiation(_))));

        session.close().await;
    }
}
