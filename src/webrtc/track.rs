//! Per-eye video tracks
//!
//! Each eye of the stereo pair gets its own send-only track fed by a
//! frame pump. The pump paces itself to the target frame rate, pulls
//! the latest pair from the source, converts its eye's buffer to the
//! transport layout and stamps a monotone presentation clock.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, error, info};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::camera::{convert::rgb24_to_yuv420, Eye, FrameSource, PixelFormat};
use crate::error::{AppError, Result};

/// Stream ID shared by both eye tracks
const STREAM_ID: &str = "stereolink-stream";

/// Track lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackLifecycle {
    /// Created, pump not started
    Idle,
    /// Pump running
    Streaming,
    /// Pump died on a conversion failure; fatal for this track only
    Errored,
    /// Stopped cleanly
    Closed,
}

impl std::fmt::Display for TrackLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackLifecycle::Idle => write!(f, "idle"),
            TrackLifecycle::Streaming => write!(f, "streaming"),
            TrackLifecycle::Errored => write!(f, "errored"),
            TrackLifecycle::Closed => write!(f, "closed"),
        }
    }
}

/// H264 codec capability for the eye tracks
pub fn eye_codec_capability(clock_rate: u32) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: "video/H264".to_string(),
        clock_rate,
        channels: 0,
        sdp_fmtp_line: "level-asymmetry-allowed=1;packetization-mode=1;profile-level-id=42e01f"
            .to_string(),
        rtcp_feedback: vec![],
    }
}

/// Pull-convert-stamp state for one eye
///
/// Separated from the track so the timing and conversion rules are
/// testable without a peer connection.
pub(crate) struct FramePump {
    source: Arc<dyn FrameSource>,
    eye: Eye,
    ticks_per_frame: u64,
    frame_duration: Duration,
    frame_count: u64,
    presentation_clock: u64,
}

impl FramePump {
    pub(crate) fn new(
        source: Arc<dyn FrameSource>,
        eye: Eye,
        clock_rate: u32,
        target_fps: u32,
    ) -> Self {
        Self {
            source,
            eye,
            ticks_per_frame: (clock_rate / target_fps.max(1)) as u64,
            frame_duration: Duration::from_secs(1) / target_fps.max(1),
            frame_count: 0,
            presentation_clock: 0,
        }
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn presentation_clock(&self) -> u64 {
        self.presentation_clock
    }

    /// Produce the next sample, or `None` when the source has no pair
    /// yet. A not-ready read advances neither the clock nor the count.
    pub(crate) fn next_sample(&mut self) -> Result<Option<Sample>> {
        let pair = self.source.get_frames();
        let Some(buffer) = pair.select(self.eye) else {
            return Ok(None);
        };

        if buffer.format != PixelFormat::Rgb24 {
            return Err(AppError::Track {
                eye: self.eye.to_string(),
                reason: format!("Unexpected source format {}", buffer.format),
            });
        }

        let yuv = rgb24_to_yuv420(buffer.data(), buffer.resolution).map_err(|e| {
            AppError::Track {
                eye: self.eye.to_string(),
                reason: e.to_string(),
            }
        })?;

        // Stamp before advancing: the first sample sits at clock zero
        let sample = Sample {
            data: Bytes::from(yuv),
            duration: self.frame_duration,
            packet_timestamp: self.presentation_clock as u32,
            ..Default::default()
        };

        self.presentation_clock += self.ticks_per_frame;
        self.frame_count += 1;

        Ok(Some(sample))
    }
}

/// Send-only video track for one eye
pub struct EyeTrack {
    eye: Eye,
    track: Arc<TrackLocalStaticSample>,
    running: watch::Sender<bool>,
    lifecycle: watch::Sender<TrackLifecycle>,
}

impl EyeTrack {
    pub fn new(eye: Eye, clock_rate: u32) -> Self {
        let track = Arc::new(TrackLocalStaticSample::new(
            eye_codec_capability(clock_rate),
            format!("{}-eye", eye),
            STREAM_ID.to_string(),
        ));

        let (running, _) = watch::channel(false);
        let (lifecycle, _) = watch::channel(TrackLifecycle::Idle);

        Self {
            eye,
            track,
            running,
            lifecycle,
        }
    }

    /// The underlying track, for adding to a peer connection
    pub fn track_local(&self) -> Arc<dyn TrackLocal + Send + Sync> {
        self.track.clone()
    }

    pub fn eye(&self) -> Eye {
        self.eye
    }

    pub fn lifecycle(&self) -> TrackLifecycle {
        *self.lifecycle.subscribe().borrow()
    }

    pub fn lifecycle_watch(&self) -> watch::Receiver<TrackLifecycle> {
        self.lifecycle.subscribe()
    }

    /// Spawn the pump task
    ///
    /// Paces at 1/target_fps, writes converted samples into the track
    /// and races the running flag against the pacing sleep so `stop`
    /// cancels promptly.
    pub fn start_pump(&self, source: Arc<dyn FrameSource>, clock_rate: u32, target_fps: u32) {
        if *self.running.borrow() {
            return;
        }

        let _ = self.running.send(true);
        let _ = self.lifecycle.send(TrackLifecycle::Streaming);

        let eye = self.eye;
        let track = self.track.clone();
        let lifecycle = self.lifecycle.clone();
        let mut running_rx = self.running.subscribe();
        let mut pump = FramePump::new(source, eye, clock_rate, target_fps);
        let interval = pump.frame_duration;

        info!("Starting {} eye pump at {}fps", eye, target_fps);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = running_rx.changed() => {
                        if !*running_rx.borrow() {
                            let _ = lifecycle.send(TrackLifecycle::Closed);
                            info!("{} eye pump stopped", eye);
                            break;
                        }
                        continue;
                    }
                }

                match pump.next_sample() {
                    Ok(Some(sample)) => {
                        if pump.frame_count() == 1 {
                            debug!("First {} eye frame sent", eye);
                        }
                        if let Err(e) = track.write_sample(&sample).await {
                            debug!("{} eye write_sample failed: {}", eye, e);
                        }
                    }
                    Ok(None) => {
                        // Source not warmed up yet; retry next tick
                        debug!("{} eye frame not ready", eye);
                    }
                    Err(e) => {
                        error!("{} eye pump fatal: {}", eye, e);
                        let _ = lifecycle.send(TrackLifecycle::Errored);
                        break;
                    }
                }
            }
        });
    }

    /// Request pump shutdown; the task notices at its next suspension
    pub fn stop(&self) {
        let _ = self.running.send(false);
    }
}
