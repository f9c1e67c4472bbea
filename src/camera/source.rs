//! Frame sources
//!
//! A `FrameSource` hands out the most recent stereo pair on demand.
//! Reads are non-blocking and "latest wins": a slow consumer misses
//! intermediate pairs instead of queueing them. Publication replaces
//! the whole pair atomically, so a reader never sees one eye from an
//! old capture and the other from a new one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::config::CameraConfig;
use crate::error::{AppError, Result};

use super::convert::yuyv_to_rgb24;
use super::format::{PixelFormat, Resolution};
use super::frame::{FramePair, PixelBuffer};

/// Number of mmap capture buffers per device
const BUFFER_COUNT: u32 = 2;
/// Delay before reopening devices after a capture error
const REOPEN_DELAY: Duration = Duration::from_secs(1);

/// Source of synchronized stereo frame pairs
pub trait FrameSource: Send + Sync {
    /// Begin producing frames. May spawn a background acquisition worker.
    fn start(&self) -> Result<()>;

    /// Latest available pair, non-blocking. Returns an empty pair until
    /// the first capture completes.
    fn get_frames(&self) -> FramePair;

    /// Release hardware resources. Idempotent and best-effort; never
    /// fails even if the source was never started.
    fn stop(&self);
}

/// Lock-free holder for the latest published pair
struct FrameCell {
    pair: ArcSwap<FramePair>,
}

impl FrameCell {
    fn new() -> Self {
        Self {
            pair: ArcSwap::from_pointee(FramePair::empty()),
        }
    }

    fn publish(&self, pair: FramePair) {
        self.pair.store(Arc::new(pair));
    }

    fn load(&self) -> FramePair {
        FramePair::clone(&self.pair.load())
    }
}

/// Stereo source backed by two V4L2 capture devices
///
/// One blocking worker drives both devices so a published pair always
/// comes from the same acquisition round.
pub struct V4l2StereoSource {
    config: CameraConfig,
    cell: Arc<FrameCell>,
    stop_flag: Arc<AtomicBool>,
    worker: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl V4l2StereoSource {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            cell: Arc::new(FrameCell::new()),
            stop_flag: Arc::new(AtomicBool::new(false)),
            worker: Mutex::new(None),
        }
    }

    fn resolution(&self) -> Resolution {
        Resolution::new(self.config.width, self.config.height)
    }
}

impl FrameSource for V4l2StereoSource {
    fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        info!(
            "Starting stereo capture: left={} right={} {}",
            self.config.left_device,
            self.config.right_device,
            self.resolution()
        );

        self.stop_flag.store(false, Ordering::SeqCst);

        let config = self.config.clone();
        let cell = self.cell.clone();
        let stop_flag = self.stop_flag.clone();

        let handle = std::thread::Builder::new()
            .name("stereo-capture".to_string())
            .spawn(move || capture_loop(config, cell, stop_flag))
            .map_err(|e| AppError::Camera(format!("Failed to spawn capture worker: {}", e)))?;

        *worker = Some(handle);
        Ok(())
    }

    fn get_frames(&self) -> FramePair {
        self.cell.load()
    }

    fn stop(&self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().take() {
            // Best effort: the worker drops the devices when it notices
            // the flag. A hung device must not block shutdown.
            drop(handle);
            info!("Stereo capture stop requested");
        }
    }
}

/// Main acquisition loop (runs on the blocking worker thread)
fn capture_loop(config: CameraConfig, cell: Arc<FrameCell>, stop_flag: Arc<AtomicBool>) {
    let resolution = Resolution::new(config.width, config.height);

    while !stop_flag.load(Ordering::SeqCst) {
        if let Err(e) = run_capture(&config, resolution, &cell, &stop_flag) {
            warn!("Capture error, reopening devices: {}", e);
            std::thread::sleep(REOPEN_DELAY);
        }
    }

    info!("Capture worker stopped");
}

/// Open both devices and capture until stopped or a device fails
fn run_capture(
    config: &CameraConfig,
    resolution: Resolution,
    cell: &FrameCell,
    stop_flag: &AtomicBool,
) -> Result<()> {
    let left_dev = open_device(&config.left_device, resolution, config.fps)?;
    let right_dev = open_device(&config.right_device, resolution, config.fps)?;

    let mut left = Stream::with_buffers(&left_dev, Type::VideoCapture, BUFFER_COUNT)
        .map_err(|e| AppError::Camera(format!("Failed to start left stream: {}", e)))?;
    let mut right = Stream::with_buffers(&right_dev, Type::VideoCapture, BUFFER_COUNT)
        .map_err(|e| AppError::Camera(format!("Failed to start right stream: {}", e)))?;

    info!("Stereo capture running at {}", resolution);

    while !stop_flag.load(Ordering::SeqCst) {
        let left_buf = capture_eye(&mut left, resolution)?;
        let right_buf = capture_eye(&mut right, resolution)?;
        cell.publish(FramePair::ready(left_buf, right_buf));
    }

    Ok(())
}

fn open_device(path: &str, resolution: Resolution, fps: u32) -> Result<Device> {
    let device = Device::with_path(path)
        .map_err(|e| AppError::Camera(format!("Failed to open {}: {}", path, e)))?;

    let requested = v4l::Format::new(
        resolution.width,
        resolution.height,
        PixelFormat::Yuyv.to_fourcc(),
    );
    let actual = device
        .set_format(&requested)
        .map_err(|e| AppError::Camera(format!("Failed to set format on {}: {}", path, e)))?;
    if PixelFormat::from_fourcc(actual.fourcc) != Some(PixelFormat::Yuyv) {
        return Err(AppError::Camera(format!(
            "{} does not support YUYV capture",
            path
        )));
    }

    if fps > 0 {
        let params = v4l::video::capture::Parameters::with_fps(fps);
        if let Err(e) = device.set_params(&params) {
            debug!("Failed to set {}fps on {}: {}", fps, path, e);
        }
    }

    Ok(device)
}

fn capture_eye(stream: &mut Stream<'_>, resolution: Resolution) -> Result<PixelBuffer> {
    let (buf, _meta) = stream
        .next()
        .map_err(|e| AppError::Camera(format!("Capture read failed: {}", e)))?;
    let rgb = yuyv_to_rgb24(buf, resolution)?;
    Ok(PixelBuffer::from_vec(rgb, resolution, PixelFormat::Rgb24))
}

/// Synthetic stereo source for bring-up and tests
///
/// Produces flat-shaded pairs with distinguishable left/right content
/// (dark left, bright right) at whatever rate the consumer asks.
pub struct SyntheticSource {
    resolution: Resolution,
    cell: Arc<FrameCell>,
    started: AtomicBool,
}

impl SyntheticSource {
    pub fn new(resolution: Resolution) -> Self {
        Self {
            resolution,
            cell: Arc::new(FrameCell::new()),
            started: AtomicBool::new(false),
        }
    }

    fn flat(&self, fill: u8) -> PixelBuffer {
        let size = PixelFormat::Rgb24.frame_size(self.resolution);
        PixelBuffer::from_vec(vec![fill; size], self.resolution, PixelFormat::Rgb24)
    }
}

impl FrameSource for SyntheticSource {
    fn start(&self) -> Result<()> {
        if !self.started.swap(true, Ordering::SeqCst) {
            self.cell
                .publish(FramePair::ready(self.flat(0), self.flat(255)));
            info!("Synthetic stereo source started at {}", self.resolution);
        }
        Ok(())
    }

    fn get_frames(&self) -> FramePair {
        self.cell.load()
    }

    fn stop(&self) {
        self.started.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_until_first_publish() {
        let cell = FrameCell::new();
        assert!(!cell.load().is_ready());

        let res = Resolution::new(4, 2);
        let buf = |fill| {
            PixelBuffer::from_vec(
                vec![fill; PixelFormat::Rgb24.frame_size(res)],
                res,
                PixelFormat::Rgb24,
            )
        };
        cell.publish(FramePair::ready(buf(1), buf(2)));

        let pair = cell.load();
        assert!(pair.is_ready());
        assert!(pair.left().is_some() && pair.right().is_some());
    }

    #[test]
    fn publish_replaces_whole_pair() {
        let cell = FrameCell::new();
        let res = Resolution::new(4, 2);
        let buf = |fill| {
            PixelBuffer::from_vec(
                vec![fill; PixelFormat::Rgb24.frame_size(res)],
                res,
                PixelFormat::Rgb24,
            )
        };

        cell.publish(FramePair::ready(buf(1), buf(1)));
        cell.publish(FramePair::ready(buf(2), buf(2)));

        let pair = cell.load();
        assert_eq!(pair.left().unwrap().data()[0], 2);
        assert_eq!(pair.right().unwrap().data()[0], 2);
    }

    #[test]
    fn synthetic_source_lifecycle() {
        let source = SyntheticSource::new(Resolution::new(4, 2));
        assert!(!source.get_frames().is_ready());

        source.start().unwrap();
        let pair = source.get_frames();
        assert!(pair.is_ready());
        assert_eq!(pair.left().unwrap().data()[0], 0);
        assert_eq!(pair.right().unwrap().data()[0], 255);

        // stop is idempotent
        source.stop();
        source.stop();
    }
}
