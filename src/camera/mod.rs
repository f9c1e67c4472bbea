//! Stereo camera capture
//!
//! A hardware-backed frame source produces rectified left/right frame
//! pairs. Acquisition runs on its own blocking worker; each completed
//! pair is published wholesale so readers never observe one eye from an
//! old capture and the other from a new one.

pub mod convert;
pub mod format;
pub mod frame;
pub mod source;

pub use format::{PixelFormat, Resolution};
pub use frame::{Eye, FramePair, PixelBuffer};
pub use source::{FrameSource, SyntheticSource, V4l2StereoSource};
