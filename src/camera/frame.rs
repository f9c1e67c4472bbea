//! Stereo frame data structures

use bytes::Bytes;
use std::fmt;

use super::format::{PixelFormat, Resolution};

/// Which half of a stereo pair a buffer or track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl fmt::Display for Eye {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Eye::Left => write!(f, "left"),
            Eye::Right => write!(f, "right"),
        }
    }
}

/// A single captured image plane with metadata
///
/// Data is immutable once constructed; clones share the underlying
/// allocation.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    data: Bytes,
    pub resolution: Resolution,
    pub format: PixelFormat,
}

impl PixelBuffer {
    pub fn new(data: Bytes, resolution: Resolution, format: PixelFormat) -> Self {
        Self {
            data,
            resolution,
            format,
        }
    }

    pub fn from_vec(data: Vec<u8>, resolution: Resolution, format: PixelFormat) -> Self {
        Self::new(Bytes::from(data), resolution, format)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A synchronized left/right capture
///
/// Either both eyes are present or neither is; a one-sided pair is not
/// representable. `empty()` models a camera that has not produced its
/// first capture yet.
#[derive(Debug, Clone, Default)]
pub struct FramePair {
    frames: Option<(PixelBuffer, PixelBuffer)>,
}

impl FramePair {
    /// A pair with no frames (camera not warmed up)
    pub fn empty() -> Self {
        Self { frames: None }
    }

    /// A completed capture of both eyes
    pub fn ready(left: PixelBuffer, right: PixelBuffer) -> Self {
        Self {
            frames: Some((left, right)),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.frames.is_some()
    }

    pub fn left(&self) -> Option<&PixelBuffer> {
        self.frames.as_ref().map(|(l, _)| l)
    }

    pub fn right(&self) -> Option<&PixelBuffer> {
        self.frames.as_ref().map(|(_, r)| r)
    }

    /// Select the buffer for one eye
    pub fn select(&self, eye: Eye) -> Option<&PixelBuffer> {
        match eye {
            Eye::Left => self.left(),
            Eye::Right => self.right(),
        }
    }
}
