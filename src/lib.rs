//! Stereolink - stereo camera streaming for VR teleoperation
//!
//! This crate provides the core functionality for Stereolink,
//! a server that streams a rectified stereo camera pair to a
//! head-mounted display over WebRTC and relays pose data from
//! the display back to a motorized rig controller over TCP.

pub mod camera;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod relay;
pub mod state;
pub mod web;
pub mod webrtc;

pub use error::{AppError, Result};
