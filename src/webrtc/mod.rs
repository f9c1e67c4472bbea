//! WebRTC transport
//!
//! Session management, per-eye video tracks and the signaling DTOs for
//! the offer/answer handshake.

pub mod registry;
pub mod session;
pub mod signaling;
pub mod track;

pub use registry::SessionRegistry;
pub use session::{ControlEvents, PoseForwarder, RigSession};
pub use signaling::{AnswerAck, AnswerRequest, OfferResponse};
pub use track::{EyeTrack, TrackLifecycle};
