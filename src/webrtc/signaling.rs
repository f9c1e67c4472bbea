//! Signaling message types
//!
//! JSON bodies for the offer/answer handshake. The server is the
//! offerer: the client fetches an offer, applies it, and posts its
//! answer back.

use serde::{Deserialize, Serialize};

/// Server-generated offer, returned from `POST /offer`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferResponse {
    pub sdp: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl OfferResponse {
    pub fn new(sdp: String) -> Self {
        Self {
            sdp,
            kind: "offer".to_string(),
        }
    }
}

/// Client answer, posted to `POST /answer`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    pub sdp: String,
    #[serde(rename = "type", default = "answer_kind")]
    pub kind: String,
}

fn answer_kind() -> String {
    "answer".to_string()
}

/// Acknowledgement body for a successfully applied answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerAck {
    pub status: String,
}

impl AnswerAck {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
