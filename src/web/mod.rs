//! HTTP surface: signaling endpoints, status and the static client

pub mod handlers;
pub mod routes;

pub use routes::create_router;
