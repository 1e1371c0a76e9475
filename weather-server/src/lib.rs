//! HTTP surface of the weather backend.
//!
//! The binary (`weather`) lives in `main.rs`; this library exposes the router
//! so integration tests can drive it without opening sockets.

pub mod api;
pub mod telemetry;

pub use api::{AppState, router};
