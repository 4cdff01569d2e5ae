//! # api-adapters
//!
//! The JSON surface of the board. Wire types and metrics are framework-free;
//! the axum router sits behind the `web-axum` feature.

pub mod dto;
pub mod metrics;
#[cfg(feature = "web-axum")]
pub mod web;

pub use metrics::{Metrics, Operation, Outcome};
#[cfg(feature = "web-axum")]
pub use web::{router, ApiError, AppState};
