//! dialect/crates/domains/src/lib.rs
//!
//! Models, error taxonomy and port definitions shared by every other crate.

pub mod error;
pub mod models;
pub mod path;
pub mod ports;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use path::*;
pub use ports::*;
