//! gazectl Common Utilities
//!
//! Shared infrastructure for all gazectl crates:
//! - Error taxonomy and result aliases
//! - Session clock, rate control, and latency measurement
//! - Tracing/logging initialization
//! - Configuration loading and validation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
