//! Shared foundation for the blit2d rendering layer.
//!
//! This crate provides the application-facing error type and logging
//! initialization used by the higher-level crates.

mod error;
mod logging;

pub use error::{Error, Result};
pub use logging::init_logging;
