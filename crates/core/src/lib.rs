//! Core utilities for the lumen renderer.
//!
//! This crate provides foundational types shared by every other crate:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Configuration loading

mod config;
mod error;
mod logging;
mod timer;

pub use config::{CameraConfig, Config, LightConfig, LoggingConfig, RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
