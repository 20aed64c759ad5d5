//! Error types for the renderer.

use thiserror::Error;

/// Top-level error type shared by the application-facing crates.
#[derive(Error, Debug)]
pub enum Error {
    /// Graphics API failure, already formatted with the failing call.
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or surface errors.
    #[error("Window error: {0}")]
    Window(String),

    /// Scene data errors.
    #[error("Scene error: {0}")]
    Scene(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Result type alias using the renderer's Error type.
pub type Result<T> = std::result::Result<T, Error>;
