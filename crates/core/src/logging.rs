//! Logging initialization and configuration.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Initialize the logging system with tracing.
///
/// `RUST_LOG` takes precedence; otherwise the filter directive from the
/// configuration is used.
///
/// # Example
/// ```
/// let config = lumen_core::LoggingConfig::default();
/// lumen_core::init_logging(&config);
/// tracing::info!("Renderer initialized");
/// ```
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter.as_str()));

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
    // A second initialization keeps the first subscriber.
    if let Err(e) = installed {
        tracing::debug!("Logging already initialized, keeping existing subscriber: {}", e);
    }
}
