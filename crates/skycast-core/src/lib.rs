pub mod config;
pub mod error;

pub use config::{
    Config, DefaultsConfig, LocationConfig, RetryConfig, StorageConfig, TemperatureUnit,
    ValidationResult, WeatherConfig,
};
pub use error::{AppError, ConfigError, RusqliteErrorExt, StorageError};

use anyhow::Result;

/// Initialize logging for an embedding application.
///
/// Reads `RUST_LOG`, defaulting to `info`. Fails instead of panicking when a
/// global subscriber is already installed.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))?;

    tracing::info!("Skycast core initialized");
    Ok(())
}
