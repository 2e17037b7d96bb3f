//! Weather acquisition pipeline for Skycast
//!
//! Fetches current, hourly and daily forecasts from Open-Meteo with per-call
//! retry, caches results in a local key-value store and falls back to stale
//! data when the network is unavailable.

pub mod cache;
pub mod error;
pub mod geocode;
pub mod orchestrator;
pub mod preferences;
pub mod provider;
pub mod retry;
pub mod session;
pub mod store;
pub mod types;

pub use cache::{CacheEntry, CacheKey, CacheStore};
pub use error::{classify, ClassifiedError, ErrorKind, Failure};
pub use geocode::GeocodingClient;
pub use orchestrator::{
    AcquireError, Acquisition, AcquisitionRequest, Cycle, DataKind, Forecast, Orchestrator,
    PartialForecast, WeatherState, DEFAULT_FRESHNESS,
};
pub use preferences::Preferences;
pub use provider::{api_date, zoned_date, ForecastClient, ForecastSource};
pub use retry::{with_retry, RetryOptions};
pub use session::{local_date, CycleHandle, Selection, WeatherSession};
pub use store::{KeyValueStore, MemoryStore, SqliteStore};
pub use types::*;

use std::sync::Arc;
use std::time::Duration;

use skycast_core::{AppError, Config, ConfigError};

/// Everything a presentation layer needs to show weather for a place.
pub struct WeatherServices {
    pub session: WeatherSession,
    pub geocoder: GeocodingClient,
}

/// Build ready-to-use services from application config.
///
/// Opens the SQLite store at `storage.cache_path` and wires the forecast
/// client, preferences and orchestrator. The session spawns acquisition
/// cycles, so call it inside a Tokio runtime.
pub fn open(config: &Config) -> Result<WeatherServices, AppError> {
    let validation = config.validate();
    if !validation.is_valid() {
        return Err(ConfigError::Invalid(validation.error_summary()).into());
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteStore::open(&config.storage.cache_path)?);
    let weather = &config.weather;

    let client = ForecastClient::new(&weather.forecast_url, RetryOptions::from(&weather.retry))
        .map_err(|e| AppError::Network(e.to_string()))?;
    let geocoder = GeocodingClient::new(&weather.geocoding_url, weather.geocoding_limit)
        .map_err(|e| AppError::Network(e.to_string()))?;
    let freshness = Duration::from_secs(u64::from(weather.freshness_minutes) * 60);
    let orchestrator =
        Orchestrator::new(Arc::new(client), CacheStore::new(store.clone()), freshness);

    let preferences = Preferences::new(store, config.defaults.clone());
    tracing::info!(
        "Weather session opened (cache: {})",
        config.storage.cache_path.display()
    );
    Ok(WeatherServices {
        session: WeatherSession::new(Arc::new(orchestrator), preferences),
        geocoder,
    })
}
