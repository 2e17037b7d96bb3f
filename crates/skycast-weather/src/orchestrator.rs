//! Acquisition cycles: fresh-cache short-circuit, concurrent fetch of the
//! missing kinds, cache write-back and stale fallback.
//!
//! Only the latest cycle may publish. Each cycle owns a generation number and
//! a [`CancellationToken`]; starting a new cycle cancels the previous token
//! and bumps the generation under the same lock used for publication.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::cache::{CacheKey, CacheStore};
use crate::error::ClassifiedError;
use crate::provider::ForecastSource;
use crate::types::{Coordinates, CurrentWeather, DailyEntry, HourlyEntry, UnitPreferences};

/// Default freshness window for cached forecasts
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(10 * 60);

/// The three independently fetched and cached data kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Current,
    Hourly,
    Daily,
}

impl DataKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of one acquisition cycle
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionRequest {
    pub coordinates: Coordinates,
    pub units: UnitPreferences,
    /// Provider-local day for the hourly forecast
    pub date: NaiveDate,
}

impl AcquisitionRequest {
    pub fn new(coordinates: Coordinates, units: UnitPreferences, date: NaiveDate) -> Self {
        Self {
            coordinates,
            units,
            date,
        }
    }

    /// Cache key for one data kind.
    ///
    /// Hourly keys include the date and omit the precipitation unit, which
    /// the hourly request does not send.
    pub fn cache_key(&self, kind: DataKind) -> CacheKey {
        let builder = CacheKey::builder()
            .field("kind", kind)
            .field("lat", self.coordinates.latitude)
            .field("lon", self.coordinates.longitude)
            .field("temperature_unit", self.units.temperature.as_str())
            .field("wind_speed_unit", self.units.wind_speed.as_str())
            .field("timezone", &self.units.timezone);

        match kind {
            DataKind::Hourly => builder.field("date", self.date.format("%Y-%m-%d")).build(),
            DataKind::Current | DataKind::Daily => builder
                .field("precipitation_unit", self.units.precipitation.as_str())
                .build(),
        }
    }
}

/// A complete set of results for one cycle
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub current: CurrentWeather,
    pub hourly: Vec<HourlyEntry>,
    pub daily: Vec<DailyEntry>,
}

/// Whatever subset of results is available
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialForecast {
    pub current: Option<CurrentWeather>,
    pub hourly: Option<Vec<HourlyEntry>>,
    pub daily: Option<Vec<DailyEntry>>,
}

impl PartialForecast {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.hourly.is_none() && self.daily.is_none()
    }
}

/// Published view of the latest cycle
#[derive(Debug, Clone, Default)]
pub struct WeatherState {
    pub current: Option<CurrentWeather>,
    pub hourly: Option<Vec<HourlyEntry>>,
    pub daily: Option<Vec<DailyEntry>>,
    pub loading: bool,
    /// Some shown value came from the stale fallback
    pub is_stale: bool,
    pub error: Option<ClassifiedError>,
    /// Cycle that last wrote this state
    pub generation: u64,
}

/// Successful cycle outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Acquisition {
    pub forecast: Forecast,
    /// Kinds fetched from the network; empty on a full fresh-cache hit
    pub fetched: Vec<DataKind>,
}

impl Acquisition {
    pub fn from_cache(&self) -> bool {
        self.fetched.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum AcquireError {
    /// The fan-out failed. `stale` holds whatever the fallback found and published.
    #[error("{error}")]
    Fetch {
        error: ClassifiedError,
        stale: PartialForecast,
    },

    /// A newer cycle started; nothing from this one was published.
    #[error("Acquisition superseded by a newer cycle")]
    Superseded,
}

impl AcquireError {
    pub fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Fetch { error, .. } => Some(error),
            Self::Superseded => None,
        }
    }
}

/// Handle for a started cycle
#[derive(Debug, Clone)]
pub struct Cycle {
    generation: u64,
    token: CancellationToken,
}

impl Cycle {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

struct Keys {
    current: CacheKey,
    hourly: CacheKey,
    daily: CacheKey,
}

impl Keys {
    fn for_request(request: &AcquisitionRequest) -> Self {
        Self {
            current: request.cache_key(DataKind::Current),
            hourly: request.cache_key(DataKind::Hourly),
            daily: request.cache_key(DataKind::Daily),
        }
    }
}

/// Coordinates acquisition cycles and publishes their results.
pub struct Orchestrator {
    source: Arc<dyn ForecastSource>,
    cache: CacheStore,
    freshness: Duration,
    active: Mutex<Cycle>,
    state: watch::Sender<WeatherState>,
}

impl Orchestrator {
    pub fn new(source: Arc<dyn ForecastSource>, cache: CacheStore, freshness: Duration) -> Self {
        let (state, _) = watch::channel(WeatherState::default());
        Self {
            source,
            cache,
            freshness,
            active: Mutex::new(Cycle {
                generation: 0,
                token: CancellationToken::new(),
            }),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<WeatherState> {
        self.state.subscribe()
    }

    /// Snapshot of the published state
    pub fn state(&self) -> WeatherState {
        self.state.borrow().clone()
    }

    /// Supersede the active cycle and mark the state as loading.
    pub fn begin_cycle(&self) -> Cycle {
        let mut active = self.active.lock();
        active.token.cancel();
        active.generation += 1;
        active.token = CancellationToken::new();

        let generation = active.generation;
        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
            state.generation = generation;
        });
        active.clone()
    }

    /// Run a full cycle for `request`, superseding any in-flight one.
    pub async fn acquire(&self, request: &AcquisitionRequest) -> Result<Acquisition, AcquireError> {
        let cycle = self.begin_cycle();
        self.run_cycle(&cycle, request).await
    }

    /// Begin a cycle now and run it on the Tokio runtime.
    ///
    /// The cycle is started before this returns, so cycles started in
    /// sequence are ordered even if their tasks are scheduled out of order.
    pub fn spawn(
        self: &Arc<Self>,
        request: AcquisitionRequest,
    ) -> JoinHandle<Result<Acquisition, AcquireError>> {
        let cycle = self.begin_cycle();
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run_cycle(&cycle, &request).await })
    }

    #[instrument(
        skip(self, cycle, request),
        fields(
            generation = cycle.generation,
            lat = request.coordinates.latitude,
            lon = request.coordinates.longitude,
            date = %request.date,
        )
    )]
    pub async fn run_cycle(
        &self,
        cycle: &Cycle,
        request: &AcquisitionRequest,
    ) -> Result<Acquisition, AcquireError> {
        let keys = Keys::for_request(request);

        let fresh = match self.read_fresh(&keys) {
            PartialForecast {
                current: Some(current),
                hourly: Some(hourly),
                daily: Some(daily),
            } => {
                tracing::debug!("All forecast data fresh in cache");
                let forecast = Forecast {
                    current,
                    hourly,
                    daily,
                };
                self.publish_success(cycle, &forecast)?;
                return Ok(Acquisition {
                    forecast,
                    fetched: Vec::new(),
                });
            }
            partial => partial,
        };

        let outcome = tokio::select! {
            biased;
            _ = cycle.token.cancelled() => {
                tracing::debug!("Cycle superseded before fetch completed");
                return Err(AcquireError::Superseded);
            }
            outcome = self.fetch_missing(request, fresh) => outcome,
        };

        match outcome {
            Ok((forecast, fetched)) => {
                for kind in &fetched {
                    match kind {
                        DataKind::Current => self.cache.put(&keys.current, &forecast.current),
                        DataKind::Hourly => self.cache.put(&keys.hourly, &forecast.hourly),
                        DataKind::Daily => self.cache.put(&keys.daily, &forecast.daily),
                    }
                }
                tracing::info!("Fetched {} forecast kind(s) from network", fetched.len());
                self.publish_success(cycle, &forecast)?;
                Ok(Acquisition { forecast, fetched })
            }
            Err(error) => {
                let stale = self.read_stale(&keys);
                tracing::warn!(
                    "Forecast fetch failed ({}); stale fallback {}",
                    error,
                    if stale.is_empty() { "empty" } else { "available" }
                );
                self.publish_failure(cycle, &error, &stale)?;
                Err(AcquireError::Fetch { error, stale })
            }
        }
    }

    fn read_fresh(&self, keys: &Keys) -> PartialForecast {
        PartialForecast {
            current: self.cache.get_fresh(&keys.current, self.freshness),
            hourly: self.cache.get_fresh(&keys.hourly, self.freshness),
            daily: self.cache.get_fresh(&keys.daily, self.freshness),
        }
    }

    fn read_stale(&self, keys: &Keys) -> PartialForecast {
        PartialForecast {
            current: self.cache.get_stale(&keys.current),
            hourly: self.cache.get_stale(&keys.hourly),
            daily: self.cache.get_stale(&keys.daily),
        }
    }

    /// Fetch every kind not already fresh, concurrently. The first failure wins.
    async fn fetch_missing(
        &self,
        request: &AcquisitionRequest,
        fresh: PartialForecast,
    ) -> Result<(Forecast, Vec<DataKind>), ClassifiedError> {
        let coords = request.coordinates;
        let units = &request.units;
        let date = request.date;
        let source = self.source.as_ref();
        let PartialForecast {
            current: cached_current,
            hourly: cached_hourly,
            daily: cached_daily,
        } = fresh;

        let current = async move {
            match cached_current {
                Some(cached) => Ok((cached, false)),
                None => source.current(coords, units).await.map(|v| (v, true)),
            }
        };
        let hourly = async move {
            match cached_hourly {
                Some(cached) => Ok((cached, false)),
                None => source.hourly(coords, date, units).await.map(|v| (v, true)),
            }
        };
        let daily = async move {
            match cached_daily {
                Some(cached) => Ok((cached, false)),
                None => source.daily(coords, units).await.map(|v| (v, true)),
            }
        };

        let ((current, current_fetched), (hourly, hourly_fetched), (daily, daily_fetched)) =
            tokio::try_join!(current, hourly, daily)?;

        let fetched = [
            (DataKind::Current, current_fetched),
            (DataKind::Hourly, hourly_fetched),
            (DataKind::Daily, daily_fetched),
        ]
        .into_iter()
        .filter_map(|(kind, fetched)| fetched.then_some(kind))
        .collect();

        Ok((
            Forecast {
                current,
                hourly,
                daily,
            },
            fetched,
        ))
    }

    /// Apply `update` if `cycle` is still the active one.
    fn publish(
        &self,
        cycle: &Cycle,
        update: impl FnOnce(&mut WeatherState),
    ) -> Result<(), AcquireError> {
        let active = self.active.lock();
        if active.generation != cycle.generation {
            tracing::debug!(
                "Discarding result of cycle {} (active: {})",
                cycle.generation,
                active.generation
            );
            return Err(AcquireError::Superseded);
        }

        self.state.send_modify(|state| {
            update(state);
            state.loading = false;
            state.generation = cycle.generation;
        });
        Ok(())
    }

    fn publish_success(&self, cycle: &Cycle, forecast: &Forecast) -> Result<(), AcquireError> {
        self.publish(cycle, |state| {
            state.current = Some(forecast.current.clone());
            state.hourly = Some(forecast.hourly.clone());
            state.daily = Some(forecast.daily.clone());
            state.is_stale = false;
            state.error = None;
        })
    }

    fn publish_failure(
        &self,
        cycle: &Cycle,
        error: &ClassifiedError,
        stale: &PartialForecast,
    ) -> Result<(), AcquireError> {
        self.publish(cycle, |state| {
            if let Some(current) = &stale.current {
                state.current = Some(current.clone());
            }
            if let Some(hourly) = &stale.hourly {
                state.hourly = Some(hourly.clone());
            }
            if let Some(daily) = &stale.daily {
                state.daily = Some(daily.clone());
            }
            state.is_stale = !stale.is_empty();
            state.error = Some(error.clone());
        })
    }
}
