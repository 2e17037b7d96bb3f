//! Session driver: owns the (location, unit, date, refresh) tuple and starts a
//! new acquisition cycle whenever any part of it changes.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::orchestrator::{
    AcquireError, Acquisition, AcquisitionRequest, Orchestrator, WeatherState,
};
use crate::preferences::Preferences;
use crate::provider::zoned_date;
use crate::types::{Location, TemperatureUnit, UnitPreferences};

/// Provider-local date of `instant` at `location`.
///
/// Uses the location's IANA zone when it has one, else the UTC date.
pub fn local_date(location: &Location, instant: DateTime<Utc>) -> NaiveDate {
    location
        .timezone
        .as_deref()
        .and_then(|tz| zoned_date(instant, tz))
        .unwrap_or_else(|| instant.date_naive())
}

/// Handle to a spawned acquisition cycle
pub type CycleHandle = JoinHandle<Result<Acquisition, AcquireError>>;

/// The inputs that drive acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub location: Location,
    pub temperature_unit: TemperatureUnit,
    pub date: NaiveDate,
    /// Bumped by every manual retry
    pub refresh: u64,
}

impl Selection {
    pub fn units(&self) -> UnitPreferences {
        let units = UnitPreferences::for_temperature_unit(self.temperature_unit);
        match &self.location.timezone {
            Some(tz) if !tz.is_empty() => units.with_timezone(tz.clone()),
            _ => units,
        }
    }

    pub fn request(&self) -> AcquisitionRequest {
        AcquisitionRequest::new(self.location.coordinates(), self.units(), self.date)
    }
}

/// Weather session for one presentation layer.
///
/// Mutators spawn onto the current Tokio runtime and must be called from
/// within one.
pub struct WeatherSession {
    orchestrator: Arc<Orchestrator>,
    preferences: Preferences,
    selection: Mutex<Selection>,
}

impl WeatherSession {
    /// Restore the last location and unit, else the configured defaults.
    pub fn new(orchestrator: Arc<Orchestrator>, preferences: Preferences) -> Self {
        let location = preferences.location();
        let selection = Selection {
            date: local_date(&location, Utc::now()),
            location,
            temperature_unit: preferences.temperature_unit(),
            refresh: 0,
        };

        Self {
            orchestrator,
            preferences,
            selection: Mutex::new(selection),
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection.lock().clone()
    }

    pub fn state(&self) -> WeatherState {
        self.orchestrator.state()
    }

    pub fn subscribe(&self) -> watch::Receiver<WeatherState> {
        self.orchestrator.subscribe()
    }

    /// Today at the selected location.
    pub fn today(&self) -> NaiveDate {
        local_date(&self.selection.lock().location, Utc::now())
    }

    /// Start a cycle for the current selection (initial load).
    pub fn load(&self) -> CycleHandle {
        self.update(|_| {})
    }

    pub fn set_location(&self, location: Location) -> CycleHandle {
        tracing::info!("Location changed to {}", location.display_name());
        self.preferences.set_location(&location);
        self.update(move |selection| selection.location = location)
    }

    pub fn set_temperature_unit(&self, unit: TemperatureUnit) -> CycleHandle {
        self.preferences.set_temperature_unit(unit);
        self.update(move |selection| selection.temperature_unit = unit)
    }

    pub fn select_date(&self, date: NaiveDate) -> CycleHandle {
        self.update(move |selection| selection.date = date)
    }

    /// Manually retry, even when nothing else changed.
    pub fn retry(&self) -> CycleHandle {
        self.update(|selection| selection.refresh += 1)
    }

    fn update(&self, change: impl FnOnce(&mut Selection)) -> CycleHandle {
        // Held while starting so cycles begin in selection order
        let mut selection = self.selection.lock();
        change(&mut *selection);
        self.orchestrator.spawn(selection.request())
    }
}
