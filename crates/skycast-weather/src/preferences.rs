//! Last-used temperature unit and location, kept in the same key-value store
//! as the forecast cache but outside its namespace.

use std::sync::Arc;

use skycast_core::DefaultsConfig;

use crate::store::KeyValueStore;
use crate::types::{Location, TemperatureUnit};

const UNIT_KEY: &str = "prefs:temperature_unit";
const LOCATION_KEY: &str = "prefs:location";

/// Persisted user preferences with configured fallbacks.
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn KeyValueStore>,
    defaults: DefaultsConfig,
}

impl Preferences {
    pub fn new(store: Arc<dyn KeyValueStore>, defaults: DefaultsConfig) -> Self {
        Self { store, defaults }
    }

    pub fn temperature_unit(&self) -> TemperatureUnit {
        match self.read(UNIT_KEY).as_deref() {
            Some("celsius") => TemperatureUnit::Celsius,
            Some("fahrenheit") => TemperatureUnit::Fahrenheit,
            Some(other) => {
                tracing::debug!("Ignoring unrecognized temperature unit {:?}", other);
                self.defaults.temperature_unit
            }
            None => self.defaults.temperature_unit,
        }
    }

    pub fn set_temperature_unit(&self, unit: TemperatureUnit) {
        self.write(UNIT_KEY, unit.as_str());
    }

    pub fn location(&self) -> Location {
        self.read(LOCATION_KEY)
            .and_then(|raw| match serde_json::from_str::<Location>(&raw) {
                Ok(location) => Some(location),
                Err(e) => {
                    tracing::debug!("Ignoring unreadable saved location: {}", e);
                    None
                }
            })
            .unwrap_or_else(|| Location::from(self.defaults.location.clone()))
    }

    pub fn set_location(&self, location: &Location) {
        match serde_json::to_string(location) {
            Ok(raw) => self.write(LOCATION_KEY, &raw),
            Err(e) => tracing::warn!("Failed to serialize location: {}", e),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        self.store.get(key).unwrap_or_else(|e| {
            tracing::warn!("Failed to read preference {}: {}", key, e);
            None
        })
    }

    fn write(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            tracing::warn!("Failed to save preference {}: {}", key, e);
        }
    }
}
