use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use skycast_core::TemperatureUnit;
use skycast_core::LocationConfig;

/// Wind speed unit accepted by the forecast API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WindSpeedUnit {
    #[default]
    Kmh,
    Mph,
    Ms,
    Kn,
}

impl WindSpeedUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Kmh => "kmh",
            Self::Mph => "mph",
            Self::Ms => "ms",
            Self::Kn => "kn",
        }
    }
}

/// Precipitation unit accepted by the forecast API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrecipitationUnit {
    #[default]
    Mm,
    Inch,
}

impl PrecipitationUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mm => "mm",
            Self::Inch => "inch",
        }
    }
}

/// Unit selections for one request. Changing any field changes the cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitPreferences {
    pub temperature: TemperatureUnit,
    pub wind_speed: WindSpeedUnit,
    pub precipitation: PrecipitationUnit,
    /// IANA timezone name, or "auto" to let the provider resolve it
    pub timezone: String,
}

impl Default for UnitPreferences {
    fn default() -> Self {
        Self {
            temperature: TemperatureUnit::Fahrenheit,
            wind_speed: WindSpeedUnit::Kmh,
            precipitation: PrecipitationUnit::Mm,
            timezone: "auto".to_string(),
        }
    }
}

impl UnitPreferences {
    /// Companion units for a temperature choice: imperial pairs with mph and
    /// inches, metric with km/h and millimetres.
    pub fn for_temperature_unit(unit: TemperatureUnit) -> Self {
        match unit {
            TemperatureUnit::Fahrenheit => Self {
                temperature: unit,
                wind_speed: WindSpeedUnit::Mph,
                precipitation: PrecipitationUnit::Inch,
                timezone: "auto".to_string(),
            },
            TemperatureUnit::Celsius => Self {
                temperature: unit,
                wind_speed: WindSpeedUnit::Kmh,
                precipitation: PrecipitationUnit::Mm,
                timezone: "auto".to_string(),
            },
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }
}

/// Geographic coordinates in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A named place, as returned by geocoding search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub country: String,
    pub admin1: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Option<String>,
}

impl Location {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// "Atlanta, Georgia", falling back to the country when there is no region
    pub fn display_name(&self) -> String {
        let region = self
            .admin1
            .as_deref()
            .filter(|r| !r.is_empty() && *r != self.name)
            .unwrap_or(&self.country);
        if region.is_empty() || region == self.name {
            self.name.clone()
        } else {
            format!("{}, {}", self.name, region)
        }
    }
}

impl From<LocationConfig> for Location {
    fn from(config: LocationConfig) -> Self {
        Self {
            id: 0,
            name: config.name,
            country: config.country,
            admin1: config.admin1,
            latitude: config.latitude,
            longitude: config.longitude,
            timezone: config.timezone,
        }
    }
}

/// Current conditions at one observation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentWeather {
    pub time: DateTime<Utc>,
    pub temperature: f64,
    pub apparent_temperature: f64,
    pub relative_humidity: f64,
    pub wind_speed: f64,
    pub wind_direction: f64,
    pub precipitation: f64,
    /// WMO weather interpretation code
    pub weather_code: i32,
    pub is_day: bool,
    /// Offset of the resolved timezone, used to derive provider-local dates
    pub utc_offset_seconds: i32,
}

/// One hour of the hourly forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyEntry {
    pub time: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub precipitation_probability: Option<f64>,
    pub weather_code: Option<i32>,
    pub wind_speed: Option<f64>,
}

/// One day of the daily forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyEntry {
    /// Calendar date in the location's timezone
    pub date: NaiveDate,
    /// Start of that day as an absolute instant
    pub time: DateTime<Utc>,
    pub weather_code: Option<i32>,
    pub temperature_max: Option<f64>,
    pub temperature_min: Option<f64>,
    pub precipitation_sum: Option<f64>,
}
