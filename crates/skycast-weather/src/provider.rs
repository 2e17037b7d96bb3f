//! Open-Meteo forecast client.
//!
//! Three independent requests (current, hourly for one date, daily), each
//! sent through the retry executor and normalized into typed records.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::error::{classify, ClassifiedError, Failure};
use crate::retry::{with_retry, RetryOptions};
use crate::types::{Coordinates, CurrentWeather, DailyEntry, HourlyEntry, UnitPreferences};

const USER_AGENT: &str = "Skycast/0.1.0";
const CONNECT_TIMEOUT_SECS: u64 = 5;
const MAX_ERROR_BODY: usize = 512;

const HOURLY_INTERVAL_SECS: i64 = 3600;
const DAILY_INTERVAL_SECS: i64 = 86_400;

const CURRENT_VARIABLES: &[&str] = &[
    "temperature_2m",
    "apparent_temperature",
    "relative_humidity_2m",
    "precipitation",
    "wind_speed_10m",
    "wind_direction_10m",
    "weather_code",
    "is_day",
];

const HOURLY_VARIABLES: &[&str] = &[
    "temperature_2m",
    "precipitation_probability",
    "weather_code",
    "wind_speed_10m",
];

const DAILY_VARIABLES: &[&str] = &[
    "weather_code",
    "temperature_2m_max",
    "temperature_2m_min",
    "precipitation_sum",
];

/// Source of forecast data consumed by the orchestrator.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    async fn current(
        &self,
        coords: Coordinates,
        units: &UnitPreferences,
    ) -> Result<CurrentWeather, ClassifiedError>;

    /// Hourly entries for one provider-local calendar day.
    async fn hourly(
        &self,
        coords: Coordinates,
        date: NaiveDate,
        units: &UnitPreferences,
    ) -> Result<Vec<HourlyEntry>, ClassifiedError>;

    async fn daily(
        &self,
        coords: Coordinates,
        units: &UnitPreferences,
    ) -> Result<Vec<DailyEntry>, ClassifiedError>;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    #[serde(default)]
    utc_offset_seconds: i32,
    current: Option<CurrentSection>,
    hourly: Option<HourlySection>,
    daily: Option<DailySection>,
}

#[derive(Debug, Deserialize)]
struct CurrentSection {
    time: i64,
    temperature_2m: f64,
    apparent_temperature: f64,
    relative_humidity_2m: f64,
    precipitation: f64,
    wind_speed_10m: f64,
    wind_direction_10m: f64,
    weather_code: i32,
    is_day: i32,
}

#[derive(Debug, Deserialize)]
struct HourlySection {
    time: Vec<i64>,
    temperature_2m: Vec<Option<f64>>,
    precipitation_probability: Vec<Option<f64>>,
    weather_code: Vec<Option<i32>>,
    wind_speed_10m: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct DailySection {
    time: Vec<i64>,
    weather_code: Vec<Option<i32>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
}

/// HTTP client for the Open-Meteo forecast endpoint.
#[derive(Debug, Clone)]
pub struct ForecastClient {
    client: Client,
    base_url: String,
    retry: RetryOptions,
}

impl ForecastClient {
    pub fn new(base_url: &str, retry: RetryOptions) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            retry,
        })
    }

    #[instrument(skip(self, params), level = "info")]
    async fn fetch(
        &self,
        section: &'static str,
        params: &[(&'static str, String)],
    ) -> Result<ForecastResponse, ClassifiedError> {
        let client = &self.client;
        let url = self.base_url.as_str();

        with_retry(&self.retry, || async move {
            let response = client.get(url).query(params).send().await?;

            let status = response.status();
            if !status.is_success() {
                let mut body = response.text().await.unwrap_or_default();
                body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
                return Err(Failure::Status {
                    status: status.as_u16(),
                    body,
                });
            }

            let bytes = response.bytes().await?;
            let decoded: ForecastResponse = serde_json::from_slice(&bytes)?;
            Ok::<_, Failure>(decoded)
        })
        .await
    }
}

#[async_trait]
impl ForecastSource for ForecastClient {
    async fn current(
        &self,
        coords: Coordinates,
        units: &UnitPreferences,
    ) -> Result<CurrentWeather, ClassifiedError> {
        let response = self.fetch("current", &current_params(coords, units)).await?;
        normalize_current(response)
    }

    async fn hourly(
        &self,
        coords: Coordinates,
        date: NaiveDate,
        units: &UnitPreferences,
    ) -> Result<Vec<HourlyEntry>, ClassifiedError> {
        let response = self
            .fetch("hourly", &hourly_params(coords, date, units))
            .await?;
        normalize_hourly(response)
    }

    async fn daily(
        &self,
        coords: Coordinates,
        units: &UnitPreferences,
    ) -> Result<Vec<DailyEntry>, ClassifiedError> {
        let response = self.fetch("daily", &daily_params(coords, units)).await?;
        normalize_daily(response)
    }
}

fn base_params(coords: Coordinates, units: &UnitPreferences) -> Vec<(&'static str, String)> {
    vec![
        ("latitude", coords.latitude.to_string()),
        ("longitude", coords.longitude.to_string()),
        ("temperature_unit", units.temperature.as_str().to_string()),
        ("wind_speed_unit", units.wind_speed.as_str().to_string()),
        ("timezone", units.timezone.clone()),
        ("timeformat", "unixtime".to_string()),
    ]
}

pub fn current_params(coords: Coordinates, units: &UnitPreferences) -> Vec<(&'static str, String)> {
    let mut params = base_params(coords, units);
    params.push(("current", CURRENT_VARIABLES.join(",")));
    params.push(("precipitation_unit", units.precipitation.as_str().to_string()));
    params
}

/// Hourly request for a single day; precipitation unit is not applicable.
pub fn hourly_params(
    coords: Coordinates,
    date: NaiveDate,
    units: &UnitPreferences,
) -> Vec<(&'static str, String)> {
    let day = date.format("%Y-%m-%d").to_string();
    let mut params = base_params(coords, units);
    params.push(("hourly", HOURLY_VARIABLES.join(",")));
    params.push(("start_date", day.clone()));
    params.push(("end_date", day));
    params
}

pub fn daily_params(coords: Coordinates, units: &UnitPreferences) -> Vec<(&'static str, String)> {
    let mut params = base_params(coords, units);
    params.push(("daily", DAILY_VARIABLES.join(",")));
    params.push(("precipitation_unit", units.precipitation.as_str().to_string()));
    params
}

/// Provider-local calendar date of `instant`.
///
/// Without a known UTC offset the UTC date is used.
pub fn api_date(instant: DateTime<Utc>, utc_offset_seconds: Option<i32>) -> NaiveDate {
    let offset = i64::from(utc_offset_seconds.unwrap_or(0));
    (instant + chrono::Duration::seconds(offset)).date_naive()
}

/// Calendar date of `instant` in the IANA zone named `timezone`.
///
/// Returns `None` for names that are not IANA zones, including "auto".
pub fn zoned_date(instant: DateTime<Utc>, timezone: &str) -> Option<NaiveDate> {
    match timezone.parse::<Tz>() {
        Ok(tz) => Some(instant.with_timezone(&tz).date_naive()),
        Err(_) => {
            tracing::debug!("Unknown timezone {:?}", timezone);
            None
        }
    }
}

/// Timestamp of entry `index` in a series starting at `start` (epoch seconds).
pub fn series_timestamp(start: i64, index: usize, interval: i64) -> Option<DateTime<Utc>> {
    let offset = (index as i64).checked_mul(interval)?;
    DateTime::from_timestamp(start.checked_add(offset)?, 0)
}

fn series_interval(time: &[i64], fallback: i64) -> i64 {
    match time {
        [first, second, ..] if second > first => second - first,
        _ => fallback,
    }
}

fn check_len<T>(
    section: &'static str,
    variable: &str,
    values: &[T],
    expected: usize,
) -> Result<(), ClassifiedError> {
    if values.len() < expected {
        return Err(classify(Failure::Other(format!(
            "Malformed {} data: {} has {} values for {} timestamps",
            section,
            variable,
            values.len(),
            expected
        ))));
    }
    Ok(())
}

fn timestamp_or_err(secs: i64) -> Result<DateTime<Utc>, ClassifiedError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| classify(Failure::Other(format!("Timestamp out of range: {}", secs))))
}

fn normalize_current(response: ForecastResponse) -> Result<CurrentWeather, ClassifiedError> {
    let current = response
        .current
        .ok_or_else(|| classify(Failure::MissingSection("current")))?;

    Ok(CurrentWeather {
        time: timestamp_or_err(current.time)?,
        temperature: current.temperature_2m,
        apparent_temperature: current.apparent_temperature,
        relative_humidity: current.relative_humidity_2m,
        wind_speed: current.wind_speed_10m,
        wind_direction: current.wind_direction_10m,
        precipitation: current.precipitation,
        weather_code: current.weather_code,
        is_day: current.is_day == 1,
        utc_offset_seconds: response.utc_offset_seconds,
    })
}

fn normalize_hourly(response: ForecastResponse) -> Result<Vec<HourlyEntry>, ClassifiedError> {
    let hourly = response
        .hourly
        .ok_or_else(|| classify(Failure::MissingSection("hourly")))?;

    let count = hourly.time.len();
    check_len("hourly", "temperature_2m", &hourly.temperature_2m, count)?;
    check_len("hourly", "precipitation_probability", &hourly.precipitation_probability, count)?;
    check_len("hourly", "weather_code", &hourly.weather_code, count)?;
    check_len("hourly", "wind_speed_10m", &hourly.wind_speed_10m, count)?;

    let Some(&start) = hourly.time.first() else {
        return Ok(Vec::new());
    };
    let interval = series_interval(&hourly.time, HOURLY_INTERVAL_SECS);

    (0..count)
        .map(|i| {
            let time = series_timestamp(start, i, interval)
                .ok_or_else(|| classify(Failure::Other("Hourly timestamp out of range".into())))?;
            Ok(HourlyEntry {
                time,
                temperature: hourly.temperature_2m[i],
                precipitation_probability: hourly.precipitation_probability[i],
                weather_code: hourly.weather_code[i],
                wind_speed: hourly.wind_speed_10m[i],
            })
        })
        .collect()
}

fn normalize_daily(response: ForecastResponse) -> Result<Vec<DailyEntry>, ClassifiedError> {
    let daily = response
        .daily
        .ok_or_else(|| classify(Failure::MissingSection("daily")))?;

    let count = daily.time.len();
    check_len("daily", "weather_code", &daily.weather_code, count)?;
    check_len("daily", "temperature_2m_max", &daily.temperature_2m_max, count)?;
    check_len("daily", "temperature_2m_min", &daily.temperature_2m_min, count)?;
    check_len("daily", "precipitation_sum", &daily.precipitation_sum, count)?;

    let Some(&start) = daily.time.first() else {
        return Ok(Vec::new());
    };
    let interval = series_interval(&daily.time, DAILY_INTERVAL_SECS);
    let offset = Some(response.utc_offset_seconds);

    (0..count)
        .map(|i| {
            let time = series_timestamp(start, i, interval)
                .ok_or_else(|| classify(Failure::Other("Daily timestamp out of range".into())))?;
            Ok(DailyEntry {
                date: api_date(time, offset),
                time,
                weather_code: daily.weather_code[i],
                temperature_max: daily.temperature_2m_max[i],
                temperature_min: daily.temperature_2m_min[i],
                precipitation_sum: daily.precipitation_sum[i],
            })
        })
        .collect()
}

/// Largest char boundary of `s` not after `max`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
