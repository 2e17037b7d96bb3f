//! Shared fake forecast source for integration tests.
//!
//! The fake echoes the request latitude as the temperature so tests can tell
//! which cycle's data was published.

#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;
use skycast_weather::{
    ClassifiedError, Coordinates, CurrentWeather, DailyEntry, DataKind, ForecastSource,
    HourlyEntry, UnitPreferences,
};

#[derive(Default)]
pub struct FakeSource {
    calls: Mutex<Vec<DataKind>>,
    failures: Mutex<HashMap<DataKind, ClassifiedError>>,
    /// Artificial latency keyed by latitude bits
    delays: Mutex<HashMap<u64, Duration>>,
}

impl FakeSource {
    pub fn fail(&self, kind: DataKind, error: ClassifiedError) {
        self.failures.lock().insert(kind, error);
    }

    pub fn fail_all(&self, error: ClassifiedError) {
        for kind in [DataKind::Current, DataKind::Hourly, DataKind::Daily] {
            self.fail(kind, error.clone());
        }
    }

    pub fn delay(&self, latitude: f64, delay: Duration) {
        self.delays.lock().insert(latitude.to_bits(), delay);
    }

    pub fn calls(&self) -> Vec<DataKind> {
        let mut calls = self.calls.lock().clone();
        calls.sort_by_key(|k| k.as_str());
        calls
    }

    async fn enter(&self, kind: DataKind, coords: Coordinates) -> Result<(), ClassifiedError> {
        self.calls.lock().push(kind);
        let delay = self.delays.lock().get(&coords.latitude.to_bits()).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.failures.lock().get(&kind) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ForecastSource for FakeSource {
    async fn current(
        &self,
        coords: Coordinates,
        _units: &UnitPreferences,
    ) -> Result<CurrentWeather, ClassifiedError> {
        self.enter(DataKind::Current, coords).await?;
        Ok(current(coords.latitude))
    }

    async fn hourly(
        &self,
        coords: Coordinates,
        date: NaiveDate,
        _units: &UnitPreferences,
    ) -> Result<Vec<HourlyEntry>, ClassifiedError> {
        self.enter(DataKind::Hourly, coords).await?;
        Ok(hourly(coords.latitude, date))
    }

    async fn daily(
        &self,
        coords: Coordinates,
        _units: &UnitPreferences,
    ) -> Result<Vec<DailyEntry>, ClassifiedError> {
        self.enter(DataKind::Daily, coords).await?;
        Ok(daily(coords.latitude))
    }
}

pub fn current(temperature: f64) -> CurrentWeather {
    CurrentWeather {
        time: chrono::DateTime::from_timestamp(1_717_250_400, 0).unwrap(),
        temperature,
        apparent_temperature: temperature,
        relative_humidity: 50.0,
        wind_speed: 3.0,
        wind_direction: 90.0,
        precipitation: 0.0,
        weather_code: 1,
        is_day: true,
        utc_offset_seconds: 0,
    }
}

pub fn hourly(temperature: f64, date: NaiveDate) -> Vec<HourlyEntry> {
    let start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
    (0..24)
        .map(|h| HourlyEntry {
            time: start + chrono::Duration::hours(h),
            temperature: Some(temperature),
            precipitation_probability: Some(0.0),
            weather_code: Some(0),
            wind_speed: Some(2.0),
        })
        .collect()
}

pub fn daily(temperature: f64) -> Vec<DailyEntry> {
    vec![DailyEntry {
        date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
        time: chrono::DateTime::from_timestamp(1_717_200_000, 0).unwrap(),
        weather_code: Some(3),
        temperature_max: Some(temperature + 5.0),
        temperature_min: Some(temperature - 5.0),
        precipitation_sum: Some(0.0),
    }]
}
