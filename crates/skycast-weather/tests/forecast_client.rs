//! Integration tests for ForecastClient using wiremock.
//!
//! These tests verify request parameters, response normalization and retry
//! behavior against a mock HTTP server.

use std::time::Duration;

use chrono::NaiveDate;
use skycast_weather::{
    Coordinates, ErrorKind, ForecastClient, ForecastSource, RetryOptions, TemperatureUnit,
    UnitPreferences,
};
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const FORECAST_PATH: &str = "/v1/forecast";

/// Fast retries so tests finish quickly
fn fast_retry(max_retries: u32) -> RetryOptions {
    RetryOptions::new(max_retries, 1, 5)
        .with_jitter(false)
        .with_timeout(Duration::from_secs(5))
}

fn client(server: &MockServer, retry: RetryOptions) -> ForecastClient {
    ForecastClient::new(&format!("{}{}", server.uri(), FORECAST_PATH), retry).unwrap()
}

fn atlanta() -> Coordinates {
    Coordinates::new(33.749, -84.388)
}

fn current_body() -> serde_json::Value {
    serde_json::json!({
        "latitude": 33.75,
        "longitude": -84.39,
        "utc_offset_seconds": -14400,
        "timezone": "America/New_York",
        "current": {
            "time": 1_717_250_400,
            "interval": 900,
            "temperature_2m": 78.4,
            "apparent_temperature": 80.1,
            "relative_humidity_2m": 62,
            "precipitation": 0.0,
            "wind_speed_10m": 6.3,
            "wind_direction_10m": 225,
            "weather_code": 2,
            "is_day": 1
        }
    })
}

fn hourly_body() -> serde_json::Value {
    let start = 1_717_214_400i64;
    let time: Vec<i64> = (0..24).map(|i| start + i * 3600).collect();
    serde_json::json!({
        "utc_offset_seconds": -14400,
        "hourly": {
            "time": time,
            "temperature_2m": vec![70.0; 24],
            "precipitation_probability": vec![10; 24],
            "weather_code": vec![1; 24],
            "wind_speed_10m": vec![4.5; 24]
        }
    })
}

fn daily_body() -> serde_json::Value {
    let start = 1_717_214_400i64;
    let time: Vec<i64> = (0..7).map(|i| start + i * 86_400).collect();
    serde_json::json!({
        "utc_offset_seconds": -14400,
        "daily": {
            "time": time,
            "weather_code": [0, 1, 2, 3, 45, 61, 95],
            "temperature_2m_max": [85.0, 86.0, 87.0, 88.0, 89.0, 90.0, 91.0],
            "temperature_2m_min": [65.0, 66.0, 67.0, 68.0, 69.0, 70.0, 71.0],
            "precipitation_sum": [0.0, 0.0, 0.1, 0.0, 0.0, 0.5, 1.2]
        }
    })
}

#[tokio::test]
async fn test_current_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .and(query_param("latitude", "33.749"))
        .and(query_param("longitude", "-84.388"))
        .and(query_param("temperature_unit", "fahrenheit"))
        .and(query_param("wind_speed_unit", "mph"))
        .and(query_param("precipitation_unit", "inch"))
        .and(query_param("timeformat", "unixtime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let units = UnitPreferences::for_temperature_unit(TemperatureUnit::Fahrenheit);
    let current = client(&mock_server, fast_retry(3))
        .current(atlanta(), &units)
        .await
        .unwrap();

    assert_eq!(current.time.timestamp(), 1_717_250_400);
    assert_eq!(current.temperature, 78.4);
    assert_eq!(current.wind_direction, 225.0);
    assert_eq!(current.weather_code, 2);
    assert!(current.is_day);
    assert_eq!(current.utc_offset_seconds, -14400);
}

#[tokio::test]
async fn test_hourly_requests_single_day() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .and(query_param("start_date", "2024-06-01"))
        .and(query_param("end_date", "2024-06-01"))
        .and(query_param_is_missing("precipitation_unit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(hourly_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    let hourly = client(&mock_server, fast_retry(3))
        .hourly(atlanta(), date, &UnitPreferences::default())
        .await
        .unwrap();

    assert_eq!(hourly.len(), 24);
    assert_eq!(hourly[0].time.timestamp(), 1_717_214_400);
    assert_eq!(hourly[2].time.timestamp(), 1_717_214_400 + 7200);
    assert_eq!(hourly[5].precipitation_probability, Some(10.0));
}

#[tokio::test]
async fn test_daily_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .and(query_param(
            "daily",
            "weather_code,temperature_2m_max,temperature_2m_min,precipitation_sum",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(daily_body()))
        .mount(&mock_server)
        .await;

    let daily = client(&mock_server, fast_retry(3))
        .daily(atlanta(), &UnitPreferences::default())
        .await
        .unwrap();

    assert_eq!(daily.len(), 7);
    // 2024-06-01T04:00:00Z is local midnight at UTC-4
    assert_eq!(daily[0].date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
    assert_eq!(daily[6].date, NaiveDate::from_ymd_opt(2024, 6, 7).unwrap());
    assert_eq!(daily[6].precipitation_sum, Some(1.2));
}

#[tokio::test]
async fn test_server_error_retried_until_budget_exhausted() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("Service Unavailable"))
        .expect(4)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, fast_retry(3))
        .current(atlanta(), &UnitPreferences::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Http5xx);
    assert_eq!(err.status, Some(503));
}

#[tokio::test]
async fn test_server_error_then_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(daily_body()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let daily = client(&mock_server, fast_retry(3))
        .daily(atlanta(), &UnitPreferences::default())
        .await
        .unwrap();

    assert_eq!(daily.len(), 7);
}

#[tokio::test]
async fn test_client_error_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": true,
            "reason": "Latitude must be in range of -90 to 90°."
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, fast_retry(3))
        .current(atlanta(), &UnitPreferences::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Http4xx);
    assert_eq!(err.status, Some(400));
    assert_eq!(err.message, "Client error (400)");
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(current_body())
                .set_delay(Duration::from_millis(500)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let retry = fast_retry(1).with_timeout(Duration::from_millis(100));
    let err = client(&mock_server, retry)
        .current(atlanta(), &UnitPreferences::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Timeout);
    assert!(err.message.contains("100ms"));
}

#[tokio::test]
async fn test_missing_section_is_unknown_and_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "latitude": 33.75,
            "longitude": -84.39,
            "utc_offset_seconds": 0
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, fast_retry(3))
        .hourly(
            atlanta(),
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            &UnitPreferences::default(),
        )
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unknown);
    assert_eq!(err.message, "Missing hourly data in response");
}

#[tokio::test]
async fn test_invalid_json_is_unknown() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(FORECAST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let err = client(&mock_server, fast_retry(3))
        .daily(atlanta(), &UnitPreferences::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Unknown);
}

#[tokio::test]
async fn test_unreachable_host_is_network() {
    // Nothing listens on the discard port
    let client = ForecastClient::new("http://127.0.0.1:9/v1/forecast", fast_retry(1)).unwrap();

    let err = client
        .current(atlanta(), &UnitPreferences::default())
        .await
        .unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert!(std::error::Error::source(&err).is_some());
}
