//! Forward geocoding: turn a place name into candidate locations.
//! Uses the Open-Meteo geocoding API - free, no API key required.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;

use crate::error::{classify, ClassifiedError, Failure};
use crate::types::Location;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const USER_AGENT: &str = "Skycast/0.1.0";
const LANGUAGE: &str = "en";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    id: i64,
    name: String,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    admin1: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
}

impl From<SearchResult> for Location {
    fn from(result: SearchResult) -> Self {
        Self {
            id: result.id,
            name: result.name,
            country: result.country.unwrap_or_default(),
            admin1: result.admin1.filter(|a| !a.is_empty()),
            latitude: result.latitude,
            longitude: result.longitude,
            timezone: result.timezone,
        }
    }
}

/// Location search client. Each search is a single attempt.
#[derive(Debug, Clone)]
pub struct GeocodingClient {
    client: Client,
    base_url: String,
    limit: u32,
}

impl GeocodingClient {
    pub fn new(base_url: &str, limit: u32) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            limit,
        })
    }

    /// Search with the configured result limit.
    pub async fn search(&self, query: &str) -> Result<Vec<Location>, ClassifiedError> {
        self.search_with_limit(query, self.limit).await
    }

    /// Search for up to `limit` places matching `query`.
    ///
    /// A blank query returns no results without touching the network.
    #[instrument(skip(self), level = "info")]
    pub async fn search_with_limit(
        &self,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Location>, ClassifiedError> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let locations = self.request(query, limit).await.map_err(classify)?;
        tracing::info!("Geocoding found {} result(s)", locations.len());
        Ok(locations)
    }

    async fn request(&self, query: &str, limit: u32) -> Result<Vec<Location>, Failure> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("name", query.to_string()),
                ("count", limit.to_string()),
                ("language", LANGUAGE.to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Failure::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        let body: SearchResponse = serde_json::from_slice(&bytes)?;
        Ok(body.results.into_iter().map(Location::from).collect())
    }
}
