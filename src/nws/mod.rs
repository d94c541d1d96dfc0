//! Upstream api.weather.gov client
//!
//! The reference walker reconstructs missing event history by fetching
//! referenced bulletins from `GET /alerts/{capId}`. Only the `properties`
//! subset the walker consumes is modeled; everything else in the response
//! is ignored.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

/// Default upstream endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.weather.gov";

/// Per-request deadline. A slow branch should abort, not stall a worker.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0} for {1}")]
    Status(reqwest::StatusCode, String),
}

/// `GET /alerts/{capId}` response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertResponse {
    pub properties: AlertProperties,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertProperties {
    pub id: String,
    #[serde(default)]
    pub geocode: Geocode,
    #[serde(default)]
    pub parameters: ApiParameters,
    pub sent: DateTime<Utc>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub effective: Option<DateTime<Utc>>,
    #[serde(default)]
    pub references: Vec<ApiReference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct Geocode {
    #[serde(default)]
    pub same: Vec<String>,
    #[serde(default)]
    pub ugc: Vec<String>,
}

/// Upstream `parameters` block. `VTEC` is a list; index 0 is authoritative.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiParameters {
    #[serde(default, rename = "VTEC")]
    pub vtec: Vec<String>,
    #[serde(default, rename = "expiredReferences")]
    pub expired_references: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiReference {
    #[serde(default)]
    pub sender: String,
    pub identifier: String,
    #[serde(default)]
    pub sent: Option<DateTime<Utc>>,
}

/// Fetches one bulletin by CAP identifier. The walker is generic over this
/// trait so its graph traversal can be exercised against canned data.
#[async_trait]
pub trait AlertFetcher: Send + Sync {
    async fn fetch_alert(&self, cap_id: &str) -> Result<AlertProperties, FetchError>;
}

/// Production fetcher against api.weather.gov.
#[derive(Debug, Clone)]
pub struct NwsClient {
    http: reqwest::Client,
    base_url: String,
}

impl NwsClient {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("siren/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, base_url: base_url.into() })
    }
}

#[async_trait]
impl AlertFetcher for NwsClient {
    async fn fetch_alert(&self, cap_id: &str) -> Result<AlertProperties, FetchError> {
        let url = format!("{}/alerts/{}", self.base_url, cap_id);
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FetchError::Status(response.status(), cap_id.to_string()));
        }
        let body: AlertResponse = response.json().await?;
        Ok(body.properties)
    }
}
