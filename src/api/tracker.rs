//! Client for the donation-tracker REST API.
//!
//! The tracker is the primary upstream: events, runs, bids, and talent.
//! `TrackerClient` is the seam the reconciler consumes; `HttpTrackerClient`
//! is the reqwest implementation.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::warn;

use crate::models::{Bid, Event, Run, Talent};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds. Every upstream call must be bounded so
/// the reconciler can fall back to cached data promptly.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Contract consumed by the schedule reconciler.
pub trait TrackerClient: Send + Sync {
    fn list_events(&self) -> impl Future<Output = Result<Vec<Event>>> + Send;
    fn get_event(&self, id: i64) -> impl Future<Output = Result<Option<Event>>> + Send;
    fn list_runs(&self, event_id: i64) -> impl Future<Output = Result<Vec<Run>>> + Send;
    fn list_bids(&self, event_id: i64) -> impl Future<Output = Result<Vec<Bid>>> + Send;
    fn list_talent(&self, ids: &[i64]) -> impl Future<Output = Result<Vec<Talent>>> + Send;
}

/// List endpoints wrap their results in a paging envelope.
#[derive(Debug, Deserialize)]
struct Paged<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

/// Donation-tracker API client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTrackerClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTrackerClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit
    /// (should retry), or Err for other errors.
    pub(crate) async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            // Rate limited - signal to retry
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    let text = response
                        .text()
                        .await
                        .with_context(|| format!("Failed to read response body from {}", url))?;
                    return serde_json::from_str(&text)
                        .map_err(|e| ApiError::Decode(format!("{}: {}", url, e)).into());
                }
                None => {
                    // Rate limited
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }
}

impl TrackerClient for HttpTrackerClient {
    async fn list_events(&self) -> Result<Vec<Event>> {
        let url = format!("{}/api/v2/events", self.base_url);
        let page: Paged<Event> = self.get_json(&url).await?;
        Ok(page.results)
    }

    async fn get_event(&self, id: i64) -> Result<Option<Event>> {
        let url = format!("{}/api/v2/events/{}", self.base_url, id);
        match self.get_json::<Event>(&url).await {
            Ok(event) => Ok(Some(event)),
            Err(e) if ApiError::is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_runs(&self, event_id: i64) -> Result<Vec<Run>> {
        let url = format!("{}/api/v2/events/{}/runs", self.base_url, event_id);
        let page: Paged<Run> = self.get_json(&url).await?;
        Ok(page.results)
    }

    async fn list_bids(&self, event_id: i64) -> Result<Vec<Bid>> {
        let url = format!("{}/api/v2/events/{}/bids", self.base_url, event_id);
        let page: Paged<Bid> = self.get_json(&url).await?;
        Ok(page.results)
    }

    async fn list_talent(&self, ids: &[i64]) -> Result<Vec<Talent>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/api/v2/talent?ids={}", self.base_url, joined);
        let page: Paged<Talent> = self.get_json(&url).await?;
        Ok(page.results)
    }
}
