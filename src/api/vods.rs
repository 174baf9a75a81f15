//! Client for the community-curated VOD list.
//!
//! The third-party source has no stable run ids; suggestions are keyed by
//! run position within the event, so the outer list index must line up with
//! the reconciled schedule order.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::models::Vod;

use super::ApiError;

const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Contract consumed by the reconciler for community VOD suggestions.
pub trait VodListClient: Send + Sync {
    /// Suggested VODs for an event, outer list indexed by run position.
    fn suggested_vods(
        &self,
        event_short_name: &str,
    ) -> impl Future<Output = Result<Vec<Vec<Vod>>>> + Send;
}

#[derive(Clone)]
pub struct HttpVodListClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVodListClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

impl VodListClient for HttpVodListClient {
    async fn suggested_vods(&self, event_short_name: &str) -> Result<Vec<Vec<Vod>>> {
        let url = format!("{}/{}.json", self.base_url, event_short_name);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to send GET request to {}", url))?;

        // An event without a community list yet is an empty result, not an error.
        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body).into());
        }

        let text = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", url))?;
        let vods: Vec<Vec<Vod>> = serde_json::from_str(&text)
            .map_err(|e| ApiError::Decode(format!("{}: {}", url, e)))?;
        Ok(vods)
    }
}
