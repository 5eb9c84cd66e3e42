use std::time::Duration;

use anyhow::{Context, Result};

use crate::{config::NetworkConfig, provider::DailyTimes};

/// HTTP client for the monthly prayer-times endpoint.
#[derive(Clone, Debug)]
pub struct PrayerTimesClient {
    client: reqwest::Client,
    base_url: String,
}

impl PrayerTimesClient {
    /// Create a new API client with configurable timeouts.
    pub fn new(base_url: impl Into<String>, network_config: &NetworkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(network_config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(network_config.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the month of daily times for a location.
    pub async fn fetch_month(&self, location_id: &str) -> Result<Vec<DailyTimes>> {
        let url = format!(
            "{}/api/diyanet/prayertimes?location_id={}",
            self.base_url,
            location_id.trim()
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to send request to prayer times API")?;

        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("API returned error status: {}", status);
        }

        let data = response
            .json::<Vec<DailyTimes>>()
            .await
            .context("Failed to parse prayer times API response")?;

        tracing::debug!(location_id, days = data.len(), "Fetched monthly prayer times");

        Ok(data)
    }
}
