use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

/// Configuration for the raw data poller
#[derive(Clone, Debug)]
pub struct RawdataPollerConfig {
    pub url: String,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
}

impl RawdataPollerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

impl Default for RawdataPollerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9000/api/rawdata".to_string(),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Background task that marks the upstream raw data as settled
///
/// Settled means two consecutive polls returned the same element count. Any
/// request or decode failure also ends polling and counts as settled, so a
/// missing proxy API never holds readiness back forever.
pub struct RawdataPoller {
    client: reqwest::Client,
    config: RawdataPollerConfig,
    settled: Arc<AtomicBool>,
}

impl RawdataPoller {
    pub fn new(config: RawdataPollerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build raw data HTTP client")?;

        Ok(Self {
            client,
            config,
            settled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag shared with readers; becomes true once and stays true.
    pub fn settled_flag(&self) -> Arc<AtomicBool> {
        self.settled.clone()
    }

    pub fn spawn(self, cancel_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.worker_loop(cancel_token).await })
    }

    /// Main worker loop
    async fn worker_loop(self, cancel_token: CancellationToken) {
        let period = self.config.poll_interval;
        let mut poll_interval = interval_at(Instant::now() + period, period);

        tracing::info!(
            url = %self.config.url,
            poll_interval_ms = period.as_millis() as u64,
            "Raw data poller started"
        );

        let mut last_element_count = 0usize;
        loop {
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    tracing::info!("Raw data poller shutting down");
                    break;
                }
                _ = poll_interval.tick() => {
                    match self.fetch_element_count().await {
                        Ok(count) if count == last_element_count => {
                            tracing::info!(element_count = count, "Traefik raw data has settled");
                            break;
                        }
                        Ok(count) => {
                            tracing::debug!(
                                element_count = count,
                                previous = last_element_count,
                                "Traefik raw data still changing"
                            );
                            last_element_count = count;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "Error polling Traefik raw data, treating as settled");
                            break;
                        }
                    }
                }
            }
        }

        self.settled.store(true, Ordering::Release);
    }

    async fn fetch_element_count(&self) -> Result<usize> {
        let response = self
            .client
            .get(&self.config.url)
            .send()
            .await
            .context("Error getting data from Traefik API")?
            .error_for_status()
            .context("Traefik API returned an error status")?;

        let elements: HashMap<String, Map<String, Value>> = response
            .json()
            .await
            .context("Error decoding Traefik API response")?;

        Ok(count_elements(&elements))
    }
}

/// Total number of entries across all sections of the raw data document.
pub fn count_elements(elements: &HashMap<String, Map<String, Value>>) -> usize {
    elements.values().map(Map::len).sum()
}
