//! Balance aggregator REST client.
//!
//! The provider computes app balances asynchronously: a POST to the balances
//! endpoint queues a recomputation for the address, and a GET on the same
//! endpoint returns the latest computed result. The client waits a fixed
//! settle delay between the two.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::BalanceSource;
use super::types::RawBalanceResponse;
use crate::config::Config;
use crate::error::{TrackerError, TrackerResult};

const PROVIDER: &str = "balances";
const BALANCES_PATH: &str = "/v2/balances/apps";

/// Authenticated client for the app balances endpoint.
#[derive(Debug, Clone)]
pub struct BalanceClient {
    http: Client,
    api_key: String,
    base_url: String,
    settle_delay: Duration,
}

impl BalanceClient {
    /// Create a client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_base_url(
            &config.balances.base_url,
            &config.balances.api_key,
            config.settle_delay(),
            config.timeout(),
        )
    }

    /// Create a client against a custom base URL.
    pub fn with_base_url(
        base_url: &str,
        api_key: &str,
        settle_delay: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            settle_delay,
        })
    }

    fn url(&self) -> String {
        format!("{}{}", self.base_url, BALANCES_PATH)
    }

    /// Ask the provider to recompute balances for `address`.
    #[instrument(skip(self), name = "balances_warm_up")]
    async fn warm_up(&self, address: &str, network: &str) -> TrackerResult<()> {
        let response = self
            .http
            .post(self.url())
            .query(&[("addresses[]", address), ("network", network)])
            .basic_auth(&self.api_key, None::<&str>)
            .header("accept", "*/*")
            .send()
            .await
            .map_err(|e| TrackerError::upstream(PROVIDER, e))?;

        ensure_success(response).await?;
        Ok(())
    }

    /// Read the computed balances for `address`.
    #[instrument(skip(self), name = "balances_get")]
    async fn get_balances(&self, address: &str, network: &str) -> TrackerResult<RawBalanceResponse> {
        let response = self
            .http
            .get(self.url())
            .query(&[("addresses[]", address), ("network", network)])
            .basic_auth(&self.api_key, None::<&str>)
            .header("accept", "*/*")
            .send()
            .await
            .map_err(|e| TrackerError::upstream(PROVIDER, e))?;

        let body = ensure_success(response)
            .await?
            .text()
            .await
            .map_err(|e| TrackerError::upstream(PROVIDER, e))?;

        let balances: RawBalanceResponse =
            serde_json::from_str(&body).map_err(TrackerError::extraction)?;

        debug!("Fetched {} app balances", balances.len());
        Ok(balances)
    }
}

#[async_trait]
impl BalanceSource for BalanceClient {
    async fn fetch_balances(
        &self,
        address: &str,
        network: &str,
    ) -> TrackerResult<RawBalanceResponse> {
        self.warm_up(address, network).await?;

        debug!(delay_secs = self.settle_delay.as_secs(), "Waiting for balances to settle");
        tokio::time::sleep(self.settle_delay).await;

        let balances = self.get_balances(address, network).await?;
        info!(apps = balances.len(), "Balances fetched");
        Ok(balances)
    }
}

/// Turn a non-2xx response into an upstream error carrying status and body.
async fn ensure_success(response: Response) -> TrackerResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(TrackerError::upstream(
        PROVIDER,
        format!("HTTP {}: {}", status, body),
    ))
}
