//! Yield aggregator GraphQL client.
//!
//! Fetches the chain directory first, waits the settle delay, then fetches the
//! full opportunity list. Both queries share the `x-api-key` header.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::OpportunitySource;
use super::types::*;
use crate::config::Config;
use crate::error::{TrackerError, TrackerResult};

const PROVIDER: &str = "opportunities";

pub const CHAINS_QUERY: &str = "query Chains { chains { id name } }";

pub const OPPORTUNITIES_QUERY: &str = "query Opportunities { \
    opportunities { apr categories chainId farm { slug } depositTokens { displayName } } \
}";

/// Authenticated GraphQL client for the yield aggregator.
#[derive(Debug, Clone)]
pub struct OpportunityClient {
    http: Client,
    api_key: String,
    endpoint: String,
    settle_delay: Duration,
}

impl OpportunityClient {
    /// Create a client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_endpoint(
            &config.opportunities.endpoint,
            &config.opportunities.api_key,
            config.settle_delay(),
            config.timeout(),
        )
    }

    /// Create a client against a custom GraphQL endpoint.
    pub fn with_endpoint(
        endpoint: &str,
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
            endpoint: endpoint.to_string(),
            settle_delay,
        })
    }

    /// Post one GraphQL query and unwrap its `data` member.
    async fn query<T: DeserializeOwned>(&self, query: &str) -> TrackerResult<T> {
        let response = self
            .http
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .json(&GraphQlRequest { query })
            .send()
            .await
            .map_err(|e| TrackerError::upstream(PROVIDER, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::upstream(
                PROVIDER,
                format!("HTTP {}: {}", status, body),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| TrackerError::upstream(PROVIDER, e))?;
        let envelope: GraphQlResponse<T> =
            serde_json::from_str(&body).map_err(TrackerError::extraction)?;

        if !envelope.errors.is_empty() {
            let messages: Vec<&str> = envelope.errors.iter().map(|e| e.message.as_str()).collect();
            return Err(TrackerError::upstream(PROVIDER, messages.join("; ")));
        }

        envelope
            .data
            .ok_or_else(|| TrackerError::upstream(PROVIDER, "response carried no data"))
    }

    #[instrument(skip(self), name = "yield_get_chains")]
    pub async fn get_chain_directory(&self) -> TrackerResult<ChainDirectory> {
        let data: ChainsData = self.query(CHAINS_QUERY).await?;
        debug!("Fetched {} chains", data.chains.len());
        Ok(ChainDirectory::from(data.chains))
    }

    #[instrument(skip(self), name = "yield_get_opportunities")]
    pub async fn get_opportunities(&self) -> TrackerResult<RawOpportunityResponse> {
        let data: RawOpportunityResponse = self.query(OPPORTUNITIES_QUERY).await?;
        debug!("Fetched {} opportunities", data.opportunities.len());
        Ok(data)
    }
}

#[async_trait]
impl OpportunitySource for OpportunityClient {
    async fn fetch_opportunities(&self) -> TrackerResult<(ChainDirectory, RawOpportunityResponse)> {
        let chains = self.get_chain_directory().await?;

        debug!(delay_secs = self.settle_delay.as_secs(), "Waiting before opportunities query");
        tokio::time::sleep(self.settle_delay).await;

        let opportunities = self.get_opportunities().await?;
        info!(
            chains = chains.len(),
            opportunities = opportunities.opportunities.len(),
            "Opportunities fetched"
        );
        Ok((chains, opportunities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OpportunityClient {
        OpportunityClient::with_endpoint(
            &format!("{}/graphql", server.uri()),
            "yield-key",
            Duration::ZERO,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    async fn mount_chains(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("x-api-key", "yield-key"))
            .and(body_string_contains("chains"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "chains": [{ "id": 1, "name": "Ethereum" }, { "id": 8453, "name": "Base" }] }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_fetch_chains_then_opportunities() {
        let server = MockServer::start().await;
        mount_chains(&server).await;

        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("x-api-key", "yield-key"))
            .and(body_string_contains("opportunities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "opportunities": [{
                    "apr": 0.0532,
                    "categories": ["lending"],
                    "chainId": 8453,
                    "farm": { "slug": "moonwell" },
                    "depositTokens": [{ "displayName": "USDC" }]
                }] }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let (chains, raw) = client(&server).fetch_opportunities().await.unwrap();
        assert_eq!(chains.name(8453), Some("Base"));
        assert_eq!(raw.opportunities.len(), 1);
        assert_eq!(raw.opportunities[0]["farm"]["slug"], "moonwell");
    }

    #[tokio::test]
    async fn test_chain_query_failure_aborts() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(body_string_contains("chains"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_string_contains("opportunities"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server).fetch_opportunities().await.unwrap_err();
        assert!(matches!(err, TrackerError::UpstreamRequest { .. }));
    }

    #[tokio::test]
    async fn test_graphql_errors_are_upstream_errors() {
        let server = MockServer::start().await;
        mount_chains(&server).await;

        Mock::given(method("POST"))
            .and(body_string_contains("opportunities"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": null,
                "errors": [{ "message": "rate limited" }]
            })))
            .mount(&server)
            .await;

        let err = client(&server).fetch_opportunities().await.unwrap_err();
        match err {
            TrackerError::UpstreamRequest { message, .. } => assert_eq!(message, "rate limited"),
            other => panic!("expected upstream error, got {other:?}"),
        }
    }
}
