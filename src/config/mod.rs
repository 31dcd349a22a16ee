//! Configuration management for the DeFi yield tracker.
//!
//! Loads settings from an optional config file, `DYT__`-prefixed environment
//! variables and the legacy variable names of the hosted job.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::pipeline::Dataset;
use crate::storage::ReadErrorPolicy;

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Balance aggregator credentials and target wallet
    #[serde(default)]
    pub balances: BalancesConfig,
    /// Yield aggregator credentials
    #[serde(default)]
    pub opportunities: OpportunitiesConfig,
    /// Blob storage location and read policy
    #[serde(default)]
    pub storage: StorageConfig,
    /// Trigger schedule
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Outbound HTTP behaviour
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancesConfig {
    /// API key, sent as the Basic-auth username with an empty password
    #[serde(default)]
    pub api_key: String,
    /// Wallet address whose app balances are tracked
    #[serde(default)]
    pub address: String,
    /// Network name passed to the provider
    #[serde(default = "default_network")]
    pub network: String,
    #[serde(default = "default_balances_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpportunitiesConfig {
    /// API key, sent in the `x-api-key` header
    #[serde(default)]
    pub api_key: String,
    /// GraphQL endpoint URL
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Azure connection string, `file://<dir>` or `memory://`
    #[serde(default)]
    pub connection_string: String,
    #[serde(default = "default_container")]
    pub container: String,
    /// What to do when a stored table exists but cannot be read
    #[serde(default)]
    pub on_read_error: ReadErrorPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Cron expression with a seconds field, evaluated in UTC
    #[serde(default = "default_cron")]
    pub cron: String,
    /// Run once immediately when the scheduler starts
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,
    /// Lateness tolerated before a fire is reported as past due
    #[serde(default = "default_past_due_grace")]
    pub past_due_grace_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Wait between a provider's warm-up call and the data call
    #[serde(default = "default_settle_delay")]
    pub settle_delay_secs: u64,
    /// Per-request timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

// Default value functions
fn default_network() -> String {
    "Ethereum".to_string()
}

fn default_balances_base_url() -> String {
    "https://api.zapper.xyz".to_string()
}

fn default_container() -> String {
    "defi-tracker".to_string()
}

fn default_cron() -> String {
    "0 0 12 * * *".to_string() // daily at 12:00 UTC
}

fn default_run_on_startup() -> bool {
    true
}

fn default_past_due_grace() -> u64 {
    60
}

fn default_settle_delay() -> u64 {
    10
}

fn default_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from `.env`, config files and environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("DYT"))
            .build()
            .context("Failed to build configuration")?;

        let mut config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Fill empty fields from the variable names used by the hosted job.
    fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |field: &mut String, key: &str| {
            if field.is_empty() {
                if let Some(value) = lookup(key) {
                    *field = value;
                }
            }
        };
        fill(&mut self.balances.api_key, "API_KEY");
        fill(&mut self.balances.address, "ADDRESS");
        fill(&mut self.storage.connection_string, "AzureWebJobsStorage");
    }

    /// Validate the values required to run the given datasets.
    ///
    /// Missing credentials are fatal for the run.
    pub fn validate(&self, datasets: &[Dataset]) -> Result<()> {
        anyhow::ensure!(
            !self.storage.connection_string.is_empty(),
            "storage.connection_string is required"
        );
        anyhow::ensure!(!self.storage.container.is_empty(), "storage.container is required");

        for dataset in datasets {
            match dataset {
                Dataset::Balances => {
                    anyhow::ensure!(!self.balances.api_key.is_empty(), "balances.api_key is required");
                    anyhow::ensure!(!self.balances.address.is_empty(), "balances.address is required");
                    anyhow::ensure!(!self.balances.network.is_empty(), "balances.network is required");
                }
                Dataset::Apy => {
                    anyhow::ensure!(
                        !self.opportunities.api_key.is_empty(),
                        "opportunities.api_key is required"
                    );
                    anyhow::ensure!(
                        !self.opportunities.endpoint.is_empty(),
                        "opportunities.endpoint is required"
                    );
                }
            }
        }

        cron::Schedule::from_str(&self.schedule.cron)
            .map_err(|e| anyhow::anyhow!("invalid schedule.cron '{}': {}", self.schedule.cron, e))?;

        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.http.settle_delay_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

impl Default for BalancesConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            address: String::new(),
            network: default_network(),
            base_url: default_balances_base_url(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            connection_string: String::new(),
            container: default_container(),
            on_read_error: ReadErrorPolicy::default(),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            cron: default_cron(),
            run_on_startup: default_run_on_startup(),
            past_due_grace_secs: default_past_due_grace(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            settle_delay_secs: default_settle_delay(),
            timeout_secs: default_timeout(),
        }
    }
}
