use std::env;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Agent runtime configuration, loaded from TOML with environment overrides
/// (`ADDRESS`, `POLL_INTERVAL`, `REPORT_INTERVAL`, `RATE_LIMIT`, `KEY`).
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Host:port of the collector server.
    #[serde(default = "default_server_address")]
    pub server_address: String,
    /// Sampler tick interval in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Accepted for compatibility with older deployments; the pipeline
    /// delivers each batch as it is produced.
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
    /// Maximum number of concurrent delivery workers.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    /// Shared secret for request signing; unset leaves requests unsigned.
    #[serde(default)]
    pub key: Option<String>,
}

fn default_server_address() -> String {
    "localhost:8080".to_string()
}

fn default_poll_interval_secs() -> u64 {
    2
}

fn default_report_interval_secs() -> u64 {
    10
}

fn default_rate_limit() -> usize {
    1
}

impl AgentConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config: Self = if Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!(path, "config file not found, using defaults");
            toml::from_str("")?
        };
        config.apply_env()?;
        Ok(config)
    }

    fn apply_env(&mut self) -> anyhow::Result<()> {
        if let Ok(address) = env::var("ADDRESS") {
            self.server_address = address;
        }
        if let Ok(raw) = env::var("POLL_INTERVAL") {
            self.poll_interval_secs = raw.parse().context("parsing POLL_INTERVAL")?;
        }
        if let Ok(raw) = env::var("REPORT_INTERVAL") {
            self.report_interval_secs = raw.parse().context("parsing REPORT_INTERVAL")?;
        }
        if let Ok(raw) = env::var("RATE_LIMIT") {
            self.rate_limit = raw.parse().context("parsing RATE_LIMIT")?;
        }
        if let Ok(key) = env::var("KEY") {
            self.key = Some(key);
        }
        Ok(())
    }

    /// Batch-update endpoint derived from the configured server address.
    pub fn endpoint(&self) -> String {
        let address = self.server_address.trim();
        if address.contains("://") {
            format!("{}/updates/", address.trim_end_matches('/'))
        } else {
            format!("http://{address}/updates/")
        }
    }
}
