use std::env;
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

/// Server configuration, loaded from TOML with environment overrides
/// (`ADDRESS`, `STORE_INTERVAL`, `FILE_STORAGE_PATH`, `RESTORE`,
/// `DATABASE_PATH`, `KEY`).
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_address")]
    pub address: String,
    /// Snapshot flush interval in seconds; zero or negative makes every
    /// mutation flush synchronously.
    #[serde(default = "default_store_interval_secs")]
    pub store_interval_secs: i64,
    /// Snapshot file path; empty disables snapshot durability.
    #[serde(default = "default_file_storage_path")]
    pub file_storage_path: String,
    /// Restore state from the snapshot file on startup.
    #[serde(default = "default_restore")]
    pub restore: bool,
    /// SQLite database path; when set, the relational backend replaces the
    /// in-memory store and the snapshot file.
    #[serde(default)]
    pub database_path: Option<String>,
    /// Shared secret for request verification and response signing.
    #[serde(default)]
    pub key: Option<String>,
}

fn default_address() -> String {
    "localhost:8080".to_string()
}

fn default_store_interval_secs() -> i64 {
    300
}

fn default_file_storage_path() -> String {
    "/tmp/pushmon-db.json".to_string()
}

fn default_restore() -> bool {
    true
}

impl ServerConfig {
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
            self.address = address;
        }
        if let Ok(raw) = env::var("STORE_INTERVAL") {
            self.store_interval_secs = raw.parse().context("parsing STORE_INTERVAL")?;
        }
        if let Ok(path) = env::var("FILE_STORAGE_PATH") {
            self.file_storage_path = path;
        }
        if let Ok(raw) = env::var("RESTORE") {
            self.restore = raw.parse().context("parsing RESTORE")?;
        }
        if let Ok(path) = env::var("DATABASE_PATH") {
            self.database_path = Some(path);
        }
        if let Ok(key) = env::var("KEY") {
            self.key = Some(key);
        }
        Ok(())
    }

    /// Synchronous durability applies when no flush interval is configured
    /// and a snapshot file is in play.
    pub fn sync_save(&self) -> bool {
        self.store_interval_secs <= 0 && !self.file_storage_path.is_empty()
    }
}
