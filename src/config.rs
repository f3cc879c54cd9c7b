use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;

use crate::ledger::rules::LedgerLimits;
use crate::logging::Rotation;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    #[serde(default)]
    pub rotation: Rotation,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub limits: LedgerLimits,
    #[serde(default)]
    pub jobs: JobsConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// Accounts, clients, transactions, archive run claims
    pub primary_url: String,
    /// Daily archive copies
    pub archive_url: String,
    /// Weekly snapshot partitions (defaults to the archive database)
    #[serde(default)]
    pub document_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl DatabaseConfig {
    pub fn document_url(&self) -> &str {
        self.document_url.as_deref().unwrap_or(&self.archive_url)
    }
}

/// Job timing, all UTC
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub archive_expired_at: String,
    pub unarchive_expired_at: String,
    pub daily_archive_at: String,
    pub weekly_snapshot_at: String,
    pub weekly_snapshot_day: String,
    pub daily_archive_enabled: bool,
    pub weekly_snapshot_enabled: bool,
    pub retry_attempts: u32,
    pub retry_backoff_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            archive_expired_at: "00:00".to_string(),
            unarchive_expired_at: "00:30".to_string(),
            daily_archive_at: "01:00".to_string(),
            weekly_snapshot_at: "02:00".to_string(),
            weekly_snapshot_day: "mon".to_string(),
            daily_archive_enabled: true,
            weekly_snapshot_enabled: true,
            retry_attempts: 3,
            retry_backoff_secs: 60,
        }
    }
}

impl AppConfig {
    pub fn load(env: &str) -> anyhow::Result<Self> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", config_path))
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}
