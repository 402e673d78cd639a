//! Agent configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration, read from `TUNER_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Name reported in structured logs
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// API server port for entries/health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Control loop period in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Let values already in the store win over compiled-in defaults
    #[serde(default)]
    pub persistent: bool,

    /// JSON snapshot of persistent entries, loaded on start and saved on shutdown
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "tuning-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_tick_interval() -> u64 {
    20
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            tick_interval_ms: default_tick_interval(),
            persistent: false,
            store_path: None,
        }
    }
}

impl AgentConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("TUNER").try_parsing(true))
            .build()?;

        config
            .try_deserialize()
            .context("Invalid TUNER_* configuration")
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}
