//! YAML configuration: crawler tuning and the list of sources.
//!
//! ```yaml
//! crawler:
//!   fetch_timeout_ms: 5000
//!   discovery_batch: 10
//!   extraction_batch: 10
//!   interval_secs: 300
//! sources:
//!   - id: 1
//!     category_id: 2
//!     url: https://vnexpress.net/thoi-su
//!     title_selector: h1.title-detail
//! ```
//!
//! Every `crawler` key is optional. Source selectors are validated here so
//! a malformed rule stops the process at startup instead of quietly
//! producing empty fields on every crawl.

use crate::error::ConfigError;
use crate::models::Source;
use crate::selectors::validate_source;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, instrument};

/// Tuning knobs shared by the workers and the scheduler.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrawlerSettings {
    /// Timeout for every page fetch.
    pub fetch_timeout_ms: u64,
    /// New posts queued per discovery cycle, across all sources.
    pub discovery_batch: usize,
    /// Posts extracted per extraction cycle.
    pub extraction_batch: usize,
    /// Pause between two cycles of the same worker.
    pub interval_secs: u64,
    pub user_agent: String,
}

impl Default for CrawlerSettings {
    fn default() -> Self {
        Self {
            fetch_timeout_ms: 5000,
            discovery_batch: 10,
            extraction_batch: 10,
            interval_secs: 300,
            user_agent: format!("news_crawler/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl CrawlerSettings {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerSettings,
    #[serde(default)]
    pub sources: Vec<Source>,
}

impl Config {
    /// Parse and validate a configuration document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate the configuration file at `path`.
    #[instrument(level = "info")]
    pub async fn load(path: &str) -> Result<Self, ConfigError> {
        let yaml = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_string(),
                source,
            })?;
        let config = Self::from_yaml(&yaml)?;
        info!(
            sources = config.sources.len(),
            active = config.sources.iter().filter(|s| !s.deleted).count(),
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id) {
                return Err(ConfigError::DuplicateSource(source.id));
            }
            validate_source(source)?;
        }
        Ok(())
    }
}
