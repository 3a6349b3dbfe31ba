//! Configuration for crawlguard

mod crawl;
mod logging;

pub use crawl::{CrawlConfig, DedupConfig, TrapConfig, DEFAULT_DENIED_EXTENSIONS};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default user agent for crawl requests
pub const DEFAULT_USER_AGENT: &str = "crawlguard/0.1 (+https://github.com/crawlguard)";

/// Top-level crawler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Crawl loop, persistence and fetch settings
    #[serde(default)]
    pub crawl: CrawlConfig,
    /// Crawl trap heuristics
    #[serde(default)]
    pub traps: TrapConfig,
    /// Shingle fingerprinting and near-duplicate detection
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate all configuration fields.
    ///
    /// Every problem is collected and reported in a single error.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Crawl
        if let Err(e) = url::Url::parse(&self.crawl.seed_url) {
            errors.push(format!("seed_url '{}' is not a valid URL: {}", self.crawl.seed_url, e));
        }
        if self.crawl.allowed_domain_suffix.trim_matches('.').is_empty() {
            errors.push("allowed_domain_suffix must not be empty".to_string());
        }
        if self.crawl.workers == 0 {
            errors.push("workers must be positive".to_string());
        }
        if self.crawl.state_dir.as_os_str().is_empty() {
            errors.push("state_dir must not be empty".to_string());
        }
        if self.crawl.request_timeout_secs == 0 {
            errors.push("request_timeout_secs must be positive".to_string());
        }

        // Traps
        if self.traps.url_size_limit == 0 {
            errors.push("url_size_limit must be positive".to_string());
        }
        if self.traps.domain_access_limit == 0 {
            errors.push("domain_access_limit must be positive".to_string());
        }
        if self.traps.max_repeated_segments < 2 {
            errors.push("max_repeated_segments must be at least 2".to_string());
        }

        // Dedup
        if self.dedup.shingle_size == 0 {
            errors.push("shingle_size must be positive".to_string());
        }
        if self.dedup.sample_divisor == 0 {
            errors.push("sample_divisor must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            errors.push("similarity_threshold must be between 0.0 and 1.0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
