/// Configuration management for the feed sync engine
///
/// Loads configuration from environment variables.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Engine tuning
    pub feed: EngineConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Log output format
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => Err(format!("unknown log format '{}'", other)),
        }
    }
}

/// Engine settings shared by every feed instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Posts requested per timeline/profile page
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    /// Search results kept from the unpaged search call
    #[serde(default = "default_search_result_limit")]
    pub search_result_limit: usize,
    /// Posts whose interaction lookups may run at once
    #[serde(default = "default_lookup_concurrency")]
    pub lookup_concurrency: usize,
    /// Maximum post/quote length in characters
    #[serde(default = "default_max_post_length")]
    pub max_post_length: usize,
    /// Users listed in explore suggestions
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
    /// Hashtags counted for explore trending topics
    #[serde(default = "default_trending_hashtags")]
    pub trending_hashtags: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            search_result_limit: default_search_result_limit(),
            lookup_concurrency: default_lookup_concurrency(),
            max_post_length: default_max_post_length(),
            suggestion_limit: default_suggestion_limit(),
            trending_hashtags: default_trending_hashtags(),
        }
    }
}

// Default values
fn default_page_size() -> u64 {
    10
}

fn default_search_result_limit() -> usize {
    10
}

fn default_lookup_concurrency() -> usize {
    16
}

fn default_max_post_length() -> usize {
    280
}

fn default_suggestion_limit() -> usize {
    6
}

fn default_trending_hashtags() -> Vec<String> {
    [
        "#ICP",
        "#Web3",
        "#Social360",
        "#DeFi",
        "#InternetComputer",
        "#Blockchain",
        "#Crypto",
        "#DApp",
    ]
    .iter()
    .map(|tag| tag.to_string())
    .collect()
}

/// Comma-separated list; blank entries are dropped
fn env_list_or(key: &str, default: Vec<String>) -> Vec<String> {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        default
    } else {
        items
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let app = AppConfig {
            env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            log_format: env_or("LOG_FORMAT", LogFormat::Pretty),
        };

        let feed = EngineConfig {
            page_size: env_or("FEED_PAGE_SIZE", default_page_size()),
            search_result_limit: env_or("FEED_SEARCH_LIMIT", default_search_result_limit()),
            lookup_concurrency: env_or("FEED_LOOKUP_CONCURRENCY", default_lookup_concurrency()),
            max_post_length: env_or("FEED_MAX_POST_LENGTH", default_max_post_length()),
            suggestion_limit: env_or("FEED_SUGGESTION_LIMIT", default_suggestion_limit()),
            trending_hashtags: env_list_or("FEED_TRENDING_TAGS", default_trending_hashtags()),
        };
        feed.validate()?;

        Ok(Config { app, feed })
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            bail!("FEED_PAGE_SIZE must be greater than zero");
        }
        if self.lookup_concurrency == 0 {
            bail!("FEED_LOOKUP_CONCURRENCY must be greater than zero");
        }
        if self.max_post_length == 0 {
            bail!("FEED_MAX_POST_LENGTH must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "APP_ENV",
            "LOG_FORMAT",
            "FEED_PAGE_SIZE",
            "FEED_SEARCH_LIMIT",
            "FEED_LOOKUP_CONCURRENCY",
            "FEED_MAX_POST_LENGTH",
            "FEED_SUGGESTION_LIMIT",
            "FEED_TRENDING_TAGS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_default_values() {
        clear_env();

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.log_format, LogFormat::Pretty);
        assert_eq!(config.feed.page_size, 10);
        assert_eq!(config.feed.search_result_limit, 10);
        assert_eq!(config.feed.lookup_concurrency, 16);
        assert_eq!(config.feed.max_post_length, 280);
        assert_eq!(config.feed.suggestion_limit, 6);
        assert_eq!(config.feed.trending_hashtags.len(), 8);
        assert_eq!(config.feed.trending_hashtags[0], "#ICP");
    }

    #[test]
    #[serial]
    fn test_overrides_and_unparsable_fallback() {
        clear_env();
        std::env::set_var("LOG_FORMAT", "json");
        std::env::set_var("FEED_PAGE_SIZE", "25");
        std::env::set_var("FEED_SEARCH_LIMIT", "not-a-number");
        std::env::set_var("FEED_TRENDING_TAGS", " #rust, ,#tokio ");

        let config = Config::from_env().unwrap();

        assert_eq!(config.app.log_format, LogFormat::Json);
        assert_eq!(config.feed.page_size, 25);
        assert_eq!(config.feed.search_result_limit, 10);
        assert_eq!(config.feed.trending_hashtags, vec!["#rust", "#tokio"]);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_zero_page_size_rejected() {
        clear_env();
        std::env::set_var("FEED_PAGE_SIZE", "0");

        assert!(Config::from_env().is_err());
        clear_env();
    }
}
