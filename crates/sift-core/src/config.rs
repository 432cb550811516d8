//! Runtime configuration
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/sift/config/sift.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! `SIFT_REQUESTS_PER_MINUTE` overrides the rate limit after loading.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::retry::RetryOptions;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/sift.toml");

/// Environment variable overriding `rate_limit.requests_per_minute`
pub const RATE_ENV: &str = "SIFT_REQUESTS_PER_MINUTE";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Worker pool size for batch classification
    pub concurrency: usize,
    /// Merchants per provider call
    pub merchant_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            merchant_batch_size: 10,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub rate_limit: RateLimitConfig,
    pub cache: CacheConfig,
    pub retry: RetryOptions,
    pub batch: BatchConfig,
}

impl SiftConfig {
    /// Load from the data-dir override if present, else the embedded defaults
    pub fn load() -> Result<Self> {
        let content = match default_config_path() {
            Some(path) if path.exists() => read_config(&path)?,
            _ => DEFAULT_CONFIG.to_string(),
        };
        Ok(Self::parse(&content)?.with_rate_override(std::env::var(RATE_ENV).ok()))
    }

    /// Load from an explicit file, which must exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        let content = read_config(path)?;
        Ok(Self::parse(&content)?.with_rate_override(std::env::var(RATE_ENV).ok()))
    }

    /// Parse TOML content; missing keys keep their defaults
    pub fn parse(content: &str) -> Result<Self> {
        let config: SiftConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Embedded defaults
    pub fn embedded() -> Self {
        Self::parse(DEFAULT_CONFIG).unwrap_or_default()
    }

    fn validate(&self) -> Result<()> {
        let retry = &self.retry;
        if !retry.multiplier.is_finite() || retry.multiplier < 1.0 {
            return Err(Error::Config(format!(
                "retry.multiplier must be >= 1.0, got {}",
                retry.multiplier
            )));
        }
        if retry.initial_delay > retry.max_delay {
            return Err(Error::Config(
                "retry.initial_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }
        Ok(())
    }

    /// Apply a `SIFT_REQUESTS_PER_MINUTE`-style override; bad values are ignored
    pub fn with_rate_override(mut self, value: Option<String>) -> Self {
        if let Some(raw) = value {
            match raw.trim().parse::<u32>() {
                Ok(rate) => {
                    debug!(rate, "Rate limit overridden from environment");
                    self.rate_limit.requests_per_minute = rate;
                }
                Err(_) => warn!(value = %raw, "Ignoring invalid {}", RATE_ENV),
            }
        }
        self
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("sift").join("config").join("sift.toml"))
}

fn read_config(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = SiftConfig::embedded();
        assert_eq!(config, SiftConfig::default());
        assert_eq!(config.rate_limit.requests_per_minute, 60);
        assert_eq!(config.cache.ttl(), Duration::from_secs(900));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.batch.concurrency, 5);
        assert_eq!(config.batch.merchant_batch_size, 10);
    }

    #[test]
    fn test_partial_override() {
        let config = SiftConfig::parse("[batch]\nconcurrency = 2\n[retry]\nmax_attempts = 5").unwrap();
        assert_eq!(config.batch.concurrency, 2);
        assert_eq!(config.batch.merchant_batch_size, 10);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(matches!(
            SiftConfig::parse("[retry]\nmultiplier = 0.5"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SiftConfig::parse("[retry]\ninitial_delay_ms = 5000\nmax_delay_ms = 100"),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            SiftConfig::parse("rate_limit = \"fast\""),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rate_override() {
        let config = SiftConfig::default().with_rate_override(Some("120".into()));
        assert_eq!(config.rate_limit.requests_per_minute, 120);
        let config = SiftConfig::default().with_rate_override(Some("lots".into()));
        assert_eq!(config.rate_limit.requests_per_minute, 60);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sift.toml");
        std::fs::write(&path, "[cache]\nttl_secs = 60\n").unwrap();
        let config = SiftConfig::load_from(&path).unwrap();
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));

        assert!(SiftConfig::load_from(&dir.path().join("missing.toml")).is_err());
    }
}
