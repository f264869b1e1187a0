//! Configuration parsing and validation.
//!
//! Store configuration can be built in code or loaded from TOML. Every field
//! has a default, so an empty document is a valid configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// When false every mutating call is ignored.
    #[serde(default = "default_writable")]
    pub writable: bool,

    /// Enables the fetch surface.
    #[serde(default)]
    pub fetchable: bool,

    /// Default copy-on-write behaviour for writes that do not specify it.
    #[serde(default)]
    pub immutable: bool,

    /// Upper bound on alias hops during resolution and dereferencing.
    #[serde(default = "default_max_alias_hops")]
    pub max_alias_hops: usize,

    /// Initial serialisability map (key → included in JSON export).
    #[serde(default)]
    pub serialisable_keys: BTreeMap<String, bool>,

    /// Fetch engine settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Logging settings.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            writable: default_writable(),
            fetchable: false,
            immutable: false,
            max_alias_hops: default_max_alias_hops(),
            serialisable_keys: BTreeMap::new(),
            fetch: FetchConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Fetch engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Retries after the first failed attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff step between attempts; attempt `n` waits `n * retry_backoff_ms`.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Expiry floor applied when a response yields an expiry in the past.
    #[serde(default = "default_min_expiry_ms")]
    pub min_expiry_ms: u64,

    /// Lower bounds for the cache-control windows of every response.
    #[serde(default)]
    pub cache_control: CacheControlConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            timeout_ms: default_timeout_ms(),
            retry_backoff_ms: default_retry_backoff_ms(),
            min_expiry_ms: default_min_expiry_ms(),
            cache_control: CacheControlConfig::default(),
        }
    }
}

impl FetchConfig {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff step between attempts.
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Cache-control floors, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControlConfig {
    #[serde(default)]
    pub max_age_secs: u64,

    #[serde(default)]
    pub stale_while_revalidate_secs: u64,

    #[serde(default = "default_stale_if_error_secs")]
    pub stale_if_error_secs: u64,
}

impl Default for CacheControlConfig {
    fn default() -> Self {
        Self {
            max_age_secs: 0,
            stale_while_revalidate_secs: 0,
            stale_if_error_secs: default_stale_if_error_secs(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

// Default value functions

fn default_writable() -> bool {
    true
}

fn default_max_alias_hops() -> usize {
    32
}

fn default_retries() -> u32 {
    2
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_retry_backoff_ms() -> u64 {
    250
}

fn default_min_expiry_ms() -> u64 {
    1_000
}

fn default_stale_if_error_secs() -> u64 {
    3_600
}

fn default_log_level() -> String {
    "info".to_string()
}

impl StoreConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(content).with_context(|| "failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency.
    pub fn validate(&self) -> Result<()> {
        if self.max_alias_hops == 0 {
            anyhow::bail!("max_alias_hops must be > 0");
        }
        if self.fetch.timeout_ms == 0 {
            anyhow::bail!("fetch.timeout_ms must be > 0");
        }
        for key in self.serialisable_keys.keys() {
            if key.trim_matches('/').is_empty() {
                anyhow::bail!("serialisable_keys cannot contain the root key");
            }
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "telemetry.log_level must be one of {:?}, got: {}",
                valid_levels,
                self.telemetry.log_level
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = StoreConfig::from_toml("").unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(config.writable);
        assert!(!config.fetchable);
        assert_eq!(config.max_alias_hops, 32);
        assert_eq!(config.fetch.retries, 2);
    }

    #[test]
    fn nested_sections_parse() {
        let config = StoreConfig::from_toml(
            r#"
fetchable = true
immutable = true

[serialisable_keys]
"session" = false

[fetch]
retries = 5
timeout_ms = 500

[fetch.cache_control]
max_age_secs = 30
"#,
        )
        .unwrap();
        assert!(config.fetchable);
        assert!(config.immutable);
        assert_eq!(config.serialisable_keys.get("session"), Some(&false));
        assert_eq!(config.fetch.retries, 5);
        assert_eq!(config.fetch.timeout(), Duration::from_millis(500));
        assert_eq!(config.fetch.cache_control.max_age_secs, 30);
        assert_eq!(config.fetch.cache_control.stale_if_error_secs, 3_600);
    }

    #[test]
    fn zero_hops_rejected() {
        let err = StoreConfig::from_toml("max_alias_hops = 0").unwrap_err();
        assert!(err.to_string().contains("max_alias_hops"));
    }

    #[test]
    fn bad_log_level_rejected() {
        let result = StoreConfig::from_toml("[telemetry]\nlog_level = \"loud\"\n");
        assert!(result.is_err());
    }
}
