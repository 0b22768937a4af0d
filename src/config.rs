//! Duckflow Configuration Module
//!
//! Tunables for the cache, breaker, monitor and scheduler.
//! Config is stored in `~/.config/duckflow/config.toml` unless
//! `DUCKFLOW_CONFIG` points elsewhere.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. Environment variables (`DUCKFLOW_*`)
//! 2. Config file
//! 3. Defaults

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DuckflowError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub breaker: BreakerConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub engine: SchedulerConfig,
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Hard cap on live entries; oldest are evicted first
    pub max_entries: usize,
    /// TTL for cacheable tasks that don't declare their own
    pub default_ttl_secs: u64,
    /// Background sweep period
    pub sweep_interval_secs: u64,
    /// Recent messages folded into the cache key
    pub context_messages: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 1000,
            default_ttl_secs: 300,
            sweep_interval_secs: 60,
            context_messages: 3,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Session-level circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BreakerConfig {
    /// Consecutive failing runs before the breaker opens
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

impl BreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Performance window and optimization thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// Ring buffer capacity (runs)
    pub window: usize,
    /// Below this hit rate `should_optimize` fires
    pub min_cache_hit_rate: f64,
    /// Above this average latency `should_optimize` fires
    pub max_avg_latency_ms: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window: 100,
            min_cache_hit_rate: 0.2,
            max_avg_latency_ms: 5000.0,
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Recent-message window kept per request
    pub recent_messages: usize,
    /// Per-run concurrency cap; `None` runs a whole level at once
    pub max_concurrency: Option<usize>,
    /// Timeout for tasks registered without one
    pub default_timeout_ms: u64,
    /// Run the warmup pass on start
    pub warmup: bool,
    /// Workflow definitions file; `None` uses the built-in set
    pub workflows_path: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            recent_messages: 6,
            max_concurrency: None,
            default_timeout_ms: 10_000,
            warmup: true,
            workflows_path: None,
        }
    }
}

impl SchedulerConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }
}

impl EngineConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/duckflow/` on Unix, `%APPDATA%/duckflow/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("duckflow")
    }

    /// Get the config file path, honoring `DUCKFLOW_CONFIG`
    pub fn config_path() -> PathBuf {
        match std::env::var("DUCKFLOW_CONFIG") {
            Ok(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::config_dir().join("config.toml"),
        }
    }

    /// Load configuration from the default location
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from an explicit path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| DuckflowError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;

        Self::parse(&content)
    }

    /// Parse TOML content
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DuckflowError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Merge with environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `DUCKFLOW_*` overrides from an arbitrary lookup.
    ///
    /// Empty or unparsable values are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DUCKFLOW_CACHE_MAX_ENTRIES").and_then(|v| v.trim().parse().ok()) {
            self.cache.max_entries = v;
        }
        if let Some(v) = get("DUCKFLOW_CACHE_TTL_SECS").and_then(|v| v.trim().parse().ok()) {
            self.cache.default_ttl_secs = v;
        }
        if let Some(v) = get("DUCKFLOW_SWEEP_INTERVAL_SECS").and_then(|v| v.trim().parse().ok()) {
            self.cache.sweep_interval_secs = v;
        }
        if let Some(v) = get("DUCKFLOW_BREAKER_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
            self.breaker.failure_threshold = v;
        }
        if let Some(v) = get("DUCKFLOW_BREAKER_COOLDOWN_SECS").and_then(|v| v.trim().parse().ok())
        {
            self.breaker.cooldown_secs = v;
        }
        if let Some(v) = get("DUCKFLOW_MAX_CONCURRENCY").and_then(|v| v.trim().parse().ok()) {
            self.engine.max_concurrency = Some(v);
        }
        if let Some(v) = get("DUCKFLOW_WARMUP") {
            match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.engine.warmup = true,
                "0" | "false" | "no" | "off" => self.engine.warmup = false,
                _ => {}
            }
        }
        if let Some(v) = get("DUCKFLOW_WORKFLOWS") {
            self.engine.workflows_path = Some(PathBuf::from(v));
        }

        self
    }
}
