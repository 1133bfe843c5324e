//! Configuration Module
//!
//! This module defines all configuration structures for the batching engine.
//! Configuration is loaded from TOML files and parsed using serde.

use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Main configuration structure
///
/// Every section and field has a default, so a partial (or empty) file is valid.
///
/// # Example TOML
/// ```toml
/// [batch]
/// dedupe_keys = true
/// flush_delay_ms = 0
///
/// [demo]
/// resolver_delay_ms = 1000
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub batch: BatchConfig,
    pub demo: DemoConfig,
}

/// Batch coalescing configuration
///
/// # Fields
/// - `dedupe_keys`: Repeated keys within one window share a single pending handle.
///   When disabled, every request is its own entry and the resolver sees the key once per request.
/// - `flush_delay_ms`: `0` flushes as soon as the current work drains; a positive value
///   keeps the window open for that many milliseconds instead
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub dedupe_keys: bool,
    pub flush_delay_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            dedupe_keys: true,
            flush_delay_ms: 0,
        }
    }
}

impl BatchConfig {
    /// Extra time a window stays open after it is armed, if any.
    pub fn flush_delay(&self) -> Option<Duration> {
        (self.flush_delay_ms > 0).then(|| Duration::from_millis(self.flush_delay_ms))
    }
}

/// Settings for the demonstration resolvers driven by the binary
///
/// # Fields
/// - `resolver_delay_ms`: Simulated latency of each resolver invocation
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub resolver_delay_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            resolver_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML configuration file
    ///
    /// # Returns
    /// * `Ok(Config)` if the file was successfully loaded and parsed
    /// * `Err` if the file couldn't be read or the TOML is invalid
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults when the file does not exist
    ///
    /// A file that exists but fails to parse is still an error.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }
}
