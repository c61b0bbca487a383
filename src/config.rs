//! Configuration file parser for ~/.config/skyshelf/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged, since they are usually typos.
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::engine::EngineConfig;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Handle or DID of the account whose feed is shown.
    pub actor: String,

    /// Base URL of the public XRPC API, without a trailing slash.
    pub api_base: String,

    /// Items requested per page (upstream accepts 1-100).
    pub page_size: u32,

    /// Background continuation stops once this many items are cached.
    pub target_ceiling: usize,

    /// Delay between a page settling and the next automatic request.
    pub continuation_delay_ms: u64,

    pub profile_stale_secs: u64,
    pub feed_stale_secs: u64,
    pub profile_revalidate_secs: u64,
    pub feed_revalidate_secs: u64,

    /// Distance from the end of the list at which more items are requested.
    pub viewport_margin_px: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            actor: "cshuamy.bsky.social".to_string(),
            api_base: "https://public.api.bsky.app/xrpc".to_string(),
            page_size: 20,
            target_ceiling: 500,
            continuation_delay_ms: 500,
            profile_stale_secs: 300,
            feed_stale_secs: 120,
            profile_revalidate_secs: 600,
            feed_revalidate_secs: 300,
            viewport_margin_px: 100.0,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "actor",
        "api_base",
        "page_size",
        "target_ceiling",
        "continuation_delay_ms",
        "profile_stale_secs",
        "feed_stale_secs",
        "profile_revalidate_secs",
        "feed_revalidate_secs",
        "viewport_margin_px",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::parse(&content).inspect(|config| {
            tracing::info!(path = %path.display(), actor = %config.actor, "Loaded configuration");
        })
    }

    /// Parse TOML text. Blank input yields the defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            tracing::debug!("Config is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        Ok(toml::from_str(content)?)
    }

    /// Engine tunables derived from this configuration.
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            target_ceiling: self.target_ceiling,
            continuation_delay: Duration::from_millis(self.continuation_delay_ms),
            profile_stale_after: Duration::from_secs(self.profile_stale_secs),
            feed_stale_after: Duration::from_secs(self.feed_stale_secs),
            profile_revalidate_every: Duration::from_secs(self.profile_revalidate_secs.max(1)),
            feed_revalidate_every: Duration::from_secs(self.feed_revalidate_secs.max(1)),
            viewport_margin_px: self.viewport_margin_px,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
