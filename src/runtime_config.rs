// =============================================================================
// Runtime Configuration — scanner settings with atomic save
// =============================================================================
//
// Central configuration for the Meridian scanner.  Persistence uses an
// atomic tmp + rename pattern to prevent corruption on crash.  All fields
// carry serde defaults so that adding new fields never breaks loading an
// older config file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_universe_size() -> usize {
    50
}

fn default_candle_limit() -> usize {
    300
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    1_500
}

fn default_refresh_interval_secs() -> u64 {
    150
}

fn default_alert_score_threshold() -> f64 {
    75.0
}

fn default_klines_base() -> String {
    "https://api.binance.com".to_string()
}

fn default_listing_base() -> String {
    "https://api.coingecko.com".to_string()
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the scanner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Universe -----------------------------------------------------------

    /// How many entities (by market-cap rank) each refresh cycle scans.
    #[serde(default = "default_universe_size")]
    pub universe_size: usize,

    /// Candles requested per (entity, timeframe) fetch.
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,

    // --- Loader -------------------------------------------------------------

    /// Entities fetched concurrently within one batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay between batches, milliseconds (client-side rate limiting).
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Full refresh cycle interval, seconds.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    // --- Upstream sources ---------------------------------------------------

    /// Base URL of the authoritative klines endpoint.
    #[serde(default = "default_klines_base")]
    pub klines_base: String,

    /// Base URL of the coarse markets listing.
    #[serde(default = "default_listing_base")]
    pub listing_base: String,

    // --- Alerts -------------------------------------------------------------

    /// Whether qualifying setups are posted to the webhook at all.
    #[serde(default = "default_true")]
    pub alerts_enabled: bool,

    /// Minimum final score for an alert to fire.
    #[serde(default = "default_alert_score_threshold")]
    pub alert_score_threshold: f64,

    /// Alert webhook URL; alerts are disabled when unset.
    #[serde(default)]
    pub alert_webhook_url: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            universe_size: default_universe_size(),
            candle_limit: default_candle_limit(),
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            refresh_interval_secs: default_refresh_interval_secs(),
            klines_base: default_klines_base(),
            listing_base: default_listing_base(),
            alerts_enabled: true,
            alert_score_threshold: default_alert_score_threshold(),
            alert_webhook_url: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can
    /// fall back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            universe_size = config.universe_size,
            batch_size = config.batch_size,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}
