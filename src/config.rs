// =============================================================================
// Host Configuration — bind address, price data location, refresh cadence
// =============================================================================
//
// Host-level settings only; indicator parameters live in `SettingsStore` and
// are never written to disk.
//
// Persistence uses an atomic tmp + rename pattern.  All fields carry
// `#[serde(default)]` so that a partial or empty file still loads.
//
// Environment overrides (applied after the file, `.env` honoured):
//   ANALYTICS_BIND_ADDR   ANALYTICS_DATA_DIR   ANALYTICS_ASSET   ANALYTICS_DAYS
// =============================================================================

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "crypto_analytics.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_price_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_asset() -> String {
    "bitcoin".to_string()
}

fn default_timeframe_days() -> u32 {
    30
}

fn default_refresh_interval_secs() -> u64 {
    60
}

// =============================================================================
// AppConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Socket address the HTTP/WebSocket server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory holding `<asset>_<days>.json` market-chart files.
    #[serde(default = "default_price_data_dir")]
    pub price_data_dir: PathBuf,

    /// Asset loaded at start-up and on every periodic refresh.
    #[serde(default = "default_asset")]
    pub default_asset: String,

    #[serde(default = "default_timeframe_days")]
    pub default_timeframe_days: u32,

    /// Seconds between periodic refreshes; 0 disables them.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            price_data_dir: default_price_data_dir(),
            default_asset: default_asset(),
            default_timeframe_days: default_timeframe_days(),
            refresh_interval_secs: default_refresh_interval_secs(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            asset = %config.default_asset,
            days = config.default_timeframe_days,
            "config loaded"
        );

        Ok(config)
    }

    /// Load from `path`, falling back to defaults on any error, then apply
    /// environment overrides.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let mut config = match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "using default config");
                Self::default()
            }
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Apply `ANALYTICS_*` overrides read through `lookup`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("ANALYTICS_BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(dir) = lookup("ANALYTICS_DATA_DIR") {
            self.price_data_dir = PathBuf::from(dir);
        }
        if let Some(asset) = lookup("ANALYTICS_ASSET") {
            self.default_asset = asset;
        }
        if let Some(days) = lookup("ANALYTICS_DAYS") {
            match days.trim().parse::<u32>() {
                Ok(d) if d > 0 => self.default_timeframe_days = d,
                _ => warn!(value = %days, "ignoring invalid ANALYTICS_DAYS"),
            }
        }
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content =
            serde_json::to_string_pretty(self).context("failed to serialise config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "config saved (atomic)");
        Ok(())
    }
}
