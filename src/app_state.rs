// =============================================================================
// Central Application State — Crypto Analytics host
// =============================================================================
//
// Ties the host configuration, the indicator settings store, the recompute
// pipeline and the price source together.  Handlers and background tasks
// share one `Arc<AppState>`.
//
// Thread safety:
//   - The settings store and pipeline manage their own interior mutability.
//   - parking_lot::RwLock for the currently selected timeframe.
//   - Atomic counter for the WebSocket sequence number.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::AppConfig;
use crate::market_data::JsonFileSource;
use crate::pipeline::{PipelineSnapshot, RecomputePipeline};
use crate::settings::{IndicatorSettings, SettingsStore};

// =============================================================================
// Timeframe
// =============================================================================

/// The asset and lookback window currently shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeframe {
    pub asset_id: String,
    pub days: u32,
}

// =============================================================================
// AppState
// =============================================================================

pub struct AppState {
    // ── Configuration ───────────────────────────────────────────────────
    pub config: AppConfig,

    // ── Analytics core ──────────────────────────────────────────────────
    pub settings: Arc<SettingsStore>,
    pub pipeline: Arc<RecomputePipeline>,
    pub source: JsonFileSource,

    // ── Selection ───────────────────────────────────────────────────────
    pub timeframe: RwLock<Timeframe>,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Fresh state with default indicator settings and an Idle pipeline.
    pub fn new(config: AppConfig) -> Self {
        let settings = Arc::new(SettingsStore::new());
        let pipeline = Arc::new(RecomputePipeline::new(settings.clone()));
        let source = JsonFileSource::new(config.price_data_dir.clone());
        let timeframe = Timeframe {
            asset_id: config.default_asset.clone(),
            days: config.default_timeframe_days,
        };

        Self {
            config,
            settings,
            pipeline,
            source,
            timeframe: RwLock::new(timeframe),
            ws_sequence_number: AtomicU64::new(0),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    /// Changes whenever the settings or the pipeline change. The WebSocket
    /// feed compares it against the last version it pushed.
    pub fn current_state_version(&self) -> u64 {
        self.settings.version() + self.pipeline.version()
    }

    pub fn next_ws_sequence(&self) -> u64 {
        self.ws_sequence_number.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ── Price refresh ───────────────────────────────────────────────────

    /// Select `timeframe` and reload its series from the price source.
    ///
    /// Returns the pipeline token issued for the refresh.
    pub async fn refresh(&self, timeframe: Timeframe) -> u64 {
        info!(asset = %timeframe.asset_id, days = timeframe.days, "refreshing price series");
        *self.timeframe.write() = timeframe.clone();
        self.pipeline
            .refresh_from(&self.source, &timeframe.asset_id, timeframe.days)
            .await
    }

    /// Reload the currently selected timeframe.
    pub async fn refresh_current(&self) -> u64 {
        let timeframe = self.timeframe.read().clone();
        self.refresh(timeframe).await
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Serialisable view of the whole host, served by `GET /api/v1/state`
    /// and pushed over the WebSocket feed.
    pub fn build_snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: Utc::now().timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            timeframe: self.timeframe.read().clone(),
            settings: self.settings.snapshot(),
            settings_version: self.settings.version(),
            pipeline: self.pipeline.snapshot(),
        }
    }
}

// =============================================================================
// Snapshot types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub timeframe: Timeframe,
    pub settings: IndicatorSettings,
    pub settings_version: u64,
    pub pipeline: PipelineSnapshot,
}
