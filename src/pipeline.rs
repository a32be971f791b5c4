// =============================================================================
// Recompute Pipeline — token-ordered indicator recomputation
// =============================================================================
//
// States:   Idle ──► Computing ──► Ready
//                        │  ▲         │
//                        ▼  └─────────┘
//                      Error ──► Computing
//
// Every trigger (new series, settings change, explicit request, timeframe
// change) issues a strictly increasing token and moves the pipeline to
// Computing.  A finished computation is published only if its token is still
// the latest one issued; anything older is dropped on the floor.  Running
// computations are never interrupted; "cancel" means "discard on arrival".
//
// Each token also records the settings version its inputs were read at.  A
// result computed from settings that have since moved is refused as well, so
// a settings change takes effect even before its own trigger is issued.
//
// A failed computation moves to Error but keeps the last Ready result around
// as stale-but-valid data for the display layer.
//
// Idle holds until the first price series arrives.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AnalysisError;
use crate::indicators::{compute_indicators, IndicatorSnapshot};
use crate::market_data::{PriceSeries, PriceSource};
use crate::settings::{IndicatorSettings, SettingsStore};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Computing,
    Ready,
    Error,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Computing => write!(f, "Computing"),
            Self::Ready => write!(f, "Ready"),
            Self::Error => write!(f, "Error"),
        }
    }
}

/// What caused a recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
    SeriesArrived,
    SettingsChanged { version: u64 },
    Explicit { reason: String },
    Timeframe { asset_id: String, days: u32 },
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SeriesArrived => write!(f, "series-arrived"),
            Self::SettingsChanged { version } => write!(f, "settings-changed(v{version})"),
            Self::Explicit { reason } => write!(f, "explicit({reason})"),
            Self::Timeframe { asset_id, days } => write!(f, "timeframe({asset_id}, {days}d)"),
        }
    }
}

/// A unit of work: the inputs captured when its token was issued.
#[derive(Debug, Clone)]
pub struct Job {
    pub token: u64,
    pub trigger: Trigger,
    series: Arc<PriceSeries>,
    settings: IndicatorSettings,
    settings_version: u64,
}

impl Job {
    /// Pure computation over the captured inputs.
    pub fn run(&self) -> Result<IndicatorSnapshot, AnalysisError> {
        compute_indicators(&self.series, &self.settings)
    }

    pub fn settings(&self) -> &IndicatorSettings {
        &self.settings
    }

    pub fn series(&self) -> &PriceSeries {
        &self.series
    }

    /// Settings store version the inputs were captured at.
    pub fn settings_version(&self) -> u64 {
        self.settings_version
    }
}

/// Why `accept` did or did not publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acceptance {
    Published,
    Superseded,
    SettingsMoved,
}

/// Serialisable view of the pipeline for the display layer.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSnapshot {
    pub state: PipelineState,
    /// Latest issued token.
    pub token: u64,
    /// Token of the computation behind `last_result`.
    pub result_token: Option<u64>,
    pub version: u64,
    pub trigger: Option<Trigger>,
    pub series_len: Option<usize>,
    pub last_result: Option<IndicatorSnapshot>,
    /// `true` when `last_result` predates the latest trigger.
    pub stale: bool,
    pub error: Option<AnalysisError>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Internal mutable state (behind RwLock)
// ---------------------------------------------------------------------------

struct Inner {
    state: PipelineState,
    latest_token: u64,
    /// Settings version behind the latest token's inputs.
    settings_version: u64,
    trigger: Option<Trigger>,
    series: Option<Arc<PriceSeries>>,
    result: Option<Arc<IndicatorSnapshot>>,
    result_token: Option<u64>,
    result_settings_version: Option<u64>,
    error: Option<AnalysisError>,
    updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// RecomputePipeline
// ---------------------------------------------------------------------------

pub struct RecomputePipeline {
    settings: Arc<SettingsStore>,
    inner: RwLock<Inner>,
    /// Incremented on every state transition; the WebSocket feed polls it.
    version: AtomicU64,
}

impl RecomputePipeline {
    pub fn new(settings: Arc<SettingsStore>) -> Self {
        Self {
            settings,
            inner: RwLock::new(Inner {
                state: PipelineState::Idle,
                latest_token: 0,
                settings_version: 0,
                trigger: None,
                series: None,
                result: None,
                result_token: None,
                result_settings_version: None,
                error: None,
                updated_at: Utc::now(),
            }),
            version: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn state(&self) -> PipelineState {
        self.inner.read().state
    }

    pub fn current_token(&self) -> u64 {
        self.inner.read().latest_token
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Result of the most recent successful computation, possibly stale.
    pub fn latest_result(&self) -> Option<Arc<IndicatorSnapshot>> {
        self.inner.read().result.clone()
    }

    pub fn last_error(&self) -> Option<AnalysisError> {
        self.inner.read().error.clone()
    }

    pub fn series(&self) -> Option<Arc<PriceSeries>> {
        self.inner.read().series.clone()
    }

    // -------------------------------------------------------------------------
    // Submit / accept
    // -------------------------------------------------------------------------

    /// Issue a token for `trigger` over the current series.
    ///
    /// Returns `None` (and stays Idle) while no series has arrived.
    pub fn prepare(&self, trigger: Trigger) -> Option<Job> {
        let mut inner = self.inner.write();
        let Some(series) = inner.series.clone() else {
            debug!(%trigger, "no price series yet; staying idle");
            return None;
        };
        Some(self.issue(&mut inner, series, trigger))
    }

    /// Install `series` as the current series and issue a token for it.
    pub fn prepare_series(&self, series: PriceSeries) -> Job {
        let series = Arc::new(series);
        let mut inner = self.inner.write();
        inner.series = Some(series.clone());
        self.issue(&mut inner, series, Trigger::SeriesArrived)
    }

    /// Accept `outcome` if `token` is still the latest issued token and the
    /// settings have not changed since its inputs were captured.
    ///
    /// Returns `false` when the result was discarded as stale.
    pub fn publish(
        &self,
        token: u64,
        outcome: Result<IndicatorSnapshot, AnalysisError>,
    ) -> bool {
        self.accept(token, outcome, true) == Acceptance::Published
    }

    fn accept(
        &self,
        token: u64,
        outcome: Result<IndicatorSnapshot, AnalysisError>,
        check_settings: bool,
    ) -> Acceptance {
        let mut inner = self.inner.write();

        if token != inner.latest_token || inner.state != PipelineState::Computing {
            debug!(
                token,
                latest = inner.latest_token,
                state = %inner.state,
                "discarding stale computation result"
            );
            return Acceptance::Superseded;
        }

        let current_settings = self.settings.version();
        if check_settings && inner.settings_version != current_settings {
            debug!(
                token,
                computed_with = inner.settings_version,
                current = current_settings,
                "discarding result computed from outdated settings"
            );
            return Acceptance::SettingsMoved;
        }

        match outcome {
            Ok(snapshot) => {
                inner.state = PipelineState::Ready;
                inner.result = Some(Arc::new(snapshot));
                inner.result_token = Some(token);
                inner.result_settings_version = Some(inner.settings_version);
                inner.error = None;
                debug!(token, "pipeline ready");
            }
            Err(e) => {
                if matches!(e, AnalysisError::TaskFailed { .. }) {
                    warn!(token, error = %e, "pipeline computation failed");
                } else {
                    debug!(token, error = %e, "pipeline computation failed");
                }
                inner.state = PipelineState::Error;
                inner.error = Some(e);
            }
        }
        inner.updated_at = Utc::now();
        self.bump_version();
        Acceptance::Published
    }

    // -------------------------------------------------------------------------
    // Convenience drivers
    // -------------------------------------------------------------------------

    /// Recompute inline on the calling thread.
    pub fn trigger(&self, trigger: Trigger) -> Option<u64> {
        let job = self.prepare(trigger)?;
        Some(self.run_inline(job))
    }

    /// Install a new series and recompute inline.
    pub fn submit_series(&self, series: PriceSeries) -> u64 {
        let job = self.prepare_series(series);
        self.run_inline(job)
    }

    /// Recompute on the blocking thread pool.
    pub async fn trigger_async(&self, trigger: Trigger) -> Option<u64> {
        let job = self.prepare(trigger)?;
        Some(self.run_job(job).await)
    }

    /// Install a new series and recompute on the blocking thread pool.
    pub async fn submit_series_async(&self, series: PriceSeries) -> u64 {
        let job = self.prepare_series(series);
        self.run_job(job).await
    }

    /// Fetch `(asset_id, days)` from `source` and recompute.
    ///
    /// The token is issued before the fetch starts, so a trigger arriving
    /// mid-fetch supersedes it. Fetch failures land in the Error state as
    /// `UpstreamFailure`.
    pub async fn refresh_from<S: PriceSource>(
        &self,
        source: &S,
        asset_id: &str,
        days: u32,
    ) -> u64 {
        let trigger = Trigger::Timeframe {
            asset_id: asset_id.to_string(),
            days,
        };
        let token = {
            let mut inner = self.inner.write();
            self.begin(&mut inner, trigger.clone())
        };

        let series = match source.fetch(asset_id, days).await {
            Ok(series) => series,
            Err(e) => {
                warn!(asset_id, days, error = %format!("{e:#}"), "price source failed");
                self.accept(token, Err(AnalysisError::upstream(&e)), false);
                return token;
            }
        };

        let job = {
            let mut inner = self.inner.write();
            if token != inner.latest_token {
                debug!(token, latest = inner.latest_token, "fetched series superseded");
                return token;
            }
            let series = Arc::new(series);
            inner.series = Some(series.clone());
            self.capture(&mut inner, token, trigger, series)
        };

        info!(asset_id, days, points = job.series.len(), "price series refreshed");
        self.run_job(job).await
    }

    /// Recompute whenever the settings store commits a change.
    pub fn watch_settings(self: Arc<Self>) -> JoinHandle<()> {
        let mut rx = self.settings.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let version = *rx.borrow_and_update();
                self.trigger_async(Trigger::SettingsChanged { version }).await;
            }
            debug!("settings channel closed; watcher exiting");
        })
    }

    /// Serialisable view of the current state.
    pub fn snapshot(&self) -> PipelineSnapshot {
        let inner = self.inner.read();
        PipelineSnapshot {
            state: inner.state,
            token: inner.latest_token,
            result_token: inner.result_token,
            version: self.version(),
            trigger: inner.trigger.clone(),
            series_len: inner.series.as_ref().map(|s| s.len()),
            last_result: inner.result.as_deref().cloned(),
            stale: inner.result.is_some()
                && (inner.result_token != Some(inner.latest_token)
                    || inner.result_settings_version != Some(self.settings.version())),
            error: inner.error.clone(),
            updated_at: inner.updated_at,
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Run `job` inline, re-running it under the same token while the
    /// settings keep moving underneath it.
    fn run_inline(&self, mut job: Job) -> u64 {
        let token = job.token;
        loop {
            let outcome = job.run();
            if self.accept(token, outcome, true) != Acceptance::SettingsMoved {
                return token;
            }
            match self.rearm(token) {
                Some(next) => job = next,
                None => return token,
            }
        }
    }

    async fn run_job(&self, mut job: Job) -> u64 {
        let token = job.token;
        loop {
            let outcome = match tokio::task::spawn_blocking(move || job.run()).await {
                Ok(outcome) => outcome,
                Err(e) => Err(AnalysisError::TaskFailed {
                    message: e.to_string(),
                }),
            };
            if self.accept(token, outcome, true) != Acceptance::SettingsMoved {
                return token;
            }
            match self.rearm(token) {
                Some(next) => job = next,
                None => return token,
            }
        }
    }

    /// Fresh inputs for `token` if it is still the one being computed.
    fn rearm(&self, token: u64) -> Option<Job> {
        let mut inner = self.inner.write();
        if token != inner.latest_token || inner.state != PipelineState::Computing {
            return None;
        }
        let series = inner.series.clone()?;
        let trigger = inner.trigger.clone()?;
        debug!(token, "settings moved mid-computation; recomputing");
        Some(self.capture(&mut inner, token, trigger, series))
    }

    fn issue(&self, inner: &mut Inner, series: Arc<PriceSeries>, trigger: Trigger) -> Job {
        let token = self.begin(inner, trigger.clone());
        self.capture(inner, token, trigger, series)
    }

    /// Snapshot the settings for `token` and record their version.
    fn capture(
        &self,
        inner: &mut Inner,
        token: u64,
        trigger: Trigger,
        series: Arc<PriceSeries>,
    ) -> Job {
        let (settings_version, settings) = self.settings.versioned_snapshot();
        inner.settings_version = settings_version;
        Job {
            token,
            trigger,
            series,
            settings,
            settings_version,
        }
    }

    /// Issue the next token and enter Computing. Caller holds the write lock.
    fn begin(&self, inner: &mut Inner, trigger: Trigger) -> u64 {
        inner.latest_token += 1;
        let token = inner.latest_token;
        debug!(token, %trigger, from = %inner.state, "pipeline computing");
        inner.state = PipelineState::Computing;
        inner.trigger = Some(trigger);
        inner.updated_at = Utc::now();
        self.bump_version();
        token
    }

    fn bump_version(&self) {
        self.version.fetch_add(1, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for RecomputePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("RecomputePipeline")
            .field("state", &inner.state)
            .field("latest_token", &inner.latest_token)
            .field("result_token", &inner.result_token)
            .field("version", &self.version())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{BollingerPatch, RsiPatch};
    use std::time::Duration;
    use tokio::sync::Notify;

    fn series(n: usize, base: f64) -> PriceSeries {
        let prices: Vec<f64> = (0..n)
            .map(|i| base + 50.0 * (i as f64 / 4.0).sin() + i as f64)
            .collect();
        PriceSeries::from_prices(&prices).unwrap()
    }

    fn pipeline() -> Arc<RecomputePipeline> {
        Arc::new(RecomputePipeline::new(Arc::new(SettingsStore::new())))
    }

    #[test]
    fn starts_idle_and_ignores_triggers_without_series() {
        let p = pipeline();
        assert_eq!(p.state(), PipelineState::Idle);
        assert!(p
            .trigger(Trigger::Explicit {
                reason: "manual".into()
            })
            .is_none());
        assert_eq!(p.state(), PipelineState::Idle);
        assert_eq!(p.current_token(), 0);
    }

    #[test]
    fn series_arrival_computes_ready_result() {
        let p = pipeline();
        let token = p.submit_series(series(80, 1_000.0));
        assert_eq!(token, 1);
        assert_eq!(p.state(), PipelineState::Ready);

        let snap = p.snapshot();
        assert_eq!(snap.result_token, Some(1));
        assert!(!snap.stale);
        assert_eq!(snap.series_len, Some(80));
        assert_eq!(snap.last_result.unwrap().results.len(), 4);
    }

    #[test]
    fn tokens_increase_monotonically() {
        let p = pipeline();
        let t1 = p.submit_series(series(60, 100.0));
        let t2 = p.trigger(Trigger::Explicit { reason: "a".into() }).unwrap();
        let t3 = p.trigger(Trigger::Explicit { reason: "b".into() }).unwrap();
        assert!(t1 < t2 && t2 < t3);
    }

    #[test]
    fn failure_keeps_previous_result_as_stale() {
        let p = pipeline();
        p.submit_series(series(80, 500.0));
        let good = p.latest_result().unwrap();

        p.submit_series(series(10, 500.0));
        assert_eq!(p.state(), PipelineState::Error);
        assert!(matches!(
            p.last_error(),
            Some(AnalysisError::InsufficientData { .. })
        ));

        let snap = p.snapshot();
        assert!(snap.stale);
        assert_eq!(snap.result_token, Some(1));
        assert_eq!(*p.latest_result().unwrap(), *good);

        // Recovers on the next good series.
        p.submit_series(series(80, 700.0));
        assert_eq!(p.state(), PipelineState::Ready);
        assert!(p.last_error().is_none());
    }

    #[test]
    fn late_result_of_older_trigger_is_discarded() {
        let p = pipeline();
        p.submit_series(series(80, 1_000.0));

        // T1 starts with the default settings.
        let t1 = p
            .prepare(Trigger::Explicit {
                reason: "t1".into(),
            })
            .unwrap();

        // T2 arrives before T1 resolves, with different settings.
        p.settings()
            .update_bollinger(BollingerPatch {
                period: Some(10),
                deviations: None,
            })
            .unwrap();
        let t2 = p.prepare(Trigger::SettingsChanged { version: 1 }).unwrap();
        assert!(t2.token > t1.token);

        // T2 resolves first, then T1.
        assert!(p.publish(t2.token, t2.run()));
        assert!(!p.publish(t1.token, t1.run()));

        let expected = compute_indicators(t2.series(), t2.settings()).unwrap();
        assert_eq!(*p.latest_result().unwrap(), expected);
        assert_eq!(p.latest_result().unwrap().bollinger().unwrap().middle_band.len(), 71);
        assert_eq!(p.snapshot().result_token, Some(t2.token));
    }

    #[test]
    fn older_result_arriving_first_is_also_discarded() {
        let p = pipeline();
        p.submit_series(series(80, 1_000.0));

        let t1 = p.prepare(Trigger::Explicit { reason: "t1".into() }).unwrap();
        let t2 = p.prepare(Trigger::Explicit { reason: "t2".into() }).unwrap();

        assert!(!p.publish(t1.token, t1.run()));
        assert_eq!(p.state(), PipelineState::Computing);
        assert!(p.snapshot().stale);

        assert!(p.publish(t2.token, t2.run()));
        assert_eq!(p.state(), PipelineState::Ready);
    }

    #[test]
    fn double_publish_is_rejected() {
        let p = pipeline();
        let job = p.prepare_series(series(80, 10_000.0));
        assert!(p.publish(job.token, job.run()));
        assert!(!p.publish(job.token, job.run()));
    }

    #[test]
    fn job_prepared_before_settings_change_is_refused() {
        let p = pipeline();
        p.submit_series(series(80, 1_000.0));

        let t1 = p.prepare(Trigger::Explicit { reason: "t1".into() }).unwrap();
        assert_eq!(t1.settings_version(), 0);

        // No newer token exists yet; only the settings moved.
        p.settings()
            .update_bollinger(BollingerPatch {
                period: Some(10),
                deviations: None,
            })
            .unwrap();

        assert!(!p.publish(t1.token, t1.run()));
        assert_eq!(p.state(), PipelineState::Computing);
        assert!(p.snapshot().stale);
        assert_eq!(p.snapshot().result_token, Some(1));

        let t2 = p.trigger(Trigger::SettingsChanged { version: 1 }).unwrap();
        assert_eq!(p.state(), PipelineState::Ready);
        assert_eq!(p.snapshot().result_token, Some(t2));
        assert_eq!(p.latest_result().unwrap().bollinger().unwrap().middle_band.len(), 71);
    }

    #[test]
    fn inline_run_recomputes_under_same_token_when_settings_move() {
        let p = pipeline();
        p.submit_series(series(80, 1_000.0));

        let job = p.prepare(Trigger::Explicit { reason: "t1".into() }).unwrap();
        let token = job.token;
        p.settings()
            .update_bollinger(BollingerPatch {
                period: Some(10),
                deviations: None,
            })
            .unwrap();

        assert_eq!(p.run_inline(job), token);
        assert_eq!(p.state(), PipelineState::Ready);
        assert_eq!(p.snapshot().result_token, Some(token));
        assert!(!p.snapshot().stale);
        assert_eq!(p.latest_result().unwrap().bollinger().unwrap().middle_band.len(), 71);
    }

    #[test]
    fn ready_result_is_stale_once_settings_move() {
        let p = pipeline();
        p.submit_series(series(80, 1_000.0));
        assert!(!p.snapshot().stale);

        p.settings()
            .update_rsi(RsiPatch {
                period: Some(7),
                ..Default::default()
            })
            .unwrap();
        assert!(p.snapshot().stale);
    }

    #[test]
    fn oversized_rsi_period_ends_in_error_not_panic() {
        let p = pipeline();
        p.settings()
            .update_rsi(RsiPatch {
                period: Some(usize::MAX),
                ..Default::default()
            })
            .unwrap();

        p.submit_series(series(80, 1_000.0));
        assert_eq!(p.state(), PipelineState::Error);
        assert!(matches!(
            p.last_error(),
            Some(AnalysisError::InsufficientData { required: usize::MAX, actual: 80, .. })
        ));
    }

    #[test]
    fn version_moves_on_every_transition() {
        let p = pipeline();
        let v0 = p.version();
        p.submit_series(series(80, 100.0));
        // Computing + Ready.
        assert_eq!(p.version(), v0 + 2);
    }

    #[tokio::test]
    async fn async_trigger_publishes() {
        let p = pipeline();
        let token = p.submit_series_async(series(80, 100.0)).await;
        assert_eq!(p.state(), PipelineState::Ready);
        assert_eq!(p.snapshot().result_token, Some(token));
    }

    #[tokio::test]
    async fn settings_watcher_recomputes_on_change() {
        let p = pipeline();
        p.submit_series(series(80, 100.0));
        let handle = p.clone().watch_settings();

        p.settings()
            .update_rsi(RsiPatch {
                period: Some(7),
                ..Default::default()
            })
            .unwrap();

        let wait = async {
            loop {
                let snap = p.snapshot();
                if snap.state == PipelineState::Ready
                    && matches!(snap.trigger, Some(Trigger::SettingsChanged { version: 1 }))
                {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("watcher did not recompute");

        handle.abort();
    }

    // ---- price source integration -----------------------------------------

    struct StaticSource(PriceSeries);

    impl PriceSource for StaticSource {
        async fn fetch(&self, _asset_id: &str, _days: u32) -> anyhow::Result<PriceSeries> {
            Ok(self.0.clone())
        }
    }

    struct FailingSource;

    impl PriceSource for FailingSource {
        async fn fetch(&self, asset_id: &str, _days: u32) -> anyhow::Result<PriceSeries> {
            anyhow::bail!("network unreachable for {asset_id}")
        }
    }

    /// Blocks inside `fetch` until released.
    struct GatedSource {
        series: PriceSeries,
        entered: Notify,
        release: Notify,
    }

    impl PriceSource for GatedSource {
        async fn fetch(&self, _asset_id: &str, _days: u32) -> anyhow::Result<PriceSeries> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(self.series.clone())
        }
    }

    #[tokio::test]
    async fn refresh_installs_fetched_series() {
        let p = pipeline();
        let source = StaticSource(series(90, 2_000.0));
        let token = p.refresh_from(&source, "bitcoin", 30).await;
        assert_eq!(p.state(), PipelineState::Ready);
        let snap = p.snapshot();
        assert_eq!(snap.result_token, Some(token));
        assert_eq!(snap.series_len, Some(90));
        assert_eq!(
            snap.trigger,
            Some(Trigger::Timeframe {
                asset_id: "bitcoin".into(),
                days: 30
            })
        );
    }

    #[tokio::test]
    async fn upstream_failure_lands_in_error_state() {
        let p = pipeline();
        p.submit_series(series(80, 100.0));

        p.refresh_from(&FailingSource, "ethereum", 7).await;
        assert_eq!(p.state(), PipelineState::Error);
        match p.last_error() {
            Some(AnalysisError::UpstreamFailure { message }) => {
                assert!(message.contains("network unreachable for ethereum"));
            }
            other => panic!("unexpected error {other:?}"),
        }
        // Old series and result survive.
        assert_eq!(p.series().unwrap().len(), 80);
        assert!(p.snapshot().stale);
    }

    #[tokio::test]
    async fn fetch_superseded_by_newer_trigger_is_dropped() {
        let p = pipeline();
        p.submit_series(series(80, 100.0));

        let source = Arc::new(GatedSource {
            series: series(120, 9_000.0),
            entered: Notify::new(),
            release: Notify::new(),
        });

        let task = {
            let p = p.clone();
            let source = source.clone();
            tokio::spawn(async move { p.refresh_from(&*source, "bitcoin", 90).await })
        };

        source.entered.notified().await;
        let newer = p
            .trigger(Trigger::Explicit {
                reason: "newer".into(),
            })
            .unwrap();

        source.release.notify_one();
        let fetch_token = task.await.unwrap();
        assert!(fetch_token < newer);

        let snap = p.snapshot();
        assert_eq!(snap.state, PipelineState::Ready);
        assert_eq!(snap.result_token, Some(newer));
        assert_eq!(snap.series_len, Some(80));
    }
}
