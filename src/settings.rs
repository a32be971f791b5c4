// =============================================================================
// Indicator Settings — per-session parameter store with change notification
// =============================================================================
//
// One `SettingsStore` per session holds the four indicator parameter records.
// Each family is mutated through its own patch: the patch is merged into a
// copy of the current record, the merged record is validated, and only then
// is it committed.  A rejected patch leaves the store untouched.
//
// Every committed change bumps a version number and publishes it on a
// `watch` channel; the recompute pipeline subscribes to that channel.
//
// Reads return a cloned snapshot taken under the lock, so a reader never
// observes half of an update.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::AnalysisError;
use crate::indicators::fibonacci::SwingPoints;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_rsi_period() -> usize {
    14
}

fn default_oversold() -> f64 {
    30.0
}

fn default_overbought() -> f64 {
    70.0
}

fn default_fast_period() -> usize {
    12
}

fn default_slow_period() -> usize {
    26
}

fn default_signal_period() -> usize {
    9
}

fn default_bollinger_period() -> usize {
    20
}

fn default_deviations() -> f64 {
    2.0
}

fn default_window_size() -> usize {
    20
}

// =============================================================================
// Per-family records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiSettings {
    #[serde(default = "default_rsi_period")]
    pub period: usize,

    /// RSI at or below this value reads as oversold.
    #[serde(default = "default_oversold")]
    pub oversold: f64,

    /// RSI at or above this value reads as overbought.
    #[serde(default = "default_overbought")]
    pub overbought: f64,

    /// Flag the RSI result when it leaves the neutral zone.
    #[serde(default = "default_true")]
    pub alerts_enabled: bool,
}

impl Default for RsiSettings {
    fn default() -> Self {
        Self {
            period: default_rsi_period(),
            oversold: default_oversold(),
            overbought: default_overbought(),
            alerts_enabled: true,
        }
    }
}

impl RsiSettings {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.period < 2 {
            return Err(AnalysisError::invalid(format!(
                "RSI period must be >= 2, got {}",
                self.period
            )));
        }
        let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
        if !in_range(self.oversold) || !in_range(self.overbought) {
            return Err(AnalysisError::invalid("RSI thresholds must lie in [0, 100]"));
        }
        if self.oversold >= self.overbought {
            return Err(AnalysisError::invalid(format!(
                "RSI oversold ({}) must be below overbought ({})",
                self.oversold, self.overbought
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdSettings {
    #[serde(default = "default_fast_period")]
    pub fast_period: usize,
    #[serde(default = "default_slow_period")]
    pub slow_period: usize,
    #[serde(default = "default_signal_period")]
    pub signal_period: usize,
}

impl Default for MacdSettings {
    fn default() -> Self {
        Self {
            fast_period: default_fast_period(),
            slow_period: default_slow_period(),
            signal_period: default_signal_period(),
        }
    }
}

impl MacdSettings {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.fast_period == 0 || self.signal_period == 0 {
            return Err(AnalysisError::invalid("MACD periods must be >= 1"));
        }
        if self.fast_period >= self.slow_period {
            return Err(AnalysisError::invalid(format!(
                "MACD fast period ({}) must be below slow period ({})",
                self.fast_period, self.slow_period
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerSettings {
    #[serde(default = "default_bollinger_period")]
    pub period: usize,
    /// Band half-width in standard deviations.
    #[serde(default = "default_deviations")]
    pub deviations: f64,
}

impl Default for BollingerSettings {
    fn default() -> Self {
        Self {
            period: default_bollinger_period(),
            deviations: default_deviations(),
        }
    }
}

impl BollingerSettings {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.period == 0 {
            return Err(AnalysisError::invalid("Bollinger period must be >= 1"));
        }
        if !(self.deviations.is_finite() && self.deviations > 0.0) {
            return Err(AnalysisError::invalid(format!(
                "Bollinger deviations must be > 0, got {}",
                self.deviations
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciSettings {
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Detect swing points from the price window. When off and
    /// `manual_swing` is set, the manual anchors are used instead.
    #[serde(default = "default_true")]
    pub auto_detect: bool,

    #[serde(default)]
    pub manual_swing: Option<SwingPoints>,
}

impl Default for FibonacciSettings {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            auto_detect: true,
            manual_swing: None,
        }
    }
}

impl FibonacciSettings {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if self.window_size == 0 {
            return Err(AnalysisError::invalid("Fibonacci window size must be >= 1"));
        }
        if let Some(points) = &self.manual_swing {
            points.validate()?;
        }
        Ok(())
    }

    /// Manual anchors in effect, if any.
    pub fn effective_manual_swing(&self) -> Option<SwingPoints> {
        if self.auto_detect {
            None
        } else {
            self.manual_swing
        }
    }
}

// =============================================================================
// IndicatorSettings
// =============================================================================

/// All indicator parameters for one session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSettings {
    #[serde(default)]
    pub rsi: RsiSettings,
    #[serde(default)]
    pub macd: MacdSettings,
    #[serde(default)]
    pub bollinger: BollingerSettings,
    #[serde(default)]
    pub fibonacci: FibonacciSettings,
}

impl IndicatorSettings {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.rsi.validate()?;
        self.macd.validate()?;
        self.bollinger.validate()?;
        self.fibonacci.validate()
    }
}

// =============================================================================
// Patches
// =============================================================================

macro_rules! merge_field {
    ($patch:ident, $target:ident, $field:ident) => {
        if let Some(val) = $patch.$field {
            $target.$field = val;
        }
    };
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RsiPatch {
    #[serde(default)]
    pub period: Option<usize>,
    #[serde(default)]
    pub oversold: Option<f64>,
    #[serde(default)]
    pub overbought: Option<f64>,
    #[serde(default)]
    pub alerts_enabled: Option<bool>,
}

impl RsiPatch {
    pub fn apply(self, target: &mut RsiSettings) {
        merge_field!(self, target, period);
        merge_field!(self, target, oversold);
        merge_field!(self, target, overbought);
        merge_field!(self, target, alerts_enabled);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MacdPatch {
    #[serde(default)]
    pub fast_period: Option<usize>,
    #[serde(default)]
    pub slow_period: Option<usize>,
    #[serde(default)]
    pub signal_period: Option<usize>,
}

impl MacdPatch {
    pub fn apply(self, target: &mut MacdSettings) {
        merge_field!(self, target, fast_period);
        merge_field!(self, target, slow_period);
        merge_field!(self, target, signal_period);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BollingerPatch {
    #[serde(default)]
    pub period: Option<usize>,
    #[serde(default)]
    pub deviations: Option<f64>,
}

impl BollingerPatch {
    pub fn apply(self, target: &mut BollingerSettings) {
        merge_field!(self, target, period);
        merge_field!(self, target, deviations);
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FibonacciPatch {
    #[serde(default)]
    pub window_size: Option<usize>,
    #[serde(default)]
    pub auto_detect: Option<bool>,
    /// `Some(None)` clears the manual anchors; JSON `null` maps to that.
    #[serde(default, deserialize_with = "deserialize_some")]
    pub manual_swing: Option<Option<SwingPoints>>,
}

impl FibonacciPatch {
    pub fn apply(self, target: &mut FibonacciSettings) {
        merge_field!(self, target, window_size);
        merge_field!(self, target, auto_detect);
        merge_field!(self, target, manual_swing);
    }
}

/// Distinguish an explicit `null` from an absent field.
fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// =============================================================================
// SettingsStore
// =============================================================================

pub struct SettingsStore {
    settings: RwLock<IndicatorSettings>,
    version: AtomicU64,
    notify: watch::Sender<u64>,
}

impl Default for SettingsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingsStore {
    /// Store holding the default settings, at version 0.
    pub fn new() -> Self {
        let (notify, _) = watch::channel(0);
        Self {
            settings: RwLock::new(IndicatorSettings::default()),
            version: AtomicU64::new(0),
            notify,
        }
    }

    /// Consistent copy of all four records.
    pub fn snapshot(&self) -> IndicatorSettings {
        self.settings.read().clone()
    }

    /// Settings together with the version they were committed at.  The
    /// version only moves under the write lock, so the pair is consistent.
    pub fn versioned_snapshot(&self) -> (u64, IndicatorSettings) {
        let settings = self.settings.read();
        (self.version(), settings.clone())
    }

    /// Number of committed changes so far.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    /// Receiver that observes the version after every committed change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    pub fn update_rsi(&self, patch: RsiPatch) -> Result<IndicatorSettings, AnalysisError> {
        self.update("rsi", |s| patch.apply(&mut s.rsi))
    }

    pub fn update_macd(&self, patch: MacdPatch) -> Result<IndicatorSettings, AnalysisError> {
        self.update("macd", |s| patch.apply(&mut s.macd))
    }

    pub fn update_bollinger(
        &self,
        patch: BollingerPatch,
    ) -> Result<IndicatorSettings, AnalysisError> {
        self.update("bollinger", |s| patch.apply(&mut s.bollinger))
    }

    pub fn update_fibonacci(
        &self,
        patch: FibonacciPatch,
    ) -> Result<IndicatorSettings, AnalysisError> {
        self.update("fibonacci", |s| patch.apply(&mut s.fibonacci))
    }

    /// Restore the defaults.
    pub fn reset(&self) -> IndicatorSettings {
        // Defaults always validate.
        self.update("all", |s| *s = IndicatorSettings::default())
            .unwrap_or_default()
    }

    /// Merge, validate, commit, notify. Holding the write lock across the
    /// whole sequence serialises concurrent updates.
    fn update<F>(&self, family: &'static str, merge: F) -> Result<IndicatorSettings, AnalysisError>
    where
        F: FnOnce(&mut IndicatorSettings),
    {
        let mut current = self.settings.write();

        let mut next = current.clone();
        merge(&mut next);
        if let Err(e) = next.validate() {
            debug!(family, error = %e, "settings patch rejected");
            return Err(e);
        }

        if next == *current {
            debug!(family, "settings patch is a no-op");
            return Ok(next);
        }

        *current = next.clone();
        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        self.notify.send_replace(version);

        info!(family, version, "indicator settings updated");
        Ok(next)
    }
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsStore")
            .field("settings", &*self.settings.read())
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

    #[test]
    fn default_settings_have_expected_values() {
        let s = IndicatorSettings::default();
        assert_eq!(s.rsi.period, 14);
        assert_eq!(s.rsi.oversold, 30.0);
        assert_eq!(s.rsi.overbought, 70.0);
        assert!(s.rsi.alerts_enabled);
        assert_eq!(
            (s.macd.fast_period, s.macd.slow_period, s.macd.signal_period),
            (12, 26, 9)
        );
        assert_eq!(s.bollinger.period, 20);
        assert_eq!(s.bollinger.deviations, 2.0);
        assert_eq!(s.fibonacci.window_size, 20);
        assert!(s.fibonacci.auto_detect);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let s: IndicatorSettings =
            serde_json::from_str(r#"{ "rsi": { "period": 7 }, "bollinger": {} }"#).unwrap();
        assert_eq!(s.rsi.period, 7);
        assert_eq!(s.rsi.overbought, 70.0);
        assert_eq!(s.bollinger.period, 20);
        assert_eq!(s.macd.slow_period, 26);
    }

    #[test]
    fn patch_merges_only_given_fields() {
        let store = SettingsStore::new();
        let updated = store
            .update_rsi(RsiPatch {
                period: Some(21),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(updated.rsi.period, 21);
        assert_eq!(updated.rsi.oversold, 30.0);
        assert_eq!(updated.macd, MacdSettings::default());
        assert_eq!(store.snapshot(), updated);
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn invalid_patch_leaves_store_unchanged() {
        let store = SettingsStore::new();
        let err = store
            .update_macd(MacdPatch {
                fast_period: Some(30),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput { .. }));
        assert_eq!(store.snapshot(), IndicatorSettings::default());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn patch_validated_against_merged_record() {
        // slow 10 alone conflicts with the current fast 12, but the pair is fine.
        let store = SettingsStore::new();
        let updated = store
            .update_macd(MacdPatch {
                fast_period: Some(5),
                slow_period: Some(10),
                signal_period: None,
            })
            .unwrap();
        assert_eq!(updated.macd.fast_period, 5);
        assert_eq!(updated.macd.slow_period, 10);
    }

    #[test]
    fn noop_patch_does_not_bump_version() {
        let store = SettingsStore::new();
        store
            .update_bollinger(BollingerPatch {
                period: Some(20),
                deviations: None,
            })
            .unwrap();
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn rejects_bad_rsi_thresholds() {
        let store = SettingsStore::new();
        assert!(store
            .update_rsi(RsiPatch {
                oversold: Some(80.0),
                ..Default::default()
            })
            .is_err());
        assert!(store
            .update_rsi(RsiPatch {
                period: Some(1),
                ..Default::default()
            })
            .is_err());
    }

    #[test]
    fn subscribers_see_new_versions() {
        let store = SettingsStore::new();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        store
            .update_bollinger(BollingerPatch {
                period: None,
                deviations: Some(2.5),
            })
            .unwrap();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
    }

    #[test]
    fn fibonacci_patch_sets_and_clears_manual_swing() {
        let store = SettingsStore::new();
        let patch: FibonacciPatch = serde_json::from_str(
            r#"{ "auto_detect": false, "manual_swing": { "high": 120.0, "low": 80.0 } }"#,
        )
        .unwrap();
        let s = store.update_fibonacci(patch).unwrap();
        assert_eq!(
            s.fibonacci.effective_manual_swing(),
            Some(SwingPoints { high: 120.0, low: 80.0 })
        );

        let clear: FibonacciPatch = serde_json::from_str(r#"{ "manual_swing": null }"#).unwrap();
        let s = store.update_fibonacci(clear).unwrap();
        assert!(s.fibonacci.manual_swing.is_none());
        assert!(!s.fibonacci.auto_detect);

        let untouched: FibonacciPatch = serde_json::from_str(r#"{ "window_size": 30 }"#).unwrap();
        assert!(untouched.manual_swing.is_none());
    }

    #[test]
    fn auto_detect_ignores_manual_swing() {
        let fib = FibonacciSettings {
            window_size: 20,
            auto_detect: true,
            manual_swing: Some(SwingPoints { high: 2.0, low: 1.0 }),
        };
        assert!(fib.effective_manual_swing().is_none());
    }

    #[test]
    fn reset_restores_defaults() {
        let store = SettingsStore::new();
        store
            .update_rsi(RsiPatch {
                period: Some(5),
                ..Default::default()
            })
            .unwrap();
        let s = store.reset();
        assert_eq!(s, IndicatorSettings::default());
        assert_eq!(store.version(), 2);
    }

    #[test]
    fn versioned_snapshot_pairs_settings_with_their_version() {
        let store = SettingsStore::new();
        assert_eq!(store.versioned_snapshot(), (0, IndicatorSettings::default()));

        let s = store
            .update_macd(MacdPatch {
                fast_period: Some(8),
                ..Default::default()
            })
            .unwrap();
        let (version, settings) = store.versioned_snapshot();
        assert_eq!(version, 1);
        assert_eq!(settings, s);
    }
}
