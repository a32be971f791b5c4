// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1 — Compute price changes (deltas) from consecutive prices.
// Step 2 — Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3 — Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)      (100 when avg_loss == 0)
//
// Zones are configurable: value >= overbought => OVERBOUGHT,
// value <= oversold => OVERSOLD.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Lazy RSI sequence over a price slice.
///
/// Yields one value per price index from `period` onward, i.e. exactly
/// `prices.len() - period` values.
#[derive(Debug, Clone)]
pub struct RsiIter<'a> {
    prices: &'a [f64],
    period: f64,
    avg_gain: f64,
    avg_loss: f64,
    /// Next price index to produce a value for.
    next: usize,
    seeded: bool,
}

impl<'a> RsiIter<'a> {
    /// Validate inputs and seed the Wilder averages.
    ///
    /// # Errors
    /// - `period < 2` => `InvalidInput`
    /// - `prices.len() < period + 1` => `InsufficientData`
    pub fn new(prices: &'a [f64], period: usize) -> Result<Self, AnalysisError> {
        if period < 2 {
            return Err(AnalysisError::invalid(format!(
                "RSI period must be >= 2, got {period}"
            )));
        }
        // Saturates: no slice holds usize::MAX prices.
        let required = period.saturating_add(1);
        if prices.len() < required {
            return Err(AnalysisError::insufficient("RSI", required, prices.len()));
        }

        // --- Seed averages with SMA of first `period` deltas -------------------
        let (sum_gain, sum_loss) = prices[..=period].windows(2).map(|w| w[1] - w[0]).fold(
            (0.0_f64, 0.0_f64),
            |(g, l), d| if d > 0.0 { (g + d, l) } else { (g, l - d) },
        );

        let period_f = period as f64;
        Ok(Self {
            prices,
            period: period_f,
            avg_gain: sum_gain / period_f,
            avg_loss: sum_loss / period_f,
            next: period,
            seeded: false,
        })
    }
}

impl Iterator for RsiIter<'_> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.next >= self.prices.len() {
            return None;
        }

        if self.seeded {
            let delta = self.prices[self.next] - self.prices[self.next - 1];
            let gain = delta.max(0.0);
            let loss = (-delta).max(0.0);
            self.avg_gain = (self.avg_gain * (self.period - 1.0) + gain) / self.period;
            self.avg_loss = (self.avg_loss * (self.period - 1.0) + loss) / self.period;
        } else {
            // The seed already covers the first `period` deltas.
            self.seeded = true;
        }

        self.next += 1;
        Some(rsi_from_averages(self.avg_gain, self.avg_loss))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.prices.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for RsiIter<'_> {}

/// Compute the full RSI series for `prices` and `period`.
///
/// The returned vector has one RSI value for each price starting at index
/// `period`.
pub fn calculate_rsi(prices: &[f64], period: usize) -> Result<Vec<f64>, AnalysisError> {
    Ok(RsiIter::new(prices, period)?.collect())
}

/// Where an RSI value sits relative to the configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RsiZone {
    Oversold,
    Neutral,
    Overbought,
}

impl RsiZone {
    pub fn classify(value: f64, oversold: f64, overbought: f64) -> Self {
        if value >= overbought {
            Self::Overbought
        } else if value <= oversold {
            Self::Oversold
        } else {
            Self::Neutral
        }
    }
}

impl std::fmt::Display for RsiZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oversold => write!(f, "OVERSOLD"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Overbought => write!(f, "OVERBOUGHT"),
        }
    }
}

/// Most recent RSI value together with its zone.
pub fn current_rsi(
    prices: &[f64],
    period: usize,
    oversold: f64,
    overbought: f64,
) -> Result<(f64, RsiZone), AnalysisError> {
    let value = RsiIter::new(prices, period)?.last().ok_or_else(|| {
        AnalysisError::insufficient("RSI", period.saturating_add(1), prices.len())
    })?;
    Ok((value, RsiZone::classify(value, oversold, overbought)))
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
/// A zero average loss means no down moves at all, which pins RSI to 100.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}
