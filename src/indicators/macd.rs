// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   macd_line   = EMA(prices, fast) - EMA(prices, slow)
//   signal_line = EMA(macd_line, signal)
//   histogram   = macd_line - signal_line
//
// Alignment (n = number of prices):
//   macd_line   starts at price index slow - 1
//   signal_line starts at price index slow + signal - 2
//   histogram   shares the signal line's alignment
//
// Minimum input length is `slow + signal`.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::ema::calculate_ema;
use crate::error::AnalysisError;

/// The three MACD series, each aligned to a suffix of the input prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Crossover reading from the last two histogram values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacdSignal {
    BullishCrossover,
    BearishCrossover,
    NoSignal,
}

impl MacdResult {
    /// Histogram sign change between the previous and the latest value.
    pub fn crossover(&self) -> MacdSignal {
        match self.histogram.as_slice() {
            [.., prev, curr] if *prev <= 0.0 && *curr > 0.0 => MacdSignal::BullishCrossover,
            [.., prev, curr] if *prev >= 0.0 && *curr < 0.0 => MacdSignal::BearishCrossover,
            _ => MacdSignal::NoSignal,
        }
    }
}

/// Calculate MACD for `prices`.
///
/// # Errors
/// - `fast == 0`, `signal == 0` or `fast >= slow` => `InvalidInput`
/// - `prices.len() < slow + signal` => `InsufficientData`
pub fn calculate_macd(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<MacdResult, AnalysisError> {
    if fast == 0 || signal == 0 {
        return Err(AnalysisError::invalid("MACD periods must be >= 1"));
    }
    if fast >= slow {
        return Err(AnalysisError::invalid(format!(
            "MACD fast period ({fast}) must be below slow period ({slow})"
        )));
    }
    let required = slow.saturating_add(signal);
    if prices.len() < required {
        return Err(AnalysisError::insufficient("MACD", required, prices.len()));
    }

    let fast_ema = calculate_ema(prices, fast)?;
    let slow_ema = calculate_ema(prices, slow)?;

    // fast_ema[k] sits at price index fast-1+k, slow_ema[j] at slow-1+j.
    let lag = slow - fast;
    let macd_line: Vec<f64> = slow_ema
        .iter()
        .enumerate()
        .map(|(j, slow_val)| fast_ema[j + lag] - slow_val)
        .collect();

    let signal_line = calculate_ema(&macd_line, signal)?;

    let histogram: Vec<f64> = macd_line[signal - 1..]
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| m - s)
        .collect();

    Ok(MacdResult {
        macd_line,
        signal_line,
        histogram,
    })
}
