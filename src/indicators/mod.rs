// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the dashboard's technical
// indicators.  Every public function returns `Result<T, AnalysisError>` so
// callers are forced to handle insufficient-data and bad-parameter cases;
// nothing silently returns zeros.
//
// Alignment rule: an output series of length `m` computed over `n` prices
// starts at price index `n - m`.

pub mod bollinger;
pub mod ema;
pub mod fibonacci;
pub mod macd;
pub mod rsi;

use serde::{Deserialize, Serialize};

pub use bollinger::{calculate_bollinger, BollingerResult, Volatility};
pub use ema::{calculate_ema, calculate_sma};
pub use fibonacci::{calculate_fibonacci, FibonacciLevels, SwingPoints};
pub use macd::{calculate_macd, MacdResult, MacdSignal};
pub use rsi::{calculate_rsi, current_rsi, RsiIter, RsiZone};

use crate::error::AnalysisError;
use crate::market_data::PriceSeries;
use crate::settings::IndicatorSettings;

/// Price index of element `k` of an output series of length `values_len`
/// computed over `series_len` prices.
///
/// `None` when the output is longer than the series or `k` is past its end.
pub fn aligned_index(series_len: usize, values_len: usize, k: usize) -> Option<usize> {
    if k >= values_len {
        return None;
    }
    series_len.checked_sub(values_len).map(|offset| offset + k)
}

/// Latest RSI reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiReading {
    pub value: f64,
    pub zone: RsiZone,
    /// Set when alerts are enabled and the zone is not neutral.
    pub alert: bool,
}

/// One indicator family's output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "indicator", rename_all = "snake_case")]
pub enum IndicatorResult {
    Rsi(RsiReading),
    Macd {
        #[serde(flatten)]
        result: MacdResult,
        signal: MacdSignal,
    },
    Bollinger {
        #[serde(flatten)]
        result: BollingerResult,
        volatility: Option<Volatility>,
    },
    Fibonacci(FibonacciLevels),
}

/// Every family's output for one `(series, settings)` pair, in the order
/// RSI, MACD, Bollinger, Fibonacci.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub series_len: usize,
    pub results: Vec<IndicatorResult>,
}

impl IndicatorSnapshot {
    pub fn rsi(&self) -> Option<&RsiReading> {
        self.results.iter().find_map(|r| match r {
            IndicatorResult::Rsi(reading) => Some(reading),
            _ => None,
        })
    }

    pub fn macd(&self) -> Option<&MacdResult> {
        self.results.iter().find_map(|r| match r {
            IndicatorResult::Macd { result, .. } => Some(result),
            _ => None,
        })
    }

    pub fn bollinger(&self) -> Option<&BollingerResult> {
        self.results.iter().find_map(|r| match r {
            IndicatorResult::Bollinger { result, .. } => Some(result),
            _ => None,
        })
    }

    pub fn fibonacci(&self) -> Option<&FibonacciLevels> {
        self.results.iter().find_map(|r| match r {
            IndicatorResult::Fibonacci(levels) => Some(levels),
            _ => None,
        })
    }
}

pub fn compute_rsi(
    prices: &[f64],
    settings: &IndicatorSettings,
) -> Result<IndicatorResult, AnalysisError> {
    let rsi = &settings.rsi;
    let (value, zone) = current_rsi(prices, rsi.period, rsi.oversold, rsi.overbought)?;
    Ok(IndicatorResult::Rsi(RsiReading {
        value,
        zone,
        alert: rsi.alerts_enabled && zone != RsiZone::Neutral,
    }))
}

pub fn compute_macd(
    prices: &[f64],
    settings: &IndicatorSettings,
) -> Result<IndicatorResult, AnalysisError> {
    let m = &settings.macd;
    let result = calculate_macd(prices, m.fast_period, m.slow_period, m.signal_period)?;
    let signal = result.crossover();
    Ok(IndicatorResult::Macd { result, signal })
}

pub fn compute_bollinger(
    prices: &[f64],
    settings: &IndicatorSettings,
) -> Result<IndicatorResult, AnalysisError> {
    let b = &settings.bollinger;
    let result = calculate_bollinger(prices, b.period, b.deviations)?;
    let volatility = result.volatility();
    Ok(IndicatorResult::Bollinger { result, volatility })
}

pub fn compute_fibonacci(
    prices: &[f64],
    settings: &IndicatorSettings,
) -> Result<IndicatorResult, AnalysisError> {
    let f = &settings.fibonacci;
    let levels = calculate_fibonacci(prices, f.window_size, f.effective_manual_swing())?;
    Ok(IndicatorResult::Fibonacci(levels))
}

/// Run all four indicator families over `series`.
///
/// The first failing family aborts the whole computation.
pub fn compute_indicators(
    series: &PriceSeries,
    settings: &IndicatorSettings,
) -> Result<IndicatorSnapshot, AnalysisError> {
    let prices = series.prices();

    let results = vec![
        compute_rsi(&prices, settings)?,
        compute_macd(&prices, settings)?,
        compute_bollinger(&prices, settings)?,
        compute_fibonacci(&prices, settings)?,
    ];

    Ok(IndicatorSnapshot {
        series_len: prices.len(),
        results,
    })
}
