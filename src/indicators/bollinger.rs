// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), where σ is the population standard deviation
// over the same window. The Band Width (BBW) is the normalised distance:
// BBW = (upper - lower) / middle * 100, or 0 when the middle band is 0.
//
// Every output series starts at price index `period - 1`; earlier indices are
// excluded, not zero-padded.

use serde::{Deserialize, Serialize};

use super::ema::calculate_sma;
use crate::error::AnalysisError;

/// Bandwidth above which volatility reads as high.
const HIGH_VOLATILITY_BANDWIDTH: f64 = 30.0;
/// Bandwidth below which volatility reads as low.
const LOW_VOLATILITY_BANDWIDTH: f64 = 10.0;

/// Result of a Bollinger Band calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerResult {
    pub upper_band: Vec<f64>,
    pub middle_band: Vec<f64>,
    pub lower_band: Vec<f64>,
    pub bandwidth: Vec<f64>,
    /// Position of each price inside its band, in percent.
    pub percent_b: Vec<f64>,
}

/// Coarse volatility reading derived from bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    Low,
    Normal,
    High,
}

impl Volatility {
    pub fn from_bandwidth(bandwidth: f64) -> Self {
        if bandwidth > HIGH_VOLATILITY_BANDWIDTH {
            Self::High
        } else if bandwidth < LOW_VOLATILITY_BANDWIDTH {
            Self::Low
        } else {
            Self::Normal
        }
    }
}

impl BollingerResult {
    /// Volatility reading for the most recent window.
    pub fn volatility(&self) -> Option<Volatility> {
        self.bandwidth.last().copied().map(Volatility::from_bandwidth)
    }
}

/// Calculate Bollinger Bands for `prices`.
///
/// # Errors
/// - `period == 0` or `deviations` not a finite positive number => `InvalidInput`
/// - `prices.len() < period` => `InsufficientData`
pub fn calculate_bollinger(
    prices: &[f64],
    period: usize,
    deviations: f64,
) -> Result<BollingerResult, AnalysisError> {
    if period == 0 {
        return Err(AnalysisError::invalid("Bollinger period must be >= 1"));
    }
    if !(deviations.is_finite() && deviations > 0.0) {
        return Err(AnalysisError::invalid(format!(
            "Bollinger deviations must be > 0, got {deviations}"
        )));
    }
    if prices.len() < period {
        return Err(AnalysisError::insufficient("Bollinger", period, prices.len()));
    }

    let mut middle_band = calculate_sma(prices, period)?;
    let len = middle_band.len();

    let mut upper_band = Vec::with_capacity(len);
    let mut lower_band = Vec::with_capacity(len);
    let mut bandwidth = Vec::with_capacity(len);
    let mut percent_b = Vec::with_capacity(len);

    for (window, middle_slot) in prices.windows(period).zip(middle_band.iter_mut()) {
        // A flat window collapses all three bands onto its price; the summed
        // mean can be off by an ulp and would otherwise leave a sliver.
        if window.iter().all(|&x| x == window[0]) {
            *middle_slot = window[0];
        }
        let middle = *middle_slot;

        let variance =
            window.iter().map(|x| (x - middle).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();

        let upper = middle + deviations * std_dev;
        let lower = middle - deviations * std_dev;

        let width = if middle == 0.0 {
            0.0
        } else {
            (upper - lower) / middle * 100.0
        };

        let price = window[period - 1];
        let pct_b = if upper == lower {
            50.0
        } else {
            (price - lower) / (upper - lower) * 100.0
        };

        upper_band.push(upper);
        lower_band.push(lower);
        bandwidth.push(width);
        percent_b.push(pct_b);
    }

    Ok(BollingerResult {
        upper_band,
        middle_band,
        lower_band,
        bandwidth,
        percent_b,
    })
}
