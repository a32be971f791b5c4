// =============================================================================
// Moving Averages — SMA and EMA
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_t      = value_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `period`
// values, so the output is aligned with the input from index `period - 1`.
// =============================================================================

use crate::error::AnalysisError;

/// Compute the EMA series for `values` and look-back `period`.
///
/// Each output element corresponds to an input element starting at index
/// `period - 1`; the output length is `values.len() - period + 1`.
///
/// # Errors
/// - `period == 0` => `InvalidInput`
/// - `values.len() < period` => `InsufficientData`
pub fn calculate_ema(values: &[f64], period: usize) -> Result<Vec<f64>, AnalysisError> {
    if period == 0 {
        return Err(AnalysisError::invalid("EMA period must be >= 1"));
    }
    if values.len() < period {
        return Err(AnalysisError::insufficient("EMA", period, values.len()));
    }

    let multiplier = 2.0 / (period as f64 + 1.0);

    // Seed: SMA of the first `period` values.
    let seed = values[..period].iter().sum::<f64>() / period as f64;

    let mut result = Vec::with_capacity(values.len() - period + 1);
    result.push(seed);

    let mut prev = seed;
    for &value in &values[period..] {
        let ema = value * multiplier + prev * (1.0 - multiplier);
        result.push(ema);
        prev = ema;
    }

    Ok(result)
}

/// Compute the rolling simple moving average over `period` values.
///
/// Output is aligned with the input from index `period - 1`. Each window is
/// summed directly rather than with a running sum so that repeated values
/// produce exactly that value.
pub fn calculate_sma(values: &[f64], period: usize) -> Result<Vec<f64>, AnalysisError> {
    if period == 0 {
        return Err(AnalysisError::invalid("SMA period must be >= 1"));
    }
    if values.len() < period {
        return Err(AnalysisError::insufficient("SMA", period, values.len()));
    }

    Ok(values
        .windows(period)
        .map(|w| w.iter().sum::<f64>() / period as f64)
        .collect())
}
