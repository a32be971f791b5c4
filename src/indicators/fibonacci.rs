// =============================================================================
// Fibonacci Retracement
// =============================================================================
//
// Levels sit between a swing high and a swing low at fixed ratios:
//   level_price = swing_high - ratio * (swing_high - swing_low)
//
// The swing points come either from the most recent `window_size` prices
// (max / min) or from an explicit manual pair.
//
// Strength:  0.382, 0.5, 0.618 => Strong
//            0.236, 0.786      => Medium
//            0, 1              => Weak (the swing bounds themselves)
//
// When swing_high == swing_low every level collapses onto that price and the
// result is flagged `degenerate`; nothing divides by the zero range.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

/// Retracement ratios, in output order.
pub const FIB_RATIOS: [f64; 7] = [0.0, 0.236, 0.382, 0.5, 0.618, 0.786, 1.0];

/// Explicit swing anchors entered by the trader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingPoints {
    pub high: f64,
    pub low: f64,
}

impl SwingPoints {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.high.is_finite() && self.low.is_finite()) {
            return Err(AnalysisError::invalid("swing points must be finite"));
        }
        if self.high < self.low {
            return Err(AnalysisError::invalid(format!(
                "swing high ({}) is below swing low ({})",
                self.high, self.low
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelStrength {
    Strong,
    Medium,
    Weak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelType {
    /// Ratio 0 or 1: the swing high / swing low itself.
    Boundary,
    /// 0 < ratio < 1.
    Retracement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Uptrend,
    Downtrend,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevel {
    pub ratio: f64,
    pub price: f64,
    pub level_type: LevelType,
    pub strength: LevelStrength,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibonacciLevels {
    pub levels: Vec<FibonacciLevel>,
    pub swing_high: f64,
    pub swing_low: f64,
    /// `true` when swing high equals swing low.
    pub degenerate: bool,
    /// Latest price relative to the swing midpoint; `None` without prices.
    pub trend: Option<Trend>,
}

impl FibonacciLevels {
    /// Where `price` sits inside the swing range, as a retracement ratio
    /// (0 at the swing high, 1 at the swing low).
    pub fn retracement_of(&self, price: f64) -> Result<f64, AnalysisError> {
        let range = self.swing_high - self.swing_low;
        if self.degenerate || range == 0.0 {
            return Err(AnalysisError::DegenerateRange {
                price: self.swing_high,
            });
        }
        Ok((self.swing_high - price) / range)
    }

    /// The level closest to `price`.
    pub fn nearest_level(&self, price: f64) -> Option<&FibonacciLevel> {
        self.levels
            .iter()
            .min_by(|a, b| (a.price - price).abs().total_cmp(&(b.price - price).abs()))
    }
}

pub fn level_strength(ratio: f64) -> LevelStrength {
    if ratio == 0.382 || ratio == 0.5 || ratio == 0.618 {
        LevelStrength::Strong
    } else if ratio == 0.236 || ratio == 0.786 {
        LevelStrength::Medium
    } else {
        LevelStrength::Weak
    }
}

pub fn level_type(ratio: f64) -> LevelType {
    if ratio > 0.0 && ratio < 1.0 {
        LevelType::Retracement
    } else {
        LevelType::Boundary
    }
}

/// Calculate Fibonacci retracement levels.
///
/// With `manual` set, those anchors are used as-is and `prices` only feeds the
/// trend reading. Otherwise the swing high/low are the max/min of the last
/// `window_size` prices.
///
/// # Errors
/// - `window_size == 0` or invalid manual anchors => `InvalidInput`
/// - auto-detection with `prices.len() < window_size` => `InsufficientData`
pub fn calculate_fibonacci(
    prices: &[f64],
    window_size: usize,
    manual: Option<SwingPoints>,
) -> Result<FibonacciLevels, AnalysisError> {
    let (swing_high, swing_low) = match manual {
        Some(points) => {
            points.validate()?;
            (points.high, points.low)
        }
        None => detect_swing(prices, window_size)?,
    };

    let range = swing_high - swing_low;
    let degenerate = range == 0.0;

    let levels = FIB_RATIOS
        .iter()
        .map(|&ratio| FibonacciLevel {
            ratio,
            price: level_price(swing_high, swing_low, ratio),
            level_type: level_type(ratio),
            strength: level_strength(ratio),
        })
        .collect();

    let trend = prices.last().map(|&last| {
        if last > (swing_high + swing_low) / 2.0 {
            Trend::Uptrend
        } else {
            Trend::Downtrend
        }
    });

    Ok(FibonacciLevels {
        levels,
        swing_high,
        swing_low,
        degenerate,
        trend,
    })
}

/// Boundary ratios return the anchors exactly; `high - 1.0 * (high - low)`
/// does not always round back to `low`.
fn level_price(swing_high: f64, swing_low: f64, ratio: f64) -> f64 {
    if ratio <= 0.0 || swing_high == swing_low {
        swing_high
    } else if ratio >= 1.0 {
        swing_low
    } else {
        swing_high - ratio * (swing_high - swing_low)
    }
}

/// Max / min over the most recent `window_size` prices.
fn detect_swing(prices: &[f64], window_size: usize) -> Result<(f64, f64), AnalysisError> {
    if window_size == 0 {
        return Err(AnalysisError::invalid("Fibonacci window size must be >= 1"));
    }
    if prices.len() < window_size {
        return Err(AnalysisError::insufficient(
            "Fibonacci",
            window_size,
            prices.len(),
        ));
    }

    let window = &prices[prices.len() - window_size..];
    let high = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().copied().fold(f64::INFINITY, f64::min);
    Ok((high, low))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn levels_from_window() {
        let prices = [
            100.0, 105.0, 110.0, 115.0, 120.0, 115.0, 110.0, 105.0, 100.0, 95.0, 90.0, 85.0,
            90.0, 95.0, 100.0, 105.0, 110.0, 115.0,
        ];
        let fib = calculate_fibonacci(&prices, 10, None).unwrap();
        // Last 10 prices: 100..85..115.
        assert_eq!(fib.swing_high, 115.0);
        assert_eq!(fib.swing_low, 85.0);
        assert!(!fib.degenerate);
        assert_eq!(fib.levels.len(), 7);
        assert_eq!(fib.levels[0].price, 115.0);
        assert_eq!(fib.levels[6].price, 85.0);
        assert!((fib.levels[3].price - 100.0).abs() < 1e-10);
        assert_eq!(fib.trend, Some(Trend::Uptrend));
    }

    #[test]
    fn window_ignores_older_prices() {
        let prices = [500.0, 1.0, 10.0, 12.0, 11.0];
        let fib = calculate_fibonacci(&prices, 3, None).unwrap();
        assert_eq!(fib.swing_high, 12.0);
        assert_eq!(fib.swing_low, 10.0);
    }

    #[test]
    fn manual_swing_points_take_precedence() {
        let prices = [10.0, 11.0, 12.0];
        let fib =
            calculate_fibonacci(&prices, 50, Some(SwingPoints { high: 200.0, low: 100.0 }))
                .unwrap();
        assert_eq!(fib.swing_high, 200.0);
        assert!((fib.levels[2].price - 161.8).abs() < 1e-9);
        assert_eq!(fib.trend, Some(Trend::Downtrend));
    }

    #[test]
    fn manual_swing_without_prices_has_no_trend() {
        let fib = calculate_fibonacci(&[], 20, Some(SwingPoints { high: 2.0, low: 1.0 })).unwrap();
        assert!(fib.trend.is_none());
    }

    #[test]
    fn rejects_inverted_manual_points() {
        let err = calculate_fibonacci(&[], 20, Some(SwingPoints { high: 1.0, low: 2.0 }));
        assert!(matches!(err, Err(AnalysisError::InvalidInput { .. })));
    }

    #[test]
    fn insufficient_window() {
        assert!(matches!(
            calculate_fibonacci(&[1.0, 2.0], 5, None),
            Err(AnalysisError::InsufficientData { required: 5, actual: 2, .. })
        ));
        assert!(calculate_fibonacci(&[1.0], 0, None).is_err());
    }

    #[test]
    fn degenerate_range_is_flagged() {
        let fib = calculate_fibonacci(&[42.0; 10], 10, None).unwrap();
        assert!(fib.degenerate);
        assert!(fib.levels.iter().all(|l| l.price == 42.0));
        assert!(matches!(
            fib.retracement_of(42.0),
            Err(AnalysisError::DegenerateRange { price }) if price == 42.0
        ));
    }

    #[test]
    fn classification() {
        assert_eq!(level_strength(0.382), LevelStrength::Strong);
        assert_eq!(level_strength(0.5), LevelStrength::Strong);
        assert_eq!(level_strength(0.236), LevelStrength::Medium);
        assert_eq!(level_strength(0.786), LevelStrength::Medium);
        assert_eq!(level_strength(0.0), LevelStrength::Weak);
        assert_eq!(level_strength(1.0), LevelStrength::Weak);

        assert_eq!(level_type(0.0), LevelType::Boundary);
        assert_eq!(level_type(0.618), LevelType::Retracement);
        assert_eq!(level_type(1.0), LevelType::Boundary);
    }

    #[test]
    fn level_enums_serialise_snake_case() {
        let fib = calculate_fibonacci(&[100.0, 200.0], 2, None).unwrap();
        let json = serde_json::to_value(&fib).unwrap();
        let level = &json["levels"][3];
        assert_eq!(level["ratio"], 0.5);
        assert_eq!(level["strength"], "strong");
        assert_eq!(level["level_type"], "retracement");
        assert_eq!(json["levels"][0]["strength"], "weak");
        assert_eq!(json["levels"][2]["strength"], "strong");

        assert_eq!(
            serde_json::to_value(LevelStrength::Medium).unwrap(),
            "medium"
        );
        let parsed: LevelStrength = serde_json::from_str(r#""strong""#).unwrap();
        assert_eq!(parsed, LevelStrength::Strong);
    }

    #[test]
    fn retracement_and_nearest_level() {
        let fib = calculate_fibonacci(&[100.0, 200.0], 2, None).unwrap();
        assert!((fib.retracement_of(150.0).unwrap() - 0.5).abs() < 1e-12);
        let nearest = fib.nearest_level(140.0).unwrap();
        assert_eq!(nearest.ratio, 0.618);
    }

    proptest! {
        #[test]
        fn levels_are_monotonic_and_bounded(
            prices in prop::collection::vec(1.0f64..10_000.0, 1..100),
            window in 1usize..50,
        ) {
            prop_assume!(prices.len() >= window);
            let fib = calculate_fibonacci(&prices, window, None).unwrap();
            prop_assert_eq!(fib.levels[0].price, fib.swing_high);
            prop_assert_eq!(fib.levels[6].price, fib.swing_low);
            for pair in fib.levels.windows(2) {
                prop_assert!(pair[0].ratio < pair[1].ratio);
                prop_assert!(pair[0].price >= pair[1].price);
            }
            for level in &fib.levels {
                prop_assert!(level.price <= fib.swing_high);
                prop_assert!(level.price >= fib.swing_low);
            }
        }
    }
}
