// =============================================================================
// Leverage Calculator — position sizing from a trader's loss tolerance
// =============================================================================
//
//   max_loss_pct = max_loss                       (percentage mode)
//                = max_loss / capital * 100       (amount mode)
//   leverage     = max_loss_pct / (stop_loss_pct + fees_pct)
//   position     = capital * leverage
//
// Risk tiers (on full-precision leverage):
//   (0, 2]   Low
//   (2, 5]   Moderate
//   (5, 10]  High
//   (10, ∞)  VeryHigh
//
// Every call is independent: no history, no side effects.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Trader inputs for one leverage computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageInput {
    /// Total capital available.
    pub capital: f64,
    /// Acceptable loss, either a percentage of capital or an amount.
    pub max_loss: f64,
    /// `true` when `max_loss` is a percentage.
    #[serde(default)]
    pub is_max_loss_percentage: bool,
    /// Stop-loss distance in percent.
    pub stop_loss_percent: f64,
    /// Round-trip trading fees in percent.
    #[serde(default)]
    pub fees_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
    VeryHigh,
}

impl RiskTier {
    pub fn from_leverage(leverage: f64) -> Self {
        if leverage <= 2.0 {
            Self::Low
        } else if leverage <= 5.0 {
            Self::Moderate
        } else if leverage <= 10.0 {
            Self::High
        } else {
            Self::VeryHigh
        }
    }

    /// One-line guidance shown next to the tier.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Low => "Conservative risk level, suitable for beginners.",
            Self::Moderate => "Acceptable risk level for experienced traders.",
            Self::High => "This leverage level carries significant risk.",
            Self::VeryHigh => "Warning: this leverage level is extremely risky.",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "Low"),
            Self::Moderate => write!(f, "Moderate"),
            Self::High => write!(f, "High"),
            Self::VeryHigh => write!(f, "Very High"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeverageResult {
    /// Full-precision leverage.
    pub leverage: f64,
    /// Leverage rounded to 2 decimal places.
    pub leverage_display: f64,
    /// `capital * leverage`, computed from the full-precision leverage.
    pub position_size: f64,
    pub risk_tier: RiskTier,
    pub max_loss_percent: f64,
    pub max_loss_amount: f64,
}

// ---------------------------------------------------------------------------
// Computation
// ---------------------------------------------------------------------------

/// Compute leverage, position size and risk tier.
///
/// # Errors
/// `InvalidInput` when any field is non-finite, `capital <= 0`,
/// `stop_loss_percent <= 0`, `fees_percent < 0`, the resulting maximum loss
/// percentage is not a finite positive number, or the leverage, position size
/// or loss amount overflows.
pub fn compute_leverage(input: &LeverageInput) -> Result<LeverageResult, AnalysisError> {
    let LeverageInput {
        capital,
        max_loss,
        is_max_loss_percentage,
        stop_loss_percent,
        fees_percent,
    } = *input;

    if !(capital.is_finite() && capital > 0.0) {
        return Err(AnalysisError::invalid(format!(
            "capital must be > 0, got {capital}"
        )));
    }
    if !(stop_loss_percent.is_finite() && stop_loss_percent > 0.0) {
        return Err(AnalysisError::invalid(format!(
            "stop loss must be > 0%, got {stop_loss_percent}"
        )));
    }
    if !(fees_percent.is_finite() && fees_percent >= 0.0) {
        return Err(AnalysisError::invalid(format!(
            "fees must be >= 0%, got {fees_percent}"
        )));
    }

    let denominator = stop_loss_percent + fees_percent;
    if denominator <= 0.0 {
        return Err(AnalysisError::invalid(
            "stop loss plus fees must be > 0%",
        ));
    }

    let max_loss_percent = if is_max_loss_percentage {
        max_loss
    } else {
        max_loss / capital * 100.0
    };
    if !(max_loss_percent.is_finite() && max_loss_percent > 0.0) {
        return Err(AnalysisError::invalid(format!(
            "max loss must be a positive number, got {max_loss}"
        )));
    }

    let leverage = max_loss_percent / denominator;
    let position_size = capital * leverage;
    let max_loss_amount = capital * max_loss_percent / 100.0;

    // Finite inputs can still overflow: a subnormal stop loss divides to inf.
    if !(leverage.is_finite() && position_size.is_finite() && max_loss_amount.is_finite()) {
        return Err(AnalysisError::invalid(format!(
            "inputs overflow: leverage {leverage}, position size {position_size}"
        )));
    }

    Ok(LeverageResult {
        leverage,
        leverage_display: round_to(leverage, 2),
        position_size,
        risk_tier: RiskTier::from_leverage(leverage),
        max_loss_percent,
        max_loss_amount,
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
