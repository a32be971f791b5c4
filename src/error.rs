// =============================================================================
// Analysis Errors
// =============================================================================
//
// Every fallible operation in the quantitative core returns `AnalysisError`.
//
//   InsufficientData: series shorter than an indicator's minimum window.
//   InvalidInput    : parameters or risk inputs break an arithmetic
//                     precondition (zero denominator, fast >= slow, ...).
//   DegenerateRange : Fibonacci swing high equals swing low.
//   UpstreamFailure : the price source failed; opaque to the core.
//   TaskFailed      : a background computation task panicked or was
//                     cancelled by the runtime.
//
// The first three are local, recoverable data conditions.  Only
// UpstreamFailure is meant to reach the end user as "could not update".
// =============================================================================

use serde::Serialize;
use thiserror::Error;

/// Typed failure of an indicator, risk or pipeline operation.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisError {
    #[error("insufficient data for {indicator}: need {required} points, got {actual}")]
    InsufficientData {
        indicator: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    #[error("degenerate range: swing high equals swing low ({price})")]
    DegenerateRange { price: f64 },

    #[error("upstream failure: {message}")]
    UpstreamFailure { message: String },

    #[error("computation task failed: {message}")]
    TaskFailed { message: String },
}

impl AnalysisError {
    pub fn insufficient(indicator: &'static str, required: usize, actual: usize) -> Self {
        Self::InsufficientData {
            indicator,
            required,
            actual,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Wrap a price-source error. The full `anyhow` chain is flattened into
    /// the message so the cause survives serialisation.
    pub fn upstream(err: &anyhow::Error) -> Self {
        Self::UpstreamFailure {
            message: format!("{err:#}"),
        }
    }

    /// `true` for conditions the caller can recover from by changing inputs.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InsufficientData { .. } | Self::InvalidInput { .. } | Self::DegenerateRange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message() {
        let err = AnalysisError::insufficient("RSI", 15, 3);
        assert_eq!(err.to_string(), "insufficient data for RSI: need 15 points, got 3");
        assert!(err.is_local());
    }

    #[test]
    fn upstream_keeps_context_chain() {
        let inner = anyhow::anyhow!("connection refused").context("fetching bitcoin");
        let err = AnalysisError::upstream(&inner);
        assert!(!err.is_local());
        match err {
            AnalysisError::UpstreamFailure { message } => {
                assert!(message.contains("fetching bitcoin"));
                assert!(message.contains("connection refused"));
            }
            other => panic!("unexpected variant {other:?}"),
        }
    }

    #[test]
    fn serialises_with_kind_tag() {
        let json = serde_json::to_value(AnalysisError::invalid("capital must be > 0")).unwrap();
        assert_eq!(json["kind"], "invalid_input");
        assert_eq!(json["message"], "capital must be > 0");
    }
}
