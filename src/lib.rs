// =============================================================================
// Crypto Analytics — quantitative core of the crypto dashboard
// =============================================================================
//
// Indicator engine (RSI, MACD, Bollinger Bands, Fibonacci retracement), the
// leverage / risk calculator, the indicator settings store and the
// token-ordered recompute pipeline.  `api`, `app_state` and `config` make up
// the small HTTP/WebSocket host used by the binary.
// =============================================================================

pub mod api;
pub mod app_state;
pub mod config;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod pipeline;
pub mod risk;
pub mod settings;

pub use error::AnalysisError;
pub use indicators::{compute_indicators, IndicatorResult, IndicatorSnapshot};
pub use market_data::{JsonFileSource, PricePoint, PriceSeries, PriceSource};
pub use pipeline::{PipelineSnapshot, PipelineState, RecomputePipeline, Trigger};
pub use risk::{compute_leverage, LeverageInput, LeverageResult, RiskTier};
pub use settings::{IndicatorSettings, SettingsStore};
