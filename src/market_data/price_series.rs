use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub price: f64,
}

/// Ordered price observations, non-decreasing in timestamp.
///
/// The series is validated once at construction and never mutated afterwards;
/// the pipeline shares it behind an `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

/// Wire shape of the upstream market-chart payload:
/// `{"prices": [[1700000000000, 37012.5], ...]}`.
#[derive(Debug, Deserialize)]
struct MarketChart {
    prices: Vec<(f64, f64)>,
}

impl PriceSeries {
    /// Build a series, rejecting out-of-order timestamps and non-finite
    /// prices.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, AnalysisError> {
        for (i, p) in points.iter().enumerate() {
            if !p.price.is_finite() {
                return Err(AnalysisError::invalid(format!(
                    "price at index {i} is not finite"
                )));
            }
        }
        if let Some(i) = points
            .windows(2)
            .position(|w| w[1].timestamp < w[0].timestamp)
        {
            return Err(AnalysisError::invalid(format!(
                "timestamps decrease at index {}",
                i + 1
            )));
        }
        Ok(Self { points })
    }

    /// Build a series from `(timestamp_ms, price)` pairs.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, AnalysisError>
    where
        I: IntoIterator<Item = (i64, f64)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(timestamp, price)| PricePoint { timestamp, price })
                .collect(),
        )
    }

    /// Build a series from bare prices, stamping them one minute apart.
    /// Handy for tests and for callers that only hold a price column.
    pub fn from_prices(prices: &[f64]) -> Result<Self, AnalysisError> {
        Self::from_pairs(
            prices
                .iter()
                .enumerate()
                .map(|(i, &p)| (i as i64 * 60_000, p)),
        )
    }

    /// Parse the market-chart JSON payload (`{"prices": [[ts, price], ...]}`).
    pub fn from_market_chart_json(json: &str) -> anyhow::Result<Self> {
        let chart: MarketChart = serde_json::from_str(json)?;
        let series = Self::from_pairs(
            chart
                .prices
                .into_iter()
                .map(|(ts, price)| (ts as i64, price)),
        )?;
        Ok(series)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    /// The price column, in order.
    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.points.last().map(|p| p.price)
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points
            .first()
            .and_then(|p| Utc.timestamp_millis_opt(p.timestamp).single())
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.points
            .last()
            .and_then(|p| Utc.timestamp_millis_opt(p.timestamp).single())
    }
}

impl<'de> Deserialize<'de> for PriceSeries {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            points: Vec<PricePoint>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Self::new(raw.points).map_err(serde::de::Error::custom)
    }
}
