// =============================================================================
// Price Sources
// =============================================================================
//
// The core never fetches data itself.  A `PriceSource` hands it a
// `PriceSeries` for `(asset_id, timeframe_days)`; any failure is reported as
// an opaque `anyhow::Error` that the pipeline turns into `UpstreamFailure`.
// =============================================================================

use std::future::Future;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;

use super::PriceSeries;

/// Supplier of price series for an asset and look-back window.
pub trait PriceSource: Send + Sync {
    fn fetch(
        &self,
        asset_id: &str,
        timeframe_days: u32,
    ) -> impl Future<Output = Result<PriceSeries>> + Send;
}

/// Reads market-chart JSON files laid out as `<dir>/<asset_id>_<days>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    dir: PathBuf,
}

impl JsonFileSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `asset_id` over `timeframe_days`.
    pub fn path_for(&self, asset_id: &str, timeframe_days: u32) -> PathBuf {
        self.dir.join(format!("{asset_id}_{timeframe_days}.json"))
    }
}

impl PriceSource for JsonFileSource {
    async fn fetch(&self, asset_id: &str, timeframe_days: u32) -> Result<PriceSeries> {
        if asset_id.is_empty() || asset_id.contains(['/', '\\', '.']) {
            anyhow::bail!("invalid asset id '{asset_id}'");
        }

        let path = self.path_for(asset_id, timeframe_days);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read price file {}", path.display()))?;

        let series = PriceSeries::from_market_chart_json(&content)
            .with_context(|| format!("failed to parse price file {}", path.display()))?;

        debug!(
            asset_id,
            timeframe_days,
            points = series.len(),
            "price series loaded"
        );
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "crypto-analytics-{tag}-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn reads_market_chart_file() {
        let dir = temp_dir("source-ok");
        std::fs::write(
            dir.join("bitcoin_30.json"),
            r#"{"prices": [[1, 10.0], [2, 11.0], [3, 12.0]]}"#,
        )
        .unwrap();

        let source = JsonFileSource::new(&dir);
        let series = source.fetch("bitcoin", 30).await.unwrap();
        assert_eq!(series.prices(), vec![10.0, 11.0, 12.0]);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let source = JsonFileSource::new(temp_dir("source-missing"));
        let err = source.fetch("ethereum", 7).await.unwrap_err();
        assert!(format!("{err:#}").contains("ethereum_7.json"));
    }

    #[tokio::test]
    async fn rejects_path_like_asset_ids() {
        let source = JsonFileSource::new(temp_dir("source-path"));
        assert!(source.fetch("../etc/passwd", 1).await.is_err());
        assert!(source.fetch("", 1).await.is_err());
    }
}
