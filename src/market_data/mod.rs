pub mod price_series;
pub mod source;

pub use price_series::{PricePoint, PriceSeries};
pub use source::{JsonFileSource, PriceSource};
