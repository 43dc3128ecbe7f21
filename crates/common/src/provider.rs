use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{OptionChain, PriceBar, Quote, Result};

/// Abstraction over the market-data source.
///
/// Implementations report a missing symbol as `Error::DataUnavailable` with
/// `FetchFailure::NotFound` and upstream trouble with `FetchFailure::Transient`.
/// Retrying is the implementation's business; the screener never retries.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Latest quote for a symbol.
    async fn get_quote(&self, symbol: &str) -> Result<Quote>;

    /// The most recent `lookback_days` daily bars, oldest first.
    async fn get_historical_prices(&self, symbol: &str, lookback_days: u32)
        -> Result<Vec<PriceBar>>;

    /// All contracts for a single expiration.
    async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain>;

    /// Listed expirations, nearest first.
    async fn get_available_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>>;
}
