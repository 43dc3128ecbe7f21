use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use common::{MarketDataProvider, OptionChain, PriceBar, Quote, Result};

use crate::cache::{CacheKey, DataCache, DataKind};

/// A `MarketDataProvider` that routes every call through a shared `DataCache`.
pub struct CachedProvider {
    inner: Arc<dyn MarketDataProvider>,
    cache: Arc<DataCache>,
}

impl CachedProvider {
    pub fn new(inner: Arc<dyn MarketDataProvider>, cache: Arc<DataCache>) -> Self {
        Self { inner, cache }
    }

    pub fn cache(&self) -> &Arc<DataCache> {
        &self.cache
    }
}

#[async_trait]
impl MarketDataProvider for CachedProvider {
    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        let key = CacheKey::new(DataKind::Quote, symbol, "");
        self.cache
            .get_or_fetch(key, || self.inner.get_quote(symbol))
            .await
    }

    async fn get_historical_prices(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<PriceBar>> {
        let key = CacheKey::new(DataKind::History, symbol, lookback_days.to_string());
        self.cache
            .get_or_fetch(key, || self.inner.get_historical_prices(symbol, lookback_days))
            .await
    }

    async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
        let key = CacheKey::new(DataKind::OptionChain, symbol, expiration.to_string());
        self.cache
            .get_or_fetch(key, || self.inner.get_option_chain(symbol, expiration))
            .await
    }

    async fn get_available_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let key = CacheKey::new(DataKind::Expirations, symbol, "");
        self.cache
            .get_or_fetch(key, || self.inner.get_available_expirations(symbol))
            .await
    }
}
