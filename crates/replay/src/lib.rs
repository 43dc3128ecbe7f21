use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use common::{Error, MarketDataProvider, OptionChain, OptionContract, PriceBar, Quote, Result};

/// Market data captured at one point in time.
///
/// ```json
/// {
///   "quotes":  { "AAPL": { "symbol": "AAPL", "price": 189.5, "volume": 51000000, "timestamp": "..." } },
///   "history": { "AAPL": [ { "date": "2026-09-30", "open": 188.0, "high": 190.1, ... } ] },
///   "chains":  { "AAPL": [ { "contract_symbol": "AAPL261030P00190000", "right": "put", ... } ] }
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub quotes: HashMap<String, Quote>,
    pub history: HashMap<String, Vec<PriceBar>>,
    pub chains: HashMap<String, Vec<OptionContract>>,
}

/// Offline `MarketDataProvider` serving a recorded snapshot.
///
/// Symbols missing from the snapshot are reported as not found.
#[derive(Clone, Default)]
pub struct ReplayProvider {
    snapshot: Arc<RwLock<Snapshot>>,
}

impl ReplayProvider {
    pub fn new(snapshot: Snapshot) -> Self {
        info!(
            quotes = snapshot.quotes.len(),
            histories = snapshot.history.len(),
            chains = snapshot.chains.len(),
            "ReplayProvider initialized"
        );
        Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read market data '{}': {e}", path.display()))
        })?;
        Self::from_json(&json)
    }

    pub async fn insert_quote(&self, quote: Quote) {
        self.snapshot
            .write()
            .await
            .quotes
            .insert(quote.symbol.clone(), quote);
    }

    pub async fn insert_history(&self, symbol: &str, bars: Vec<PriceBar>) {
        self.snapshot
            .write()
            .await
            .history
            .insert(symbol.to_string(), bars);
    }

    pub async fn insert_contracts(&self, symbol: &str, contracts: Vec<OptionContract>) {
        self.snapshot
            .write()
            .await
            .chains
            .entry(symbol.to_string())
            .or_default()
            .extend(contracts);
    }

    /// Timestamp of the newest quote, i.e. when the snapshot was taken.
    pub async fn as_of(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.quotes.values().map(|q| q.timestamp).max()
    }

    pub async fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.snapshot.read().await.quotes.keys().cloned().collect();
        symbols.sort();
        symbols
    }
}

#[async_trait]
impl MarketDataProvider for ReplayProvider {
    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        self.snapshot
            .read()
            .await
            .quotes
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::not_found(symbol, "no quote in snapshot"))
    }

    /// The most recent `lookback_days` bars, oldest first.
    async fn get_historical_prices(&self, symbol: &str, lookback_days: u32) -> Result<Vec<PriceBar>> {
        let snapshot = self.snapshot.read().await;
        let bars = snapshot
            .history
            .get(symbol)
            .ok_or_else(|| Error::not_found(symbol, "no price history in snapshot"))?;
        let skip = bars.len().saturating_sub(lookback_days as usize);
        debug!(symbol, bars = bars.len() - skip, "Replaying price history");
        Ok(bars[skip..].to_vec())
    }

    async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
        let snapshot = self.snapshot.read().await;
        let contracts = snapshot
            .chains
            .get(symbol)
            .ok_or_else(|| Error::not_found(symbol, "no option chain in snapshot"))?;
        Ok(OptionChain::from_contracts(
            symbol,
            contracts
                .iter()
                .filter(|c| c.expiration == expiration)
                .cloned(),
        ))
    }

    async fn get_available_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        let snapshot = self.snapshot.read().await;
        let contracts = snapshot
            .chains
            .get(symbol)
            .ok_or_else(|| Error::not_found(symbol, "no listed options in snapshot"))?;
        let dates: BTreeSet<NaiveDate> = contracts.iter().map(|c| c.expiration).collect();
        Ok(dates.into_iter().collect())
    }
}
