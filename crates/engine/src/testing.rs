//! In-memory provider and fixtures shared by the engine's tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use common::{
    Error, MarketDataProvider, OptionChain, OptionContract, OptionRight, PriceBar, Quote, Result,
};
use strategy::StrategyDefinition;

use crate::screener::Clock;

pub(crate) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
}

pub(crate) fn fixed_clock() -> Clock {
    Arc::new(|| Utc.with_ymd_and_hms(2026, 10, 1, 15, 0, 0).unwrap())
}

const TREND: &str = r#"
name = "trend-only"
version = "1"
description = "Uptrend filter"

[[entry_conditions]]
type = "trend"
rule = "sma_20 > sma_60"
"#;

pub(crate) fn trend_strategy() -> Arc<StrategyDefinition> {
    Arc::new(strategy::parse(TREND).unwrap())
}

/// 80 daily bars ending yesterday, drifting up or down by 0.5 a day.
fn drifting_bars(rising: bool) -> Vec<PriceBar> {
    let step = if rising { 0.5 } else { -0.5 };
    (0..80)
        .map(|i| {
            let close = 100.0 + step * i as f64;
            PriceBar {
                date: today() - chrono::Duration::days(80 - i),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000_000,
            }
        })
        .collect()
}

fn puts_around(symbol: &str, spot: f64, expiration: NaiveDate) -> Vec<OptionContract> {
    [-2.0, -1.0, 0.0, 1.0, 2.0]
        .iter()
        .map(|offset| {
            let strike = (spot + offset).round();
            OptionContract {
                contract_symbol: format!("{symbol}{expiration}P{strike}"),
                underlying: symbol.to_string(),
                right: OptionRight::Put,
                strike,
                expiration,
                bid: 1.9,
                ask: 2.1 + offset.abs() * 0.1,
                volume: 500,
                open_interest: 1_000,
                implied_volatility: Some(0.3),
            }
        })
        .collect()
}

/// Deterministic provider with call counting and an in-flight high-water mark.
#[derive(Default)]
pub(crate) struct MockProvider {
    quotes: HashMap<String, Quote>,
    bars: HashMap<String, Vec<PriceBar>>,
    chains: HashMap<String, Vec<OptionContract>>,
    expirations: HashMap<String, Vec<NaiveDate>>,
    failing_quotes: HashSet<String>,
    failing_chains: HashSet<String>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub(crate) quote_calls: AtomicUsize,
}

impl MockProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_symbol(mut self, symbol: &str, rising: bool) -> Self {
        let bars = drifting_bars(rising);
        let spot = bars.last().map(|b| b.close).unwrap_or(100.0);
        let expiration = today() + chrono::Duration::days(30);
        self.quotes.insert(
            symbol.to_string(),
            Quote {
                symbol: symbol.to_string(),
                price: spot,
                volume: 1_000_000,
                timestamp: Utc.with_ymd_and_hms(2026, 10, 1, 14, 30, 0).unwrap(),
            },
        );
        self.bars.insert(symbol.to_string(), bars);
        self.chains
            .insert(symbol.to_string(), puts_around(symbol, spot, expiration));
        self.expirations.insert(
            symbol.to_string(),
            vec![today() + chrono::Duration::days(3), expiration],
        );
        self
    }

    pub(crate) fn with_empty_history(mut self, symbol: &str) -> Self {
        self.bars.insert(symbol.to_string(), Vec::new());
        self
    }

    pub(crate) fn with_shuffled_history(mut self, symbol: &str) -> Self {
        if let Some(bars) = self.bars.get_mut(symbol) {
            bars.swap(10, 11);
        }
        self
    }

    pub(crate) fn without_expirations(mut self, symbol: &str) -> Self {
        self.expirations
            .insert(symbol.to_string(), vec![today() + chrono::Duration::days(200)]);
        self
    }

    pub(crate) fn failing_quote(mut self, symbol: &str) -> Self {
        self.failing_quotes.insert(symbol.to_string());
        self
    }

    pub(crate) fn failing_chain(mut self, symbol: &str) -> Self {
        self.failing_chains.insert(symbol.to_string());
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl MarketDataProvider for MockProvider {
    async fn get_quote(&self, symbol: &str) -> Result<Quote> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await;
        if self.failing_quotes.contains(symbol) {
            return Err(Error::transient(symbol, "quote request timed out"));
        }
        self.quotes
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::not_found(symbol, "unknown symbol"))
    }

    async fn get_historical_prices(&self, symbol: &str, _lookback_days: u32) -> Result<Vec<PriceBar>> {
        self.enter().await;
        self.bars
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::not_found(symbol, "no history"))
    }

    async fn get_option_chain(&self, symbol: &str, expiration: NaiveDate) -> Result<OptionChain> {
        self.enter().await;
        if self.failing_chains.contains(symbol) {
            return Err(Error::transient(symbol, "option chain request failed"));
        }
        let contracts = self
            .chains
            .get(symbol)
            .into_iter()
            .flatten()
            .filter(|c| c.expiration == expiration)
            .cloned();
        Ok(OptionChain::from_contracts(symbol, contracts))
    }

    async fn get_available_expirations(&self, symbol: &str) -> Result<Vec<NaiveDate>> {
        self.enter().await;
        self.expirations
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::not_found(symbol, "no listed options"))
    }
}
