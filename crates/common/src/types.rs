use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Contracts trading less than this are treated as illiquid.
pub const MIN_LIQUID_VOLUME: u64 = 100;
/// Contracts with less open interest than this are treated as illiquid.
pub const MIN_LIQUID_OPEN_INTEREST: u64 = 500;

/// Latest quote for an equity symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

/// One daily OHLCV bar. Series are ascending by `date` with no duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionRight {
    Call,
    Put,
}

impl std::fmt::Display for OptionRight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionRight::Call => write!(f, "call"),
            OptionRight::Put => write!(f, "put"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    /// OCC-style contract symbol, e.g. "AAPL240119P00150000".
    pub contract_symbol: String,
    pub underlying: String,
    pub right: OptionRight,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub bid: f64,
    pub ask: f64,
    pub volume: u64,
    pub open_interest: u64,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
}

impl OptionContract {
    pub fn mid(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    pub fn is_liquid(&self, min_volume: u64, min_open_interest: u64) -> bool {
        self.volume >= min_volume && self.open_interest >= min_open_interest
    }

    /// Liquidity at the house thresholds (volume ≥ 100 and open interest ≥ 500).
    pub fn meets_liquidity(&self) -> bool {
        self.is_liquid(MIN_LIQUID_VOLUME, MIN_LIQUID_OPEN_INTEREST)
    }

    pub fn key(&self) -> ContractKey {
        ContractKey {
            expiration: self.expiration,
            strike_cents: (self.strike * 100.0).round() as i64,
            right: self.right,
        }
    }
}

/// Identity of a contract within a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContractKey {
    pub expiration: NaiveDate,
    pub strike_cents: i64,
    pub right: OptionRight,
}

/// Option contracts for one underlying, keyed by (expiration, strike, right).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionChain {
    pub symbol: String,
    contracts: BTreeMap<ContractKey, OptionContract>,
}

impl OptionChain {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            contracts: BTreeMap::new(),
        }
    }

    pub fn from_contracts(
        symbol: impl Into<String>,
        contracts: impl IntoIterator<Item = OptionContract>,
    ) -> Self {
        let mut chain = Self::new(symbol);
        for contract in contracts {
            chain.insert(contract);
        }
        chain
    }

    /// Insert a contract, replacing any existing one with the same key.
    pub fn insert(&mut self, contract: OptionContract) {
        self.contracts.insert(contract.key(), contract);
    }

    pub fn get(&self, key: &ContractKey) -> Option<&OptionContract> {
        self.contracts.get(key)
    }

    pub fn merge(&mut self, other: OptionChain) {
        self.contracts.extend(other.contracts);
    }

    pub fn contracts(&self) -> impl Iterator<Item = &OptionContract> {
        self.contracts.values()
    }

    pub fn puts(&self) -> impl Iterator<Item = &OptionContract> {
        self.contracts().filter(|c| c.right == OptionRight::Put)
    }

    pub fn expirations(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.contracts.keys().map(|k| k.expiration).collect();
        dates.dedup();
        dates
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

/// Indicator snapshot for one symbol. A field is `None` when the series was
/// shorter than that indicator's window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub symbol: String,
    /// Date of the last bar the snapshot was computed from.
    pub as_of: Option<NaiveDate>,
    pub sma_20: Option<f64>,
    pub sma_60: Option<f64>,
    pub rsi_14: Option<f64>,
    pub volume_avg_20: Option<f64>,
}

impl TechnicalIndicators {
    pub fn empty(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            as_of: None,
            sma_20: None,
            sma_60: None,
            rsi_14: None,
            volume_avg_20: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PatternSignals {
    pub bounce_detected: bool,
    /// Bars examined for the bounce pattern.
    pub bounce_window: usize,
    pub volume_confirmed: bool,
    /// Bars averaged for volume confirmation.
    pub volume_window: usize,
}

/// The contract picked for a matched symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionSelection {
    pub contract: OptionContract,
    pub annualized_yield: f64,
    pub days_to_expiration: i64,
    pub reason: String,
}

/// Point-in-time screening snapshot for one symbol. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningResult {
    pub symbol: String,
    pub strategy: String,
    pub timestamp: DateTime<Utc>,
    /// False when the quote fails the strategy's stock criteria.
    pub eligible: bool,
    pub matches: bool,
    pub signal_strength: f64,
    pub conditions_met: Vec<String>,
    pub conditions_missed: Vec<String>,
    pub quote: Quote,
    pub indicators: TechnicalIndicators,
    pub patterns: PatternSignals,
    pub recommendation: Option<OptionSelection>,
}

/// Stages of a single-symbol pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Pending,
    Fetching,
    Analyzing,
    Evaluating,
    Matched,
    NotMatched,
    OptionLookup,
    Completed,
    Failed,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipelineStage::Pending => "pending",
            PipelineStage::Fetching => "fetching",
            PipelineStage::Analyzing => "analyzing",
            PipelineStage::Evaluating => "evaluating",
            PipelineStage::Matched => "matched",
            PipelineStage::NotMatched => "not_matched",
            PipelineStage::OptionLookup => "option_lookup",
            PipelineStage::Completed => "completed",
            PipelineStage::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// Terminal state of one symbol within a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum SymbolOutcome {
    Completed(ScreeningResult),
    Failed {
        symbol: String,
        /// Stage the pipeline was in when it failed.
        stage: PipelineStage,
        reason: String,
    },
    /// The batch deadline passed before this symbol finished.
    Incomplete { symbol: String, started: bool },
}

impl SymbolOutcome {
    pub fn symbol(&self) -> &str {
        match self {
            SymbolOutcome::Completed(result) => &result.symbol,
            SymbolOutcome::Failed { symbol, .. } | SymbolOutcome::Incomplete { symbol, .. } => {
                symbol
            }
        }
    }

    pub fn result(&self) -> Option<&ScreeningResult> {
        match self {
            SymbolOutcome::Completed(result) => Some(result),
            _ => None,
        }
    }

    pub fn is_matched(&self) -> bool {
        self.result().is_some_and(|r| r.matches)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SymbolOutcome::Failed { .. })
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, SymbolOutcome::Incomplete { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub strategy: String,
    pub started_at: DateTime<Utc>,
    /// Symbols submitted to the batch.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub matched: usize,
    pub incomplete: usize,
    pub duration: Duration,
}
