use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use common::Quote;
use options::OptionScreening;

use crate::patterns::PatternDetector;
use crate::rule::{Field, PatternFlag, Rule};

/// The kinds of entry condition the evaluator knows how to check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionKind {
    Trend,
    Oversold,
    Bounce,
    Price,
    Volume,
}

impl ConditionKind {
    pub const ALL: [ConditionKind; 5] = [
        ConditionKind::Trend,
        ConditionKind::Oversold,
        ConditionKind::Bounce,
        ConditionKind::Price,
        ConditionKind::Volume,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionKind::Trend => "trend",
            ConditionKind::Oversold => "oversold",
            ConditionKind::Bounce => "bounce",
            ConditionKind::Price => "price",
            ConditionKind::Volume => "volume",
        }
    }

    /// Whether a condition of this kind can evaluate `rule`.
    pub fn check_rule(&self, rule: &Rule) -> Result<(), String> {
        let ok = match (self, rule) {
            (ConditionKind::Trend, Rule::Compare(cmp)) => {
                cmp.fields().filter(Field::is_indicator).count() == 2
            }
            (ConditionKind::Oversold, Rule::Compare(cmp)) => cmp.fields().any(|f| f.is_indicator()),
            (ConditionKind::Bounce, Rule::Pattern(flags)) => {
                flags.contains(&PatternFlag::BounceDetected)
            }
            (ConditionKind::Price, Rule::Compare(cmp)) => cmp.fields().any(|f| f == Field::Price),
            (ConditionKind::Volume, Rule::Compare(cmp)) => cmp
                .fields()
                .any(|f| matches!(f, Field::Volume | Field::VolumeAvg20)),
            (ConditionKind::Volume, Rule::Pattern(flags)) => {
                flags == &[PatternFlag::VolumeConfirmed]
            }
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(format!("a '{self}' condition cannot evaluate rule '{rule}'"))
        }
    }
}

impl fmt::Display for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConditionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConditionKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = ConditionKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("unrecognized condition type '{s}' (expected one of {})", known.join(", "))
            })
    }
}

/// One entry condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Identifier reported in `conditions_met`; defaults to the kind name.
    pub id: String,
    pub kind: ConditionKind,
    pub rule: Rule,
    pub description: String,
    pub weight: f64,
    pub parameters: BTreeMap<String, toml::Value>,
}

impl Condition {
    pub const DEFAULT_LOOKBACK_DAYS: usize = 1;

    pub fn param_f64(&self, key: &str, default: f64) -> f64 {
        match self.parameters.get(key) {
            Some(toml::Value::Float(v)) => *v,
            Some(toml::Value::Integer(v)) => *v as f64,
            _ => default,
        }
    }

    pub fn param_usize(&self, key: &str, default: usize) -> usize {
        self.parameters
            .get(key)
            .and_then(|v| v.as_integer())
            .filter(|v| *v > 0)
            .map(|v| v as usize)
            .unwrap_or(default)
    }

    /// Trailing snapshots an oversold condition inspects (1 = latest only).
    pub fn lookback_days(&self) -> usize {
        self.param_usize("lookback_days", Self::DEFAULT_LOOKBACK_DAYS)
    }
}

/// Eligibility filters applied to the quote before a symbol can match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StockCriteria {
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    /// Fundamentals-based filters. Carried for reporting; the screener has
    /// no fundamentals source to apply them against.
    pub min_market_cap: Option<u64>,
    pub max_market_cap: Option<u64>,
    pub min_revenue: Option<u64>,
    pub exchanges: Vec<String>,
    pub sectors: Vec<String>,
    pub exclude_sectors: Vec<String>,
}

impl StockCriteria {
    pub fn admits(&self, quote: &Quote) -> bool {
        self.min_price.map_or(true, |min| quote.price >= min)
            && self.max_price.map_or(true, |max| quote.price <= max)
    }
}

/// How condition results turn into a match.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum MatchPolicy {
    /// Every condition must hold.
    #[default]
    AllConditions,
    /// Weighted signal strength must reach the threshold.
    MinimumStrength(f64),
}

/// A validated strategy. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDefinition {
    pub name: String,
    pub version: String,
    pub description: String,
    pub tags: Vec<String>,
    pub stock_criteria: StockCriteria,
    pub conditions: Vec<Condition>,
    pub option_screening: OptionScreening,
    pub match_policy: MatchPolicy,
}

impl StrategyDefinition {
    pub fn total_weight(&self) -> f64 {
        self.conditions.iter().map(|c| c.weight).sum()
    }

    /// Indicator snapshots the evaluator needs: the longest oversold lookback.
    pub fn history_depth(&self) -> usize {
        self.conditions
            .iter()
            .filter(|c| c.kind == ConditionKind::Oversold)
            .map(Condition::lookback_days)
            .max()
            .unwrap_or(1)
    }

    /// Pattern detector configured from the first bounce condition's
    /// `lookback` and `volume_multiplier` parameters.
    pub fn pattern_detector(&self) -> PatternDetector {
        let defaults = PatternDetector::default();
        match self.conditions.iter().find(|c| c.kind == ConditionKind::Bounce) {
            Some(c) => PatternDetector::new(
                c.param_usize("lookback", defaults.lookback()),
                c.param_f64("volume_multiplier", defaults.volume_multiplier()),
            ),
            None => defaults,
        }
    }
}
