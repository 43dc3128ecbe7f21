//! Strategy definition loader.
//!
//! Example `config/ofi.toml`:
//! ```toml
//! name = "OFI"
//! version = "1.0"
//! description = "Sell at-the-money puts on oversold uptrends"
//!
//! [[entry_conditions]]
//! type = "trend"
//! rule = "sma_20 > sma_60"
//! weight = 0.5
//!
//! [[entry_conditions]]
//! type = "oversold"
//! rule = "rsi_14 < threshold"
//! weight = 0.3
//!
//! [entry_conditions.parameters]
//! threshold = 30
//! lookback_days = 5
//! ```
//!
//! Validation never stops at the first problem: every issue in the file is
//! collected into one `Error::Validation`.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::info;

use common::{Error, Result, ValidationIssues};
use options::OptionScreening;

use crate::definition::{
    Condition, ConditionKind, MatchPolicy, StockCriteria, StrategyDefinition,
};
use crate::rule::Rule;

/// Read and parse a strategy file.
pub fn load(path: impl AsRef<Path>) -> Result<StrategyDefinition> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|e| {
        Error::Configuration(format!("cannot read strategy file '{}': {e}", path.display()))
    })?;
    let strategy = parse(&source)?;
    info!(
        path = %path.display(),
        name = %strategy.name,
        version = %strategy.version,
        conditions = strategy.conditions.len(),
        "Loaded strategy"
    );
    Ok(strategy)
}

/// Parse strategy source. Pure: equal input yields equal output.
pub fn parse(source: &str) -> Result<StrategyDefinition> {
    let table: toml::Table = toml::from_str(source).map_err(|e| {
        Error::Validation(ValidationIssues(vec![format!(
            "strategy is not valid TOML: {}",
            e.message()
        )]))
    })?;

    let mut issues = ValidationIssues::default();

    let name = required_text(&table, "name", &mut issues);
    let version = required_text(&table, "version", &mut issues);
    let description = required_text(&table, "description", &mut issues);
    let tags = string_list(&table, "tags", &mut issues);

    let conditions = match table.get("entry_conditions") {
        None => {
            issues.push("missing required field 'entry_conditions'");
            Vec::new()
        }
        Some(toml::Value::Array(items)) => parse_conditions(items, &mut issues),
        Some(_) => {
            issues.push("'entry_conditions' must be an array of tables");
            Vec::new()
        }
    };

    let stock_criteria: StockCriteria = section(&table, "stock_criteria", &mut issues);
    if let (Some(min), Some(max)) = (stock_criteria.min_price, stock_criteria.max_price) {
        if min > max {
            issues.push(format!(
                "stock_criteria.min_price ({min}) exceeds max_price ({max})"
            ));
        }
    }

    let option_screening: OptionScreening = section(&table, "option_screening", &mut issues);
    for issue in option_screening.issues() {
        issues.push(issue);
    }

    let match_policy = parse_matching(table.get("matching"), &mut issues);

    if !issues.is_empty() {
        return Err(Error::Validation(issues));
    }

    Ok(StrategyDefinition {
        name,
        version,
        description,
        tags,
        stock_criteria,
        conditions,
        option_screening,
        match_policy,
    })
}

// ─── Conditions ───────────────────────────────────────────────────────────────

fn parse_conditions(items: &[toml::Value], issues: &mut ValidationIssues) -> Vec<Condition> {
    if items.is_empty() {
        issues.push("'entry_conditions' must contain at least one condition");
        return Vec::new();
    }

    let before = issues.len();
    let mut conditions = Vec::with_capacity(items.len());
    let mut seen = HashSet::new();

    for (index, item) in items.iter().enumerate() {
        let Some(entry) = item.as_table() else {
            issues.push(format!("entry_conditions[{index}] must be a table"));
            continue;
        };
        if let Some(condition) = parse_condition(index, entry, issues) {
            if !seen.insert(condition.id.clone()) {
                issues.push(format!(
                    "entry_conditions[{index}]: duplicate condition id '{}'",
                    condition.id
                ));
            }
            conditions.push(condition);
        }
    }

    // Only meaningful once every weight parsed cleanly.
    if issues.len() == before {
        let total: f64 = conditions.iter().map(|c| c.weight).sum();
        if total <= 0.0 {
            issues.push(format!("condition weights must sum to more than 0, got {total}"));
        }
    }

    conditions
}

fn parse_condition(
    index: usize,
    entry: &toml::Table,
    issues: &mut ValidationIssues,
) -> Option<Condition> {
    let at = format!("entry_conditions[{index}]");

    let kind = match entry.get("type") {
        None => {
            issues.push(format!("{at}: missing required field 'type'"));
            None
        }
        Some(toml::Value::String(raw)) => match raw.parse::<ConditionKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                issues.push(format!("{at}: {e}"));
                None
            }
        },
        Some(_) => {
            issues.push(format!("{at}: 'type' must be a string"));
            None
        }
    };

    let parameters: BTreeMap<String, toml::Value> = match entry.get("parameters") {
        None => BTreeMap::new(),
        Some(toml::Value::Table(t)) => t.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Some(_) => {
            issues.push(format!("{at}: 'parameters' must be a table"));
            BTreeMap::new()
        }
    };

    let rule = match entry.get("rule") {
        None => {
            issues.push(format!("{at}: missing required field 'rule'"));
            None
        }
        Some(toml::Value::String(text)) => match Rule::parse(text, &parameters) {
            Ok(rule) => Some(rule),
            Err(e) => {
                issues.push(format!("{at}: {e}"));
                None
            }
        },
        Some(_) => {
            issues.push(format!("{at}: 'rule' must be a string"));
            None
        }
    };

    let weight = match entry.get("weight") {
        None => Some(1.0),
        Some(value) => match number(value) {
            Some(w) if w.is_finite() && w >= 0.0 => Some(w),
            Some(w) => {
                issues.push(format!("{at}: weight must be a non-negative number, got {w}"));
                None
            }
            None => {
                issues.push(format!("{at}: weight must be a number"));
                None
            }
        },
    };

    for key in ["lookback_days", "lookback"] {
        if let Some(value) = parameters.get(key) {
            if !value.as_integer().is_some_and(|v| v > 0) {
                issues.push(format!("{at}: parameter '{key}' must be a positive integer"));
            }
        }
    }
    if let Some(value) = parameters.get("volume_multiplier") {
        if !number(value).is_some_and(|v| v.is_finite() && v > 0.0) {
            issues.push(format!("{at}: parameter 'volume_multiplier' must be a positive number"));
        }
    }

    let (kind, rule, weight) = (kind?, rule?, weight?);
    if let Err(e) = kind.check_rule(&rule) {
        issues.push(format!("{at}: {e}"));
        return None;
    }

    let id = match entry.get("id") {
        Some(toml::Value::String(id)) if !id.trim().is_empty() => id.trim().to_string(),
        Some(_) => {
            issues.push(format!("{at}: 'id' must be a non-empty string"));
            return None;
        }
        None => kind.to_string(),
    };

    Some(Condition {
        id,
        kind,
        rule,
        description: entry
            .get("description")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        weight,
        parameters,
    })
}

// ─── Sections ─────────────────────────────────────────────────────────────────

fn parse_matching(value: Option<&toml::Value>, issues: &mut ValidationIssues) -> MatchPolicy {
    let Some(value) = value else {
        return MatchPolicy::default();
    };
    let Some(table) = value.as_table() else {
        issues.push("'matching' must be a table");
        return MatchPolicy::default();
    };

    match table.get("policy").and_then(|v| v.as_str()).unwrap_or("all") {
        "all" => MatchPolicy::AllConditions,
        "weighted" => match table.get("min_signal_strength").and_then(number) {
            Some(t) if t > 0.0 && t <= 1.0 => MatchPolicy::MinimumStrength(t),
            Some(t) => {
                issues.push(format!("matching.min_signal_strength must be in (0, 1], got {t}"));
                MatchPolicy::default()
            }
            None => {
                issues.push("matching.policy 'weighted' requires a numeric min_signal_strength");
                MatchPolicy::default()
            }
        },
        other => {
            issues.push(format!(
                "matching.policy must be 'all' or 'weighted', got '{other}'"
            ));
            MatchPolicy::default()
        }
    }
}

/// Deserialize an optional table section, falling back to its defaults.
fn section<T>(table: &toml::Table, key: &str, issues: &mut ValidationIssues) -> T
where
    T: Default + serde::de::DeserializeOwned,
{
    match table.get(key) {
        None => T::default(),
        Some(value) => value.clone().try_into::<T>().unwrap_or_else(|e| {
            issues.push(format!("invalid '{key}': {}", e.message()));
            T::default()
        }),
    }
}

fn required_text(table: &toml::Table, key: &str, issues: &mut ValidationIssues) -> String {
    match table.get(key) {
        Some(toml::Value::String(s)) if !s.trim().is_empty() => s.clone(),
        // `version = 1.0` is common enough to accept.
        Some(toml::Value::Float(v)) if key == "version" => v.to_string(),
        Some(toml::Value::Integer(v)) if key == "version" => v.to_string(),
        Some(_) => {
            issues.push(format!("field '{key}' must be a non-empty string"));
            String::new()
        }
        None => {
            issues.push(format!("missing required field '{key}'"));
            String::new()
        }
    }
}

fn string_list(table: &toml::Table, key: &str, issues: &mut ValidationIssues) -> Vec<String> {
    match table.get(key) {
        None => Vec::new(),
        Some(toml::Value::Array(items)) => {
            let tags: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            if tags.len() != items.len() {
                issues.push(format!("'{key}' must contain only strings"));
            }
            tags
        }
        Some(_) => {
            issues.push(format!("'{key}' must be an array of strings"));
            Vec::new()
        }
    }
}

fn number(value: &toml::Value) -> Option<f64> {
    match value {
        toml::Value::Float(v) => Some(*v),
        toml::Value::Integer(v) => Some(*v as f64),
        _ => None,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
