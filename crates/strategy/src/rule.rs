//! Declarative condition rules.
//!
//! A rule is parsed once, at strategy load time, into either a single
//! comparison (`sma_20 > sma_60`, `rsi_14 < threshold`) or a conjunction of
//! pattern flags (`bounce_detected and volume_confirmed`). Identifiers that
//! are not indicator names resolve to numeric condition parameters. Nothing
//! is ever executed; evaluation is a numeric comparison.

use std::collections::BTreeMap;
use std::fmt;

use common::{Quote, TechnicalIndicators};

/// A named numeric input a rule can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Sma20,
    Sma60,
    Rsi14,
    VolumeAvg20,
    /// Latest quote price.
    Price,
    /// Latest quote volume.
    Volume,
}

impl Field {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sma_20" => Some(Field::Sma20),
            "sma_60" => Some(Field::Sma60),
            "rsi_14" | "rsi" => Some(Field::Rsi14),
            "volume_avg_20" => Some(Field::VolumeAvg20),
            "price" => Some(Field::Price),
            "volume" => Some(Field::Volume),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Field::Sma20 => "sma_20",
            Field::Sma60 => "sma_60",
            Field::Rsi14 => "rsi_14",
            Field::VolumeAvg20 => "volume_avg_20",
            Field::Price => "price",
            Field::Volume => "volume",
        }
    }

    /// True for fields computed from the price series rather than read off the quote.
    pub fn is_indicator(&self) -> bool {
        !matches!(self, Field::Price | Field::Volume)
    }

    pub fn value(&self, indicators: &TechnicalIndicators, quote: &Quote) -> Option<f64> {
        match self {
            Field::Sma20 => indicators.sma_20,
            Field::Sma60 => indicators.sma_60,
            Field::Rsi14 => indicators.rsi_14,
            Field::VolumeAvg20 => indicators.volume_avg_20,
            Field::Price => Some(quote.price),
            Field::Volume => Some(quote.volume as f64),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operand {
    Field(Field),
    Constant(f64),
}

impl Operand {
    fn resolve(&self, indicators: &TechnicalIndicators, quote: &Quote) -> Option<f64> {
        match self {
            Operand::Field(field) => field.value(indicators, quote),
            Operand::Constant(value) => Some(*value),
        }
    }

    fn field(&self) -> Option<Field> {
        match self {
            Operand::Field(field) => Some(*field),
            Operand::Constant(_) => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Field(field) => write!(f, "{}", field.name()),
            Operand::Constant(value) => write!(f, "{value}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparator {
    // Two-character operators first so `>=` is not read as `>`.
    const TOKENS: [(&'static str, Comparator); 6] = [
        (">=", Comparator::Ge),
        ("<=", Comparator::Le),
        ("==", Comparator::Eq),
        ("!=", Comparator::Ne),
        (">", Comparator::Gt),
        ("<", Comparator::Lt),
    ];

    const EPSILON: f64 = 1e-9;

    pub fn symbol(&self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Eq => "==",
            Comparator::Ne => "!=",
        }
    }

    pub fn apply(&self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparator::Gt => lhs > rhs,
            Comparator::Ge => lhs >= rhs,
            Comparator::Lt => lhs < rhs,
            Comparator::Le => lhs <= rhs,
            Comparator::Eq => (lhs - rhs).abs() < Self::EPSILON,
            Comparator::Ne => (lhs - rhs).abs() >= Self::EPSILON,
        }
    }

    /// Locate the first comparator in `text`, returning its byte offset and length.
    fn find(text: &str) -> Option<(usize, usize, Comparator)> {
        text.char_indices().find_map(|(i, _)| {
            Self::TOKENS
                .iter()
                .find(|(tok, _)| text[i..].starts_with(tok))
                .map(|(tok, cmp)| (i, tok.len(), *cmp))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Comparison {
    pub lhs: Operand,
    pub op: Comparator,
    pub rhs: Operand,
}

impl Comparison {
    /// False when either side references an indicator with no value.
    pub fn holds(&self, indicators: &TechnicalIndicators, quote: &Quote) -> bool {
        match (
            self.lhs.resolve(indicators, quote),
            self.rhs.resolve(indicators, quote),
        ) {
            (Some(lhs), Some(rhs)) => self.op.apply(lhs, rhs),
            _ => false,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = Field> {
        [self.lhs.field(), self.rhs.field()].into_iter().flatten()
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op.symbol(), self.rhs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternFlag {
    BounceDetected,
    VolumeConfirmed,
}

impl PatternFlag {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "bounce_detected" | "higher_high_higher_low" => Some(PatternFlag::BounceDetected),
            "volume_confirmed" | "volume_spike" => Some(PatternFlag::VolumeConfirmed),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PatternFlag::BounceDetected => "bounce_detected",
            PatternFlag::VolumeConfirmed => "volume_confirmed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Compare(Comparison),
    /// Every flag must be set.
    Pattern(Vec<PatternFlag>),
}

impl Rule {
    /// Parse rule text, resolving bare identifiers against `parameters`.
    pub fn parse(text: &str, parameters: &BTreeMap<String, toml::Value>) -> Result<Rule, String> {
        let text = text.trim();
        if text.is_empty() {
            return Err("rule is empty".to_string());
        }

        match Comparator::find(text) {
            Some((at, len, op)) => {
                let rest = &text[at + len..];
                if Comparator::find(rest).is_some() {
                    return Err(format!("rule '{text}' must contain exactly one comparison"));
                }
                let lhs = parse_operand(&text[..at], parameters)?;
                let rhs = parse_operand(rest, parameters)?;
                if lhs.field().is_none() && rhs.field().is_none() {
                    return Err(format!("rule '{text}' compares two constants"));
                }
                Ok(Rule::Compare(Comparison { lhs, op, rhs }))
            }
            None => parse_pattern(text).map(Rule::Pattern),
        }
    }

    pub fn flags(&self) -> &[PatternFlag] {
        match self {
            Rule::Pattern(flags) => flags,
            Rule::Compare(_) => &[],
        }
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Compare(cmp) => write!(f, "{cmp}"),
            Rule::Pattern(flags) => {
                let names: Vec<&str> = flags.iter().map(PatternFlag::name).collect();
                write!(f, "{}", names.join(" and "))
            }
        }
    }
}

fn parse_operand(raw: &str, parameters: &BTreeMap<String, toml::Value>) -> Result<Operand, String> {
    let token = raw.trim();
    if token.is_empty() {
        return Err("comparison is missing an operand".to_string());
    }
    if let Some(field) = Field::from_name(token) {
        return Ok(Operand::Field(field));
    }
    if let Ok(value) = token.parse::<f64>() {
        return if value.is_finite() {
            Ok(Operand::Constant(value))
        } else {
            Err(format!("constant '{token}' is not finite"))
        };
    }
    match parameters.get(token) {
        Some(toml::Value::Float(v)) if v.is_finite() => Ok(Operand::Constant(*v)),
        Some(toml::Value::Integer(v)) => Ok(Operand::Constant(*v as f64)),
        Some(_) => Err(format!("parameter '{token}' is not a number")),
        None => Err(format!("unknown indicator or parameter '{token}'")),
    }
}

fn parse_pattern(text: &str) -> Result<Vec<PatternFlag>, String> {
    let mut flags = Vec::new();
    let mut expect_flag = true;
    for word in text.split_whitespace() {
        if expect_flag {
            let flag = PatternFlag::from_name(word)
                .ok_or_else(|| format!("unknown pattern or indicator '{word}'"))?;
            if !flags.contains(&flag) {
                flags.push(flag);
            }
        } else if !(word == "and" || word == "&&") {
            return Err(format!("expected 'and' between pattern flags, found '{word}'"));
        }
        expect_flag = !expect_flag;
    }
    if expect_flag {
        return Err(format!("rule '{text}' ends with a dangling 'and'"));
    }
    Ok(flags)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn params(pairs: &[(&str, toml::Value)]) -> BTreeMap<String, toml::Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn quote(price: f64) -> Quote {
        Quote {
            symbol: "TEST".into(),
            price,
            volume: 1_000,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn parses_indicator_comparison() {
        let rule = Rule::parse("sma_20 > sma_60", &BTreeMap::new()).unwrap();
        assert_eq!(
            rule,
            Rule::Compare(Comparison {
                lhs: Operand::Field(Field::Sma20),
                op: Comparator::Gt,
                rhs: Operand::Field(Field::Sma60),
            })
        );
    }

    #[test]
    fn parses_without_whitespace_and_two_char_operators() {
        let rule = Rule::parse("rsi_14<=30", &BTreeMap::new()).unwrap();
        assert_eq!(rule.to_string(), "rsi_14 <= 30");
    }

    #[test]
    fn resolves_parameters_to_constants() {
        let p = params(&[("threshold", toml::Value::Integer(30))]);
        let rule = Rule::parse("rsi < threshold", &p).unwrap();
        assert_eq!(rule.to_string(), "rsi_14 < 30");
    }

    #[test]
    fn rejects_unknown_identifiers() {
        let err = Rule::parse("macd > 0", &BTreeMap::new()).unwrap_err();
        assert!(err.contains("'macd'"), "{err}");
    }

    #[test]
    fn rejects_chained_comparisons() {
        assert!(Rule::parse("10 < price < 20", &BTreeMap::new()).is_err());
    }

    #[test]
    fn rejects_non_numeric_parameter() {
        let p = params(&[("threshold", toml::Value::String("low".into()))]);
        assert!(Rule::parse("rsi_14 < threshold", &p).is_err());
    }

    #[test]
    fn parses_pattern_conjunction() {
        let rule = Rule::parse("bounce_detected and volume_confirmed", &BTreeMap::new()).unwrap();
        assert_eq!(
            rule.flags(),
            &[PatternFlag::BounceDetected, PatternFlag::VolumeConfirmed]
        );
        assert!(Rule::parse("bounce_detected and", &BTreeMap::new()).is_err());
        assert!(Rule::parse("bounce_detected or volume_confirmed", &BTreeMap::new()).is_err());
    }

    #[test]
    fn missing_indicator_never_satisfies_a_comparison() {
        let Rule::Compare(cmp) = Rule::parse("sma_20 > sma_60", &BTreeMap::new()).unwrap() else {
            panic!("expected comparison");
        };
        let mut indicators = TechnicalIndicators::empty("TEST");
        indicators.sma_20 = Some(10.0);
        assert!(!cmp.holds(&indicators, &quote(10.0)));
        indicators.sma_60 = Some(9.0);
        assert!(cmp.holds(&indicators, &quote(10.0)));
    }

    #[test]
    fn quote_fields_resolve_from_the_quote() {
        let Rule::Compare(cmp) = Rule::parse("price >= 10", &BTreeMap::new()).unwrap() else {
            panic!("expected comparison");
        };
        let indicators = TechnicalIndicators::empty("TEST");
        assert!(cmp.holds(&indicators, &quote(10.0)));
        assert!(!cmp.holds(&indicators, &quote(9.99)));
    }
}
