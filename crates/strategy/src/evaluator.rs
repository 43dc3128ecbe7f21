use std::sync::Arc;

use tracing::debug;

use common::{Error, PatternSignals, Quote, Result, TechnicalIndicators};

use crate::definition::{Condition, ConditionKind, MatchPolicy, StrategyDefinition};
use crate::rule::{PatternFlag, Rule};

/// Everything the evaluator looks at for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub quote: &'a Quote,
    pub indicators: &'a TechnicalIndicators,
    /// Trailing daily snapshots, oldest first, ending with `indicators`.
    /// Oversold conditions look back through these.
    pub history: &'a [TechnicalIndicators],
    pub patterns: &'a PatternSignals,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub eligible: bool,
    pub matches: bool,
    /// Satisfied weight over total weight, in [0, 1].
    pub signal_strength: f64,
    /// Condition ids in strategy order.
    pub conditions_met: Vec<String>,
    pub conditions_missed: Vec<String>,
}

/// Applies a strategy's entry conditions to computed indicators and patterns.
#[derive(Debug, Clone)]
pub struct RuleEvaluator {
    strategy: Arc<StrategyDefinition>,
    total_weight: f64,
}

impl RuleEvaluator {
    /// Fails with `Error::Configuration` when a condition cannot be evaluated
    /// or the weights do not sum to a positive number.
    pub fn new(strategy: Arc<StrategyDefinition>) -> Result<Self> {
        for condition in &strategy.conditions {
            condition.kind.check_rule(&condition.rule).map_err(|e| {
                Error::Configuration(format!("condition '{}': {e}", condition.id))
            })?;
            if !(condition.weight.is_finite() && condition.weight >= 0.0) {
                return Err(Error::Configuration(format!(
                    "condition '{}' has invalid weight {}",
                    condition.id, condition.weight
                )));
            }
        }
        let total_weight = strategy.total_weight();
        if !(total_weight > 0.0) {
            return Err(Error::Configuration(format!(
                "strategy '{}' has no positive condition weight",
                strategy.name
            )));
        }
        Ok(Self {
            strategy,
            total_weight,
        })
    }

    pub fn strategy(&self) -> &Arc<StrategyDefinition> {
        &self.strategy
    }

    pub fn evaluate(&self, input: &EvaluationInput<'_>) -> Result<Evaluation> {
        let mut met_weight = 0.0;
        let mut conditions_met = Vec::new();
        let mut conditions_missed = Vec::new();

        for condition in &self.strategy.conditions {
            if condition_holds(condition, input)? {
                met_weight += condition.weight;
                conditions_met.push(condition.id.clone());
            } else {
                conditions_missed.push(condition.id.clone());
            }
        }

        let signal_strength = (met_weight / self.total_weight).clamp(0.0, 1.0);
        let eligible = self.strategy.stock_criteria.admits(input.quote);
        let satisfied = match self.strategy.match_policy {
            MatchPolicy::AllConditions => conditions_missed.is_empty(),
            MatchPolicy::MinimumStrength(threshold) => signal_strength >= threshold,
        };

        debug!(
            symbol = %input.quote.symbol,
            signal_strength,
            eligible,
            met = ?conditions_met,
            missed = ?conditions_missed,
            "Evaluated conditions"
        );

        Ok(Evaluation {
            eligible,
            matches: eligible && satisfied,
            signal_strength,
            conditions_met,
            conditions_missed,
        })
    }
}

fn condition_holds(condition: &Condition, input: &EvaluationInput<'_>) -> Result<bool> {
    match (condition.kind, &condition.rule) {
        (ConditionKind::Oversold, Rule::Compare(cmp)) => {
            let lookback = condition.lookback_days();
            let window = if input.history.is_empty() {
                std::slice::from_ref(input.indicators)
            } else {
                &input.history[input.history.len().saturating_sub(lookback)..]
            };
            Ok(window.iter().any(|snapshot| cmp.holds(snapshot, input.quote)))
        }
        (ConditionKind::Trend | ConditionKind::Price | ConditionKind::Volume, Rule::Compare(cmp)) => {
            Ok(cmp.holds(input.indicators, input.quote))
        }
        (ConditionKind::Bounce | ConditionKind::Volume, Rule::Pattern(flags)) => {
            Ok(flags.iter().all(|flag| match flag {
                PatternFlag::BounceDetected => input.patterns.bounce_detected,
                PatternFlag::VolumeConfirmed => input.patterns.volume_confirmed,
            }))
        }
        (kind, rule) => Err(Error::Configuration(format!(
            "condition '{}' of type '{kind}' cannot evaluate rule '{rule}'",
            condition.id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use options::OptionScreening;

    use crate::definition::StockCriteria;

    fn condition(kind: ConditionKind, rule: &str, weight: f64) -> Condition {
        Condition {
            id: kind.to_string(),
            kind,
            rule: Rule::parse(rule, &BTreeMap::new()).unwrap(),
            description: String::new(),
            weight,
            parameters: BTreeMap::new(),
        }
    }

    fn ofi(conditions: Vec<Condition>) -> StrategyDefinition {
        StrategyDefinition {
            name: "OFI".into(),
            version: "1.0".into(),
            description: String::new(),
            tags: vec![],
            stock_criteria: StockCriteria::default(),
            conditions,
            option_screening: OptionScreening::default(),
            match_policy: MatchPolicy::AllConditions,
        }
    }

    fn reference() -> StrategyDefinition {
        ofi(vec![
            condition(ConditionKind::Trend, "sma_20 > sma_60", 0.5),
            condition(ConditionKind::Oversold, "rsi_14 < 30", 0.3),
            condition(ConditionKind::Bounce, "bounce_detected", 0.2),
        ])
    }

    fn quote(price: f64) -> Quote {
        Quote {
            symbol: "TEST".into(),
            price,
            volume: 1_000_000,
            timestamp: Utc::now(),
        }
    }

    fn indicators(sma_20: f64, sma_60: f64, rsi: f64) -> TechnicalIndicators {
        TechnicalIndicators {
            sma_20: Some(sma_20),
            sma_60: Some(sma_60),
            rsi_14: Some(rsi),
            ..TechnicalIndicators::empty("TEST")
        }
    }

    fn evaluate(
        strategy: StrategyDefinition,
        ind: &TechnicalIndicators,
        history: &[TechnicalIndicators],
        patterns: PatternSignals,
        price: f64,
    ) -> Evaluation {
        let evaluator = RuleEvaluator::new(Arc::new(strategy)).unwrap();
        let quote = quote(price);
        evaluator
            .evaluate(&EvaluationInput {
                quote: &quote,
                indicators: ind,
                history,
                patterns: &patterns,
            })
            .unwrap()
    }

    #[test]
    fn partial_match_reports_strength_but_does_not_match() {
        let ind = indicators(105.0, 100.0, 25.0);
        let eval = evaluate(reference(), &ind, &[], PatternSignals::default(), 100.0);
        assert_eq!(eval.conditions_met, vec!["trend", "oversold"]);
        assert_eq!(eval.conditions_missed, vec!["bounce"]);
        assert!((eval.signal_strength - 0.8).abs() < 1e-12);
        assert!(!eval.matches);
    }

    #[test]
    fn all_conditions_met_matches() {
        let ind = indicators(105.0, 100.0, 25.0);
        let patterns = PatternSignals {
            bounce_detected: true,
            ..PatternSignals::default()
        };
        let eval = evaluate(reference(), &ind, &[], patterns, 100.0);
        assert!(eval.matches);
        assert!((eval.signal_strength - 1.0).abs() < 1e-12);
    }

    #[test]
    fn missing_indicators_never_match() {
        let ind = TechnicalIndicators::empty("TEST");
        let eval = evaluate(reference(), &ind, &[], PatternSignals::default(), 100.0);
        assert!(eval.conditions_met.is_empty());
        assert_eq!(eval.signal_strength, 0.0);
        assert!(!eval.matches);
    }

    #[test]
    fn oversold_looks_back_through_history() {
        let mut strategy = reference();
        strategy.conditions[1]
            .parameters
            .insert("lookback_days".into(), toml::Value::Integer(3));

        let current = indicators(105.0, 100.0, 45.0);
        let history = vec![
            indicators(105.0, 100.0, 20.0),
            indicators(105.0, 100.0, 28.0),
            indicators(105.0, 100.0, 40.0),
            current.clone(),
        ];
        let eval = evaluate(strategy.clone(), &current, &history, PatternSignals::default(), 100.0);
        assert!(eval.conditions_met.contains(&"oversold".to_string()));

        // The 28 reading falls outside a two-day window.
        strategy.conditions[1]
            .parameters
            .insert("lookback_days".into(), toml::Value::Integer(2));
        let eval = evaluate(strategy, &current, &history, PatternSignals::default(), 100.0);
        assert!(!eval.conditions_met.contains(&"oversold".to_string()));
    }

    #[test]
    fn ineligible_price_blocks_match() {
        let mut strategy = reference();
        strategy.stock_criteria.min_price = Some(50.0);
        let ind = indicators(105.0, 100.0, 25.0);
        let patterns = PatternSignals {
            bounce_detected: true,
            ..PatternSignals::default()
        };
        let eval = evaluate(strategy, &ind, &[], patterns, 20.0);
        assert!(!eval.eligible);
        assert!(!eval.matches);
        assert!((eval.signal_strength - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weighted_policy_matches_above_threshold() {
        let mut strategy = reference();
        strategy.match_policy = MatchPolicy::MinimumStrength(0.75);
        let ind = indicators(105.0, 100.0, 25.0);
        let eval = evaluate(strategy.clone(), &ind, &[], PatternSignals::default(), 100.0);
        assert!(eval.matches);

        strategy.match_policy = MatchPolicy::MinimumStrength(0.9);
        let eval = evaluate(strategy, &ind, &[], PatternSignals::default(), 100.0);
        assert!(!eval.matches);
    }

    #[test]
    fn volume_pattern_condition() {
        let strategy = ofi(vec![condition(ConditionKind::Volume, "volume_confirmed", 1.0)]);
        let patterns = PatternSignals {
            volume_confirmed: true,
            ..PatternSignals::default()
        };
        let ind = TechnicalIndicators::empty("TEST");
        assert!(evaluate(strategy, &ind, &[], patterns, 10.0).matches);
    }

    #[test]
    fn mismatched_condition_is_a_configuration_error() {
        let mut strategy = reference();
        strategy.conditions[2].rule = Rule::parse("rsi_14 < 30", &BTreeMap::new()).unwrap();
        let err = RuleEvaluator::new(Arc::new(strategy)).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn zero_total_weight_is_a_configuration_error() {
        let strategy = ofi(vec![condition(ConditionKind::Trend, "sma_20 > sma_60", 0.0)]);
        assert!(RuleEvaluator::new(Arc::new(strategy)).is_err());
    }
}
