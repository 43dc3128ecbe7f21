pub mod definition;
pub mod evaluator;
pub mod indicators;
pub mod parser;
pub mod patterns;
pub mod rule;

pub use definition::{Condition, ConditionKind, MatchPolicy, StockCriteria, StrategyDefinition};
pub use evaluator::{Evaluation, EvaluationInput, RuleEvaluator};
pub use indicators::IndicatorEngine;
pub use parser::{load, parse};
pub use patterns::PatternDetector;
pub use rule::Rule;
