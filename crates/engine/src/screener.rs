use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::time::{sleep_until, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use common::{BatchSummary, MarketDataProvider, Result, ScreeningResult, SymbolOutcome};
use options::OptionSelector;
use strategy::{IndicatorEngine, PatternDetector, RuleEvaluator, StrategyDefinition};

/// Source of "now" for result timestamps and days-to-expiration.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Every symbol outcome of a batch plus its summary.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// In completion order; in-flight then unstarted symbols follow when the
    /// deadline cut the batch short.
    pub outcomes: Vec<SymbolOutcome>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn results(&self) -> impl Iterator<Item = &ScreeningResult> {
        self.outcomes.iter().filter_map(SymbolOutcome::result)
    }

    pub fn matched(&self) -> impl Iterator<Item = &ScreeningResult> {
        self.results().filter(|r| r.matches)
    }
}

/// Runs one strategy over a universe of symbols.
///
/// Built once per run. Everything it holds is read-only, so symbol
/// pipelines share it by reference.
pub struct Screener {
    pub(crate) provider: Arc<dyn MarketDataProvider>,
    pub(crate) evaluator: RuleEvaluator,
    pub(crate) selector: OptionSelector,
    pub(crate) indicators: IndicatorEngine,
    pub(crate) patterns: PatternDetector,
    pub(crate) history_days: u32,
    pub(crate) clock: Clock,
}

impl Screener {
    pub const DEFAULT_HISTORY_DAYS: u32 = 252;

    /// Fails with `Error::Configuration` if the strategy cannot be evaluated.
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        strategy: Arc<StrategyDefinition>,
    ) -> Result<Self> {
        let selector = OptionSelector::new(strategy.option_screening.clone());
        let patterns = strategy.pattern_detector();
        Ok(Self {
            provider,
            evaluator: RuleEvaluator::new(strategy)?,
            selector,
            indicators: IndicatorEngine::new(),
            patterns,
            history_days: Self::DEFAULT_HISTORY_DAYS,
            clock: Arc::new(Utc::now),
        })
    }

    pub fn with_history_days(mut self, days: u32) -> Self {
        self.history_days = days;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn strategy(&self) -> &StrategyDefinition {
        self.evaluator.strategy()
    }

    /// Screen `symbols` with at most `concurrency_limit` pipelines in flight.
    ///
    /// Per-symbol failures become `SymbolOutcome::Failed` and never affect other
    /// symbols. Once `deadline` elapses no new pipeline starts, in-flight ones
    /// are abandoned, and the partial report is returned with those symbols
    /// marked `Incomplete`. Only fatal errors return `Err`.
    pub async fn screen_batch(
        &self,
        symbols: &[String],
        concurrency_limit: usize,
        deadline: Option<Duration>,
    ) -> Result<BatchReport> {
        let limit = concurrency_limit.max(1);
        let run_id = Uuid::new_v4().to_string();
        let started_at = (self.clock)();
        let start = Instant::now();
        let deadline_at = deadline.map(|d| start + d);

        info!(
            run_id = %run_id,
            strategy = %self.strategy().name,
            symbols = symbols.len(),
            concurrency = limit,
            "Starting screening batch"
        );

        let mut outcomes = Vec::with_capacity(symbols.len());
        let mut next = 0;
        let mut running = BTreeSet::new();
        let mut in_flight = FuturesUnordered::new();
        let mut expired = false;

        loop {
            if deadline_at.is_some_and(|at| Instant::now() >= at) {
                expired = true;
                break;
            }
            while in_flight.len() < limit && next < symbols.len() {
                running.insert(next);
                in_flight.push(self.screen_indexed(next, &symbols[next]));
                next += 1;
            }
            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;
                Some((index, outcome)) = in_flight.next() => {
                    running.remove(&index);
                    match outcome {
                        Ok(outcome) => outcomes.push(outcome),
                        Err(e) => {
                            error!(run_id = %run_id, symbol = %symbols[index], error = %e, "Fatal error, aborting batch");
                            return Err(e);
                        }
                    }
                }
                _ = deadline_reached(deadline_at) => {
                    expired = true;
                    break;
                }
            }
        }

        if expired {
            drop(in_flight);
            warn!(
                run_id = %run_id,
                in_flight = running.len(),
                unstarted = symbols.len() - next,
                "Batch deadline reached, returning partial results"
            );
            outcomes.extend(running.iter().map(|&i| SymbolOutcome::Incomplete {
                symbol: symbols[i].clone(),
                started: true,
            }));
            outcomes.extend(symbols[next..].iter().map(|s| SymbolOutcome::Incomplete {
                symbol: s.clone(),
                started: false,
            }));
        }

        let summary = BatchSummary {
            run_id,
            strategy: self.strategy().name.clone(),
            started_at,
            attempted: symbols.len(),
            succeeded: outcomes.iter().filter(|o| o.result().is_some()).count(),
            failed: outcomes.iter().filter(|o| o.is_failed()).count(),
            matched: outcomes.iter().filter(|o| o.is_matched()).count(),
            incomplete: outcomes.iter().filter(|o| o.is_incomplete()).count(),
            duration: start.elapsed(),
        };

        info!(
            run_id = %summary.run_id,
            attempted = summary.attempted,
            succeeded = summary.succeeded,
            failed = summary.failed,
            matched = summary.matched,
            incomplete = summary.incomplete,
            duration_ms = summary.duration.as_millis() as u64,
            "Screening batch finished"
        );

        Ok(BatchReport { outcomes, summary })
    }

    fn screen_indexed<'a>(
        &'a self,
        index: usize,
        symbol: &'a str,
    ) -> impl Future<Output = (usize, Result<SymbolOutcome>)> + 'a {
        async move { (index, self.screen_symbol(symbol).await) }
    }
}

async fn deadline_reached(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}
