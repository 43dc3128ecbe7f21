//! Single-symbol pipeline.
//!
//! `Pending → Fetching → Analyzing → Evaluating → Matched → OptionLookup → Completed`,
//! or `Evaluating → NotMatched → Completed`. A failure at any stage ends in
//! `Failed` with the stage recorded; no partial result is produced.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use common::{
    OptionChain, OptionSelection, PipelineStage, Result, ScreeningResult, SymbolOutcome,
    TechnicalIndicators,
};
use strategy::EvaluationInput;

use crate::screener::Screener;

impl Screener {
    /// Run one symbol through every stage.
    ///
    /// Data problems become `SymbolOutcome::Failed`. Only fatal errors
    /// (a strategy the evaluator cannot apply) come back as `Err`.
    pub async fn screen_symbol(&self, symbol: &str) -> Result<SymbolOutcome> {
        let mut stage = PipelineStage::Pending;
        match self.run_stages(symbol, &mut stage).await {
            Ok(result) => Ok(SymbolOutcome::Completed(result)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(symbol, stage = %stage, error = %e, "Symbol failed");
                Ok(SymbolOutcome::Failed {
                    symbol: symbol.to_string(),
                    stage,
                    reason: e.to_string(),
                })
            }
        }
    }

    async fn run_stages(&self, symbol: &str, stage: &mut PipelineStage) -> Result<ScreeningResult> {
        advance(symbol, stage, PipelineStage::Fetching);
        let quote = self.provider.get_quote(symbol).await?;
        let bars = self
            .provider
            .get_historical_prices(symbol, self.history_days)
            .await?;

        advance(symbol, stage, PipelineStage::Analyzing);
        let depth = self.evaluator.strategy().history_depth();
        let history = self.indicators.history(symbol, &bars, depth)?;
        let indicators = history
            .last()
            .cloned()
            .unwrap_or_else(|| TechnicalIndicators::empty(symbol));
        let patterns = self.patterns.detect(&bars);

        advance(symbol, stage, PipelineStage::Evaluating);
        let evaluation = self.evaluator.evaluate(&EvaluationInput {
            quote: &quote,
            indicators: &indicators,
            history: &history,
            patterns: &patterns,
        })?;

        let now = (self.clock)();
        let recommendation = if evaluation.matches {
            advance(symbol, stage, PipelineStage::Matched);
            advance(symbol, stage, PipelineStage::OptionLookup);
            self.lookup_option(symbol, quote.price, now.date_naive()).await?
        } else {
            advance(symbol, stage, PipelineStage::NotMatched);
            None
        };
        advance(symbol, stage, PipelineStage::Completed);

        if evaluation.matches {
            info!(
                symbol,
                signal_strength = evaluation.signal_strength,
                contract = recommendation
                    .as_ref()
                    .map(|r| r.contract.contract_symbol.as_str())
                    .unwrap_or("none"),
                "Symbol matched"
            );
        }

        Ok(ScreeningResult {
            symbol: symbol.to_string(),
            strategy: self.evaluator.strategy().name.clone(),
            timestamp: now,
            eligible: evaluation.eligible,
            matches: evaluation.matches,
            signal_strength: evaluation.signal_strength,
            conditions_met: evaluation.conditions_met,
            conditions_missed: evaluation.conditions_missed,
            quote,
            indicators,
            patterns,
            recommendation,
        })
    }

    /// Fetch chains for the nearest in-window expirations and pick a put.
    async fn lookup_option(
        &self,
        symbol: &str,
        spot: f64,
        today: NaiveDate,
    ) -> Result<Option<OptionSelection>> {
        let available = self.provider.get_available_expirations(symbol).await?;
        let targets = self.selector.target_expirations(&available, today);
        if targets.is_empty() {
            debug!(symbol, available = available.len(), "No expiration inside the DTE window");
            return Ok(None);
        }

        let mut chain = OptionChain::new(symbol);
        for expiration in targets {
            chain.merge(self.provider.get_option_chain(symbol, expiration).await?);
        }
        Ok(self.selector.select(&chain, spot, today))
    }
}

fn advance(symbol: &str, stage: &mut PipelineStage, next: PipelineStage) {
    debug!(symbol, from = %stage, to = %next, "Stage transition");
    *stage = next;
}
