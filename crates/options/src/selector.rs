use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use common::{
    OptionChain, OptionContract, OptionSelection, MIN_LIQUID_OPEN_INTEREST, MIN_LIQUID_VOLUME,
};

/// Option screening parameters from the strategy's `[option_screening]` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptionScreening {
    /// Moneyness band as a fraction of spot (0.05 = strikes within ±5%).
    pub tolerance: f64,
    pub min_dte: i64,
    pub max_dte: i64,
    /// Informational; selection ranks by yield, not by distance to this.
    pub target_dte: i64,
    /// Minimum annualized premium yield (0.02 = 2%).
    pub min_premium_yield: f64,
    pub min_volume: u64,
    pub min_open_interest: u64,
    /// How many in-range expirations to fetch chains for, nearest first.
    pub max_expirations: usize,
}

impl Default for OptionScreening {
    fn default() -> Self {
        Self {
            tolerance: 0.05,
            min_dte: 7,
            max_dte: 60,
            target_dte: 30,
            min_premium_yield: 0.02,
            min_volume: MIN_LIQUID_VOLUME,
            min_open_interest: MIN_LIQUID_OPEN_INTEREST,
            max_expirations: 3,
        }
    }
}

impl OptionScreening {
    /// Problems with these parameters, one message each.
    pub fn issues(&self) -> Vec<String> {
        let mut issues = Vec::new();
        if !(self.tolerance.is_finite() && self.tolerance > 0.0 && self.tolerance < 1.0) {
            issues.push(format!(
                "option_screening.tolerance must be in (0, 1), got {}",
                self.tolerance
            ));
        }
        if self.min_dte < 1 {
            issues.push(format!("option_screening.min_dte must be >= 1, got {}", self.min_dte));
        }
        if self.max_dte < self.min_dte {
            issues.push(format!(
                "option_screening.max_dte ({}) must be >= min_dte ({})",
                self.max_dte, self.min_dte
            ));
        }
        if !(self.min_premium_yield.is_finite() && self.min_premium_yield >= 0.0) {
            issues.push(format!(
                "option_screening.min_premium_yield must be >= 0, got {}",
                self.min_premium_yield
            ));
        }
        if self.max_expirations == 0 {
            issues.push("option_screening.max_expirations must be >= 1".to_string());
        }
        issues
    }
}

/// Slack on the minimum-yield comparison so a contract priced exactly at the
/// floor is not lost to rounding in the annualization.
const YIELD_EPSILON: f64 = 1e-9;

/// Picks the best liquid at-the-money put from an option chain.
#[derive(Debug, Clone)]
pub struct OptionSelector {
    params: OptionScreening,
}

struct Candidate<'a> {
    contract: &'a OptionContract,
    dte: i64,
    annualized_yield: f64,
}

impl OptionSelector {
    pub fn new(params: OptionScreening) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &OptionScreening {
        &self.params
    }

    /// `(mid / spot) * (365 / dte)`.
    pub fn annualized_yield(contract: &OptionContract, spot: f64, dte: i64) -> f64 {
        (contract.mid() / spot) * (365.0 / dte as f64)
    }

    /// Expirations inside the DTE window, nearest first, capped at `max_expirations`.
    pub fn target_expirations(&self, available: &[NaiveDate], today: NaiveDate) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = available
            .iter()
            .copied()
            .filter(|exp| self.dte_in_range((*exp - today).num_days()))
            .collect();
        dates.sort();
        dates.dedup();
        dates.truncate(self.params.max_expirations);
        dates
    }

    /// Select the highest-yield qualifying put.
    ///
    /// Ties on yield go to the nearer expiration, then to higher open interest.
    /// Returns `None` when nothing survives filtering.
    pub fn select(&self, chain: &OptionChain, spot: f64, today: NaiveDate) -> Option<OptionSelection> {
        if !(spot.is_finite() && spot > 0.0) {
            debug!(symbol = %chain.symbol, spot, "Invalid spot price, skipping option selection");
            return None;
        }

        let band = spot * self.params.tolerance;
        let best = chain
            .puts()
            .filter(|c| (c.strike - spot).abs() <= band)
            .filter_map(|c| {
                let dte = (c.expiration - today).num_days();
                self.dte_in_range(dte).then_some((c, dte))
            })
            .filter(|(c, _)| c.is_liquid(self.params.min_volume, self.params.min_open_interest))
            .map(|(contract, dte)| Candidate {
                contract,
                dte,
                annualized_yield: Self::annualized_yield(contract, spot, dte),
            })
            .filter(|c| c.annualized_yield.is_finite())
            .filter(|c| c.annualized_yield + YIELD_EPSILON >= self.params.min_premium_yield)
            .max_by(rank);

        let Some(best) = best else {
            debug!(symbol = %chain.symbol, contracts = chain.len(), "No put survived screening");
            return None;
        };

        info!(
            symbol = %chain.symbol,
            contract = %best.contract.contract_symbol,
            annualized_yield = best.annualized_yield,
            dte = best.dte,
            "Selected put"
        );

        Some(OptionSelection {
            contract: best.contract.clone(),
            annualized_yield: best.annualized_yield,
            days_to_expiration: best.dte,
            reason: describe(best.contract, best.annualized_yield, best.dte, spot),
        })
    }

    fn dte_in_range(&self, dte: i64) -> bool {
        dte > 0 && dte >= self.params.min_dte && dte <= self.params.max_dte
    }
}

/// Greater is better: yield, then nearer expiration, then open interest.
fn rank(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    a.annualized_yield
        .total_cmp(&b.annualized_yield)
        .then_with(|| b.dte.cmp(&a.dte))
        .then_with(|| a.contract.open_interest.cmp(&b.contract.open_interest))
}

fn describe(contract: &OptionContract, annualized_yield: f64, dte: i64, spot: f64) -> String {
    let strike_pct = (contract.strike / spot - 1.0) * 100.0;
    let direction = if strike_pct < 0.0 {
        "below"
    } else if strike_pct > 0.0 {
        "above"
    } else {
        "at"
    };
    format!(
        "${:.2} strike ({:.1}% {direction} spot), {dte} days to expiration, \
         {:.1}% annualized yield, ${:.2} mid price",
        contract.strike,
        strike_pct.abs(),
        annualized_yield * 100.0,
        contract.mid()
    )
}

// ─── Tests ────────────────────────────────────────────────────────────────────
