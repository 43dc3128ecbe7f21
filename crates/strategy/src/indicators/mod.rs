pub mod rsi;
pub mod sma;

pub use rsi::RsiIndicator;
pub use sma::sma;

use common::{Error, PriceBar, Result, TechnicalIndicators};

/// Computes the indicator snapshot a strategy evaluates against.
///
/// Indicators with too little history come back as `None`; that is never an
/// error. Only a malformed series (dates out of order or repeated) fails.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    rsi: RsiIndicator,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self {
            rsi: RsiIndicator::new(Self::RSI_PERIOD),
        }
    }
}

impl IndicatorEngine {
    pub const SMA_SHORT: usize = 20;
    pub const SMA_LONG: usize = 60;
    pub const RSI_PERIOD: usize = 14;
    pub const VOLUME_WINDOW: usize = 20;

    pub fn new() -> Self {
        Self::default()
    }

    /// Bars must be strictly ascending by date.
    pub fn validate(symbol: &str, bars: &[PriceBar]) -> Result<()> {
        match bars.windows(2).find(|w| w[1].date <= w[0].date) {
            None => Ok(()),
            Some(w) => {
                let reason = if w[1].date == w[0].date {
                    format!("duplicate bar date {}", w[1].date)
                } else {
                    format!("bar dated {} follows {}", w[1].date, w[0].date)
                };
                Err(Error::DataIntegrity {
                    symbol: symbol.to_string(),
                    reason,
                })
            }
        }
    }

    /// Indicators as of the last bar.
    pub fn compute(&self, symbol: &str, bars: &[PriceBar]) -> Result<TechnicalIndicators> {
        Self::validate(symbol, bars)?;
        Ok(self.snapshot(symbol, bars))
    }

    /// The last `depth` daily snapshots, oldest first. The final entry equals
    /// `compute(symbol, bars)`. Shorter when fewer bars exist.
    pub fn history(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        depth: usize,
    ) -> Result<Vec<TechnicalIndicators>> {
        Self::validate(symbol, bars)?;
        let depth = depth.min(bars.len());
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let rsi = self.rsi.series(&closes);

        Ok((bars.len() - depth..bars.len())
            .map(|last| {
                let prefix = &bars[..=last];
                let mut snapshot = self.moving_averages(symbol, prefix);
                snapshot.rsi_14 = rsi[last];
                snapshot
            })
            .collect())
    }

    fn snapshot(&self, symbol: &str, bars: &[PriceBar]) -> TechnicalIndicators {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut snapshot = self.moving_averages(symbol, bars);
        snapshot.rsi_14 = self.rsi.compute(&closes);
        snapshot
    }

    fn moving_averages(&self, symbol: &str, bars: &[PriceBar]) -> TechnicalIndicators {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
        TechnicalIndicators {
            symbol: symbol.to_string(),
            as_of: bars.last().map(|b| b.date),
            sma_20: sma(&closes, Self::SMA_SHORT),
            sma_60: sma(&closes, Self::SMA_LONG),
            rsi_14: None,
            volume_avg_20: sma(&volumes, Self::VOLUME_WINDOW),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    pub(crate) fn bars(closes: &[f64]) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PriceBar {
                date: start + Duration::days(i as i64),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1_000,
            })
            .collect()
    }

    #[test]
    fn empty_series_yields_all_none() {
        let ind = IndicatorEngine::new().compute("TEST", &[]).unwrap();
        assert_eq!(ind, TechnicalIndicators::empty("TEST"));
    }

    #[test]
    fn indicators_fill_in_as_history_grows() {
        let engine = IndicatorEngine::new();
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();

        let short = engine.compute("TEST", &bars(&closes[..14])).unwrap();
        assert!(short.sma_20.is_none() && short.rsi_14.is_none());

        let mid = engine.compute("TEST", &bars(&closes[..20])).unwrap();
        assert_eq!(mid.sma_20, Some(109.5));
        assert_eq!(mid.volume_avg_20, Some(1_000.0));
        assert!(mid.sma_60.is_none());
        assert_eq!(mid.rsi_14, Some(100.0));

        let full = engine.compute("TEST", &bars(&closes)).unwrap();
        assert_eq!(full.sma_60, Some(129.5));
    }

    #[test]
    fn out_of_order_dates_are_a_data_integrity_error() {
        let mut series = bars(&[1.0, 2.0, 3.0]);
        series.swap(1, 2);
        let err = IndicatorEngine::new().compute("TEST", &series).unwrap_err();
        assert!(matches!(err, Error::DataIntegrity { .. }), "got {err:?}");
        assert!(!err.is_fatal());
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let mut series = bars(&[1.0, 2.0]);
        series[1].date = series[0].date;
        let err = IndicatorEngine::validate("TEST", &series).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn history_ends_with_current_snapshot() {
        let engine = IndicatorEngine::new();
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 7) as f64).collect();
        let series = bars(&closes);
        let history = engine.history("TEST", &series, 5).unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[4], engine.compute("TEST", &series).unwrap());
        assert_eq!(history[0], engine.compute("TEST", &series[..36]).unwrap());
        assert!(engine.history("TEST", &[], 5).unwrap().is_empty());
    }
}
