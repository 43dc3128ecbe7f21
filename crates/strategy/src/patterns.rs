use common::{PatternSignals, PriceBar};

use crate::indicators::{sma, IndicatorEngine};

/// Structural and volume signals over the tail of a price series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternDetector {
    lookback: usize,
    volume_multiplier: f64,
}

impl Default for PatternDetector {
    fn default() -> Self {
        Self::new(5, 1.2)
    }
}

impl PatternDetector {
    pub fn new(lookback: usize, volume_multiplier: f64) -> Self {
        Self {
            lookback,
            volume_multiplier,
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn volume_multiplier(&self) -> f64 {
        self.volume_multiplier
    }

    /// Short series produce `false` signals, never an error.
    pub fn detect(&self, bars: &[PriceBar]) -> PatternSignals {
        PatternSignals {
            bounce_detected: self.bounce(bars),
            bounce_window: self.lookback,
            volume_confirmed: self.volume_confirmed(bars),
            volume_window: IndicatorEngine::VOLUME_WINDOW,
        }
    }

    /// Higher high and higher low after the lowest low of the trailing window.
    ///
    /// The pivot is the first bar carrying the window's lowest low. Some later
    /// bar in the window must clear the high of the bar just before the pivot
    /// and hold a low above the pivot's low.
    fn bounce(&self, bars: &[PriceBar]) -> bool {
        if self.lookback < 2 || bars.len() < self.lookback {
            return false;
        }
        let start = bars.len() - self.lookback;

        let mut pivot = start;
        for i in start + 1..bars.len() {
            if bars[i].low < bars[pivot].low {
                pivot = i;
            }
        }
        // The bar preceding the pivot may sit just outside the window.
        if pivot == 0 {
            return false;
        }
        let prior_high = bars[pivot - 1].high;
        let pivot_low = bars[pivot].low;

        bars[pivot + 1..]
            .iter()
            .any(|b| b.high > prior_high && b.low > pivot_low)
    }

    fn volume_confirmed(&self, bars: &[PriceBar]) -> bool {
        let Some(latest) = bars.last() else {
            return false;
        };
        let volumes: Vec<f64> = bars.iter().map(|b| b.volume as f64).collect();
        match sma(&volumes, IndicatorEngine::VOLUME_WINDOW) {
            Some(avg) if avg > 0.0 => latest.volume as f64 >= self.volume_multiplier * avg,
            _ => false,
        }
    }
}
