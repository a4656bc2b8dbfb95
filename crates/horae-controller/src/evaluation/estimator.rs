//! Day-of-week / hour-of-day usage estimator
//!
//! Holds 48 decaying histograms: slots 0-23 for weekday hours, 24-47 for
//! weekend hours. Empty histograms are legal and skipped downstream.

use super::histogram::DecayingHistogram;
use chrono::{DateTime, Utc};
use horae_common::HoraeError;

/// Weekday slots 0-23 plus weekend slots 24-47
pub const NUM_SLOTS: usize = 48;

#[derive(Debug, Clone)]
pub struct HourEstimator {
    /// Slot index, 0 based
    pub hour: usize,
    pub is_weekday: bool,
    pub histogram: DecayingHistogram,
}

#[derive(Debug, Clone)]
pub struct DateTimeEstimator {
    pub histograms: Vec<HourEstimator>,
}

impl Default for DateTimeEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl DateTimeEstimator {
    pub fn new() -> Self {
        let histograms = (0..NUM_SLOTS)
            .map(|i| HourEstimator {
                hour: i,
                is_weekday: i < NUM_SLOTS / 2,
                histogram: DecayingHistogram::new(),
            })
            .collect();
        Self { histograms }
    }

    /// Add a sample at the given slot. A slot past the weekend block means
    /// the caller folded a series spanning more than a day; surfaced as an
    /// error rather than a panic.
    pub fn add_sample(
        &mut self,
        slot: usize,
        value: f64,
        weight: f64,
        t: DateTime<Utc>,
    ) -> Result<(), HoraeError> {
        let estimator = self.histograms.get_mut(slot).ok_or_else(|| {
            HoraeError::HistogramError(format!("hour slot {} out of range", slot))
        })?;
        estimator.histogram.add_sample(value, weight, t);
        Ok(())
    }

    /// Whether the observed footprint densely covers at least one day type:
    /// true when the weekday block or the weekend block has no empty
    /// histogram.
    pub fn is_long_running(&self) -> bool {
        let half = NUM_SLOTS / 2;
        let weekdays_have_empty = self.histograms[..half]
            .iter()
            .any(|h| h.histogram.is_empty());
        let weekends_have_empty = self.histograms[half..]
            .iter()
            .any(|h| h.histogram.is_empty());
        !(weekdays_have_empty && weekends_have_empty)
    }
}
