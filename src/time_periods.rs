// ⏰ Time Periods - the baseline anchor of every ramp
//
// Periods before the baseline are never transformed. The ramp vector is
// indexed by offset from the baseline over the periods the table actually has.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Baseline period accessor
pub trait BaselinePeriod {
    fn baseline_period(&self) -> i64;
}

impl BaselinePeriod for i64 {
    fn baseline_period(&self) -> i64 {
        *self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriods {
    pub baseline: i64,
}

impl TimePeriods {
    pub fn new(baseline: i64) -> Self {
        TimePeriods { baseline }
    }

    /// Distinct periods at or after the baseline, ascending
    pub fn periods_from_baseline(&self, periods: &[i64]) -> Vec<i64> {
        periods
            .iter()
            .copied()
            .filter(|t| *t >= self.baseline)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_transformable(&self, period: i64) -> bool {
        period >= self.baseline
    }
}

impl Default for TimePeriods {
    fn default() -> Self {
        TimePeriods::new(0)
    }
}

impl BaselinePeriod for TimePeriods {
    fn baseline_period(&self) -> i64 {
        self.baseline
    }
}
