// 📈 Ramp Vector - how fully a transformation is phased in, per period
//
// Index 0 is the baseline period. Values are finite, in [0, 1] and
// non-decreasing.

use crate::error::{Result, TransformError};
use serde::{Deserialize, Serialize};

// ============================================================================
// RAMP CONFIG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampShape {
    Linear,
    Logistic,
}

/// Default ramp used when the caller does not pass one explicitly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RampConfig {
    #[serde(default = "default_shape")]
    pub shape: RampShape,

    /// Periods after the baseline before the ramp starts rising
    #[serde(default)]
    pub start_offset: usize,

    /// Periods the linear ramp takes to go from 0 to 1
    #[serde(default = "default_n_periods_ramp")]
    pub n_periods_ramp: usize,

    /// Steepness of the logistic ramp
    #[serde(default = "default_logistic_alpha")]
    pub logistic_alpha: f64,
}

fn default_shape() -> RampShape {
    RampShape::Linear
}

fn default_n_periods_ramp() -> usize {
    10
}

fn default_logistic_alpha() -> f64 {
    1.0
}

impl Default for RampConfig {
    fn default() -> Self {
        RampConfig {
            shape: default_shape(),
            start_offset: 0,
            n_periods_ramp: default_n_periods_ramp(),
            logistic_alpha: default_logistic_alpha(),
        }
    }
}

// ============================================================================
// GENERIC RAMP
// ============================================================================

/// `(a*n + b*x) / (n * (1 + c^(d - x)))`, `d` defaults to `n / 2`.
///
/// - linear:  a = 0, b = 2, c = 1
/// - sigmoid: a = 1, b = 0, c = e
pub fn ramp_generic(x: f64, n: f64, a: f64, b: f64, c: f64, d: Option<f64>) -> f64 {
    let d = d.unwrap_or(n / 2.0);
    (a * n + b * x) / (n * (1.0 + c.powf(d - x)))
}

// ============================================================================
// RAMP VECTOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct RampVector(Vec<f64>);

impl RampVector {
    /// Validate and wrap
    pub fn new(values: Vec<f64>) -> Result<Self> {
        for (i, v) in values.iter().enumerate() {
            if !v.is_finite() || *v < 0.0 || *v > 1.0 {
                return Err(TransformError::ramp(format!(
                    "value {} at offset {} is outside [0, 1]",
                    v, i
                )));
            }
        }

        if let Some(i) = values.windows(2).position(|w| w[1] < w[0]) {
            return Err(TransformError::ramp(format!(
                "decreasing between offsets {} and {}",
                i,
                i + 1
            )));
        }

        Ok(RampVector(values))
    }

    /// Zero for `start_offset` periods, then linear up to 1 over
    /// `n_periods_ramp` periods. `n_periods_ramp == 0` is a step.
    pub fn linear(n_periods: usize, start_offset: usize, n_periods_ramp: usize) -> Self {
        let values = (0..n_periods)
            .map(|i| {
                if i < start_offset {
                    0.0
                } else if n_periods_ramp == 0 {
                    1.0
                } else {
                    ((i - start_offset) as f64 / n_periods_ramp as f64).min(1.0)
                }
            })
            .collect();
        RampVector(values)
    }

    /// Logistic curve centred on the middle of the ramp window
    pub fn logistic(n_periods: usize, start_offset: usize, alpha: f64) -> Self {
        let window = n_periods.saturating_sub(start_offset);
        let c = alpha.exp();
        let mut values: Vec<f64> = (0..n_periods)
            .map(|i| {
                if i < start_offset || window == 0 {
                    0.0
                } else {
                    let x = (i - start_offset) as f64;
                    ramp_generic(x, window as f64, 1.0, 0.0, c, None).clamp(0.0, 1.0)
                }
            })
            .collect();

        // float noise must not break monotonicity
        for i in 1..values.len() {
            if values[i] < values[i - 1] {
                values[i] = values[i - 1];
            }
        }
        RampVector(values)
    }

    pub fn from_config(config: &RampConfig, n_periods: usize) -> Self {
        match config.shape {
            RampShape::Linear => {
                RampVector::linear(n_periods, config.start_offset, config.n_periods_ramp)
            }
            RampShape::Logistic => {
                RampVector::logistic(n_periods, config.start_offset, config.logistic_alpha)
            }
        }
    }

    /// Ramp value `offset` periods after the baseline
    pub fn at(&self, offset: usize) -> Option<f64> {
        self.0.get(offset).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }
}

impl TryFrom<Vec<f64>> for RampVector {
    type Error = TransformError;

    fn try_from(values: Vec<f64>) -> Result<Self> {
        RampVector::new(values)
    }
}

impl From<RampVector> for Vec<f64> {
    fn from(ramp: RampVector) -> Self {
        ramp.0
    }
}
