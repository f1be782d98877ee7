use crate::consts::{DEFAULT_MAX_SAMPLING_ATTEMPTS, FLOAT_COMPARISON_EPSILON};
use rand::distributions::Open01;
use rand::Rng;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SamplingError {
    #[error("Cannot sample a weight vector with zero assets.")]
    ZeroDimension,
    #[error("Maximum weight must lie in (0, 1], got {0}.")]
    InvalidCap(f64),
    #[error("No {k}-asset weight vector can satisfy a cap of {max_weight_pct}.")]
    InfeasibleCap { k: usize, max_weight_pct: f64 },
    #[error("Weight sampling exhausted its budget of {attempts} attempts.")]
    Exhausted { attempts: usize },
    #[error("Weight sampling needs a budget of at least one attempt.")]
    NoAttempts,
}

/// Draws long-only weight vectors uniformly from the capped simplex.
///
/// Each attempt draws `k` unit-exponential values `-ln(u)`, normalizes them
/// (a flat Dirichlet draw) and rejects the whole vector if any weight exceeds
/// the cap. Attempts are bounded by `max_attempts`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightSampler {
    max_weight_pct: f64,
    max_attempts: usize,
}

impl WeightSampler {
    pub fn new(max_weight_pct: f64, max_attempts: usize) -> Result<Self, SamplingError> {
        if !(max_weight_pct > 0. && max_weight_pct <= 1.) {
            return Err(SamplingError::InvalidCap(max_weight_pct));
        }
        if max_attempts == 0 {
            return Err(SamplingError::NoAttempts);
        }
        Ok(WeightSampler {
            max_weight_pct,
            max_attempts,
        })
    }

    pub fn with_default_budget(max_weight_pct: f64) -> Result<Self, SamplingError> {
        Self::new(max_weight_pct, DEFAULT_MAX_SAMPLING_ATTEMPTS)
    }

    pub fn max_weight_pct(&self) -> f64 {
        self.max_weight_pct
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn sample<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> Result<Vec<f64>, SamplingError> {
        if k == 0 {
            return Err(SamplingError::ZeroDimension);
        }
        let capacity = self.max_weight_pct * k as f64;
        if capacity < 1. - FLOAT_COMPARISON_EPSILON {
            return Err(SamplingError::InfeasibleCap {
                k,
                max_weight_pct: self.max_weight_pct,
            });
        }
        // tightest feasible cap: equal weights are the only admissible point,
        // never above the cap even when it sits a rounding error below 1/k
        if capacity <= 1. + FLOAT_COMPARISON_EPSILON {
            return Ok(vec![(1. / k as f64).min(self.max_weight_pct); k]);
        }

        let mut weights = vec![0.; k];
        for _ in 0..self.max_attempts {
            weights
                .iter_mut()
                .for_each(|w| *w = -rng.sample::<f64, _>(Open01).ln());
            let magnitude = weights.iter().sum::<f64>();
            weights.iter_mut().for_each(|w| *w /= magnitude);

            if weights.iter().all(|&w| w <= self.max_weight_pct) {
                return Ok(weights);
            }
        }
        Err(SamplingError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}
