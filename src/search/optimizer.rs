use super::ComboFailure;
use crate::portfolio::{compute_portfolio_performance, PortfolioPerformance};
use crate::sampling::WeightSampler;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// A sampled weight vector and how it scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub weights: Vec<f64>,
    pub performance: PortfolioPerformance,
}

impl SimulationResult {
    pub fn sharpe(&self) -> f64 {
        self.performance.sharpe_ratio
    }
}

/// Bookkeeping for the trials of a single combination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStats {
    pub trials: usize,
    pub sampling_failures: usize,
    pub nan_trials: usize,
    pub clamped_trials: usize,
}

/// Monte Carlo search for the Sharpe-maximizing weights of one combination.
///
/// Runs `simulations` trials, each drawing a capped weight vector and scoring
/// it against the combination's `mu` and `cov` slices. The first trial reaching
/// the maximum wins, so a fixed seed always picks the same weights.
///
/// Trials whose sampling exhausts its budget or whose Sharpe ratio is undefined
/// are counted and skipped. If none is left the combination is degenerate.
pub fn optimize<R: Rng + ?Sized>(
    mu: &DVector<f64>,
    cov: &DMatrix<f64>,
    risk_free_rate: f64,
    simulations: usize,
    sampler: &WeightSampler,
    rng: &mut R,
) -> Result<(SimulationResult, TrialStats), ComboFailure> {
    let number_of_assets = mu.len();
    let mut stats = TrialStats {
        trials: simulations,
        ..TrialStats::default()
    };
    let mut best: Option<SimulationResult> = None;

    for _ in 0..simulations {
        let weights = match sampler.sample(number_of_assets, rng) {
            Ok(weights) => weights,
            Err(_) => {
                stats.sampling_failures += 1;
                continue;
            }
        };

        let performance = compute_portfolio_performance(mu, cov, &weights, risk_free_rate);
        if performance.variance_clamped {
            stats.clamped_trials += 1;
        }
        if performance.sharpe_ratio.is_nan() {
            stats.nan_trials += 1;
            continue;
        }

        // strict comparison keeps the earliest maximum
        let improves = best
            .as_ref()
            .map_or(true, |current| performance.sharpe_ratio > current.sharpe());
        if improves {
            best = Some(SimulationResult {
                weights,
                performance,
            });
        }
    }

    match best {
        Some(best) => Ok((best, stats)),
        None => Err(ComboFailure::NumericalDegeneracy {
            trials: stats.trials,
            sampling_failures: stats.sampling_failures,
            nan_trials: stats.nan_trials,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn three_asset_moments() -> (DVector<f64>, DMatrix<f64>) {
        let mu = DVector::from_vec(vec![0.0012, 0.0008, 0.0003]);
        let cov = DMatrix::from_row_slice(
            3,
            3,
            &[2e-4, 3e-5, 1e-5, 3e-5, 1e-4, 2e-5, 1e-5, 2e-5, 5e-5],
        );
        (mu, cov)
    }

    #[test]
    fn test_optimize_returns_maximum_of_trials() {
        let (mu, cov) = three_asset_moments();
        let sampler = WeightSampler::with_default_budget(0.6).unwrap();

        let mut rng = ChaCha20Rng::seed_from_u64(11);
        let (best, stats) = optimize(&mu, &cov, 0.01, 250, &sampler, &mut rng).unwrap();
        assert_eq!(stats.trials, 250);
        assert_eq!(stats.sampling_failures + stats.nan_trials, 0);

        // replay the same trials and take the naive maximum
        let mut replay = ChaCha20Rng::seed_from_u64(11);
        let naive_best = (0..250)
            .map(|_| {
                let weights = sampler.sample(3, &mut replay).unwrap();
                compute_portfolio_performance(&mu, &cov, &weights, 0.01).sharpe_ratio
            })
            .fold(f64::NEG_INFINITY, f64::max);

        assert_eq!(best.sharpe(), naive_best, "Optimizer must keep the best trial");
        assert!(best.weights.iter().all(|&w| w <= 0.6));
        assert!((best.weights.iter().sum::<f64>() - 1.).abs() < 1e-9);
    }

    #[test]
    fn test_optimize_keeps_first_of_equal_scores() {
        // perfectly correlated identical assets: every weight vector scores the same
        let mu = DVector::from_vec(vec![0.001; 3]);
        let cov = DMatrix::from_element(3, 3, 1e-4);
        let sampler = WeightSampler::with_default_budget(0.9).unwrap();

        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let (best, _) = optimize(&mu, &cov, 0., 50, &sampler, &mut rng).unwrap();

        // scores only differ by rounding, so locate the earliest exact maximum
        let mut replay = ChaCha20Rng::seed_from_u64(5);
        let trials: Vec<Vec<f64>> = (0..50)
            .map(|_| sampler.sample(3, &mut replay).unwrap())
            .collect();
        let sharpes: Vec<f64> = trials
            .iter()
            .map(|w| compute_portfolio_performance(&mu, &cov, w, 0.).sharpe_ratio)
            .collect();
        let max = sharpes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let first_max = sharpes.iter().position(|&s| s == max).unwrap();

        assert_eq!(best.weights, trials[first_max], "Earliest maximal trial must win");
    }

    #[test]
    fn test_optimize_zero_covariance_is_degenerate() {
        let mu = DVector::from_vec(vec![0.001, 0.002]);
        let cov = DMatrix::zeros(2, 2);
        let sampler = WeightSampler::with_default_budget(0.8).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(3);

        assert_eq!(
            optimize(&mu, &cov, 0., 20, &sampler, &mut rng),
            Err(ComboFailure::NumericalDegeneracy {
                trials: 20,
                sampling_failures: 0,
                nan_trials: 20,
            })
        );
    }

    #[test]
    fn test_optimize_exhausted_sampling_is_degenerate() {
        let mu = DVector::from_vec(vec![0.001; 10]);
        let cov = DMatrix::identity(10, 10) * 1e-4;
        let sampler = WeightSampler::new(0.1 + 1e-6, 2).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(3);

        assert_eq!(
            optimize(&mu, &cov, 0., 4, &sampler, &mut rng),
            Err(ComboFailure::NumericalDegeneracy {
                trials: 4,
                sampling_failures: 4,
                nan_trials: 0,
            })
        );
    }

    #[test]
    fn test_optimize_counts_clamped_variance() {
        let mu = DVector::from_vec(vec![0.001, 0.001]);
        let cov = DMatrix::from_row_slice(2, 2, &[1e-4, -2e-4, -2e-4, 1e-4]);
        let sampler = WeightSampler::with_default_budget(1.).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(8);

        match optimize(&mu, &cov, 0., 100, &sampler, &mut rng) {
            Ok((_, stats)) => {
                assert!(stats.clamped_trials > 0, "Expected some clamped trials");
                assert_eq!(stats.clamped_trials, stats.nan_trials);
            }
            Err(ComboFailure::NumericalDegeneracy { nan_trials, .. }) => {
                assert_eq!(nan_trials, 100)
            }
            Err(other) => panic!("Unexpected failure {other:?}"),
        }
    }
}
