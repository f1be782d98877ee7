use super::optimizer::optimize;
use super::{
    BestPortfolio, ComboFailure, ComboOutcome, ComboResult, RunConfig, SearchError, SearchReport,
    SearchSummary,
};
use crate::combination::{combination_count, generate, Combination};
use crate::consts::PROGRESS_LOG_INTERVAL;
use crate::sampling::WeightSampler;
use crate::universe::AssetUniverse;
use rand::rngs::OsRng;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative stop signal shared between a caller and a running search.
///
/// Once cancelled, or once the deadline has passed, no new combination is
/// started. Combinations already evaluated are kept in the report.
#[derive(Debug, Clone, Default)]
pub struct SearchControl {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl SearchControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps the earlier of `deadline` and any deadline already set.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(self.deadline.map_or(deadline, |current| current.min(deadline)));
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }

    pub fn should_stop(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Enumerates every `combo_size`-subset of the universe and searches them all.
pub fn run(
    universe: &AssetUniverse,
    config: &RunConfig,
    control: &SearchControl,
) -> Result<SearchReport, SearchError> {
    config.validate(universe.len())?;
    let combinations = generate(universe.len(), config.combo_size)?;
    match combination_count(universe.len(), config.combo_size) {
        Some(total) => info!("Enumerating {} combinations of {} assets.", total, universe.len()),
        None => warn!("Combination count overflows u64, the search will not finish in practice."),
    }
    search(universe, combinations, config, control)
}

/// Optimizes every combination on a pool of `config.parallelism` workers and
/// reduces the outcomes to the single best portfolio.
///
/// Combination `i` (in iteration order) gets its own generator seeded with
/// `seed_base + i`, so the result does not depend on scheduling. Failed
/// combinations are recorded and skipped; only a search in which nothing
/// succeeded is an error. Once `control` or the configured time limit says
/// stop, no further combination is pulled from `combinations`.
pub fn search<I>(
    universe: &AssetUniverse,
    combinations: I,
    config: &RunConfig,
    control: &SearchControl,
) -> Result<SearchReport, SearchError>
where
    I: IntoIterator<Item = Combination>,
    I::IntoIter: Send,
{
    config.validate(universe.len())?;
    let sampler = WeightSampler::new(config.max_weight_pct, config.max_sampling_attempts)?;
    let seed_base = config
        .random_seed_base
        .unwrap_or_else(|| OsRng.next_u64());
    let control = match config.time_limit()? {
        Some(limit) => control.clone().with_timeout(limit),
        None => control.clone(),
    };
    let pool = ThreadPoolBuilder::new()
        .num_threads(config.parallelism)
        .build()?;

    info!(
        assets = universe.len(),
        combo_size = config.combo_size,
        sims_per_combo = config.sims_per_combo,
        parallelism = config.parallelism,
        seed_base,
        "Starting combination search."
    );

    let evaluated = AtomicUsize::new(0);
    let stopped = AtomicBool::new(false);
    let combinations = combinations.into_iter();
    let total = match combinations.size_hint() {
        (lower, Some(upper)) if lower == upper => u64::try_from(upper).ok(),
        _ => None,
    };
    let mut outcomes: Vec<ComboOutcome> = pool.install(|| {
        combinations
            .enumerate()
            // stop pulling from the source as soon as the search is told to stop
            .take_while(|_| {
                let stop = control.should_stop();
                if stop {
                    stopped.store(true, AtomicOrdering::Relaxed);
                }
                !stop
            })
            .par_bridge()
            .map(|(index, combination)| {
                let outcome =
                    evaluate_combination(universe, index, combination, config, &sampler, seed_base);
                let done = evaluated.fetch_add(1, AtomicOrdering::Relaxed) + 1;
                if done % PROGRESS_LOG_INTERVAL == 0 {
                    info!("{} combinations evaluated.", done);
                }
                outcome
            })
            .collect()
    });
    outcomes.sort_unstable_by_key(ComboOutcome::index);

    let summary = summarize(&outcomes, seed_base, total, stopped.into_inner());
    if summary.stopped_early {
        match summary.skipped {
            Some(skipped) => warn!("Search stopped early: {} combinations never started.", skipped),
            None => warn!("Search stopped early."),
        }
    }

    let Some((index, result)) = select_best(&outcomes) else {
        return Err(if summary.stopped_early {
            SearchError::Cancelled {
                evaluated: summary.completed + summary.failed,
            }
        } else {
            SearchError::AllCombosFailed {
                attempted: outcomes.len(),
                failed: summary.failed,
            }
        });
    };
    let best = BestPortfolio {
        index,
        tickers: universe.tickers_for(&result.combination),
        result: result.clone(),
    };

    info!(
        completed = summary.completed,
        failed = summary.failed,
        skipped = ?summary.skipped,
        "Best combination {:?} with Sharpe ratio {:.4}.",
        best.tickers,
        best.result.sharpe
    );

    Ok(SearchReport {
        best,
        summary,
        outcomes,
    })
}

/// Picks the completed outcome with the highest Sharpe ratio, preferring the
/// lower enumeration index on ties. NaN scores never win.
///
/// The comparison is a total order on `(sharpe, index)`, so the parallel
/// reduction gives the same answer whatever order the outcomes arrive in.
pub fn select_best(outcomes: &[ComboOutcome]) -> Option<(usize, &ComboResult)> {
    outcomes
        .par_iter()
        .filter_map(|outcome| match outcome {
            ComboOutcome::Completed { index, result } if !result.sharpe.is_nan() => {
                Some((*index, result))
            }
            _ => None,
        })
        .reduce_with(better_of)
}

fn better_of<'a>(
    a: (usize, &'a ComboResult),
    b: (usize, &'a ComboResult),
) -> (usize, &'a ComboResult) {
    match a.1.sharpe.partial_cmp(&b.1.sharpe) {
        Some(Ordering::Greater) => a,
        Some(Ordering::Less) => b,
        _ if a.0 <= b.0 => a,
        _ => b,
    }
}

fn evaluate_combination(
    universe: &AssetUniverse,
    index: usize,
    combination: Combination,
    config: &RunConfig,
    sampler: &WeightSampler,
    seed_base: u64,
) -> ComboOutcome {
    let failed = |combination: Combination, failure: ComboFailure| {
        warn!("Combination {} skipped: {}", combination, failure);
        ComboOutcome::Failed {
            index,
            combination,
            failure,
        }
    };

    if combination.len() != config.combo_size {
        let reason = format!(
            "expected {} assets, got {}",
            config.combo_size,
            combination.len()
        );
        return failed(combination, ComboFailure::InvalidCombination { reason });
    }
    let (mu, cov) = match universe.slice(&combination) {
        Ok(slices) => slices,
        Err(error) => {
            let reason = error.to_string();
            return failed(combination, ComboFailure::InvalidCombination { reason });
        }
    };

    let mut rng = ChaCha20Rng::seed_from_u64(seed_base.wrapping_add(index as u64));
    match optimize(
        &mu,
        &cov,
        config.risk_free_rate,
        config.sims_per_combo,
        sampler,
        &mut rng,
    ) {
        Ok((best, stats)) => {
            if stats.clamped_trials > 0 {
                debug!(
                    "Combination {}: variance clamped to zero in {} of {} trials.",
                    combination, stats.clamped_trials, stats.trials
                );
            }
            ComboOutcome::Completed {
                index,
                result: ComboResult {
                    combination,
                    sharpe: best.sharpe(),
                    annualized_return: best.performance.annualized_return,
                    annualized_volatility: best.performance.annualized_volatility,
                    weights: best.weights,
                    risk_free_rate: config.risk_free_rate,
                    stats,
                },
            }
        }
        Err(failure) => failed(combination, failure),
    }
}

fn summarize(
    outcomes: &[ComboOutcome],
    seed_base: u64,
    total: Option<u64>,
    stopped_early: bool,
) -> SearchSummary {
    let completed = outcomes.iter().filter(|o| o.result().is_some()).count();
    let skipped = if stopped_early {
        total.map(|total| total.saturating_sub(outcomes.len() as u64))
    } else {
        Some(0)
    };
    SearchSummary {
        completed,
        failed: outcomes.len() - completed,
        skipped,
        stopped_early,
        seed_base,
    }
}
