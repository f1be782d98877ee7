use crate::combination::{Combination, CombinationError};
use crate::consts::{DEFAULT_MAX_SAMPLING_ATTEMPTS, FLOAT_COMPARISON_EPSILON};
use crate::sampling::SamplingError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod coordinator;
pub mod optimizer;

pub use coordinator::{run, search, select_best, SearchControl};
pub use optimizer::{optimize, SimulationResult, TrialStats};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("All {failed} of {attempted} combinations failed.")]
    AllCombosFailed { attempted: usize, failed: usize },
    #[error("Search stopped after {evaluated} evaluated combinations, none of which succeeded.")]
    Cancelled { evaluated: usize },
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl From<CombinationError> for SearchError {
    fn from(error: CombinationError) -> Self {
        SearchError::InvalidConfiguration(error.to_string())
    }
}

impl From<SamplingError> for SearchError {
    fn from(error: SamplingError) -> Self {
        SearchError::InvalidConfiguration(error.to_string())
    }
}

/// Why a single combination produced no result. Recorded, never fatal.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComboFailure {
    #[error(
        "No usable trial out of {trials} ({sampling_failures} sampling failures, {nan_trials} undefined Sharpe ratios)."
    )]
    NumericalDegeneracy {
        trials: usize,
        sampling_failures: usize,
        nan_trials: usize,
    },
    #[error("Invalid combination: {reason}")]
    InvalidCombination { reason: String },
}

fn default_parallelism() -> usize {
    num_cpus::get()
}

fn default_max_sampling_attempts() -> usize {
    DEFAULT_MAX_SAMPLING_ATTEMPTS
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub combo_size: usize,
    pub sims_per_combo: usize,
    pub max_weight_pct: f64,
    pub risk_free_rate: f64,
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    #[serde(default)]
    pub random_seed_base: Option<u64>,
    #[serde(default = "default_max_sampling_attempts")]
    pub max_sampling_attempts: usize,
    /// Overall wall-clock budget; once exceeded no new combination is started.
    #[serde(default)]
    pub time_limit_secs: Option<f64>,
}

impl RunConfig {
    pub fn new(
        combo_size: usize,
        sims_per_combo: usize,
        max_weight_pct: f64,
        risk_free_rate: f64,
    ) -> Self {
        RunConfig {
            combo_size,
            sims_per_combo,
            max_weight_pct,
            risk_free_rate,
            parallelism: default_parallelism(),
            random_seed_base: None,
            max_sampling_attempts: DEFAULT_MAX_SAMPLING_ATTEMPTS,
            time_limit_secs: None,
        }
    }

    /// Checks the configuration against a universe of `number_of_assets`.
    pub fn validate(&self, number_of_assets: usize) -> Result<(), SearchError> {
        let invalid = |message: String| Err(SearchError::InvalidConfiguration(message));

        if self.combo_size == 0 {
            return invalid("combo_size must be at least 1".into());
        }
        if self.combo_size > number_of_assets {
            return invalid(format!(
                "combo_size {} exceeds the {} available assets",
                self.combo_size, number_of_assets
            ));
        }
        if self.sims_per_combo == 0 {
            return invalid("sims_per_combo must be at least 1".into());
        }
        if !(self.max_weight_pct > 0. && self.max_weight_pct <= 1.) {
            return invalid(format!(
                "max_weight_pct must lie in (0, 1], got {}",
                self.max_weight_pct
            ));
        }
        if self.max_weight_pct * (self.combo_size as f64) < 1. - FLOAT_COMPARISON_EPSILON {
            return invalid(format!(
                "max_weight_pct {} is below 1/{} so no weight vector is feasible",
                self.max_weight_pct, self.combo_size
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return invalid("risk_free_rate must be finite".into());
        }
        if self.parallelism == 0 {
            return invalid("parallelism must be at least 1".into());
        }
        if self.max_sampling_attempts == 0 {
            return invalid("max_sampling_attempts must be at least 1".into());
        }
        self.time_limit()?;
        Ok(())
    }

    pub fn time_limit(&self) -> Result<Option<Duration>, SearchError> {
        match self.time_limit_secs {
            None => Ok(None),
            Some(secs) if secs > 0. => Duration::try_from_secs_f64(secs)
                .map(Some)
                .map_err(|e| SearchError::InvalidConfiguration(format!("time_limit_secs: {e}"))),
            Some(secs) => Err(SearchError::InvalidConfiguration(format!(
                "time_limit_secs must be positive, got {secs}"
            ))),
        }
    }
}

/// The best weights found for one combination.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ComboResult {
    pub combination: Combination,
    pub weights: Vec<f64>,
    pub sharpe: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub risk_free_rate: f64,
    pub stats: TrialStats,
}

/// What happened to the combination at `index` in enumeration order.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ComboOutcome {
    Completed {
        index: usize,
        result: ComboResult,
    },
    Failed {
        index: usize,
        combination: Combination,
        failure: ComboFailure,
    },
}

impl ComboOutcome {
    pub fn index(&self) -> usize {
        match self {
            ComboOutcome::Completed { index, .. }
            | ComboOutcome::Failed { index, .. } => *index,
        }
    }

    pub fn combination(&self) -> &Combination {
        match self {
            ComboOutcome::Completed { result, .. } => &result.combination,
            ComboOutcome::Failed { combination, .. } => combination,
        }
    }

    pub fn result(&self) -> Option<&ComboResult> {
        match self {
            ComboOutcome::Completed { result, .. } => Some(result),
            _ => None,
        }
    }
}

/// The winning combination of a search.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BestPortfolio {
    /// Position of the combination in enumeration order.
    pub index: usize,
    pub tickers: Vec<String>,
    #[serde(flatten)]
    pub result: ComboResult,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchSummary {
    pub completed: usize,
    pub failed: usize,
    /// Combinations never started because the search stopped early. `None`
    /// when the input did not report its exact length.
    pub skipped: Option<u64>,
    /// Whether cancellation or the deadline cut the search short.
    pub stopped_early: bool,
    /// Combination `i` was sampled with seed `seed_base + i`.
    pub seed_base: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SearchReport {
    pub best: BestPortfolio,
    pub summary: SearchSummary,
    /// One entry per evaluated combination, sorted by enumeration index.
    /// Combinations cut off by cancellation have no entry.
    pub outcomes: Vec<ComboOutcome>,
}
