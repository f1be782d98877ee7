/// Trading days used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.;

pub const FLOAT_COMPARISON_EPSILON: f64 = 1e-12;

/// A weight vector is considered normalized when its sum is within this of 1.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// Retry budget for a single rejection-sampled weight draw.
pub const DEFAULT_MAX_SAMPLING_ATTEMPTS: usize = 10_000;

/// Relative tolerance used when checking covariance symmetry.
pub const SYMMETRY_TOLERANCE: f64 = 1e-9;

/// Log a progress line every this many evaluated combinations.
pub const PROGRESS_LOG_INTERVAL: usize = 10_000;
