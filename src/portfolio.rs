use crate::consts::TRADING_DAYS_PER_YEAR;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPerformance {
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    /// NaN when the volatility is zero.
    pub sharpe_ratio: f64,
    /// The quadratic form came out negative and was clamped to zero.
    pub variance_clamped: bool,
}

/// Excess annualized return per unit of annualized volatility.
///
/// Undefined (NaN) unless the volatility is strictly positive; callers
/// ranking portfolios must never let a NaN win.
pub fn sharpe_ratio(annualized_return: f64, annualized_volatility: f64, risk_free_rate: f64) -> f64 {
    if annualized_volatility > 0. {
        (annualized_return - risk_free_rate) / annualized_volatility
    } else {
        f64::NAN
    }
}

/// Scores a weight vector against daily mean returns and covariance.
pub fn compute_portfolio_performance(
    mu: &DVector<f64>,
    cov: &DMatrix<f64>,
    weights: &[f64],
    risk_free_rate: f64,
) -> PortfolioPerformance {
    debug_assert_eq!(mu.len(), weights.len());
    debug_assert_eq!(cov.nrows(), weights.len());

    let weights = DVector::from_column_slice(weights);
    let daily_return = mu.dot(&weights);
    let daily_variance = weights.dot(&(cov * &weights));

    // a PSD matrix can still give a slightly negative quadratic form in floating point
    let variance_clamped = daily_variance < 0.;
    let annualized_return = daily_return * TRADING_DAYS_PER_YEAR;
    let annualized_volatility = (daily_variance.max(0.) * TRADING_DAYS_PER_YEAR).sqrt();

    PortfolioPerformance {
        annualized_return,
        annualized_volatility,
        sharpe_ratio: sharpe_ratio(annualized_return, annualized_volatility, risk_free_rate),
        variance_clamped,
    }
}
