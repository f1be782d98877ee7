use crate::combination::Combination;
use crate::consts::SYMMETRY_TOLERANCE;
use itertools::Itertools;
use nalgebra::{DMatrix, DVector};
use statrs::statistics::Statistics;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum UniverseError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
    #[error("Non-finite value found in {0}.")]
    NonFinite(&'static str),
    #[error("Covariance matrix is not symmetric at ({row}, {col}).")]
    NotSymmetric { row: usize, col: usize },
    #[error("At least {required} price rows are needed, got {found}.")]
    NotEnoughPrices { required: usize, found: usize },
    #[error("Price for asset {asset} on row {row} must be strictly positive.")]
    NonPositivePrice { asset: usize, row: usize },
    #[error("Index {index} is out of range for a universe of {len} assets.")]
    IndexOutOfRange { index: usize, len: usize },
}

/// The assets a search chooses from, with their daily mean returns and
/// covariance. Validated once at construction and read-only afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetUniverse {
    tickers: Vec<String>,
    mu: DVector<f64>,
    cov: DMatrix<f64>,
}

impl AssetUniverse {
    pub fn new(
        tickers: Vec<String>,
        mu: Vec<f64>,
        cov: Vec<Vec<f64>>,
    ) -> Result<Self, UniverseError> {
        let n = mu.len();
        if cov.len() != n || cov.iter().any(|row| row.len() != n) {
            return Err(UniverseError::DimensionMismatch(format!(
                "covariance must be {n}x{n} to match {n} mean returns"
            )));
        }
        let cov = DMatrix::from_fn(n, n, |i, j| cov[i][j]);
        Self::from_parts(tickers, DVector::from_vec(mu), cov)
    }

    pub fn from_parts(
        tickers: Vec<String>,
        mu: DVector<f64>,
        cov: DMatrix<f64>,
    ) -> Result<Self, UniverseError> {
        let n = mu.len();
        if tickers.len() != n {
            return Err(UniverseError::DimensionMismatch(format!(
                "{} tickers for {} mean returns",
                tickers.len(),
                n
            )));
        }
        if cov.nrows() != n || cov.ncols() != n {
            return Err(UniverseError::DimensionMismatch(format!(
                "covariance is {}x{}, expected {n}x{n}",
                cov.nrows(),
                cov.ncols()
            )));
        }
        if mu.iter().any(|m| !m.is_finite()) {
            return Err(UniverseError::NonFinite("mean returns"));
        }
        if cov.iter().any(|c| !c.is_finite()) {
            return Err(UniverseError::NonFinite("covariance matrix"));
        }
        for row in 0..n {
            for col in (row + 1)..n {
                let (a, b) = (cov[(row, col)], cov[(col, row)]);
                if (a - b).abs() > SYMMETRY_TOLERANCE * a.abs().max(b.abs()).max(1.) {
                    return Err(UniverseError::NotSymmetric { row, col });
                }
            }
        }
        Ok(AssetUniverse { tickers, mu, cov })
    }

    /// Builds the universe from daily closing prices.
    ///
    /// `closes` is date-major: `closes[t][i]` is the close of asset `i` on day `t`.
    /// Returns are simple daily returns, the covariance is the sample covariance.
    pub fn from_price_history(
        tickers: Vec<String>,
        closes: &[Vec<f64>],
    ) -> Result<Self, UniverseError> {
        let n = tickers.len();
        if closes.len() < 3 {
            return Err(UniverseError::NotEnoughPrices {
                required: 3,
                found: closes.len(),
            });
        }
        for (row, prices) in closes.iter().enumerate() {
            if prices.len() != n {
                return Err(UniverseError::DimensionMismatch(format!(
                    "price row {row} has {} values for {n} tickers",
                    prices.len()
                )));
            }
            if prices.iter().any(|p| !p.is_finite()) {
                return Err(UniverseError::NonFinite("prices"));
            }
            if let Some(asset) = prices.iter().position(|&p| p <= 0.) {
                return Err(UniverseError::NonPositivePrice { asset, row });
            }
        }

        // asset-major daily returns
        let returns: Vec<Vec<f64>> = (0..n)
            .map(|asset| {
                closes
                    .iter()
                    .tuple_windows()
                    .map(|(previous, next)| next[asset] / previous[asset] - 1.)
                    .collect()
            })
            .collect();

        let mu = DVector::from_iterator(n, returns.iter().map(|series| series.iter().mean()));
        let cov = DMatrix::from_fn(n, n, |i, j| {
            if i <= j {
                returns[i].iter().covariance(returns[j].iter())
            } else {
                returns[j].iter().covariance(returns[i].iter())
            }
        });
        Self::from_parts(tickers, mu, cov)
    }

    pub fn len(&self) -> usize {
        self.mu.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mu.is_empty()
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn mu(&self) -> &DVector<f64> {
        &self.mu
    }

    pub fn cov(&self) -> &DMatrix<f64> {
        &self.cov
    }

    /// Gathers the mean vector and covariance block of the combination's assets.
    pub fn slice(
        &self,
        combination: &Combination,
    ) -> Result<(DVector<f64>, DMatrix<f64>), UniverseError> {
        let indices = combination.indices();
        if let Some(&index) = indices.iter().find(|&&index| index >= self.len()) {
            return Err(UniverseError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        let k = indices.len();
        let mu = DVector::from_fn(k, |i, _| self.mu[indices[i]]);
        let cov = DMatrix::from_fn(k, k, |i, j| self.cov[(indices[i], indices[j])]);
        Ok((mu, cov))
    }

    pub fn tickers_for(&self, combination: &Combination) -> Vec<String> {
        combination
            .indices()
            .iter()
            .filter_map(|&index| self.tickers.get(index).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tickers(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("A{i}")).collect()
    }

    #[test]
    fn test_new_validates_dimensions() {
        let ok = AssetUniverse::new(
            tickers(2),
            vec![0.001, 0.002],
            vec![vec![1e-4, 2e-5], vec![2e-5, 3e-4]],
        );
        assert!(ok.is_ok());

        let bad_cov = AssetUniverse::new(tickers(2), vec![0.001, 0.002], vec![vec![1e-4, 0.]]);
        assert!(matches!(bad_cov, Err(UniverseError::DimensionMismatch(_))));

        let bad_tickers =
            AssetUniverse::new(tickers(3), vec![0.001, 0.002], vec![vec![1e-4, 0.], vec![0., 1e-4]]);
        assert!(matches!(bad_tickers, Err(UniverseError::DimensionMismatch(_))));
    }

    #[test]
    fn test_new_rejects_asymmetric_and_non_finite() {
        let asym = AssetUniverse::new(tickers(2), vec![0., 0.], vec![vec![1., 0.5], vec![0.4, 1.]]);
        assert_eq!(asym, Err(UniverseError::NotSymmetric { row: 0, col: 1 }));

        let nan = AssetUniverse::new(tickers(1), vec![f64::NAN], vec![vec![1.]]);
        assert_eq!(nan, Err(UniverseError::NonFinite("mean returns")));
    }

    #[test]
    fn test_slice_gathers_rows_and_columns() {
        let cov: Vec<Vec<f64>> = (0..4)
            .map(|i| (0..4).map(|j| (10 * i.min(j) + i.max(j)) as f64).collect())
            .collect();
        let universe =
            AssetUniverse::new(tickers(4), vec![0.1, 0.2, 0.3, 0.4], cov.clone()).unwrap();
        let combination = Combination::new(vec![1, 3]).unwrap();
        let (mu, sub_cov) = universe.slice(&combination).unwrap();

        assert_eq!(mu.as_slice(), &[0.2, 0.4]);
        assert_eq!(sub_cov[(0, 0)], cov[1][1]);
        assert_eq!(sub_cov[(0, 1)], cov[1][3]);
        assert_eq!(sub_cov[(1, 0)], cov[3][1]);
        assert_eq!(sub_cov[(1, 1)], cov[3][3]);
        assert_eq!(universe.tickers_for(&combination), vec!["A1", "A3"]);

        let out_of_range = Combination::new(vec![2, 4]).unwrap();
        assert_eq!(
            universe.slice(&out_of_range),
            Err(UniverseError::IndexOutOfRange { index: 4, len: 4 })
        );
    }

    #[test]
    fn test_from_price_history() {
        let closes = vec![
            vec![100., 50.],
            vec![110., 50.],
            vec![99., 55.],
            vec![99., 49.5],
        ];
        let universe = AssetUniverse::from_price_history(tickers(2), &closes).unwrap();

        // asset 0 returns: 0.1, -0.1, 0.0
        assert!((universe.mu()[0] - 0.).abs() < 1e-12);
        assert!((universe.cov()[(0, 0)] - 0.01).abs() < 1e-12);
        // asset 1 returns: 0.0, 0.1, -0.1 -> covariance with asset 0 is -0.005
        assert!((universe.cov()[(0, 1)] + 0.005).abs() < 1e-12);
        assert_eq!(universe.cov()[(0, 1)], universe.cov()[(1, 0)]);
    }

    #[test]
    fn test_from_price_history_rejects_bad_prices() {
        let too_short = AssetUniverse::from_price_history(tickers(1), &[vec![1.], vec![2.]]);
        assert_eq!(
            too_short,
            Err(UniverseError::NotEnoughPrices {
                required: 3,
                found: 2
            })
        );

        let zero = AssetUniverse::from_price_history(tickers(1), &[vec![1.], vec![0.], vec![2.]]);
        assert_eq!(zero, Err(UniverseError::NonPositivePrice { asset: 0, row: 1 }));

        let ragged =
            AssetUniverse::from_price_history(tickers(2), &[vec![1., 1.], vec![1.], vec![1., 1.]]);
        assert!(matches!(ragged, Err(UniverseError::DimensionMismatch(_))));
    }
}
