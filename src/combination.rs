use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CombinationError {
    #[error("Cannot choose {k} elements out of {n}.")]
    KExceedsN { n: usize, k: usize },
    #[error("Combination indices must be strictly increasing, got {0:?}.")]
    NotStrictlyIncreasing(Vec<usize>),
}

/// A strictly increasing selection of indices into the asset universe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct Combination(Vec<usize>);

impl Combination {
    pub fn new(indices: Vec<usize>) -> Result<Self, CombinationError> {
        if indices.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(CombinationError::NotStrictlyIncreasing(indices));
        }
        Ok(Combination(indices))
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<Vec<usize>> for Combination {
    type Error = CombinationError;

    fn try_from(indices: Vec<usize>) -> Result<Self, Self::Error> {
        Combination::new(indices)
    }
}

impl From<Combination> for Vec<usize> {
    fn from(combination: Combination) -> Self {
        combination.0
    }
}

impl fmt::Display for Combination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Lazy lexicographic enumeration of every `k`-subset of `{0, .., n-1}`.
///
/// Only the current index vector is kept between calls to `next`, so the
/// working memory is O(k) no matter how many combinations are produced.
#[derive(Debug, Clone)]
pub struct Combinations {
    n: usize,
    k: usize,
    current: Vec<usize>,
    started: bool,
    exhausted: bool,
    /// Combinations not yet yielded, `None` when C(n, k) overflows a `u64`.
    remaining: Option<u64>,
}

impl Combinations {
    fn emit(&mut self) -> Option<Combination> {
        self.remaining = self.remaining.map(|left| left.saturating_sub(1));
        Some(Combination(self.current.clone()))
    }
}

impl Iterator for Combinations {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        if self.exhausted {
            return None;
        }
        if !self.started {
            self.started = true;
            return self.emit();
        }

        // rightmost position that can still be bumped
        let (n, k) = (self.n, self.k);
        let Some(pivot) = (0..k).rev().find(|&i| self.current[i] < n - k + i) else {
            self.exhausted = true;
            return None;
        };

        self.current[pivot] += 1;
        for j in (pivot + 1)..k {
            self.current[j] = self.current[j - 1] + 1;
        }
        self.emit()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.remaining.map(usize::try_from) {
            Some(Ok(left)) => (left, Some(left)),
            _ => (usize::MAX, None),
        }
    }
}

impl std::iter::FusedIterator for Combinations {}

/// Enumerates all `k`-index subsets of `{0, .., n-1}` in lexicographic order.
///
/// `k == 0` yields a single empty combination. `k > n` is rejected instead of
/// silently producing nothing.
pub fn generate(n: usize, k: usize) -> Result<Combinations, CombinationError> {
    if k > n {
        return Err(CombinationError::KExceedsN { n, k });
    }
    Ok(Combinations {
        n,
        k,
        current: (0..k).collect(),
        started: false,
        exhausted: false,
        remaining: combination_count(n, k),
    })
}

/// C(n, k), or `None` if it does not fit in a `u64`.
pub fn combination_count(n: usize, k: usize) -> Option<u64> {
    if k > n {
        return Some(0);
    }
    let k = k.min(n - k);
    let mut count: u128 = 1;
    for i in 0..k {
        // exact at every step: count * (n - i) is divisible by (i + 1)
        count = count.checked_mul((n - i) as u128)? / (i as u128 + 1);
    }
    u64::try_from(count).ok()
}
