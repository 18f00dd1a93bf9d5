//! Per-vertex execution strategy.
//!
//! Every per-vertex loop in the energy and the solvers writes only its own output
//! slot, so it can run on the rayon pool. Without the `parallel` feature,
//! [`Execution::Parallel`] quietly runs sequentially.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use super::scalar::Real;

/// How per-vertex loops are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// Plain iterators on the calling thread.
    Sequential,
    /// Rayon parallel iterators.
    Parallel,
}

impl Execution {
    /// Whether this build can actually run [`Execution::Parallel`] in parallel.
    pub const fn parallel_supported() -> bool {
        cfg!(feature = "parallel")
    }

    /// Evaluate `f` for every index in `0..n` and collect in index order.
    pub(crate) fn map<R, F>(self, n: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Send + Sync,
    {
        match self {
            #[cfg(feature = "parallel")]
            Execution::Parallel => (0..n).into_par_iter().map(f).collect(),
            _ => (0..n).map(f).collect(),
        }
    }

    /// Sum `f` over `0..n`.
    pub(crate) fn sum<T, F>(self, n: usize, f: F) -> T
    where
        T: Real,
        F: Fn(usize) -> T + Send + Sync,
    {
        match self {
            #[cfg(feature = "parallel")]
            Execution::Parallel => (0..n)
                .into_par_iter()
                .map(f)
                .reduce(T::zero, |a, b| a + b),
            _ => (0..n).map(f).fold(T::zero(), |a, b| a + b),
        }
    }
}
