//! Solver backends.
//!
//! Every backend minimizes the same [`ArapEnergy`] with the same local/global
//! alternation; they differ in how the linear system of each global step is solved:
//!
//! | Backend | Global step | Execution |
//! |---------|-------------|-----------|
//! | [`GenericNlsBackend`] | dense Cholesky, factored once | sequential |
//! | [`LevenbergMarquardtBackend`] | damped CSR system, Jacobi-PCG | sequential |
//! | [`GaussNewtonBackend`] | matrix-free block-Jacobi PCG | rayon |

mod gauss_newton;
mod generic;
mod levenberg_marquardt;

pub use gauss_newton::GaussNewtonBackend;
pub use generic::{GenericNlsBackend, GENERIC_MAX_VERTICES};
pub use levenberg_marquardt::LevenbergMarquardtBackend;

use nalgebra::Vector3;

use super::config::{BackendKind, SolverConfig};
use super::energy::ArapEnergy;
use super::scalar::Real;

/// How a backend run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// The energy fell below the absolute tolerance, stopped improving, or the damping
    /// schedule ran out.
    Converged,
    /// The alternation budget ran out first. The result is still the best iterate.
    MaxIterationsReached,
    /// The energy became non-finite. The result is the best iterate before that.
    Diverged,
}

/// Whether a backend can run on a given problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Availability {
    /// Ready to run.
    Available,
    /// Cannot run, with a human-readable reason.
    Unavailable(String),
}

impl Availability {
    /// Returns true if the backend can run.
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

/// Result of one backend run, in solver precision.
#[derive(Debug, Clone)]
pub struct BackendOutcome<T: Real> {
    /// Lowest-energy positions seen.
    pub positions: Vec<Vector3<T>>,
    /// How the run ended.
    pub status: SolveStatus,
    /// Outer alternations performed.
    pub alternations: usize,
    /// Inner linear iterations summed over all alternations.
    pub linear_iterations: usize,
    /// Energy at the initial positions.
    pub initial_energy: T,
    /// Energy at `positions`.
    pub final_energy: T,
}

/// A nonlinear least-squares solver for the ARAP energy.
pub trait SolverBackend<T: Real>: Send + Sync {
    /// Which backend this is.
    fn kind(&self) -> BackendKind;

    /// Whether this backend can solve `model` in this build.
    fn availability(&self, model: &ArapEnergy<'_, T>) -> Availability;

    /// Minimize `model` starting from `initial`.
    fn solve(
        &self,
        model: &ArapEnergy<'_, T>,
        initial: Vec<Vector3<T>>,
        config: &SolverConfig,
    ) -> BackendOutcome<T>;
}

impl BackendKind {
    /// Instantiate the backend for this kind.
    pub fn backend<T: Real>(self) -> Box<dyn SolverBackend<T>> {
        match self {
            BackendKind::GenericNls => Box::new(GenericNlsBackend),
            BackendKind::LevenbergMarquardt => Box::new(LevenbergMarquardtBackend),
            BackendKind::GaussNewton => Box::new(GaussNewtonBackend),
        }
    }
}
