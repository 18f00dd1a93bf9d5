//! Levenberg-Marquardt backend.
//!
//! Assembles `JᵀJ` once as a CSR matrix and solves `(JᵀJ + λ diag(JᵀJ)) δ = -Jᵀr` per
//! coordinate with Jacobi-PCG. After each alternation the rotation-refitted energy
//! decides whether the step is kept: an accepted step shrinks λ towards plain
//! Gauss-Newton, a rejected one grows it towards gradient descent. A rejection with λ
//! already at its upper clamp ends the run.

use nalgebra::{DVector, Vector3};
use tracing::debug;

use crate::algo::deform::alternation::{solve_staged, GlobalSolve, GlobalStep, StepReview};
use crate::algo::deform::backend::{Availability, BackendOutcome, SolverBackend};
use crate::algo::deform::config::{BackendKind, DampingOptions, SolverConfig};
use crate::algo::deform::energy::{ArapEnergy, Linearization};
use crate::algo::deform::exec::Execution;
use crate::algo::deform::scalar::Real;
use crate::algo::deform::sparse::{preconditioned_cg, CsrMatrix};

/// Damped Gauss-Newton on an assembled sparse system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardtBackend;

impl<T: Real> SolverBackend<T> for LevenbergMarquardtBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LevenbergMarquardt
    }

    fn availability(&self, _model: &ArapEnergy<'_, T>) -> Availability {
        Availability::Available
    }

    fn solve(
        &self,
        model: &ArapEnergy<'_, T>,
        initial: Vec<Vector3<T>>,
        config: &SolverConfig,
    ) -> BackendOutcome<T> {
        let mut step = DampedStep::new(model.normal_matrix(), config);
        solve_staged(model, initial, config, Execution::Sequential, &mut step)
    }
}

struct DampedStep<T: Real> {
    normal: CsrMatrix<T>,
    options: DampingOptions,
    lambda: f64,
    max_iter: usize,
    tolerance: T,
}

impl<T: Real> DampedStep<T> {
    fn new(normal: CsrMatrix<T>, config: &SolverConfig) -> Self {
        Self {
            normal,
            options: config.damping,
            lambda: config.damping.initial,
            max_iter: config.linear_iter,
            tolerance: T::of(config.linear_tolerance),
        }
    }
}

impl<T: Real> GlobalSolve<T> for DampedStep<T> {
    fn step(&mut self, lin: &Linearization<'_, T>, positions: &[Vector3<T>]) -> GlobalStep<T> {
        let damped = self.normal.with_scaled_diagonal(T::of(self.lambda));
        let rhs = lin.rhs(positions);
        let n = positions.len();

        let mut next = positions.to_vec();
        let mut linear_iterations = 0;
        for axis in 0..3 {
            let b = DVector::from_fn(n, |i, _| rhs[i][axis]);
            let solve = preconditioned_cg(&damped, &b, None, self.max_iter, self.tolerance);
            linear_iterations += solve.iterations;
            for (p, d) in next.iter_mut().zip(solve.solution.iter()) {
                p[axis] += *d;
            }
        }

        GlobalStep {
            positions: next,
            linear_iterations,
        }
    }

    fn review(&mut self, current: T, proposed: T) -> StepReview {
        if proposed.is_finite() && proposed <= current {
            self.lambda = (self.lambda / self.options.decrease_factor).max(self.options.min);
            debug!(lambda = self.lambda, "step accepted");
            StepReview::Accept
        } else if self.lambda >= self.options.max {
            debug!(lambda = self.lambda, "step rejected at maximum damping");
            StepReview::Stall
        } else {
            self.lambda = (self.lambda * self.options.increase_factor).min(self.options.max);
            debug!(lambda = self.lambda, "step rejected");
            StepReview::Reject
        }
    }

    fn restart(&mut self) {
        self.lambda = self.options.initial;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::deform::backend::SolveStatus;
    use crate::algo::deform::fixtures::{grid, lifted_corner};

    fn damped_step(config: &SolverConfig) -> DampedStep<f64> {
        DampedStep::new(CsrMatrix::from_triplets(1, 1, vec![(0, 0, 1.0)]), config)
    }

    #[test]
    fn test_damping_schedule() {
        let config = SolverConfig::default();
        let mut step = damped_step(&config);
        assert_eq!(step.lambda, 1e-3);

        assert_eq!(step.review(10.0, 5.0), StepReview::Accept);
        assert!((step.lambda - 1e-4).abs() < 1e-18);

        assert_eq!(step.review(5.0, 6.0), StepReview::Reject);
        assert!((step.lambda - 1e-3).abs() < 1e-15);

        assert_eq!(step.review(5.0, f64::NAN), StepReview::Reject);
        assert!((step.lambda - 1e-2).abs() < 1e-15);

        step.restart();
        assert_eq!(step.lambda, 1e-3);
    }

    #[test]
    fn test_damping_clamps_and_stalls() {
        let config = SolverConfig::default();
        let mut step = damped_step(&config);

        for _ in 0..100 {
            step.review(1.0, 0.5);
        }
        assert_eq!(step.lambda, config.damping.min);

        let reviews: Vec<_> = (0..25).map(|_| step.review(1.0, 2.0)).collect();
        assert_eq!(step.lambda, config.damping.max);
        assert_eq!(reviews[0], StepReview::Reject);
        assert_eq!(reviews.last(), Some(&StepReview::Stall));
    }

    #[test]
    fn test_solve_pulls_corner() {
        let graph = grid(6);
        let constraints = lifted_corner(&graph, 6);
        let config = SolverConfig::default().with_nonlinear_iter(40);
        let model = ArapEnergy::<f64>::from_config(&graph, &constraints, &config).unwrap();

        let outcome = LevenbergMarquardtBackend.solve(&model, model.rest().to_vec(), &config);
        assert_ne!(outcome.status, SolveStatus::Diverged);
        assert!(outcome.final_energy < outcome.initial_energy * 0.1);
        assert!(model.constraint_error(&outcome.positions).max < 0.05);
    }

    #[test]
    fn test_single_precision() {
        let graph = grid(4);
        let constraints = lifted_corner(&graph, 4);
        let config = SolverConfig::default();
        let model = ArapEnergy::<f32>::from_config(&graph, &constraints, &config).unwrap();

        let outcome = LevenbergMarquardtBackend.solve(&model, model.rest().to_vec(), &config);
        assert_ne!(outcome.status, SolveStatus::Diverged);
        assert!(outcome.positions.iter().all(|p| p.iter().all(|c| c.is_finite())));
        assert!(outcome.final_energy < outcome.initial_energy);
    }
}
