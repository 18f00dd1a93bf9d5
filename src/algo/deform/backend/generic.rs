//! Dense reference backend.
//!
//! Expands the normal matrix into a dense matrix and factors it once per solve: it only
//! depends on the edge weights and the landmark set, not on the rotations. Cubic in the
//! vertex count, so it is limited to small meshes.

use nalgebra::linalg::{Cholesky, LU};
use nalgebra::{DMatrix, DVector, Dyn, Vector3};
use tracing::warn;

use crate::algo::deform::alternation::{solve_staged, GlobalSolve, GlobalStep};
use crate::algo::deform::backend::{Availability, BackendOutcome, SolverBackend};
use crate::algo::deform::config::{BackendKind, SolverConfig};
use crate::algo::deform::energy::{ArapEnergy, Linearization};
use crate::algo::deform::exec::Execution;
use crate::algo::deform::scalar::Real;

/// Largest mesh the dense backend accepts.
pub const GENERIC_MAX_VERTICES: usize = 2000;

/// Ridge added to the diagonal, relative to its mean, when Cholesky fails.
const RIDGE_SCALE: f64 = 100.0;

/// Dense direct solver, used as the numerical reference on small meshes.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericNlsBackend;

impl<T: Real> SolverBackend<T> for GenericNlsBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GenericNls
    }

    fn availability(&self, model: &ArapEnergy<'_, T>) -> Availability {
        let n = model.num_vertices();
        if n > GENERIC_MAX_VERTICES {
            Availability::Unavailable(format!(
                "{} vertices exceeds the dense solver limit of {}",
                n, GENERIC_MAX_VERTICES
            ))
        } else {
            Availability::Available
        }
    }

    fn solve(
        &self,
        model: &ArapEnergy<'_, T>,
        initial: Vec<Vector3<T>>,
        config: &SolverConfig,
    ) -> BackendOutcome<T> {
        let mut step = DenseStep {
            factor: Factorization::new(model.normal_matrix().to_dense()),
        };
        solve_staged(model, initial, config, Execution::Sequential, &mut step)
    }
}

/// A factored normal matrix.
enum Factorization<T: Real> {
    Cholesky(Cholesky<T, Dyn>),
    Lu(LU<T, Dyn, Dyn>),
}

impl<T: Real> Factorization<T> {
    /// Cholesky, then Cholesky with a small ridge, then LU.
    fn new(matrix: DMatrix<T>) -> Self {
        if let Some(chol) = matrix.clone().cholesky() {
            return Factorization::Cholesky(chol);
        }

        let n = matrix.nrows().max(1);
        let mean_diagonal = matrix.diagonal().sum() / T::of(n as f64);
        let ridge =
            T::default_epsilon() * T::of(RIDGE_SCALE) * mean_diagonal.abs().max(T::one());
        let mut ridged = matrix.clone();
        for i in 0..ridged.nrows() {
            ridged[(i, i)] += ridge;
        }
        if let Some(chol) = ridged.cholesky() {
            return Factorization::Cholesky(chol);
        }

        warn!("normal matrix is not positive definite, falling back to LU");
        Factorization::Lu(matrix.lu())
    }

    fn solve(&self, b: &DVector<T>) -> Option<DVector<T>> {
        match self {
            Factorization::Cholesky(chol) => Some(chol.solve(b)),
            Factorization::Lu(lu) => lu.solve(b),
        }
    }
}

struct DenseStep<T: Real> {
    factor: Factorization<T>,
}

impl<T: Real> GlobalSolve<T> for DenseStep<T> {
    fn step(&mut self, lin: &Linearization<'_, T>, positions: &[Vector3<T>]) -> GlobalStep<T> {
        let rhs = lin.rhs(positions);
        let n = positions.len();

        let mut next = positions.to_vec();
        for axis in 0..3 {
            let b = DVector::from_fn(n, |i, _| rhs[i][axis]);
            // A singular LU leaves this coordinate where it is
            if let Some(delta) = self.factor.solve(&b) {
                for (p, d) in next.iter_mut().zip(delta.iter()) {
                    p[axis] += *d;
                }
            }
        }

        GlobalStep {
            positions: next,
            linear_iterations: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algo::deform::backend::SolveStatus;
    use crate::algo::deform::fixtures::{cube, grid, lifted_corner};
    use crate::constraints::ConstraintSet;

    #[test]
    fn test_unavailable_for_large_meshes() {
        let graph = grid(45);
        let constraints = ConstraintSet::empty();
        let model =
            ArapEnergy::<f32>::from_config(&graph, &constraints, &SolverConfig::default()).unwrap();
        match SolverBackend::<f32>::availability(&GenericNlsBackend, &model) {
            Availability::Unavailable(reason) => assert!(reason.contains("2025")),
            Availability::Available => panic!("2025 vertices should exceed the dense limit"),
        }

        let small = grid(10);
        let model =
            ArapEnergy::<f32>::from_config(&small, &constraints, &SolverConfig::default()).unwrap();
        assert!(SolverBackend::<f32>::availability(&GenericNlsBackend, &model).is_available());
    }

    #[test]
    fn test_factorization_solves() {
        let m = DMatrix::<f64>::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let x = Factorization::new(m).solve(&DVector::from_vec(vec![1.0, 2.0])).unwrap();
        assert!((x[0] - 1.0 / 11.0).abs() < 1e-12);
        assert!((x[1] - 7.0 / 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_singular_matrix_gets_ridge() {
        // Laplacian of a single edge: singular, consistent right-hand side
        let m = DMatrix::<f64>::from_row_slice(2, 2, &[1.0, -1.0, -1.0, 1.0]);
        let factor = Factorization::new(m.clone());
        let b = DVector::from_vec(vec![1.0, -1.0]);
        let x = factor.solve(&b).unwrap();
        assert!(x.iter().all(|v| v.is_finite()));
        assert!((&m * &x - &b).norm() < 1e-6);
    }

    #[test]
    fn test_solve_pulls_corner() {
        let graph = grid(5);
        let constraints = lifted_corner(&graph, 5);
        let config = SolverConfig::default().with_nonlinear_iter(40);
        let model = ArapEnergy::<f64>::from_config(&graph, &constraints, &config).unwrap();

        let outcome = GenericNlsBackend.solve(&model, model.rest().to_vec(), &config);
        assert_ne!(outcome.status, SolveStatus::Diverged);
        assert_eq!(outcome.linear_iterations, outcome.alternations);
        assert!(outcome.final_energy < outcome.initial_energy * 0.1);
        assert!(model.constraint_error(&outcome.positions).max < 0.05);
    }

    #[test]
    fn test_free_cube_stays_put() {
        let graph = cube();
        let constraints = ConstraintSet::empty();
        let config = SolverConfig::default();
        let model = ArapEnergy::<f64>::from_config(&graph, &constraints, &config).unwrap();

        let outcome = GenericNlsBackend.solve(&model, model.rest().to_vec(), &config);
        assert_eq!(outcome.status, SolveStatus::Converged);
        assert_eq!(outcome.alternations, 0);
        assert_eq!(outcome.positions, model.rest());
    }
}
