//! Data-parallel Gauss-Newton backend.
//!
//! Never assembles a matrix: `JᵀJ` is applied vertex by vertex on 3-vector blocks and
//! every per-vertex loop runs on the rayon pool. The global step is solved with
//! block-Jacobi preconditioned conjugate gradient; since the three coordinates share
//! one scalar normal matrix, each diagonal block is a multiple of the identity and the
//! preconditioner reduces to a per-vertex scale.

use nalgebra::Vector3;

use crate::algo::deform::alternation::{solve_staged, GlobalSolve, GlobalStep};
use crate::algo::deform::backend::{Availability, BackendOutcome, SolverBackend};
use crate::algo::deform::config::{BackendKind, SolverConfig};
use crate::algo::deform::energy::{ArapEnergy, Linearization};
use crate::algo::deform::exec::Execution;
use crate::algo::deform::scalar::Real;

/// Matrix-free, parallel Gauss-Newton.
///
/// Requires the `parallel` feature.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussNewtonBackend;

impl<T: Real> SolverBackend<T> for GaussNewtonBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::GaussNewton
    }

    fn availability(&self, _model: &ArapEnergy<'_, T>) -> Availability {
        if Execution::parallel_supported() {
            Availability::Available
        } else {
            Availability::Unavailable("built without the `parallel` feature".to_string())
        }
    }

    fn solve(
        &self,
        model: &ArapEnergy<'_, T>,
        initial: Vec<Vector3<T>>,
        config: &SolverConfig,
    ) -> BackendOutcome<T> {
        let mut step = BlockPcgStep {
            inv_diagonal: model
                .normal_diagonal()
                .into_iter()
                .map(|d| if d > T::zero() { T::one() / d } else { T::one() })
                .collect(),
            max_iter: config.linear_iter,
            tolerance: T::of(config.linear_tolerance),
        };
        solve_staged(model, initial, config, Execution::Parallel, &mut step)
    }
}

struct BlockPcgStep<T: Real> {
    inv_diagonal: Vec<T>,
    max_iter: usize,
    tolerance: T,
}

impl<T: Real> GlobalSolve<T> for BlockPcgStep<T> {
    fn step(&mut self, lin: &Linearization<'_, T>, positions: &[Vector3<T>]) -> GlobalStep<T> {
        let rhs = lin.rhs(positions);
        let (delta, iterations) = self.solve(lin, &rhs);
        let exec = lin.execution();
        GlobalStep {
            positions: exec.map(positions.len(), |i| positions[i] + delta[i]),
            linear_iterations: iterations,
        }
    }
}

impl<T: Real> BlockPcgStep<T> {
    /// Solve `JᵀJ δ = b` from `δ = 0`. Returns the last iterate and the iteration count.
    fn solve(&self, lin: &Linearization<'_, T>, b: &[Vector3<T>]) -> (Vec<Vector3<T>>, usize) {
        let exec = lin.execution();
        let n = b.len();
        let dot = |a: &[Vector3<T>], c: &[Vector3<T>]| exec.sum(n, |i| a[i].dot(&c[i]));
        let precondition = |r: &[Vector3<T>]| exec.map(n, |i| r[i] * self.inv_diagonal[i]);

        let mut x = vec![Vector3::zeros(); n];
        let b_norm = dot(b, b).sqrt();
        if b_norm == T::zero() {
            return (x, 0);
        }

        let mut r = b.to_vec();
        let mut z = precondition(&r);
        let mut p = z.clone();
        let mut rz = dot(&r, &z);

        for iter in 0..self.max_iter {
            let ap = lin.apply_normal(&p);
            let p_ap = dot(&p, &ap);
            if p_ap <= T::zero() {
                return (x, iter);
            }
            let alpha = rz / p_ap;

            x = exec.map(n, |i| x[i] + p[i] * alpha);
            r = exec.map(n, |i| r[i] - ap[i] * alpha);

            if dot(&r, &r).sqrt() / b_norm < self.tolerance {
                return (x, iter + 1);
            }

            z = precondition(&r);
            let rz_new = dot(&r, &z);
            let beta = rz_new / rz;
            p = exec.map(n, |i| z[i] + p[i] * beta);
            rz = rz_new;
        }

        (x, self.max_iter)
    }
}
