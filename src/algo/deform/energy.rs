//! The ARAP energy with landmark data terms.
//!
//! For positions `p`, rest positions `q` and per-vertex rotations `R`:
//!
//! ```text
//! E(p) = reg · Σ_i Σ_{j ∈ N(i)} w_ij |(p_i - p_j) - R_i (q_i - q_j)|²
//!      + fit · Σ_k |p_k - t_k|²
//! ```
//!
//! Every directed one-ring edge contributes one smoothness residual, every landmark one
//! data residual. With the rotations held fixed the energy is quadratic in `p` and its
//! normal matrix `JᵀJ` is the same weighted graph Laplacian (plus landmark diagonal) for
//! the x, y and z coordinates:
//!
//! ```text
//! (JᵀJ x)_k = Σ_j 2 · reg · w_kj (x_k - x_j) + fit_k x_k
//! rhs_k     = Σ_j reg · w_kj ((R_k + R_j)(q_k - q_j) - 2 (p_k - p_j)) + fit_k (t_k - p_k)
//! ```
//!
//! where `rhs = -Jᵀr = -∇E / 2`, so a Gauss-Newton step `δ` solves `JᵀJ δ = rhs`.

use std::collections::HashMap;

use nalgebra::{Matrix3, Point3, Vector3};

use super::config::{EdgeWeighting, EnergyWeights, SolverConfig};
use super::exec::Execution;
use super::rotation::{RotationEstimator, RotationField};
use super::scalar::{to_solver, Real};
use super::sparse::CsrMatrix;
use crate::constraints::ConstraintSet;
use crate::error::{DeformError, Result};
use crate::mesh::{MeshGraph, VertexId};

/// Floor applied to cotangent weights so obtuse triangles never produce negative edges.
const MIN_COTANGENT_WEIGHT: f64 = 1e-6;

/// Landmark residual summary in mesh units.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConstraintError {
    /// Root mean square distance to the landmark targets.
    pub rms: f64,
    /// Largest distance to a landmark target.
    pub max: f64,
}

/// ARAP energy over a borrowed mesh and constraint set.
///
/// Owns only derived data: rest positions and targets in the solver precision, and the
/// per-edge weights. Positions and rotations are always passed in.
#[derive(Debug, Clone)]
pub struct ArapEnergy<'a, T: Real> {
    graph: &'a MeshGraph,
    constraints: &'a ConstraintSet,
    weights: EnergyWeights,
    rest: Vec<Vector3<T>>,
    /// `ring_weights[v][k]`: weight of the edge to the `k`-th neighbor of `v`.
    ring_weights: Vec<Vec<T>>,
    /// Target per vertex, `None` for free vertices.
    targets: Vec<Option<Vector3<T>>>,
    fit: T,
    reg: T,
}

impl<'a, T: Real> ArapEnergy<'a, T> {
    /// Build the energy for a mesh and its landmarks.
    ///
    /// # Errors
    ///
    /// - [`DeformError::EmptyMesh`] if the mesh has no vertices
    /// - [`DeformError::ConstraintOutOfRange`] if a landmark names a missing vertex
    /// - [`DeformError::InvalidParameter`] for non-positive weights
    pub fn new(
        graph: &'a MeshGraph,
        constraints: &'a ConstraintSet,
        weights: EnergyWeights,
        weighting: EdgeWeighting,
    ) -> Result<Self> {
        if graph.is_empty() {
            return Err(DeformError::EmptyMesh);
        }
        constraints.validate(graph.num_vertices())?;
        for (name, value) in [
            ("weights.fit", weights.fit),
            ("weights.regularization", weights.regularization),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(DeformError::invalid_param(
                    name,
                    value,
                    "must be positive and finite",
                ));
            }
        }

        let mut targets = vec![None; graph.num_vertices()];
        for c in constraints {
            targets[c.vertex] = Some(c.target.coords.map(T::of));
        }

        Ok(Self {
            graph,
            constraints,
            weights,
            rest: to_solver(graph.rest_positions()),
            ring_weights: ring_weights(graph, weighting),
            targets,
            fit: T::of(weights.fit),
            reg: T::of(weights.regularization),
        })
    }

    /// Build the energy with the weights and weighting scheme of a solver config.
    pub fn from_config(
        graph: &'a MeshGraph,
        constraints: &'a ConstraintSet,
        config: &SolverConfig,
    ) -> Result<Self> {
        Self::new(graph, constraints, config.weights, config.edge_weighting)
    }

    /// The mesh this energy is defined on.
    #[inline]
    pub fn graph(&self) -> &'a MeshGraph {
        self.graph
    }

    /// The landmarks this energy pulls towards.
    #[inline]
    pub fn constraints(&self) -> &'a ConstraintSet {
        self.constraints
    }

    /// Number of vertices (unknown positions).
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.rest.len()
    }

    /// Residual weights.
    #[inline]
    pub fn weights(&self) -> EnergyWeights {
        self.weights
    }

    /// Rest positions in solver precision.
    #[inline]
    pub fn rest(&self) -> &[Vector3<T>] {
        &self.rest
    }

    /// Per-neighbor edge weights, aligned with [`MeshGraph::neighbors`].
    #[inline]
    pub fn ring_weights(&self) -> &[Vec<T>] {
        &self.ring_weights
    }

    /// Current target of a vertex, if it is a landmark.
    #[inline]
    pub fn target(&self, v: VertexId) -> Option<&Vector3<T>> {
        self.targets[v.index()].as_ref()
    }

    /// Rotation estimator sharing this energy's weights.
    pub fn rotation_estimator(&self) -> RotationEstimator<'_, T> {
        RotationEstimator::new(self.graph, &self.rest, &self.ring_weights)
    }

    /// A copy whose landmark targets sit a fraction `alpha` of the way from `start` to
    /// the real targets. Used for load stepping; `alpha = 1` reproduces `self`.
    pub fn with_target_blend(&self, start: &[Vector3<T>], alpha: T) -> Self {
        let mut blended = self.clone();
        for c in self.constraints {
            let i = c.vertex;
            let target = c.target.coords.map(T::of);
            blended.targets[i] = Some(start[i] + (target - start[i]) * alpha);
        }
        blended
    }

    /// Fit rotations at `positions` and freeze them.
    pub fn linearize(&self, positions: &[Vector3<T>], exec: Execution) -> Linearization<'_, T> {
        let field = self.rotation_estimator().estimate(positions, exec);
        Linearization {
            model: self,
            field,
            exec,
        }
    }

    /// The ARAP energy at `positions`, with rotations fitted to `positions`.
    pub fn energy(&self, positions: &[Vector3<T>], exec: Execution) -> T {
        self.linearize(positions, exec).energy(positions)
    }

    /// Distances from the landmark vertices to their (final, unblended) targets.
    pub fn constraint_error(&self, positions: &[Vector3<T>]) -> ConstraintError {
        if self.constraints.is_empty() {
            return ConstraintError::default();
        }
        let mut sum_sq = 0.0;
        let mut max: f64 = 0.0;
        for c in self.constraints {
            let p = positions[c.vertex].map(|x| x.widen());
            let d = (Point3::from(p) - c.target).norm();
            sum_sq += d * d;
            max = max.max(d);
        }
        ConstraintError {
            rms: (sum_sq / self.constraints.len() as f64).sqrt(),
            max,
        }
    }

    /// Diagonal of the scalar normal matrix.
    pub fn normal_diagonal(&self) -> Vec<T> {
        let two_reg = self.reg + self.reg;
        (0..self.num_vertices())
            .map(|i| {
                let ring: T = self.ring_weights[i]
                    .iter()
                    .fold(T::zero(), |acc, &w| acc + w * two_reg);
                ring + self.data_weight(i)
            })
            .collect()
    }

    /// Explicit scalar block of `JᵀJ`, shared by the three coordinates.
    pub fn normal_matrix(&self) -> CsrMatrix<T> {
        let n = self.num_vertices();
        let two_reg = self.reg + self.reg;
        let diagonal = self.normal_diagonal();

        let mut triplets = Vec::with_capacity(n + 2 * self.graph.num_edges());
        for (i, &d) in diagonal.iter().enumerate() {
            triplets.push((i, i, d));
            for (j, w) in self.ring(i) {
                triplets.push((i, j, -(w * two_reg)));
            }
        }
        CsrMatrix::from_triplets(n, n, triplets)
    }

    /// Matrix-free `JᵀJ · x` on 3-vector blocks.
    pub fn apply_normal(&self, x: &[Vector3<T>], exec: Execution) -> Vec<Vector3<T>> {
        let two_reg = self.reg + self.reg;
        exec.map(self.num_vertices(), |k| {
            let mut acc = x[k] * self.data_weight(k);
            for (j, w) in self.ring(k) {
                acc += (x[k] - x[j]) * (w * two_reg);
            }
            acc
        })
    }

    /// Neighbor indices of `i` with their edge weights.
    fn ring(&self, i: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        self.graph
            .neighbors(VertexId::new(i))
            .iter()
            .zip(&self.ring_weights[i])
            .map(|(u, &w)| (u.index(), w))
    }

    #[inline]
    fn data_weight(&self, i: usize) -> T {
        if self.targets[i].is_some() {
            self.fit
        } else {
            T::zero()
        }
    }
}

/// Per-directed-edge weights aligned with each vertex's neighbor list.
fn ring_weights<T: Real>(graph: &MeshGraph, weighting: EdgeWeighting) -> Vec<Vec<T>> {
    let cotangents = match weighting {
        EdgeWeighting::Cotangent => cotangent_weights(graph),
        _ => HashMap::new(),
    };

    graph
        .vertex_ids()
        .map(|v| {
            graph
                .neighbors(v)
                .iter()
                .map(|&u| {
                    let w = match weighting {
                        EdgeWeighting::Uniform => 1.0,
                        EdgeWeighting::RestLength => {
                            (graph.rest_position(u) - graph.rest_position(v)).norm()
                        }
                        EdgeWeighting::Cotangent => cotangents
                            .get(&canonical_edge(v.index(), u.index()))
                            .copied()
                            .unwrap_or(1.0),
                    };
                    T::of(w)
                })
                .collect()
        })
        .collect()
}

/// Half the sum of the cotangents opposite each triangle edge, floored.
fn cotangent_weights(graph: &MeshGraph) -> HashMap<(usize, usize), f64> {
    let rest = graph.rest_positions();
    let mut weights: HashMap<(usize, usize), f64> = HashMap::new();

    for face in graph.faces() {
        let [a, b, c] = face.map(|v| v.index());
        for (corner, e0, e1) in [(a, b, c), (b, c, a), (c, a, b)] {
            let cot = cotangent_at(&rest[corner], &rest[e0], &rest[e1]);
            *weights.entry(canonical_edge(e0, e1)).or_insert(0.0) += cot;
        }
    }

    for weight in weights.values_mut() {
        *weight = (*weight * 0.5).max(MIN_COTANGENT_WEIGHT);
    }
    weights
}

/// Cotangent of the angle at `a` in triangle (a, b, c), zero for slivers.
fn cotangent_at(a: &Point3<f64>, b: &Point3<f64>, c: &Point3<f64>) -> f64 {
    let ab = b - a;
    let ac = c - a;
    let cross_len = ab.cross(&ac).norm();
    if cross_len < 1e-12 {
        0.0
    } else {
        ab.dot(&ac) / cross_len
    }
}

#[inline]
fn canonical_edge(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Residual vector split by family.
#[derive(Debug, Clone)]
pub struct Residuals<T: Real> {
    /// `smoothness[i][k]`: residual of the edge from `i` to its `k`-th neighbor.
    pub smoothness: Vec<Vec<Vector3<T>>>,
    /// One residual per landmark, in constraint order.
    pub data: Vec<Vector3<T>>,
}

impl<T: Real> Residuals<T> {
    /// `|r|²`, equal to the energy.
    pub fn squared_norm(&self) -> T {
        let smooth = self
            .smoothness
            .iter()
            .flatten()
            .fold(T::zero(), |acc, r| acc + r.norm_squared());
        self.data
            .iter()
            .fold(smooth, |acc, r| acc + r.norm_squared())
    }
}

/// The energy with rotations frozen at one set of positions.
///
/// Quadratic in the positions; every Gauss-Newton style global step works on one of
/// these.
#[derive(Debug, Clone)]
pub struct Linearization<'m, T: Real> {
    model: &'m ArapEnergy<'m, T>,
    field: RotationField<T>,
    exec: Execution,
}

impl<'m, T: Real> Linearization<'m, T> {
    /// The underlying energy.
    #[inline]
    pub fn model(&self) -> &'m ArapEnergy<'m, T> {
        self.model
    }

    /// The frozen rotations, one per vertex.
    #[inline]
    pub fn rotations(&self) -> &[Matrix3<T>] {
        &self.field.rotations
    }

    /// Number of vertices whose one-ring fell back to the identity.
    #[inline]
    pub fn degenerate_rotations(&self) -> usize {
        self.field.degenerate
    }

    /// Execution strategy used for per-vertex loops.
    #[inline]
    pub fn execution(&self) -> Execution {
        self.exec
    }

    /// Energy at `positions` with the frozen rotations.
    pub fn energy(&self, positions: &[Vector3<T>]) -> T {
        let m = self.model;
        self.exec.sum(m.num_vertices(), |i| {
            let r = &self.field.rotations[i];
            let mut e = T::zero();
            for (j, w) in m.ring(i) {
                let d = (positions[i] - positions[j]) - r * (m.rest[i] - m.rest[j]);
                e += d.norm_squared() * w * m.reg;
            }
            if let Some(t) = &m.targets[i] {
                e += (positions[i] - t).norm_squared() * m.fit;
            }
            e
        })
    }

    /// Weighted residual vector at `positions`.
    pub fn residuals(&self, positions: &[Vector3<T>]) -> Residuals<T> {
        let m = self.model;
        let smoothness: Vec<Vec<Vector3<T>>> = self.exec.map(m.num_vertices(), |i| {
            let r = &self.field.rotations[i];
            m.ring(i)
                .map(|(j, w)| {
                    ((positions[i] - positions[j]) - r * (m.rest[i] - m.rest[j]))
                        * (w * m.reg).sqrt()
                })
                .collect()
        });
        let sqrt_fit = m.fit.sqrt();
        let data = m
            .constraints
            .iter()
            .filter_map(|c| {
                let i = c.vertex;
                m.targets[i].map(|t| (positions[i] - t) * sqrt_fit)
            })
            .collect();
        Residuals { smoothness, data }
    }

    /// `-Jᵀr`, the right-hand side of the Gauss-Newton system.
    pub fn rhs(&self, positions: &[Vector3<T>]) -> Vec<Vector3<T>> {
        let m = self.model;
        let two = T::one() + T::one();
        self.exec.map(m.num_vertices(), |k| {
            let rk = &self.field.rotations[k];
            let mut acc = Vector3::zeros();
            for (j, w) in m.ring(k) {
                let rotated = (rk + self.field.rotations[j]) * (m.rest[k] - m.rest[j]);
                acc += (rotated - (positions[k] - positions[j]) * two) * (w * m.reg);
            }
            if let Some(t) = &m.targets[k] {
                acc += (t - positions[k]) * m.fit;
            }
            acc
        })
    }

    /// `∇E` at `positions` with the frozen rotations.
    pub fn gradient(&self, positions: &[Vector3<T>]) -> Vec<Vector3<T>> {
        let minus_two = -(T::one() + T::one());
        self.rhs(positions).into_iter().map(|g| g * minus_two).collect()
    }

    /// Matrix-free `JᵀJ · x`.
    #[inline]
    pub fn apply_normal(&self, x: &[Vector3<T>]) -> Vec<Vector3<T>> {
        self.model.apply_normal(x, self.exec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraints::Constraint;
    use nalgebra::Rotation3;

    fn grid(n: usize) -> MeshGraph {
        let mut vertices = Vec::new();
        for j in 0..n {
            for i in 0..n {
                vertices.push(Point3::new(i as f64, j as f64, 0.1 * ((i * j) % 3) as f64));
            }
        }
        let mut faces = Vec::new();
        for j in 0..n - 1 {
            for i in 0..n - 1 {
                let v = j * n + i;
                faces.push([v, v + 1, v + n + 1]);
                faces.push([v, v + n + 1, v + n]);
            }
        }
        MeshGraph::from_triangles(&vertices, &faces).unwrap()
    }

    fn perturbed(rest: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        rest.iter()
            .enumerate()
            .map(|(i, q)| {
                let t = i as f64;
                q + Vector3::new((t * 1.3).sin(), (t * 0.7).cos(), (t * 2.1).sin()) * 0.2
            })
            .collect()
    }

    fn energy_for<'a>(graph: &'a MeshGraph, constraints: &'a ConstraintSet) -> ArapEnergy<'a, f64> {
        ArapEnergy::new(graph, constraints, EnergyWeights::default(), EdgeWeighting::Uniform)
            .unwrap()
    }

    #[test]
    fn test_zero_energy_at_rest() {
        let graph = grid(4);
        let constraints =
            ConstraintSet::new(vec![Constraint::new(5, *graph.rest_position(VertexId::new(5)))])
                .unwrap();
        let energy = energy_for(&graph, &constraints);
        let rest = energy.rest().to_vec();
        assert!(energy.energy(&rest, Execution::Sequential).abs() < 1e-20);
    }

    #[test]
    fn test_rigid_invariance_without_constraints() {
        let graph = grid(5);
        let constraints = ConstraintSet::empty();
        let energy = energy_for(&graph, &constraints);

        let rot = Rotation3::from_euler_angles(0.4, -1.1, 2.0).into_inner();
        let shift = Vector3::new(3.0, -2.0, 7.5);
        let moved: Vec<_> = energy.rest().iter().map(|q| rot * q + shift).collect();

        for exec in [Execution::Sequential, Execution::Parallel] {
            let e = energy.energy(&moved, exec);
            assert!(e.abs() < 1e-18, "rigid motion has energy {}", e);
        }
    }

    #[test]
    fn test_rigid_motion_breaks_with_constraints() {
        let graph = grid(3);
        let constraints =
            ConstraintSet::new(vec![Constraint::new(0, *graph.rest_position(VertexId::new(0)))])
                .unwrap();
        let energy = energy_for(&graph, &constraints);
        let moved: Vec<_> = energy
            .rest()
            .iter()
            .map(|q| q + Vector3::new(1.0, 0.0, 0.0))
            .collect();
        // Only the data term remains: fit * |shift|²
        assert!((energy.energy(&moved, Execution::Sequential) - 1000.0).abs() < 1e-9);
    }

    #[test]
    fn test_residual_norm_equals_energy() {
        let graph = grid(4);
        let constraints = ConstraintSet::new(vec![
            Constraint::new(0, Point3::new(0.5, 0.0, 0.0)),
            Constraint::new(15, Point3::new(3.0, 3.5, 1.0)),
        ])
        .unwrap();
        let energy = energy_for(&graph, &constraints);
        let p = perturbed(energy.rest());

        let lin = energy.linearize(&p, Execution::Sequential);
        let residuals = lin.residuals(&p);
        assert_eq!(residuals.data.len(), 2);
        assert_eq!(residuals.smoothness.len(), 16);
        let e = lin.energy(&p);
        assert!((residuals.squared_norm() - e).abs() < 1e-9 * e.max(1.0));
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let graph = grid(3);
        let constraints =
            ConstraintSet::new(vec![Constraint::new(4, Point3::new(1.0, 1.0, 0.7))]).unwrap();
        let energy = ArapEnergy::<f64>::new(
            &graph,
            &constraints,
            EnergyWeights {
                fit: 10.0,
                regularization: 1.0,
            },
            EdgeWeighting::Uniform,
        )
        .unwrap();
        let p = perturbed(energy.rest());
        let lin = energy.linearize(&p, Execution::Sequential);
        let gradient = lin.gradient(&p);

        let h = 1e-6;
        for i in 0..p.len() {
            for axis in 0..3 {
                let mut plus = p.clone();
                let mut minus = p.clone();
                plus[i][axis] += h;
                minus[i][axis] -= h;
                let fd = (lin.energy(&plus) - lin.energy(&minus)) / (2.0 * h);
                let analytic = gradient[i][axis];
                assert!(
                    (fd - analytic).abs() < 1e-5 * analytic.abs().max(1.0),
                    "vertex {} axis {}: fd {} vs {}",
                    i,
                    axis,
                    fd,
                    analytic
                );
            }
        }
    }

    #[test]
    fn test_normal_operator_is_half_hessian() {
        let graph = grid(3);
        let constraints =
            ConstraintSet::new(vec![Constraint::new(8, Point3::new(2.0, 2.0, 1.0))]).unwrap();
        let energy = energy_for(&graph, &constraints);
        let p = perturbed(energy.rest());
        let lin = energy.linearize(&p, Execution::Sequential);

        let delta: Vec<_> = (0..p.len())
            .map(|i| Vector3::new(0.01 * i as f64, -0.02, 0.005 * (i % 4) as f64))
            .collect();
        let moved: Vec<_> = p.iter().zip(&delta).map(|(a, d)| a + d).collect();

        let g0 = lin.gradient(&p);
        let g1 = lin.gradient(&moved);
        let a_delta = lin.apply_normal(&delta);
        for i in 0..p.len() {
            let lhs = g1[i] - g0[i];
            assert!((lhs - a_delta[i] * 2.0).norm() < 1e-9);
        }
    }

    #[test]
    fn test_normal_matrix_matches_operator() {
        let graph = grid(4);
        let constraints =
            ConstraintSet::new(vec![Constraint::new(3, Point3::new(3.0, 0.0, 1.0))]).unwrap();
        let energy = energy_for(&graph, &constraints);
        let matrix = energy.normal_matrix();
        assert_eq!(matrix.nrows(), 16);
        assert_eq!(matrix.nnz(), 16 + 2 * graph.num_edges());

        let x: Vec<_> = (0..16)
            .map(|i| Vector3::new(i as f64, (i * i) as f64 * 0.1, 1.0))
            .collect();
        let operator = energy.apply_normal(&x, Execution::Parallel);
        for axis in 0..3 {
            let column = nalgebra::DVector::from_fn(16, |i, _| x[i][axis]);
            let product = matrix.mul_vec(&column);
            for i in 0..16 {
                assert!((product[i] - operator[i][axis]).abs() < 1e-9);
            }
        }

        let diag = energy.normal_diagonal();
        assert!((diag[3] - (2.0 * graph.valence(VertexId::new(3)) as f64 + 1000.0)).abs() < 1e-12);
    }

    #[test]
    fn test_constraint_error() {
        let graph = grid(2);
        let constraints = ConstraintSet::new(vec![
            Constraint::new(0, Point3::new(0.0, 0.0, 1.0)),
            Constraint::new(1, Point3::new(1.0, 0.0, 0.0)),
        ])
        .unwrap();
        let energy = energy_for(&graph, &constraints);
        let error = energy.constraint_error(energy.rest());
        assert!((error.max - 1.0).abs() < 1e-12);
        assert!((error.rms - 0.5f64.sqrt()).abs() < 1e-12);

        let empty = ConstraintSet::empty();
        let free = energy_for(&graph, &empty);
        assert_eq!(free.constraint_error(free.rest()), ConstraintError::default());
    }

    #[test]
    fn test_target_blend() {
        let graph = grid(2);
        let constraints =
            ConstraintSet::new(vec![Constraint::new(3, Point3::new(3.0, 1.0, 0.1))]).unwrap();
        let energy = energy_for(&graph, &constraints);
        let half = energy.with_target_blend(energy.rest(), 0.5);
        let t = half.target(VertexId::new(3)).unwrap();
        assert!((t - Vector3::new(2.0, 1.0, 0.1)).norm() < 1e-12);
        assert!(half.target(VertexId::new(0)).is_none());
        // Error is still measured against the real target
        assert!((half.constraint_error(half.rest()).max - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_cotangent_weights_on_split_square() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let graph = MeshGraph::from_triangles(&vertices, &[[0, 1, 2], [0, 2, 3]]).unwrap();
        let weights = cotangent_weights(&graph);

        // Sides face a 45° angle, the diagonal faces two right angles
        assert!((weights[&(0, 1)] - 0.5).abs() < 1e-12);
        assert!((weights[&(2, 3)] - 0.5).abs() < 1e-12);
        assert!((weights[&(0, 2)] - MIN_COTANGENT_WEIGHT).abs() < 1e-12);

        let ring: Vec<Vec<f64>> = ring_weights(&graph, EdgeWeighting::Cotangent);
        for v in graph.vertex_ids() {
            for (u, w) in graph.neighbors(v).iter().zip(&ring[v.index()]) {
                let back = graph.neighbors(*u).iter().position(|x| *x == v).unwrap();
                assert_eq!(*w, ring[u.index()][back]);
            }
        }
    }

    #[test]
    fn test_rest_length_weighting() {
        let graph = grid(2);
        let ring: Vec<Vec<f64>> = ring_weights(&graph, EdgeWeighting::RestLength);
        let v0 = VertexId::new(0);
        for (u, w) in graph.neighbors(v0).iter().zip(&ring[0]) {
            let len = (graph.rest_position(*u) - graph.rest_position(v0)).norm();
            assert!((w - len).abs() < 1e-12);
        }
    }

    #[test]
    fn test_accessors_and_frozen_rotations() {
        let graph = grid(4);
        let constraints = ConstraintSet::empty();
        let weights = EnergyWeights {
            fit: 50.0,
            regularization: 2.0,
        };
        let energy =
            ArapEnergy::<f64>::new(&graph, &constraints, weights, EdgeWeighting::RestLength)
                .unwrap();

        assert!(std::ptr::eq(energy.graph(), &graph));
        assert_eq!(energy.weights(), weights);
        assert_eq!(energy.ring_weights().len(), graph.num_vertices());
        for v in graph.vertex_ids() {
            assert_eq!(energy.ring_weights()[v.index()].len(), graph.valence(v));
        }

        let rot = Rotation3::from_euler_angles(0.3, 0.2, -0.9).into_inner();
        let moved: Vec<_> = energy.rest().iter().map(|q| rot * q).collect();
        let lin = energy.linearize(&moved, Execution::Sequential);
        assert_eq!(lin.rotations().len(), graph.num_vertices());

        // Corners with two neighbors fall back to the identity
        let short_rings = graph.vertex_ids().filter(|&v| graph.valence(v) < 3).count();
        assert_eq!(lin.degenerate_rotations(), short_rings);
        for v in graph.vertex_ids().filter(|&v| graph.valence(v) >= 3) {
            assert!((lin.rotations()[v.index()] - rot).norm() < 1e-9, "vertex {:?}", v);
        }
    }

    #[test]
    fn test_rejects_out_of_range_constraint() {
        let graph = grid(2);
        let constraints =
            ConstraintSet::new(vec![Constraint::new(4, Point3::origin())]).unwrap();
        let err = ArapEnergy::<f32>::new(
            &graph,
            &constraints,
            EnergyWeights::default(),
            EdgeWeighting::Uniform,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DeformError::ConstraintOutOfRange {
                vertex: 4,
                vertex_count: 4
            }
        ));
    }
}
