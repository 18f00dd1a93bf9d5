//! Per-vertex rigid rotation fitting (the "local" step of ARAP).
//!
//! For a vertex with rest one-ring edges `e_j` and current one-ring edges `e'_j`, the
//! rotation minimizing `Σ w_j |e'_j - R e_j|²` is obtained from the SVD of the
//! covariance `S = Σ w_j e_j e'_jᵀ = U Σ Vᵀ` as `R = V Uᵀ`. A reflection (det < 0) is
//! repaired by negating the column of `U` that belongs to the smallest singular value.
//!
//! # References
//!
//! - Sorkine, O., & Alexa, M. (2007). "As-Rigid-As-Possible Surface Modeling." SGP 2007.

use nalgebra::{Matrix3, Vector3};

use super::exec::Execution;
use super::scalar::Real;
use crate::mesh::{MeshGraph, VertexId};

/// Minimum number of non-degenerate one-ring edges for a rotation to be fitted.
pub const MIN_INDEPENDENT_EDGES: usize = 3;

/// Iteration cap handed to the SVD.
const SVD_MAX_ITERATIONS: usize = 200;

/// Why a one-ring could not produce a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degeneracy {
    /// Fewer than [`MIN_INDEPENDENT_EDGES`] usable rest edges.
    TooFewEdges,
    /// The covariance has rank below two.
    RankDeficient,
    /// The covariance or its decomposition is not finite.
    NonFinite,
}

/// Outcome of fitting a single rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RotationFit<T: Real> {
    /// A proper rotation (orthonormal, det = +1).
    Proper(Matrix3<T>),
    /// The one-ring is degenerate; the identity stands in.
    Degenerate(Degeneracy),
}

impl<T: Real> RotationFit<T> {
    /// The rotation to use, identity for degenerate fits.
    #[inline]
    pub fn matrix(&self) -> Matrix3<T> {
        match self {
            RotationFit::Proper(r) => *r,
            RotationFit::Degenerate(_) => Matrix3::identity(),
        }
    }

    /// Whether the identity fallback was used.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        matches!(self, RotationFit::Degenerate(_))
    }
}

/// Fit the rotation taking weighted rest edges onto current edges.
///
/// Each item is `(weight, rest_edge, current_edge)`.
pub fn fit_rotation<T, I>(edges: I) -> RotationFit<T>
where
    T: Real,
    I: IntoIterator<Item = (T, Vector3<T>, Vector3<T>)>,
{
    let edges: Vec<(T, Vector3<T>, Vector3<T>)> = edges.into_iter().collect();

    let mut covariance = Matrix3::zeros();
    let mut max_len_sq = T::zero();
    for (w, rest, current) in &edges {
        covariance += rest * current.transpose() * *w;
        max_len_sq = max_len_sq.max(rest.norm_squared());
    }

    if !covariance.iter().all(|c| c.is_finite()) {
        return RotationFit::Degenerate(Degeneracy::NonFinite);
    }

    let threshold = max_len_sq * T::default_epsilon();
    let usable = edges
        .iter()
        .filter(|(_, rest, _)| rest.norm_squared() > threshold)
        .count();
    if max_len_sq <= T::zero() || usable < MIN_INDEPENDENT_EDGES {
        return RotationFit::Degenerate(Degeneracy::TooFewEdges);
    }

    closest_rotation(&covariance)
}

/// Closest proper rotation `V Uᵀ` for a covariance `S = U Σ Vᵀ`.
fn closest_rotation<T: Real>(covariance: &Matrix3<T>) -> RotationFit<T> {
    let Some(svd) = covariance.try_svd(true, true, T::default_epsilon(), SVD_MAX_ITERATIONS)
    else {
        return RotationFit::Degenerate(Degeneracy::NonFinite);
    };
    let (Some(mut u), Some(v_t)) = (svd.u, svd.v_t) else {
        return RotationFit::Degenerate(Degeneracy::NonFinite);
    };

    // Order the singular values without relying on the decomposition's ordering.
    let s = svd.singular_values;
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| s[b].partial_cmp(&s[a]).unwrap_or(std::cmp::Ordering::Equal));
    let (largest, middle, smallest) = (s[order[0]], s[order[1]], s[order[2]]);

    if !(largest.is_finite() && smallest.is_finite()) {
        return RotationFit::Degenerate(Degeneracy::NonFinite);
    }
    if largest <= T::zero() || middle <= largest * T::default_epsilon().sqrt() {
        return RotationFit::Degenerate(Degeneracy::RankDeficient);
    }

    let v = v_t.transpose();
    let mut r = v * u.transpose();

    if r.determinant() < T::zero() {
        let k = order[2];
        for row in 0..3 {
            u[(row, k)] = -u[(row, k)];
        }
        r = v * u.transpose();
    }

    RotationFit::Proper(r)
}

/// Rotations for every vertex plus how many fell back to identity.
#[derive(Debug, Clone)]
pub struct RotationField<T: Real> {
    /// One rotation per vertex, indexed by vertex id.
    pub rotations: Vec<Matrix3<T>>,
    /// Number of vertices that used the identity fallback.
    pub degenerate: usize,
}

/// Fits rotations for every vertex of a graph against a position buffer.
#[derive(Debug, Clone, Copy)]
pub struct RotationEstimator<'a, T: Real> {
    graph: &'a MeshGraph,
    rest: &'a [Vector3<T>],
    ring_weights: &'a [Vec<T>],
}

impl<'a, T: Real> RotationEstimator<'a, T> {
    /// Create an estimator.
    ///
    /// `ring_weights[v][k]` is the weight of the edge from `v` to its `k`-th neighbor.
    pub fn new(graph: &'a MeshGraph, rest: &'a [Vector3<T>], ring_weights: &'a [Vec<T>]) -> Self {
        Self {
            graph,
            rest,
            ring_weights,
        }
    }

    /// Fit the rotation of a single vertex.
    pub fn fit_vertex(&self, v: VertexId, positions: &[Vector3<T>]) -> RotationFit<T> {
        let i = v.index();
        let ring = self.graph.neighbors(v);
        fit_rotation(ring.iter().zip(&self.ring_weights[i]).map(|(&u, &w)| {
            let j = u.index();
            (w, self.rest[i] - self.rest[j], positions[i] - positions[j])
        }))
    }

    /// Fit every vertex.
    pub fn estimate(&self, positions: &[Vector3<T>], exec: Execution) -> RotationField<T> {
        let fits = exec.map(self.graph.num_vertices(), |i| {
            self.fit_vertex(VertexId::new(i), positions)
        });
        let degenerate = fits.iter().filter(|f| f.is_degenerate()).count();
        if degenerate > 0 {
            tracing::trace!(degenerate, "identity rotation substituted for degenerate one-rings");
        }
        RotationField {
            rotations: fits.iter().map(RotationFit::matrix).collect(),
            degenerate,
        }
    }
}
