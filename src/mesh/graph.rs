//! Adjacency-based mesh representation.
//!
//! A [`MeshGraph`] is what the deformation solvers consume: rest positions, current
//! positions, symmetric per-vertex neighbor lists and the undirected edge list derived
//! from them. Triangles are optional and only feed diagnostics and cotangent weights.

use nalgebra::{Point3, Vector3};

use super::index::VertexId;
use crate::error::{DeformError, Result};

/// An undirected mesh edge with its rest vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    /// The endpoint with the smaller id.
    pub a: VertexId,
    /// The endpoint with the larger id.
    pub b: VertexId,
    /// `rest[b] - rest[a]`.
    pub rest_vector: Vector3<f64>,
}

impl Edge {
    /// Rest length of the edge.
    #[inline]
    pub fn rest_length(&self) -> f64 {
        self.rest_vector.norm()
    }
}

/// Vertex/edge graph of a mesh with rest and current geometry.
///
/// Rest positions never change after construction. Current positions start equal to
/// the rest positions and are only overwritten when a deformation is committed.
#[derive(Debug, Clone)]
pub struct MeshGraph {
    pub(crate) rest: Vec<Point3<f64>>,
    pub(crate) current: Vec<Point3<f64>>,
    pub(crate) neighbors: Vec<Vec<VertexId>>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) faces: Vec<[VertexId; 3]>,
}

impl MeshGraph {
    // ==================== Accessors ====================

    /// Get the number of vertices.
    #[inline]
    pub fn num_vertices(&self) -> usize {
        self.rest.len()
    }

    /// Get the number of undirected edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Get the number of triangles (zero for graphs built from bare adjacency).
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Whether the graph has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    /// Rest position of a vertex.
    #[inline]
    pub fn rest_position(&self, v: VertexId) -> &Point3<f64> {
        &self.rest[v.index()]
    }

    /// Current position of a vertex.
    #[inline]
    pub fn position(&self, v: VertexId) -> &Point3<f64> {
        &self.current[v.index()]
    }

    /// All rest positions, indexed by vertex id.
    #[inline]
    pub fn rest_positions(&self) -> &[Point3<f64>] {
        &self.rest
    }

    /// All current positions, indexed by vertex id.
    #[inline]
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.current
    }

    /// Neighbors of a vertex (the one-ring).
    #[inline]
    pub fn neighbors(&self, v: VertexId) -> &[VertexId] {
        &self.neighbors[v.index()]
    }

    /// Number of neighbors of a vertex.
    #[inline]
    pub fn valence(&self, v: VertexId) -> usize {
        self.neighbors[v.index()].len()
    }

    /// All undirected edges.
    #[inline]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// All triangles.
    #[inline]
    pub fn faces(&self) -> &[[VertexId; 3]] {
        &self.faces
    }

    /// Iterate over all vertex ids.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.rest.len()).map(VertexId::new)
    }

    // ==================== Geometry ====================

    /// Unnormalized normal of face `f` in the given position buffer.
    ///
    /// # Panics
    /// Panics if `f` is not a face index or `positions` is shorter than the vertex count.
    pub fn face_normal_in(&self, positions: &[Point3<f64>], f: usize) -> Vector3<f64> {
        let [v0, v1, v2] = self.faces[f];
        let p0 = positions[v0.index()];
        let e1 = positions[v1.index()] - p0;
        let e2 = positions[v2.index()] - p0;
        e1.cross(&e2)
    }

    /// Count faces whose normal in `positions` points against the rest normal.
    ///
    /// Faces that are degenerate at rest are skipped.
    ///
    /// # Errors
    ///
    /// [`DeformError::PositionCountMismatch`] if `positions` does not hold one point per
    /// vertex.
    pub fn count_normal_flips(&self, positions: &[Point3<f64>]) -> Result<usize> {
        if positions.len() != self.rest.len() {
            return Err(DeformError::PositionCountMismatch {
                expected: self.rest.len(),
                actual: positions.len(),
            });
        }
        let flips = (0..self.faces.len())
            .filter(|&f| {
                let rest = self.face_normal_in(&self.rest, f);
                if rest.norm_squared() < 1e-24 {
                    return false;
                }
                self.face_normal_in(positions, f).dot(&rest) <= 0.0
            })
            .count();
        Ok(flips)
    }

    /// Largest distance between current and rest position over all vertices.
    pub fn max_displacement(&self) -> f64 {
        self.current
            .iter()
            .zip(&self.rest)
            .map(|(c, r)| (c - r).norm())
            .fold(0.0, f64::max)
    }

    // ==================== Mutation ====================

    /// Overwrite the current positions with a solver result.
    pub(crate) fn commit_positions(&mut self, positions: Vec<Point3<f64>>) -> Result<()> {
        if positions.len() != self.current.len() {
            return Err(DeformError::PositionCountMismatch {
                expected: self.current.len(),
                actual: positions.len(),
            });
        }
        self.current = positions;
        Ok(())
    }

    /// Discard any committed deformation.
    pub fn reset_to_rest(&mut self) {
        self.current.clone_from(&self.rest);
    }
}
