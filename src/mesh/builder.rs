//! Mesh graph construction.
//!
//! Graphs are built either from a triangle list (neighbors derived from the faces) or
//! from a [`MeshSource`] that already knows the adjacency. File formats are handled by
//! the caller.

use std::collections::BTreeSet;

use nalgebra::Point3;

use super::graph::{Edge, MeshGraph};
use super::index::VertexId;
use crate::error::{DeformError, Result};

/// Supplier of rest geometry and pre-built adjacency.
///
/// Vertex `i` of the source becomes `VertexId::new(i)` in the graph.
pub trait MeshSource {
    /// Number of vertices.
    fn vertex_count(&self) -> usize;

    /// Rest position of vertex `i`.
    fn rest_position(&self, i: usize) -> Point3<f64>;

    /// Neighbor indices of vertex `i`.
    fn neighbors(&self, i: usize) -> &[usize];
}

impl MeshGraph {
    /// Build a graph from vertices and triangle faces.
    ///
    /// # Arguments
    /// * `vertices` - List of vertex positions
    /// * `faces` - List of triangle faces, each as [v0, v1, v2] indices
    ///
    /// # Example
    /// ```
    /// use arap_deform::mesh::MeshGraph;
    /// use nalgebra::Point3;
    ///
    /// let vertices = vec![
    ///     Point3::new(0.0, 0.0, 0.0),
    ///     Point3::new(1.0, 0.0, 0.0),
    ///     Point3::new(0.5, 1.0, 0.0),
    /// ];
    /// let mesh = MeshGraph::from_triangles(&vertices, &[[0, 1, 2]]).unwrap();
    /// assert_eq!(mesh.num_vertices(), 3);
    /// assert_eq!(mesh.num_edges(), 3);
    /// ```
    pub fn from_triangles(vertices: &[Point3<f64>], faces: &[[usize; 3]]) -> Result<Self> {
        if vertices.is_empty() {
            return Err(DeformError::EmptyMesh);
        }

        for (fi, face) in faces.iter().enumerate() {
            for &vi in face {
                if vi >= vertices.len() {
                    return Err(DeformError::InvalidVertexIndex { face: fi, vertex: vi });
                }
            }
            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                return Err(DeformError::DegenerateFace { face: fi });
            }
        }

        let mut rings: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); vertices.len()];
        for face in faces {
            for i in 0..3 {
                let v0 = face[i];
                let v1 = face[(i + 1) % 3];
                rings[v0].insert(v1);
                rings[v1].insert(v0);
            }
        }

        let faces = faces
            .iter()
            .map(|f| [VertexId::new(f[0]), VertexId::new(f[1]), VertexId::new(f[2])])
            .collect();

        Ok(assemble(vertices.to_vec(), rings, faces))
    }

    /// Build a graph from positions and explicit neighbor lists.
    ///
    /// Neighbor lists must be in range, free of self loops and symmetric. Duplicate
    /// entries are merged.
    pub fn from_adjacency(positions: &[Point3<f64>], neighbors: &[Vec<usize>]) -> Result<Self> {
        if positions.is_empty() {
            return Err(DeformError::EmptyMesh);
        }
        if neighbors.len() != positions.len() {
            return Err(DeformError::PositionCountMismatch {
                expected: neighbors.len(),
                actual: positions.len(),
            });
        }

        let n = positions.len();
        let mut rings: Vec<BTreeSet<usize>> = Vec::with_capacity(n);
        for (v, list) in neighbors.iter().enumerate() {
            let mut ring = BTreeSet::new();
            for &u in list {
                if u >= n {
                    return Err(DeformError::InvalidAdjacency {
                        vertex: v,
                        reason: "neighbor index out of range",
                    });
                }
                if u == v {
                    return Err(DeformError::InvalidAdjacency {
                        vertex: v,
                        reason: "vertex lists itself as a neighbor",
                    });
                }
                ring.insert(u);
            }
            rings.push(ring);
        }

        for (v, ring) in rings.iter().enumerate() {
            if ring.iter().any(|&u| !rings[u].contains(&v)) {
                return Err(DeformError::InvalidAdjacency {
                    vertex: v,
                    reason: "adjacency is not symmetric",
                });
            }
        }

        Ok(assemble(positions.to_vec(), rings, Vec::new()))
    }

    /// Build a graph from any [`MeshSource`].
    pub fn from_source<S: MeshSource + ?Sized>(source: &S) -> Result<Self> {
        let n = source.vertex_count();
        let positions: Vec<Point3<f64>> = (0..n).map(|i| source.rest_position(i)).collect();
        let neighbors: Vec<Vec<usize>> = (0..n).map(|i| source.neighbors(i).to_vec()).collect();
        Self::from_adjacency(&positions, &neighbors)
    }
}

/// Turn sorted one-rings into the final graph.
fn assemble(
    rest: Vec<Point3<f64>>,
    rings: Vec<BTreeSet<usize>>,
    faces: Vec<[VertexId; 3]>,
) -> MeshGraph {
    let mut edges = Vec::new();
    for (a, ring) in rings.iter().enumerate() {
        for &b in ring.range(a + 1..) {
            edges.push(Edge {
                a: VertexId::new(a),
                b: VertexId::new(b),
                rest_vector: rest[b] - rest[a],
            });
        }
    }

    let neighbors = rings
        .into_iter()
        .map(|ring| ring.into_iter().map(VertexId::new).collect())
        .collect();

    MeshGraph {
        current: rest.clone(),
        rest,
        neighbors,
        edges,
        faces,
    }
}
