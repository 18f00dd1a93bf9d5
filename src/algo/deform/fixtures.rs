//! Small meshes shared by the solver tests.

use nalgebra::{Point3, Vector3};

use crate::constraints::{Constraint, ConstraintSet};
use crate::mesh::{MeshGraph, VertexId};

/// Planar `n x n` vertex grid with unit spacing in the z = 0 plane.
pub(crate) fn grid(n: usize) -> MeshGraph {
    let mut vertices = Vec::with_capacity(n * n);
    for j in 0..n {
        for i in 0..n {
            vertices.push(Point3::new(i as f64, j as f64, 0.0));
        }
    }

    let mut faces = Vec::with_capacity(2 * (n - 1) * (n - 1));
    for j in 0..n - 1 {
        for i in 0..n - 1 {
            let v = j * n + i;
            faces.push([v, v + 1, v + n + 1]);
            faces.push([v, v + n + 1, v + n]);
        }
    }

    MeshGraph::from_triangles(&vertices, &faces).unwrap()
}

/// Closed unit cube made of 12 triangles.
pub(crate) fn cube() -> MeshGraph {
    let vertices = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(1.0, 1.0, 0.0),
        Point3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 1.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(0.0, 1.0, 1.0),
    ];
    let faces = [
        [0, 2, 1],
        [0, 3, 2],
        [4, 5, 6],
        [4, 6, 7],
        [0, 1, 5],
        [0, 5, 4],
        [1, 2, 6],
        [1, 6, 5],
        [2, 3, 7],
        [2, 7, 6],
        [3, 0, 4],
        [3, 4, 7],
    ];
    MeshGraph::from_triangles(&vertices, &faces).unwrap()
}

/// Pins the first corner of an `n x n` grid and lifts the opposite corner by one unit.
pub(crate) fn lifted_corner(graph: &MeshGraph, n: usize) -> ConstraintSet {
    let last = n * n - 1;
    ConstraintSet::new(vec![
        Constraint::new(0, *graph.rest_position(VertexId::new(0))),
        Constraint::new(
            last,
            graph.rest_position(VertexId::new(last)) + Vector3::new(0.0, 0.0, 1.0),
        ),
    ])
    .unwrap()
}
