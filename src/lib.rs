//! # arap-deform
//!
//! As-rigid-as-possible (ARAP) mesh deformation driven by sparse landmark constraints.
//!
//! The crate holds a lightweight mesh graph (rest and current positions plus one-ring
//! adjacency), a landmark set, the ARAP energy, and three interchangeable solver
//! backends for it. An orchestrator runs the enabled backends on the same problem,
//! picks one result and writes it back into the mesh.
//!
//! ## Features
//!
//! - **Three backends**: dense reference solve, Levenberg-Marquardt on a sparse system,
//!   and a data-parallel matrix-free Gauss-Newton
//! - **Single or double precision**: backends are generic over the scalar type
//! - **Result comparison**: per-backend timings, residuals and deviation from the
//!   committed result
//! - **Configuration errors up front**: nothing runs until the mesh, landmarks and
//!   options are validated
//!
//! ## Quick Start
//!
//! ```
//! use arap_deform::prelude::*;
//! use nalgebra::Point3;
//!
//! // A tetrahedron
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//!     Point3::new(0.5, 0.5, 1.0),
//! ];
//! let faces = vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]];
//! let mut mesh = MeshGraph::from_triangles(&vertices, &faces).unwrap();
//!
//! // Keep the base vertex, lift the apex
//! let landmarks = ConstraintSet::new(vec![
//!     Constraint::new(0, Point3::new(0.0, 0.0, 0.0)),
//!     Constraint::new(3, Point3::new(0.5, 0.5, 1.5)),
//! ])
//! .unwrap();
//!
//! let report = deform(&mut mesh, &landmarks, &SolverConfig::default()).unwrap();
//! println!("committed {} ({:?})", report.committed, report.status);
//! for run in &report.runs {
//!     println!("{}: {:?} in {:?}", run.kind, run.status, run.elapsed);
//! }
//! ```
//!
//! ## Logging
//!
//! The crate logs through [`tracing`]: one span per deformation and per backend run,
//! alternation details at `debug`, summaries at `info`, and unavailable backends,
//! divergence or disagreement between backends at `warn`. No subscriber is installed.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod constraints;
pub mod error;
pub mod mesh;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use arap_deform::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::deform::{
        deform, BackendKind, BackendSet, DeformReport, EdgeWeighting, EnergyWeights, Precision,
        SelectionPolicy, SolveMode, SolveOrchestrator, SolveStatus, SolverConfig,
    };
    pub use crate::algo::Progress;
    pub use crate::constraints::{Constraint, ConstraintSet, ConstraintSource};
    pub use crate::error::{DeformError, Result};
    pub use crate::mesh::{MeshGraph, MeshSource, VertexId};
}

// Re-export nalgebra types for convenience
pub use nalgebra;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use nalgebra::Point3;

    #[test]
    fn test_tetrahedron() {
        let vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.5, 1.0, 0.0),
            Point3::new(0.5, 0.5, 1.0),
        ];

        let faces = vec![
            [0, 2, 1], // bottom
            [0, 1, 3], // front
            [1, 2, 3], // right
            [2, 0, 3], // left
        ];

        let mut mesh = MeshGraph::from_triangles(&vertices, &faces).unwrap();
        assert_eq!(mesh.num_vertices(), 4);
        assert_eq!(mesh.num_edges(), 6);

        // Every vertex of a tetrahedron sees the other three
        for v in mesh.vertex_ids() {
            assert_eq!(mesh.valence(v), 3, "vertex {:?}", v);
        }

        let landmarks = ConstraintSet::new(vec![
            Constraint::new(0, Point3::new(0.0, 0.0, 0.0)),
            Constraint::new(3, Point3::new(0.5, 0.5, 1.5)),
        ])
        .unwrap();
        let config = SolverConfig::default().with_precision(Precision::Double);
        let report = deform(&mut mesh, &landmarks, &config).unwrap();

        assert_ne!(report.status, SolveStatus::Diverged);
        assert!((mesh.position(VertexId::new(3)).z - 1.5).abs() < 0.05);
        assert_eq!(mesh.count_normal_flips(mesh.positions()), Ok(0));
    }
}
