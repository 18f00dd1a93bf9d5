//! As-rigid-as-possible landmark deformation.
//!
//! Given a mesh and a sparse set of landmark targets, find vertex positions that hit
//! the landmarks while keeping every one-ring as close to a rigid motion of its rest
//! shape as possible. The energy is minimized by alternating a per-vertex rotation fit
//! with a global position solve; the global solve is delegated to one of three
//! backends, and the [`SolveOrchestrator`] can run several of them on the same problem
//! and compare the results.
//!
//! # Example
//!
//! ```
//! use arap_deform::algo::deform::{deform, BackendKind, BackendSet, SolverConfig};
//! use arap_deform::constraints::{Constraint, ConstraintSet};
//! use arap_deform::mesh::MeshGraph;
//! use nalgebra::Point3;
//!
//! let mut vertices = Vec::new();
//! for j in 0..4 {
//!     for i in 0..4 {
//!         vertices.push(Point3::new(i as f64, j as f64, 0.0));
//!     }
//! }
//! let mut faces = Vec::new();
//! for j in 0..3 {
//!     for i in 0..3 {
//!         let v = j * 4 + i;
//!         faces.push([v, v + 1, v + 5]);
//!         faces.push([v, v + 5, v + 4]);
//!     }
//! }
//! let mut mesh = MeshGraph::from_triangles(&vertices, &faces).unwrap();
//!
//! let landmarks = ConstraintSet::new(vec![
//!     Constraint::new(0, Point3::new(0.0, 0.0, 0.0)),
//!     Constraint::new(15, Point3::new(3.0, 3.0, 1.0)),
//! ])
//! .unwrap();
//!
//! let config = SolverConfig::default()
//!     .with_backends(BackendSet::only(BackendKind::LevenbergMarquardt));
//! let report = deform(&mut mesh, &landmarks, &config).unwrap();
//! assert_eq!(report.committed, BackendKind::LevenbergMarquardt);
//! ```
//!
//! # References
//!
//! - Sorkine, O., & Alexa, M. (2007). "As-Rigid-As-Possible Surface Modeling." SGP 2007.

mod alternation;
pub mod backend;
mod config;
pub mod energy;
mod exec;
mod orchestrator;
pub mod rotation;
mod scalar;
pub mod sparse;

#[cfg(test)]
mod fixtures;

pub use backend::{
    Availability, BackendOutcome, GaussNewtonBackend, GenericNlsBackend,
    LevenbergMarquardtBackend, SolveStatus, SolverBackend, GENERIC_MAX_VERTICES,
};
pub use config::{
    BackendKind, BackendSet, DampingOptions, EdgeWeighting, EnergyWeights, SelectionPolicy,
    SolveMode, SolverConfig,
};
pub use energy::{ArapEnergy, ConstraintError, Linearization, Residuals};
pub use exec::Execution;
pub use orchestrator::{deform, BackendRun, DeformReport, SolveOrchestrator, Unavailable};
pub use rotation::{fit_rotation, Degeneracy, RotationEstimator, RotationField, RotationFit};
pub use scalar::{Precision, Real};
