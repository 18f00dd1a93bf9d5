//! Error types for arap-deform.
//!
//! Only configuration problems are errors. Convergence trouble is reported through
//! [`SolveStatus`](crate::algo::deform::SolveStatus) and local numeric degeneracies are
//! recovered inside the solvers.

use thiserror::Error;

/// Result type alias using [`DeformError`].
pub type Result<T> = std::result::Result<T, DeformError>;

/// Errors that can occur while building inputs or setting up a solve.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeformError {
    /// The mesh has no vertices.
    #[error("mesh has no vertices")]
    EmptyMesh,

    /// A face references an invalid vertex index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face has duplicate vertex indices.
    #[error("face {face} is degenerate (has duplicate vertices)")]
    DegenerateFace {
        /// The face index.
        face: usize,
    },

    /// Neighbor lists handed in by a mesh source are inconsistent.
    #[error("invalid adjacency at vertex {vertex}: {reason}")]
    InvalidAdjacency {
        /// The vertex whose neighbor list is broken.
        vertex: usize,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// A constraint targets a vertex that does not exist.
    #[error("constraint on vertex {vertex} is out of range (mesh has {vertex_count} vertices)")]
    ConstraintOutOfRange {
        /// The constrained vertex id.
        vertex: usize,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// The same vertex is constrained twice.
    #[error("vertex {vertex} is constrained more than once")]
    DuplicateConstraint {
        /// The duplicated vertex id.
        vertex: usize,
    },

    /// A position buffer does not match the vertex count.
    #[error("expected {expected} positions, got {actual}")]
    PositionCountMismatch {
        /// Number of vertices in the mesh.
        expected: usize,
        /// Length of the buffer that was supplied.
        actual: usize,
    },

    /// The configuration enables no backend at all.
    #[error("no solver backend is enabled")]
    NoBackendsEnabled,

    /// Every enabled backend was rejected at selection time.
    #[error("no enabled solver backend is available: {reasons}")]
    NoBackendAvailable {
        /// Per-backend rejection reasons, joined.
        reasons: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl DeformError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        DeformError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Whether this error belongs to the configuration class, i.e. it is raised
    /// before any solver runs.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            DeformError::EmptyMesh
                | DeformError::InvalidVertexIndex { .. }
                | DeformError::DegenerateFace { .. }
                | DeformError::InvalidAdjacency { .. }
                | DeformError::ConstraintOutOfRange { .. }
                | DeformError::DuplicateConstraint { .. }
                | DeformError::PositionCountMismatch { .. }
                | DeformError::NoBackendsEnabled
                | DeformError::NoBackendAvailable { .. }
                | DeformError::InvalidParameter { .. }
        )
    }
}
