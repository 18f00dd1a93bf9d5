//! Core mesh data structures.
//!
//! The primary type is [`MeshGraph`]: rest and current vertex positions plus
//! symmetric one-ring adjacency, which is everything the deformation energy needs.
//!
//! # Index Types
//!
//! - [`VertexId`] - Identifies a vertex; the id is its slot in every position buffer
//!
//! # Construction
//!
//! ```
//! use arap_deform::mesh::MeshGraph;
//! use nalgebra::Point3;
//!
//! let vertices = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.5, 1.0, 0.0),
//! ];
//! let faces = vec![[0, 1, 2]];
//!
//! let mesh = MeshGraph::from_triangles(&vertices, &faces).unwrap();
//! ```

mod builder;
mod graph;
mod index;

pub use builder::MeshSource;
pub use graph::{Edge, MeshGraph};
pub use index::VertexId;
