//! Landmark constraints.
//!
//! A [`ConstraintSet`] pins individual vertices to target positions. Ids are checked
//! for uniqueness here; the range check against a concrete mesh happens when a solve
//! is set up, since the set is built independently of the mesh.

use std::collections::HashSet;

use nalgebra::Point3;

use crate::error::{DeformError, Result};
use crate::mesh::VertexId;

/// A single landmark: vertex `vertex` should end up at `target`.
///
/// The id stays a raw index until it has been checked against a mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    /// Index of the constrained vertex.
    pub vertex: usize,
    /// Where the vertex should move.
    pub target: Point3<f64>,
}

impl Constraint {
    /// Create a constraint from a raw vertex index.
    pub fn new(vertex: usize, target: Point3<f64>) -> Self {
        Self { vertex, target }
    }

    /// The constrained vertex as a typed id.
    ///
    /// Only meaningful once the set passed [`ConstraintSet::validate`].
    #[inline]
    pub fn vertex_id(&self) -> VertexId {
        VertexId::new(self.vertex)
    }
}

/// Supplier of ordered `(vertex index, target)` pairs, e.g. a landmark file reader.
pub trait ConstraintSource {
    /// The landmarks in file order.
    fn landmarks(&self) -> Vec<(usize, Point3<f64>)>;
}

impl ConstraintSource for [(usize, Point3<f64>)] {
    fn landmarks(&self) -> Vec<(usize, Point3<f64>)> {
        self.to_vec()
    }
}

impl ConstraintSource for Vec<(usize, Point3<f64>)> {
    fn landmarks(&self) -> Vec<(usize, Point3<f64>)> {
        self.clone()
    }
}

/// Immutable set of landmark constraints with unique vertex ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintSet {
    constraints: Vec<Constraint>,
}

impl ConstraintSet {
    /// An empty set (pure rigidity, no data term).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a set, rejecting duplicate vertex ids.
    pub fn new(constraints: Vec<Constraint>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(constraints.len());
        for c in &constraints {
            if !seen.insert(c.vertex) {
                return Err(DeformError::DuplicateConstraint { vertex: c.vertex });
            }
        }
        Ok(Self { constraints })
    }

    /// Build a set from a [`ConstraintSource`].
    pub fn from_source<S: ConstraintSource + ?Sized>(source: &S) -> Result<Self> {
        Self::new(
            source
                .landmarks()
                .into_iter()
                .map(|(v, target)| Constraint::new(v, target))
                .collect(),
        )
    }

    /// Number of constraints.
    #[inline]
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    /// Whether there are no constraints.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Iterate over constraints in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Constraint> + '_ {
        self.constraints.iter()
    }

    /// Constraints as a slice.
    #[inline]
    pub fn as_slice(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Check every id against a vertex count.
    ///
    /// # Errors
    ///
    /// Returns [`DeformError::ConstraintOutOfRange`] for the first id that is not
    /// smaller than `vertex_count`.
    pub fn validate(&self, vertex_count: usize) -> Result<()> {
        match self
            .constraints
            .iter()
            .find(|c| c.vertex >= vertex_count)
        {
            Some(c) => Err(DeformError::ConstraintOutOfRange {
                vertex: c.vertex,
                vertex_count,
            }),
            None => Ok(()),
        }
    }
}

impl<'a> IntoIterator for &'a ConstraintSet {
    type Item = &'a Constraint;
    type IntoIter = std::slice::Iter<'a, Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.constraints.iter()
    }
}
