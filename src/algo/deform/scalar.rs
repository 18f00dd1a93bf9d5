//! Floating-point precision selection.
//!
//! Solvers are generic over [`Real`], implemented for `f32` and `f64`. Mesh data stays
//! in `f64`; buffers are converted on the way in and out of a backend.

use nalgebra::{Point3, RealField, Vector3};

/// Scalar type a backend accumulates in.
pub trait Real: RealField + Copy + Send + Sync + std::fmt::Debug {
    /// Convert from `f64`, rounding if needed.
    fn of(v: f64) -> Self;

    /// Widen to `f64`.
    fn widen(self) -> f64;
}

impl Real for f32 {
    #[inline]
    fn of(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn widen(self) -> f64 {
        self as f64
    }
}

impl Real for f64 {
    #[inline]
    fn of(v: f64) -> Self {
        v
    }

    #[inline]
    fn widen(self) -> f64 {
        self
    }
}

/// Requested accumulation precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    /// `f32`: faster, enough for a handful of alternations.
    #[default]
    Single,
    /// `f64`: stable over many alternations.
    Double,
}

/// Convert mesh positions into a solver buffer.
pub(crate) fn to_solver<T: Real>(positions: &[Point3<f64>]) -> Vec<Vector3<T>> {
    positions.iter().map(|p| p.coords.map(T::of)).collect()
}

/// Convert a solver buffer back into mesh positions.
pub(crate) fn to_mesh<T: Real>(positions: &[Vector3<T>]) -> Vec<Point3<f64>> {
    positions
        .iter()
        .map(|v| Point3::from(v.map(|c| c.widen())))
        .collect()
}
