//! Mesh processing algorithms.
//!
//! - **Deformation**: as-rigid-as-possible landmark deformation with interchangeable
//!   nonlinear least-squares backends ([`deform`])

pub mod deform;
mod progress;

pub use progress::Progress;
