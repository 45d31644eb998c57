//! Kernel abstraction layer for solid geometry operations.
//!
//! The trait exposes exactly the fixed primitive set scripts may call, so the
//! script bindings never depend on a particular geometry library.

pub mod types;
mod bsp;
mod primitives;
mod polygon;

#[cfg(test)]
mod tests_kernel;
#[cfg(test)]
mod tests_boolean;

pub use polygon::PolygonKernel;
pub use types::*;

use crate::geometry::Point2;
use thiserror::Error;

/// Errors that can occur during kernel operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum KernelOpError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelOpError>;

/// Abstract interface for the primitive geometry operations.
///
/// All sizes are millimeters, all angles radians.
pub trait GeometryKernel: Send + Sync {
    /// Axis-aligned box.
    fn cuboid(&self, params: &CuboidParams) -> KernelResult<Solid>;

    /// UV sphere with poles on Z.
    fn sphere(&self, params: &SphereParams) -> KernelResult<Solid>;

    /// Cylinder along Z, centered on `params.center`.
    fn cylinder(&self, params: &CylinderParams) -> KernelResult<Solid>;

    /// Torus lying in the XY plane.
    fn torus(&self, params: &TorusParams) -> KernelResult<Solid>;

    /// Closed 2D profile for `revolve`.
    fn polygon(&self, points: &[Point2]) -> KernelResult<Profile>;

    /// Revolve a profile (x = radius, y = height) around Z.
    fn revolve(&self, profile: &Profile, params: &RevolveParams) -> KernelResult<Solid>;

    // === Boolean Operations ===

    /// Compute the union of two solids (A ∪ B).
    fn boolean_union(&self, a: &Solid, b: &Solid) -> KernelResult<Solid>;

    /// Compute the difference of two solids (A - B).
    fn boolean_subtract(&self, a: &Solid, b: &Solid) -> KernelResult<Solid>;

    /// Compute the intersection of two solids (A ∩ B).
    fn boolean_intersect(&self, a: &Solid, b: &Solid) -> KernelResult<Solid>;

    // === Transforms ===

    fn translate(&self, solid: &Solid, offset: [f64; 3]) -> KernelResult<Solid>;

    /// Rotation about X, then Y, then Z.
    fn rotate(&self, solid: &Solid, angles: [f64; 3]) -> KernelResult<Solid>;

    fn scale(&self, solid: &Solid, factors: [f64; 3]) -> KernelResult<Solid>;

    fn mirror(&self, solid: &Solid, params: &MirrorParams) -> KernelResult<Solid>;
}

/// Get the default kernel implementation.
pub fn default_kernel() -> PolygonKernel {
    PolygonKernel::new()
}
