//! Common geometry types for the kernel abstraction layer.
//!
//! Solids are boundary representations: lists of planar polygons whose
//! vertices wind counter-clockwise when seen from outside the solid.

use std::sync::Arc;

use crate::geometry::{newell_normal, signed_area_2d, Matrix4, Point2, Point3, Vector3};

use super::{KernelOpError, KernelResult};

/// Squared distance below which two consecutive polygon vertices are collapsed.
const DUPLICATE_VERTEX_EPSILON_SQ: f64 = 1e-18;

/// Squared length of the Newell normal below which a loop has no usable plane.
const DEGENERATE_NORMAL_EPSILON_SQ: f64 = 1e-24;

pub const MIN_SEGMENTS: u32 = 3;
pub const MAX_SEGMENTS: u32 = 512;

/// An oriented plane `normal · p = w`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vector3,
    pub w: f64,
}

impl Plane {
    pub fn new(normal: Vector3, w: f64) -> Self {
        Self { normal, w }
    }

    pub fn signed_distance(&self, p: &Point3) -> f64 {
        self.normal.dot(&p.coords) - self.w
    }

    pub fn flip(&mut self) {
        self.normal = -self.normal;
        self.w = -self.w;
    }
}

/// A convex-or-not planar loop of at least three vertices.
#[derive(Debug, Clone)]
pub struct Polygon {
    vertices: Vec<Point3>,
    plane: Plane,
}

impl Polygon {
    /// Builds a polygon from a vertex loop, collapsing repeated consecutive
    /// vertices. Returns `None` when the loop has no area.
    pub fn new(points: Vec<Point3>) -> Option<Self> {
        let mut vertices: Vec<Point3> = Vec::with_capacity(points.len());
        for p in points {
            match vertices.last() {
                Some(last) if nalgebra::distance_squared(last, &p) < DUPLICATE_VERTEX_EPSILON_SQ => {}
                _ => vertices.push(p),
            }
        }
        while vertices.len() > 1 {
            let first = vertices[0];
            match vertices.last() {
                Some(last) if nalgebra::distance_squared(last, &first) < DUPLICATE_VERTEX_EPSILON_SQ => {
                    vertices.pop();
                }
                _ => break,
            }
        }
        if vertices.len() < 3 {
            return None;
        }

        let normal = newell_normal(&vertices);
        if normal.norm_squared() < DEGENERATE_NORMAL_EPSILON_SQ {
            return None;
        }
        let normal = normal.normalize();
        let w = normal.dot(&vertices[0].coords);
        Some(Self {
            vertices,
            plane: Plane::new(normal, w),
        })
    }

    /// Used by plane splitting, where the fragment keeps its parent's plane.
    pub(crate) fn with_plane(vertices: Vec<Point3>, plane: Plane) -> Self {
        Self { vertices, plane }
    }

    pub fn vertices(&self) -> &[Point3] {
        &self.vertices
    }

    pub fn plane(&self) -> &Plane {
        &self.plane
    }

    pub fn flip(&mut self) {
        self.vertices.reverse();
        self.plane.flip();
    }

    /// Applies an affine matrix. Orientation-reversing matrices reverse the
    /// loop so the polygon keeps facing outward.
    pub fn transformed(&self, matrix: &Matrix4, reverses_orientation: bool) -> Option<Self> {
        let mut points: Vec<Point3> = self
            .vertices
            .iter()
            .map(|p| matrix.transform_point(p))
            .collect();
        if reverses_orientation {
            points.reverse();
        }
        Self::new(points)
    }
}

/// Opaque, immutable solid. Cloning shares the polygon list.
#[derive(Debug, Clone, Default)]
pub struct Solid {
    polygons: Arc<Vec<Polygon>>,
}

impl Solid {
    pub fn from_polygons(polygons: Vec<Polygon>) -> Self {
        Self {
            polygons: Arc::new(polygons),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn polygons(&self) -> &[Polygon] {
        &self.polygons
    }

    pub fn polygon_count(&self) -> usize {
        self.polygons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.polygons.is_empty()
    }

    /// Whether both handles share the same polygon storage.
    pub fn ptr_eq(&self, other: &Solid) -> bool {
        Arc::ptr_eq(&self.polygons, &other.polygons)
    }

    pub fn bounds(&self) -> Option<(Point3, Point3)> {
        let mut iter = self.polygons.iter().flat_map(|p| p.vertices().iter());
        let first = *iter.next()?;
        let (mut min, mut max) = (first, first);
        for p in iter {
            min = min.inf(p);
            max = max.sup(p);
        }
        Some((min, max))
    }
}

/// A closed 2D profile used by `revolve`.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    points: Vec<Point2>,
}

impl Profile {
    pub fn new(points: Vec<Point2>) -> KernelResult<Self> {
        if points.len() < 3 {
            return Err(KernelOpError::InvalidGeometry(format!(
                "polygon needs at least 3 points, got {}",
                points.len()
            )));
        }
        if points.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(KernelOpError::InvalidGeometry(
                "polygon points must be finite numbers".to_string(),
            ));
        }
        if signed_area_2d(&points).abs() < f64::EPSILON {
            return Err(KernelOpError::InvalidGeometry(
                "polygon has zero area".to_string(),
            ));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn signed_area(&self) -> f64 {
        signed_area_2d(&self.points)
    }

    /// The same loop, counter-clockwise.
    pub fn counter_clockwise(&self) -> Vec<Point2> {
        let mut points = self.points.clone();
        if self.signed_area() < 0.0 {
            points.reverse();
        }
        points
    }
}

/// Parameters for `cuboid`.
#[derive(Debug, Clone)]
pub struct CuboidParams {
    pub size: Vector3,
    pub center: Point3,
}

impl Default for CuboidParams {
    fn default() -> Self {
        Self {
            size: Vector3::new(2.0, 2.0, 2.0),
            center: Point3::origin(),
        }
    }
}

impl CuboidParams {
    pub fn new(size: Vector3) -> Self {
        Self {
            size,
            ..Default::default()
        }
    }

    pub fn with_center(mut self, center: Point3) -> Self {
        self.center = center;
        self
    }
}

/// Parameters for `sphere`.
#[derive(Debug, Clone)]
pub struct SphereParams {
    pub radius: f64,
    pub segments: u32,
    pub center: Point3,
}

impl Default for SphereParams {
    fn default() -> Self {
        Self {
            radius: 1.0,
            segments: 32,
            center: Point3::origin(),
        }
    }
}

impl SphereParams {
    pub fn new(radius: f64) -> Self {
        Self {
            radius,
            ..Default::default()
        }
    }

    pub fn with_segments(mut self, segments: u32) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_center(mut self, center: Point3) -> Self {
        self.center = center;
        self
    }
}

/// Parameters for `cylinder`. The axis is Z.
#[derive(Debug, Clone)]
pub struct CylinderParams {
    pub radius: f64,
    pub height: f64,
    pub segments: u32,
    pub center: Point3,
}

impl Default for CylinderParams {
    fn default() -> Self {
        Self {
            radius: 1.0,
            height: 2.0,
            segments: 32,
            center: Point3::origin(),
        }
    }
}

impl CylinderParams {
    pub fn new(radius: f64, height: f64) -> Self {
        Self {
            radius,
            height,
            ..Default::default()
        }
    }

    pub fn with_segments(mut self, segments: u32) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_center(mut self, center: Point3) -> Self {
        self.center = center;
        self
    }
}

/// Parameters for `torus`. `inner_radius` is the tube, `outer_radius` the ring.
#[derive(Debug, Clone)]
pub struct TorusParams {
    pub inner_radius: f64,
    pub outer_radius: f64,
    pub inner_segments: u32,
    pub outer_segments: u32,
}

impl Default for TorusParams {
    fn default() -> Self {
        Self {
            inner_radius: 1.0,
            outer_radius: 4.0,
            inner_segments: 32,
            outer_segments: 32,
        }
    }
}

impl TorusParams {
    pub fn new(inner_radius: f64, outer_radius: f64) -> Self {
        Self {
            inner_radius,
            outer_radius,
            ..Default::default()
        }
    }

    pub fn with_segments(mut self, inner: u32, outer: u32) -> Self {
        self.inner_segments = inner;
        self.outer_segments = outer;
        self
    }
}

/// Parameters for revolving a profile around Z.
#[derive(Debug, Clone)]
pub struct RevolveParams {
    /// Sweep angle in radians.
    pub angle: f64,
    /// Segments for a full turn; partial sweeps use a proportional share.
    pub segments: u32,
}

impl Default for RevolveParams {
    fn default() -> Self {
        Self {
            angle: std::f64::consts::TAU,
            segments: 32,
        }
    }
}

impl RevolveParams {
    pub fn with_angle(mut self, angle: f64) -> Self {
        self.angle = angle;
        self
    }

    pub fn with_segments(mut self, segments: u32) -> Self {
        self.segments = segments;
        self
    }
}

/// Mirror plane through `origin` with the given `normal`.
#[derive(Debug, Clone)]
pub struct MirrorParams {
    pub normal: Vector3,
    pub origin: Point3,
}

impl MirrorParams {
    pub fn new(normal: Vector3) -> Self {
        Self {
            normal,
            origin: Point3::origin(),
        }
    }

    pub fn with_origin(mut self, origin: Point3) -> Self {
        self.origin = origin;
        self
    }
}
