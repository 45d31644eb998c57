//! Polygon-soup kernel with BSP booleans.

use nalgebra::{Rotation3, Translation3};

use super::types::*;
use super::{bsp, primitives, GeometryKernel, KernelOpError, KernelResult};
use crate::geometry::{Matrix4, Point2, Vector3};

/// Default geometry kernel: solids as planar polygon lists.
#[derive(Debug, Clone, Default)]
pub struct PolygonKernel;

impl PolygonKernel {
    pub fn new() -> Self {
        Self
    }

    fn transformed(&self, solid: &Solid, matrix: &Matrix4) -> KernelResult<Solid> {
        if matrix.iter().any(|c| !c.is_finite()) {
            return Err(KernelOpError::InvalidParameter(
                "transform contains non-finite values".to_string(),
            ));
        }
        let reverses = matrix.fixed_view::<3, 3>(0, 0).clone_owned().determinant() < 0.0;
        let polygons = solid
            .polygons()
            .iter()
            .filter_map(|p| p.transformed(matrix, reverses))
            .collect();
        Ok(Solid::from_polygons(polygons))
    }
}

fn check_operands(op: &str, a: &Solid, b: &Solid) -> KernelResult<()> {
    if a.is_empty() || b.is_empty() {
        return Err(KernelOpError::InvalidGeometry(format!(
            "{} of an empty solid",
            op
        )));
    }
    Ok(())
}

fn check_vector(name: &str, v: [f64; 3]) -> KernelResult<()> {
    if v.iter().any(|c| !c.is_finite()) {
        return Err(KernelOpError::InvalidParameter(format!(
            "{} must contain finite numbers, got {:?}",
            name, v
        )));
    }
    Ok(())
}

impl GeometryKernel for PolygonKernel {
    fn cuboid(&self, params: &CuboidParams) -> KernelResult<Solid> {
        primitives::cuboid(params).map(Solid::from_polygons)
    }

    fn sphere(&self, params: &SphereParams) -> KernelResult<Solid> {
        primitives::sphere(params).map(Solid::from_polygons)
    }

    fn cylinder(&self, params: &CylinderParams) -> KernelResult<Solid> {
        primitives::cylinder(params).map(Solid::from_polygons)
    }

    fn torus(&self, params: &TorusParams) -> KernelResult<Solid> {
        primitives::torus(params).map(Solid::from_polygons)
    }

    fn polygon(&self, points: &[Point2]) -> KernelResult<Profile> {
        primitives::polygon(points)
    }

    fn revolve(&self, profile: &Profile, params: &RevolveParams) -> KernelResult<Solid> {
        primitives::revolve(profile, params).map(Solid::from_polygons)
    }

    // === Boolean Operations ===

    fn boolean_union(&self, a: &Solid, b: &Solid) -> KernelResult<Solid> {
        check_operands("union", a, b)?;
        let polygons = bsp::union(a.polygons().to_vec(), b.polygons().to_vec());
        Ok(Solid::from_polygons(polygons))
    }

    fn boolean_subtract(&self, a: &Solid, b: &Solid) -> KernelResult<Solid> {
        check_operands("subtract", a, b)?;
        let polygons = bsp::subtract(a.polygons().to_vec(), b.polygons().to_vec());
        Ok(Solid::from_polygons(polygons))
    }

    fn boolean_intersect(&self, a: &Solid, b: &Solid) -> KernelResult<Solid> {
        check_operands("intersect", a, b)?;
        let polygons = bsp::intersect(a.polygons().to_vec(), b.polygons().to_vec());
        Ok(Solid::from_polygons(polygons))
    }

    // === Transforms ===

    fn translate(&self, solid: &Solid, offset: [f64; 3]) -> KernelResult<Solid> {
        check_vector("translate offset", offset)?;
        let matrix = Translation3::new(offset[0], offset[1], offset[2]).to_homogeneous();
        self.transformed(solid, &matrix)
    }

    fn rotate(&self, solid: &Solid, angles: [f64; 3]) -> KernelResult<Solid> {
        check_vector("rotate angles", angles)?;
        let matrix = Rotation3::from_euler_angles(angles[0], angles[1], angles[2]).to_homogeneous();
        self.transformed(solid, &matrix)
    }

    fn scale(&self, solid: &Solid, factors: [f64; 3]) -> KernelResult<Solid> {
        check_vector("scale factors", factors)?;
        if factors.iter().any(|f| *f == 0.0) {
            return Err(KernelOpError::InvalidParameter(format!(
                "scale factors must be non-zero, got {:?}",
                factors
            )));
        }
        let matrix = Matrix4::new_nonuniform_scaling(&Vector3::from(factors));
        self.transformed(solid, &matrix)
    }

    fn mirror(&self, solid: &Solid, params: &MirrorParams) -> KernelResult<Solid> {
        check_vector("mirror normal", params.normal.into())?;
        check_vector("mirror origin", params.origin.coords.into())?;
        let length = params.normal.norm();
        if length < 1e-12 {
            return Err(KernelOpError::InvalidParameter(
                "mirror normal must not be the zero vector".to_string(),
            ));
        }
        let n = params.normal / length;
        // p' = p - 2((p - o)·n)n
        let linear = nalgebra::Matrix3::identity() - n * n.transpose() * 2.0;
        let offset = n * (2.0 * n.dot(&params.origin.coords));
        let mut matrix = linear.to_homogeneous();
        matrix.fixed_view_mut::<3, 1>(0, 3).copy_from(&offset);
        self.transformed(solid, &matrix)
    }
}
