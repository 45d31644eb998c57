use std::f64::consts::{FRAC_PI_2, PI, TAU};

use super::*;
use crate::geometry::analysis::{bounds, volume};
use crate::geometry::{triangulate, Point2, Point3, Vector3, Watertight};

fn volume_of(solid: &Solid) -> f64 {
    volume(&triangulate(solid, 1e-12).triangles)
}

fn extents(solid: &Solid) -> [f64; 3] {
    let (min, max) = solid.bounds().expect("non-empty solid");
    [max.x - min.x, max.y - min.y, max.z - min.z]
}

fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {} ± {}, got {}",
        expected,
        tolerance,
        actual
    );
}

fn closed(solid: &Solid) -> bool {
    crate::geometry::analysis::watertight(&triangulate(solid, 1e-12).triangles, 1e-5)
        == Watertight::Verified
}

#[test]
fn test_cuboid_faces_point_outward() {
    let kernel = PolygonKernel::new();
    let center = Point3::new(1.0, -2.0, 3.0);
    let solid = kernel
        .cuboid(&CuboidParams::new(Vector3::new(2.0, 3.0, 4.0)).with_center(center))
        .unwrap();

    assert_eq!(solid.polygon_count(), 6);
    for polygon in solid.polygons() {
        let n = polygon.vertices().len() as f64;
        let centroid = polygon
            .vertices()
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p.coords)
            / n;
        assert!(polygon.plane().normal.dot(&(centroid - center.coords)) > 0.0);
    }
    assert_close(volume_of(&solid), 24.0, 1e-9);
    assert!(closed(&solid));
}

#[test]
fn test_cuboid_rejects_non_positive_size() {
    let kernel = PolygonKernel::new();
    let result = kernel.cuboid(&CuboidParams::new(Vector3::new(1.0, 0.0, 1.0)));
    assert!(matches!(result, Err(KernelOpError::InvalidParameter(_))));
}

#[test]
fn test_sphere_is_closed_and_near_analytic_volume() {
    let kernel = PolygonKernel::new();
    let solid = kernel.sphere(&SphereParams::new(5.0).with_segments(48)).unwrap();
    let analytic = 4.0 / 3.0 * PI * 125.0;
    let v = volume_of(&solid);
    assert!(v > 0.0);
    assert!((v - analytic).abs() / analytic < 0.03, "volume {}", v);
    assert!(closed(&solid));
}

#[test]
fn test_cylinder_volume_matches_inscribed_prism() {
    let kernel = PolygonKernel::new();
    let n = 32u32;
    let solid = kernel
        .cylinder(&CylinderParams::new(3.0, 10.0).with_segments(n))
        .unwrap();
    let base_area = 0.5 * n as f64 * 9.0 * (TAU / n as f64).sin();
    assert_close(volume_of(&solid), base_area * 10.0, 1e-6);
    assert!(closed(&solid));

    let [_, _, height] = extents(&solid);
    assert_close(height, 10.0, 1e-9);
}

#[test]
fn test_torus_requires_tube_smaller_than_ring() {
    let kernel = PolygonKernel::new();
    assert!(kernel.torus(&TorusParams::new(2.0, 5.0)).is_ok());
    let err = kernel.torus(&TorusParams::new(5.0, 2.0)).unwrap_err();
    assert!(err.to_string().contains("innerRadius"));
}

#[test]
fn test_torus_lies_in_xy_plane() {
    let kernel = PolygonKernel::new();
    let solid = kernel.torus(&TorusParams::new(1.0, 4.0)).unwrap();
    let [x, y, z] = extents(&solid);
    assert_close(x, 10.0, 1e-6);
    assert_close(y, 10.0, 0.05);
    assert_close(z, 2.0, 1e-6);
    assert!(closed(&solid));
}

#[test]
fn test_segment_count_is_bounded() {
    let kernel = PolygonKernel::new();
    assert!(kernel.sphere(&SphereParams::new(1.0).with_segments(2)).is_err());
    assert!(kernel
        .cylinder(&CylinderParams::new(1.0, 1.0).with_segments(MAX_SEGMENTS + 1))
        .is_err());
}

fn washer_profile(kernel: &PolygonKernel) -> Profile {
    kernel
        .polygon(&[
            Point2::new(1.0, 0.0),
            Point2::new(2.0, 0.0),
            Point2::new(2.0, 1.0),
            Point2::new(1.0, 1.0),
        ])
        .unwrap()
}

#[test]
fn test_revolve_full_turn() {
    let kernel = PolygonKernel::new();
    let n = 32u32;
    let solid = kernel
        .revolve(&washer_profile(&kernel), &RevolveParams::default().with_segments(n))
        .unwrap();
    let ring_area = 0.5 * n as f64 * (TAU / n as f64).sin() * (4.0 - 1.0);
    assert_close(volume_of(&solid), ring_area, 1e-6);
    assert!(closed(&solid));
}

#[test]
fn test_revolve_partial_turn_is_capped() {
    let kernel = PolygonKernel::new();
    let full = kernel
        .revolve(&washer_profile(&kernel), &RevolveParams::default())
        .unwrap();
    let half = kernel
        .revolve(&washer_profile(&kernel), &RevolveParams::default().with_angle(PI))
        .unwrap();
    assert_close(volume_of(&half), volume_of(&full) / 2.0, 1e-6);
    assert!(closed(&half));
}

#[test]
fn test_revolve_accepts_clockwise_profile() {
    let kernel = PolygonKernel::new();
    let clockwise = kernel
        .polygon(&[
            Point2::new(1.0, 1.0),
            Point2::new(2.0, 1.0),
            Point2::new(2.0, 0.0),
            Point2::new(1.0, 0.0),
        ])
        .unwrap();
    let solid = kernel.revolve(&clockwise, &RevolveParams::default()).unwrap();
    assert!(volume_of(&solid) > 0.0);
}

#[test]
fn test_revolve_profile_touching_axis() {
    let kernel = PolygonKernel::new();
    // A right triangle against the axis revolves into a cone
    let cone = kernel
        .polygon(&[Point2::new(0.0, 0.0), Point2::new(3.0, 0.0), Point2::new(0.0, 4.0)])
        .unwrap();
    let solid = kernel
        .revolve(&cone, &RevolveParams::default().with_segments(64))
        .unwrap();
    let analytic = PI * 9.0 * 4.0 / 3.0;
    assert!((volume_of(&solid) - analytic).abs() / analytic < 0.01);
    assert!(closed(&solid));
}

#[test]
fn test_revolve_rejects_profile_crossing_axis() {
    let kernel = PolygonKernel::new();
    let crossing = kernel
        .polygon(&[Point2::new(-1.0, 0.0), Point2::new(2.0, 0.0), Point2::new(2.0, 1.0)])
        .unwrap();
    assert!(kernel.revolve(&crossing, &RevolveParams::default()).is_err());
}

#[test]
fn test_polygon_validation() {
    let kernel = PolygonKernel::new();
    assert!(kernel
        .polygon(&[Point2::new(0.0, 0.0), Point2::new(1.0, 0.0)])
        .is_err());
    let collinear = kernel.polygon(&[
        Point2::new(0.0, 0.0),
        Point2::new(1.0, 0.0),
        Point2::new(2.0, 0.0),
    ]);
    assert!(matches!(collinear, Err(KernelOpError::InvalidGeometry(_))));
}

#[test]
fn test_translate_moves_bounds() {
    let kernel = PolygonKernel::new();
    let cube = kernel.cuboid(&CuboidParams::default()).unwrap();
    let moved = kernel.translate(&cube, [10.0, 0.0, -5.0]).unwrap();
    let (min, max) = moved.bounds().unwrap();
    assert_close(min.x, 9.0, 1e-12);
    assert_close(max.z, -4.0, 1e-12);
}

#[test]
fn test_rotate_applies_x_then_y_then_z() {
    let kernel = PolygonKernel::new();
    let block = kernel
        .cuboid(&CuboidParams::new(Vector3::new(2.0, 4.0, 6.0)))
        .unwrap();
    let turned = kernel.rotate(&block, [FRAC_PI_2, FRAC_PI_2, 0.0]).unwrap();
    let [x, y, z] = extents(&turned);
    assert_close(x, 4.0, 1e-9);
    assert_close(y, 6.0, 1e-9);
    assert_close(z, 2.0, 1e-9);
    assert_close(volume_of(&turned), 48.0, 1e-9);
}

#[test]
fn test_scale_rejects_zero_and_keeps_orientation_when_negative() {
    let kernel = PolygonKernel::new();
    let cube = kernel.cuboid(&CuboidParams::default()).unwrap();
    assert!(kernel.scale(&cube, [1.0, 0.0, 1.0]).is_err());

    let flipped = kernel.scale(&cube, [-2.0, 1.0, 1.0]).unwrap();
    assert_close(volume_of(&flipped), 16.0, 1e-9);
}

#[test]
fn test_mirror_restores_outward_winding() {
    let kernel = PolygonKernel::new();
    let cube = kernel
        .cuboid(&CuboidParams::default().with_center(Point3::new(3.0, 0.0, 0.0)))
        .unwrap();

    let mirrored = kernel.mirror(&cube, &MirrorParams::new(Vector3::x())).unwrap();
    let (min, max) = mirrored.bounds().unwrap();
    assert_close((min.x + max.x) / 2.0, -3.0, 1e-9);
    assert_close(volume_of(&mirrored), 8.0, 1e-9);

    let about_one = kernel
        .mirror(
            &cube,
            &MirrorParams::new(Vector3::new(2.0, 0.0, 0.0)).with_origin(Point3::new(1.0, 0.0, 0.0)),
        )
        .unwrap();
    let (min, max) = about_one.bounds().unwrap();
    assert_close((min.x + max.x) / 2.0, -1.0, 1e-9);

    assert!(kernel.mirror(&cube, &MirrorParams::new(Vector3::zeros())).is_err());
}

#[test]
fn test_triangulated_bounds_match_solid_bounds() {
    let kernel = PolygonKernel::new();
    let solid = kernel.sphere(&SphereParams::new(2.0)).unwrap();
    let aabb = bounds(&triangulate(&solid, 1e-12).triangles).unwrap();
    let (min, max) = solid.bounds().unwrap();
    assert_eq!(aabb.min, [min.x, min.y, min.z]);
    assert_eq!(aabb.max, [max.x, max.y, max.z]);
}
