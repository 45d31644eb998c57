// BSP boolean checks, measured by enclosed volume

use super::*;
use crate::geometry::analysis::volume;
use crate::geometry::{triangulate, Point3, Vector3};

fn volume_of(solid: &Solid) -> f64 {
    volume(&triangulate(solid, 1e-12).triangles)
}

fn unit_pair(kernel: &PolygonKernel) -> (Solid, Solid) {
    // Two 2mm cubes overlapping by half along X
    let a = kernel.cuboid(&CuboidParams::default()).unwrap();
    let b = kernel
        .cuboid(&CuboidParams::default().with_center(Point3::new(1.0, 0.0, 0.0)))
        .unwrap();
    (a, b)
}

#[test]
fn test_union_overlapping_cubes() {
    let kernel = PolygonKernel::new();
    let (a, b) = unit_pair(&kernel);
    let result = kernel.boolean_union(&a, &b).unwrap();
    let v = volume_of(&result);
    println!("union volume = {}", v);
    assert!((v - 12.0).abs() < 1e-6);
}

#[test]
fn test_subtract_overlapping_cubes() {
    let kernel = PolygonKernel::new();
    let (a, b) = unit_pair(&kernel);
    let result = kernel.boolean_subtract(&a, &b).unwrap();
    assert!((volume_of(&result) - 4.0).abs() < 1e-6);

    let (min, max) = result.bounds().unwrap();
    assert!((min.x + 1.0).abs() < 1e-9);
    assert!(max.x.abs() < 1e-9);
}

#[test]
fn test_intersect_overlapping_cubes() {
    let kernel = PolygonKernel::new();
    let (a, b) = unit_pair(&kernel);
    let result = kernel.boolean_intersect(&a, &b).unwrap();
    assert!((volume_of(&result) - 4.0).abs() < 1e-6);
}

#[test]
fn test_subtract_disjoint_keeps_original() {
    let kernel = PolygonKernel::new();
    let a = kernel.cuboid(&CuboidParams::default()).unwrap();
    let far = kernel
        .cuboid(&CuboidParams::default().with_center(Point3::new(10.0, 0.0, 0.0)))
        .unwrap();
    let result = kernel.boolean_subtract(&a, &far).unwrap();
    assert!((volume_of(&result) - 8.0).abs() < 1e-9);
}

#[test]
fn test_intersect_disjoint_is_empty() {
    let kernel = PolygonKernel::new();
    let a = kernel.cuboid(&CuboidParams::default()).unwrap();
    let far = kernel
        .cuboid(&CuboidParams::default().with_center(Point3::new(10.0, 0.0, 0.0)))
        .unwrap();
    let result = kernel.boolean_intersect(&a, &far).unwrap();
    assert!(result.is_empty());
}

#[test]
fn test_cylinder_through_block_leaves_hole() {
    let kernel = PolygonKernel::new();
    let block = kernel
        .cuboid(&CuboidParams::new(Vector3::new(10.0, 10.0, 4.0)))
        .unwrap();
    let n = 32u32;
    let bore = kernel
        .cylinder(&CylinderParams::new(2.0, 4.02).with_segments(n))
        .unwrap();
    let result = kernel.boolean_subtract(&block, &bore).unwrap();

    let hole_area = 0.5 * n as f64 * 4.0 * (std::f64::consts::TAU / n as f64).sin();
    let expected = 400.0 - hole_area * 4.0;
    assert!((volume_of(&result) - expected).abs() < 1e-6);
}

#[test]
fn test_boolean_on_empty_operand_fails() {
    let kernel = PolygonKernel::new();
    let a = kernel.cuboid(&CuboidParams::default()).unwrap();
    let err = kernel.boolean_union(&a, &Solid::empty()).unwrap_err();
    assert_eq!(err, KernelOpError::InvalidGeometry("union of an empty solid".into()));
}

#[test]
fn test_inputs_are_not_modified() {
    let kernel = PolygonKernel::new();
    let (a, b) = unit_pair(&kernel);
    let before = a.polygon_count();
    let _ = kernel.boolean_subtract(&a, &b).unwrap();
    assert_eq!(a.polygon_count(), before);
    assert!((volume_of(&a) - 8.0).abs() < 1e-9);
}
