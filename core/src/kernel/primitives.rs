//! Polygon builders for the primitive solids.
//!
//! Every builder emits loops that wind counter-clockwise seen from outside.

use std::f64::consts::{PI, TAU};

use super::types::*;
use super::{KernelOpError, KernelResult};
use crate::geometry::{Point2, Point3, Vector3};

fn check_positive(name: &str, value: f64) -> KernelResult<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(KernelOpError::InvalidParameter(format!(
            "{} must be a positive number, got {}",
            name, value
        )));
    }
    Ok(())
}

fn check_segments(name: &str, segments: u32) -> KernelResult<()> {
    if !(MIN_SEGMENTS..=MAX_SEGMENTS).contains(&segments) {
        return Err(KernelOpError::InvalidParameter(format!(
            "{} must be between {} and {}, got {}",
            name, MIN_SEGMENTS, MAX_SEGMENTS, segments
        )));
    }
    Ok(())
}

fn check_point(name: &str, p: &Point3) -> KernelResult<()> {
    if p.iter().any(|c| !c.is_finite()) {
        return Err(KernelOpError::InvalidParameter(format!(
            "{} must contain finite numbers",
            name
        )));
    }
    Ok(())
}

fn push_loop(polygons: &mut Vec<Polygon>, points: Vec<Point3>) {
    if let Some(polygon) = Polygon::new(points) {
        polygons.push(polygon);
    }
}

pub(crate) fn cuboid(params: &CuboidParams) -> KernelResult<Vec<Polygon>> {
    check_positive("size[0]", params.size.x)?;
    check_positive("size[1]", params.size.y)?;
    check_positive("size[2]", params.size.z)?;
    check_point("center", &params.center)?;

    let half = params.size * 0.5;
    let corner = |i: usize| {
        Point3::new(
            params.center.x + if i & 1 != 0 { half.x } else { -half.x },
            params.center.y + if i & 2 != 0 { half.y } else { -half.y },
            params.center.z + if i & 4 != 0 { half.z } else { -half.z },
        )
    };

    const FACES: [[usize; 4]; 6] = [
        [0, 4, 6, 2], // -X
        [1, 3, 7, 5], // +X
        [0, 1, 5, 4], // -Y
        [2, 6, 7, 3], // +Y
        [0, 2, 3, 1], // -Z
        [4, 5, 7, 6], // +Z
    ];

    let mut polygons = Vec::with_capacity(6);
    for face in FACES {
        push_loop(&mut polygons, face.iter().map(|&i| corner(i)).collect());
    }
    Ok(polygons)
}

pub(crate) fn sphere(params: &SphereParams) -> KernelResult<Vec<Polygon>> {
    check_positive("radius", params.radius)?;
    check_segments("segments", params.segments)?;
    check_point("center", &params.center)?;

    let slices = params.segments as usize;
    let stacks = (params.segments as usize / 2).max(2);
    let vertex = |i: usize, j: usize| {
        let theta = TAU * (i % slices) as f64 / slices as f64;
        let phi = PI * j as f64 / stacks as f64;
        let dir = Vector3::new(theta.cos() * phi.sin(), theta.sin() * phi.sin(), phi.cos());
        params.center + dir * params.radius
    };

    let mut polygons = Vec::with_capacity(slices * stacks);
    for i in 0..slices {
        for j in 0..stacks {
            let mut points = Vec::with_capacity(4);
            points.push(vertex(i, j));
            points.push(vertex(i, j + 1));
            if j + 1 < stacks {
                points.push(vertex(i + 1, j + 1));
            }
            if j > 0 {
                points.push(vertex(i + 1, j));
            }
            push_loop(&mut polygons, points);
        }
    }
    Ok(polygons)
}

pub(crate) fn cylinder(params: &CylinderParams) -> KernelResult<Vec<Polygon>> {
    check_positive("radius", params.radius)?;
    check_positive("height", params.height)?;
    check_segments("segments", params.segments)?;
    check_point("center", &params.center)?;

    let n = params.segments as usize;
    let z0 = params.center.z - params.height * 0.5;
    let z1 = params.center.z + params.height * 0.5;
    let rim = |i: usize, z: f64| {
        let a = TAU * (i % n) as f64 / n as f64;
        Point3::new(
            params.center.x + params.radius * a.cos(),
            params.center.y + params.radius * a.sin(),
            z,
        )
    };

    let mut polygons = Vec::with_capacity(n + 2);
    for i in 0..n {
        push_loop(
            &mut polygons,
            vec![rim(i, z0), rim(i + 1, z0), rim(i + 1, z1), rim(i, z1)],
        );
    }
    push_loop(&mut polygons, (0..n).map(|i| rim(i, z1)).collect());
    push_loop(&mut polygons, (0..n).rev().map(|i| rim(i, z0)).collect());
    Ok(polygons)
}

pub(crate) fn torus(params: &TorusParams) -> KernelResult<Vec<Polygon>> {
    check_positive("innerRadius", params.inner_radius)?;
    check_positive("outerRadius", params.outer_radius)?;
    check_segments("innerSegments", params.inner_segments)?;
    check_segments("outerSegments", params.outer_segments)?;
    if params.inner_radius >= params.outer_radius {
        return Err(KernelOpError::InvalidGeometry(format!(
            "torus innerRadius ({}) must be smaller than outerRadius ({})",
            params.inner_radius, params.outer_radius
        )));
    }

    let nu = params.outer_segments as usize;
    let nv = params.inner_segments as usize;
    let vertex = |i: usize, j: usize| {
        let u = TAU * (i % nu) as f64 / nu as f64;
        let v = TAU * (j % nv) as f64 / nv as f64;
        let r = params.outer_radius + params.inner_radius * v.cos();
        Point3::new(r * u.cos(), r * u.sin(), params.inner_radius * v.sin())
    };

    let mut polygons = Vec::with_capacity(nu * nv);
    for i in 0..nu {
        for j in 0..nv {
            push_loop(
                &mut polygons,
                vec![vertex(i, j), vertex(i + 1, j), vertex(i + 1, j + 1), vertex(i, j + 1)],
            );
        }
    }
    Ok(polygons)
}

pub(crate) fn polygon(points: &[Point2]) -> KernelResult<Profile> {
    Profile::new(points.to_vec())
}

/// Triangulate a planar cap and orient every triangle along `facing`.
fn cap(points: &[Point3], flat: &[f64], facing: Vector3, polygons: &mut Vec<Polygon>) -> KernelResult<()> {
    let indices = earcutr::earcut(flat, &[], 2).map_err(|e| {
        KernelOpError::OperationFailed(format!("revolve cap triangulation failed: {:?}", e))
    })?;
    for tri in indices.chunks_exact(3) {
        let mut loop_points = vec![points[tri[0]], points[tri[1]], points[tri[2]]];
        if let Some(candidate) = Polygon::new(loop_points.clone()) {
            if candidate.plane().normal.dot(&facing) < 0.0 {
                loop_points.reverse();
                push_loop(polygons, loop_points);
            } else {
                polygons.push(candidate);
            }
        }
    }
    Ok(())
}

pub(crate) fn revolve(profile: &Profile, params: &RevolveParams) -> KernelResult<Vec<Polygon>> {
    check_segments("segments", params.segments)?;
    if !params.angle.is_finite() || params.angle <= 0.0 || params.angle > TAU + 1e-9 {
        return Err(KernelOpError::InvalidParameter(format!(
            "revolve angle must be in (0, 2π], got {}",
            params.angle
        )));
    }
    let points = profile.counter_clockwise();
    if points.iter().any(|p| p.x < -1e-9) {
        return Err(KernelOpError::InvalidGeometry(
            "revolve profile must not cross the axis (x must be >= 0)".to_string(),
        ));
    }

    let full_turn = params.angle >= TAU - 1e-9;
    let angle = params.angle.min(TAU);
    let steps = if full_turn {
        params.segments as usize
    } else {
        ((params.segments as f64 * angle / TAU).ceil() as usize).max(1)
    };
    let place = |p: &Point2, step: usize| {
        let a = if full_turn && step == steps {
            0.0
        } else {
            angle * step as f64 / steps as f64
        };
        let r = p.x.max(0.0);
        Point3::new(r * a.cos(), r * a.sin(), p.y)
    };

    let n = points.len();
    let mut polygons = Vec::with_capacity(n * steps + 2 * n);
    for step in 0..steps {
        for k in 0..n {
            let p = &points[k];
            let q = &points[(k + 1) % n];
            push_loop(
                &mut polygons,
                vec![
                    place(p, step),
                    place(p, step + 1),
                    place(q, step + 1),
                    place(q, step),
                ],
            );
        }
    }

    if !full_turn {
        let flat: Vec<f64> = points.iter().flat_map(|p| [p.x, p.y]).collect();
        let start: Vec<Point3> = points.iter().map(|p| place(p, 0)).collect();
        let end: Vec<Point3> = points.iter().map(|p| place(p, steps)).collect();
        let end_facing = Vector3::new(-angle.sin(), angle.cos(), 0.0);
        cap(&start, &flat, Vector3::new(0.0, -1.0, 0.0), &mut polygons)?;
        cap(&end, &flat, end_facing, &mut polygons)?;
    }

    if polygons.is_empty() {
        return Err(KernelOpError::InvalidGeometry(
            "revolve produced no surface".to_string(),
        ));
    }
    Ok(polygons)
}
