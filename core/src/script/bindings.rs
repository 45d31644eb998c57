//! Primitive library exposed to scripts.
//!
//! Converts script values into kernel parameters and kernel results back into
//! values. This table is the complete capability list of a script.

use std::cell::RefCell;
use std::rc::Rc;

use super::interpreter::ScriptLimits;
use super::value::{Object, Value};
use super::{ScriptError, ScriptResult};
use crate::geometry::{Point2, Point3, Vector3};
use crate::kernel::{
    CuboidParams, CylinderParams, GeometryKernel, MirrorParams, RevolveParams, Solid, SphereParams,
    TorusParams, MAX_SEGMENTS, MIN_SEGMENTS,
};

/// Deepest array nesting the variadic primitives will flatten.
pub const MAX_FLATTEN_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Cuboid,
    Sphere,
    Cylinder,
    Torus,
    Polygon,
    Revolve,
    Union,
    Subtract,
    Intersect,
    Translate,
    Rotate,
    Scale,
    Mirror,
}

/// Names in model-function parameter order.
pub const PRIMITIVES: [&str; 13] = [
    "cuboid", "sphere", "cylinder", "torus", "polygon", "revolve", "union", "subtract",
    "intersect", "translate", "rotate", "scale", "mirror",
];

impl Primitive {
    pub const ALL: [Primitive; 13] = [
        Primitive::Cuboid,
        Primitive::Sphere,
        Primitive::Cylinder,
        Primitive::Torus,
        Primitive::Polygon,
        Primitive::Revolve,
        Primitive::Union,
        Primitive::Subtract,
        Primitive::Intersect,
        Primitive::Translate,
        Primitive::Rotate,
        Primitive::Scale,
        Primitive::Mirror,
    ];

    pub fn name(self) -> &'static str {
        PRIMITIVES[self as usize]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        PRIMITIVES
            .iter()
            .position(|n| *n == name)
            .map(|i| Self::ALL[i])
    }

    /// Call shape shown to the model.
    pub fn signature(self) -> &'static str {
        match self {
            Primitive::Cuboid => "cuboid({ size: [x, y, z], center?: [x, y, z] })",
            Primitive::Sphere => "sphere({ radius, segments?, center?: [x, y, z] })",
            Primitive::Cylinder => "cylinder({ radius, height, segments?, center?: [x, y, z] })",
            Primitive::Torus => "torus({ innerRadius, outerRadius, innerSegments?, outerSegments? })",
            Primitive::Polygon => "polygon({ points: [[x, y], ...] })",
            Primitive::Revolve => "revolve({ angle?, segments? }, profile)",
            Primitive::Union => "union(a, b, ...)",
            Primitive::Subtract => "subtract(a, b, ...)",
            Primitive::Intersect => "intersect(a, b, ...)",
            Primitive::Translate => "translate([x, y, z], solid, ...)",
            Primitive::Rotate => "rotate([rx, ry, rz], solid, ...)",
            Primitive::Scale => "scale([sx, sy, sz], solid, ...)",
            Primitive::Mirror => "mirror({ normal: [x, y, z], origin?: [x, y, z] }, solid, ...)",
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            Primitive::Cuboid => "box centered on `center` (default origin), size defaults to [2, 2, 2]",
            Primitive::Sphere => "sphere, radius defaults to 1, segments to 32",
            Primitive::Cylinder => "cylinder along Z centered on `center`, defaults radius 1, height 2, segments 32",
            Primitive::Torus => "ring in the XY plane; innerRadius is the tube radius, outerRadius the ring radius",
            Primitive::Polygon => "closed 2D profile for revolve, at least 3 points with non-zero area",
            Primitive::Revolve => "revolves a profile (x = radius >= 0, y = height) around Z; angle in radians, default full turn",
            Primitive::Union => "joins solids; arrays are flattened",
            Primitive::Subtract => "removes every later solid from the first",
            Primitive::Intersect => "keeps only the volume common to all solids",
            Primitive::Translate => "moves solids by an offset",
            Primitive::Rotate => "rotates solids by radians about X, then Y, then Z",
            Primitive::Scale => "scales solids per axis; factors must be non-zero",
            Primitive::Mirror => "reflects solids across the plane through `origin` with `normal`",
        }
    }
}

pub(crate) fn call_primitive(
    kernel: &dyn GeometryKernel,
    limits: &ScriptLimits,
    primitive: Primitive,
    args: &[Value],
) -> ScriptResult<Value> {
    let name = primitive.name();
    let result = match primitive {
        Primitive::Cuboid => {
            let opts = options(name, args.first())?;
            let size = match opts.get("size") {
                None | Some(Value::Undefined) => Vector3::new(2.0, 2.0, 2.0),
                Some(v) => vec3(name, "size", v, 1.0, true)?,
            };
            let center = point_option(name, &opts)?;
            reserve_polygons(name, 6, limits)?;
            Value::Solid(kernel.cuboid(&CuboidParams::new(size).with_center(center))?)
        }
        Primitive::Sphere => {
            let opts = options(name, args.first())?;
            let params = SphereParams::new(number(name, &opts, "radius", 1.0)?)
                .with_segments(segments(name, &opts, "segments")?)
                .with_center(point_option(name, &opts)?);
            let slices = estimate_segments(params.segments);
            reserve_polygons(name, slices * (slices / 2).max(2), limits)?;
            Value::Solid(kernel.sphere(&params)?)
        }
        Primitive::Cylinder => {
            let opts = options(name, args.first())?;
            let params = CylinderParams::new(
                number(name, &opts, "radius", 1.0)?,
                number(name, &opts, "height", 2.0)?,
            )
            .with_segments(segments(name, &opts, "segments")?)
            .with_center(point_option(name, &opts)?);
            reserve_polygons(name, estimate_segments(params.segments) + 2, limits)?;
            Value::Solid(kernel.cylinder(&params)?)
        }
        Primitive::Torus => {
            let opts = options(name, args.first())?;
            let params = TorusParams::new(
                number(name, &opts, "innerRadius", 1.0)?,
                number(name, &opts, "outerRadius", 4.0)?,
            )
            .with_segments(
                segments(name, &opts, "innerSegments")?,
                segments(name, &opts, "outerSegments")?,
            );
            let estimate = estimate_segments(params.inner_segments)
                * estimate_segments(params.outer_segments);
            reserve_polygons(name, estimate, limits)?;
            Value::Solid(kernel.torus(&params)?)
        }
        Primitive::Polygon => {
            let points = match args.first() {
                Some(Value::Array(_)) => args[0].clone(),
                Some(Value::Object(obj)) => obj.borrow().get("points").cloned().unwrap_or(Value::Undefined),
                other => return Err(type_error(name, "an options object with points", other)),
            };
            let points = points_2d(&points)?;
            Value::Profile(Rc::new(kernel.polygon(&points)?))
        }
        Primitive::Revolve => {
            let (opts, profile) = match (args.first(), args.get(1)) {
                (Some(Value::Profile(p)), _) => (Object::new(), p.clone()),
                (first, Some(Value::Profile(p))) => (options(name, first)?, p.clone()),
                (_, other) => return Err(type_error(name, "a profile from polygon()", other)),
            };
            let mut params = RevolveParams::default()
                .with_segments(segments(name, &opts, "segments")?);
            let angle = number(name, &opts, "angle", params.angle)?;
            params = params.with_angle(angle);
            let points = profile.points().len();
            let estimate = points
                .saturating_mul(estimate_segments(params.segments))
                .saturating_add(points.saturating_mul(2));
            reserve_polygons(name, estimate, limits)?;
            Value::Solid(kernel.revolve(&profile, &params)?)
        }
        Primitive::Union | Primitive::Subtract | Primitive::Intersect => {
            let solids = collect_solids(name, args, limits)?;
            let mut iter = solids.into_iter();
            let mut acc = iter
                .next()
                .ok_or_else(|| ScriptError::Type(format!("{} requires at least one solid", name)))?;
            for next in iter {
                acc = match primitive {
                    Primitive::Union => kernel.boolean_union(&acc, &next)?,
                    Primitive::Subtract => kernel.boolean_subtract(&acc, &next)?,
                    _ => kernel.boolean_intersect(&acc, &next)?,
                };
                check_polygon_budget(name, &acc, limits)?;
            }
            Value::Solid(acc)
        }
        Primitive::Translate | Primitive::Rotate | Primitive::Scale | Primitive::Mirror => {
            let first = args.first().unwrap_or(&Value::Undefined);
            let solids = collect_solids(name, args.get(1..).unwrap_or_default(), limits)?;
            if solids.is_empty() {
                return Err(ScriptError::Type(format!("{} requires at least one solid", name)));
            }
            let transform = transform_operand(primitive, first)?;
            let mut out = Vec::with_capacity(solids.len());
            for solid in &solids {
                let moved = match &transform {
                    Transform::Translate(offset) => kernel.translate(solid, *offset)?,
                    Transform::Rotate(angles) => kernel.rotate(solid, *angles)?,
                    Transform::Scale(factors) => kernel.scale(solid, *factors)?,
                    Transform::Mirror(params) => kernel.mirror(solid, params)?,
                };
                out.push(Value::Solid(moved));
            }
            if out.len() == 1 {
                out.remove(0)
            } else {
                Value::array(out)
            }
        }
    };
    if let Value::Solid(solid) = &result {
        check_polygon_budget(name, solid, limits)?;
    }
    Ok(result)
}

enum Transform {
    Translate([f64; 3]),
    Rotate([f64; 3]),
    Scale([f64; 3]),
    Mirror(MirrorParams),
}

fn transform_operand(primitive: Primitive, value: &Value) -> ScriptResult<Transform> {
    let name = primitive.name();
    let xyz = |v: Vector3| [v.x, v.y, v.z];
    Ok(match primitive {
        Primitive::Translate => Transform::Translate(xyz(vec3(name, "offset", value, 0.0, false)?)),
        Primitive::Rotate => Transform::Rotate(xyz(vec3(name, "angles", value, 0.0, false)?)),
        Primitive::Scale => Transform::Scale(xyz(vec3(name, "factors", value, 1.0, true)?)),
        _ => {
            let opts = options(name, Some(value))?;
            let normal = match opts.get("normal") {
                None | Some(Value::Undefined) => {
                    return Err(ScriptError::Type("mirror requires a normal".into()))
                }
                Some(v) => vec3(name, "normal", v, 0.0, false)?,
            };
            let origin = match opts.get("origin") {
                None | Some(Value::Undefined) => Point3::origin(),
                Some(v) => Point3::from(vec3(name, "origin", v, 0.0, false)?),
            };
            Transform::Mirror(MirrorParams::new(normal).with_origin(origin))
        }
    })
}

fn type_error(name: &str, expected: &str, got: Option<&Value>) -> ScriptError {
    ScriptError::Type(format!(
        "{} expects {}, got {}",
        name,
        expected,
        got.map(Value::kind).unwrap_or("nothing")
    ))
}

fn check_polygon_budget(name: &str, solid: &Solid, limits: &ScriptLimits) -> ScriptResult<()> {
    if solid.polygon_count() > limits.max_polygons {
        return Err(ScriptError::Budget(format!(
            "{} produced {} polygons, over the limit of {}",
            name,
            solid.polygon_count(),
            limits.max_polygons
        )));
    }
    Ok(())
}

/// Refuse to build a solid whose polygon count is already known to be over budget.
fn reserve_polygons(name: &str, estimate: usize, limits: &ScriptLimits) -> ScriptResult<()> {
    if estimate > limits.max_polygons {
        return Err(ScriptError::Budget(format!(
            "{} would produce about {} polygons, over the limit of {}",
            name, estimate, limits.max_polygons
        )));
    }
    Ok(())
}

/// Segment count as the kernel will accept it; out-of-range counts are its error to report.
fn estimate_segments(segments: u32) -> usize {
    segments.clamp(MIN_SEGMENTS, MAX_SEGMENTS) as usize
}

fn options(name: &str, value: Option<&Value>) -> ScriptResult<Object> {
    match value {
        None | Some(Value::Undefined) => Ok(Object::new()),
        Some(Value::Object(obj)) => Ok(obj.borrow().clone()),
        other => Err(type_error(name, "an options object", other)),
    }
}

fn number(name: &str, opts: &Object, key: &str, default: f64) -> ScriptResult<f64> {
    match opts.get(key) {
        None | Some(Value::Undefined) => Ok(default),
        Some(Value::Number(n)) if n.is_finite() => Ok(*n),
        Some(other) => Err(ScriptError::Type(format!(
            "{}: '{}' must be a finite number, got {}",
            name,
            key,
            other.to_display_string()
        ))),
    }
}

fn segments(name: &str, opts: &Object, key: &str) -> ScriptResult<u32> {
    let n = number(name, opts, key, 32.0)?;
    if n < 0.0 {
        return Err(ScriptError::Type(format!("{}: '{}' must not be negative", name, key)));
    }
    // The kernel rejects counts outside its supported range
    Ok(n.round().min(u32::MAX as f64) as u32)
}

fn point_option(name: &str, opts: &Object) -> ScriptResult<Point3> {
    match opts.get("center") {
        None | Some(Value::Undefined) => Ok(Point3::origin()),
        Some(v) => Ok(Point3::from(vec3(name, "center", v, 0.0, false)?)),
    }
}

/// `[x, y, z]`, padding missing trailing components with `fill`.
fn vec3(name: &str, key: &str, value: &Value, fill: f64, allow_scalar: bool) -> ScriptResult<Vector3> {
    let invalid = || {
        ScriptError::Type(format!(
            "{}: '{}' must be an array of up to 3 numbers, got {}",
            name,
            key,
            value.to_display_string()
        ))
    };
    match value {
        Value::Number(n) if allow_scalar && n.is_finite() => Ok(Vector3::new(*n, *n, *n)),
        Value::Array(items) => {
            let items = items.borrow();
            if items.is_empty() || items.len() > 3 {
                return Err(invalid());
            }
            let mut out = [fill; 3];
            for (slot, item) in out.iter_mut().zip(items.iter()) {
                match item {
                    Value::Number(n) if n.is_finite() => *slot = *n,
                    _ => return Err(invalid()),
                }
            }
            Ok(Vector3::new(out[0], out[1], out[2]))
        }
        _ => Err(invalid()),
    }
}

fn points_2d(value: &Value) -> ScriptResult<Vec<Point2>> {
    let items = match value {
        Value::Array(items) => items.borrow().clone(),
        other => return Err(type_error("polygon", "points as an array of [x, y]", Some(other))),
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let pair = match item {
                Value::Array(pair) => pair.borrow().clone(),
                _ => Vec::new(),
            };
            match pair.as_slice() {
                [Value::Number(x), Value::Number(y), ..] if x.is_finite() && y.is_finite() => {
                    Ok(Point2::new(*x, *y))
                }
                _ => Err(ScriptError::Type(format!(
                    "polygon: point {} must be [x, y], got {}",
                    i,
                    item.to_display_string()
                ))),
            }
        })
        .collect()
}

/// Solids from variadic arguments, flattening nested arrays.
///
/// The walk refuses arrays that contain themselves, nesting past
/// [`MAX_FLATTEN_DEPTH`], and inputs whose polygons or values add up past the
/// polygon budget.
fn collect_solids(name: &str, args: &[Value], limits: &ScriptLimits) -> ScriptResult<Vec<Solid>> {
    struct Walk<'a> {
        name: &'a str,
        limits: &'a ScriptLimits,
        open: Vec<*const RefCell<Vec<Value>>>,
        polygons: usize,
        visited: usize,
        out: Vec<Solid>,
    }

    impl Walk<'_> {
        fn visit(&mut self, value: &Value) -> ScriptResult<()> {
            // Shared sub-arrays are walked once per reference
            self.visited += 1;
            if self.visited > self.limits.max_polygons {
                return Err(ScriptError::Budget(format!(
                    "{} received more than {} values to flatten",
                    self.name, self.limits.max_polygons
                )));
            }
            match value {
                Value::Solid(solid) => {
                    self.polygons = self.polygons.saturating_add(solid.polygon_count());
                    if self.polygons > self.limits.max_polygons {
                        return Err(ScriptError::Budget(format!(
                            "{} received more than {} polygons of input",
                            self.name, self.limits.max_polygons
                        )));
                    }
                    self.out.push(solid.clone());
                    Ok(())
                }
                Value::Array(items) => {
                    let ptr = Rc::as_ptr(items);
                    if self.open.contains(&ptr) {
                        return Err(ScriptError::Type(format!(
                            "{} cannot flatten an array that contains itself",
                            self.name
                        )));
                    }
                    if self.open.len() >= MAX_FLATTEN_DEPTH {
                        return Err(ScriptError::Range(format!(
                            "{} arguments are nested more than {} arrays deep",
                            self.name, MAX_FLATTEN_DEPTH
                        )));
                    }
                    self.open.push(ptr);
                    for item in items.borrow().iter() {
                        self.visit(item)?;
                    }
                    self.open.pop();
                    Ok(())
                }
                other => Err(ScriptError::Type(format!(
                    "{} expects solids, got {}",
                    self.name,
                    other.kind()
                ))),
            }
        }
    }

    let mut walk = Walk {
        name,
        limits,
        open: Vec::new(),
        polygons: 0,
        visited: 0,
        out: Vec::new(),
    };
    for arg in args {
        walk.visit(arg)?;
    }
    Ok(walk.out)
}
