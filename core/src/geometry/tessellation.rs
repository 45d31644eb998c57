use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::analysis::{analyze, MeshStats};
use super::{Point3, Vector3};
use crate::kernel::Solid;
use crate::sandbox::{ModelShape, Part};

/// Grid cell the size of the weld tolerance.
type GridCell = (i64, i64, i64);

/// Merges vertices closer than a tolerance into one id.
///
/// Ids are handed out from 0 in first-seen order. A vertex joins the first earlier
/// representative within tolerance, searched in its own and the 26 neighbouring
/// cells, so points straddling a cell boundary still merge.
pub(crate) struct Welder {
    tolerance: f64,
    cells: HashMap<GridCell, Vec<(Point3, usize)>>,
    next: usize,
}

impl Welder {
    pub(crate) fn new(tolerance: f64) -> Self {
        Self {
            tolerance: tolerance.max(f64::EPSILON),
            cells: HashMap::new(),
            next: 0,
        }
    }

    fn cell(&self, p: &Point3) -> GridCell {
        (
            (p.x / self.tolerance).floor() as i64,
            (p.y / self.tolerance).floor() as i64,
            (p.z / self.tolerance).floor() as i64,
        )
    }

    pub(crate) fn id(&mut self, p: &Point3) -> usize {
        let (x, y, z) = self.cell(p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let near = self.cells.get(&(x + dx, y + dy, z + dz)).and_then(|members| {
                        members
                            .iter()
                            .find(|(q, _)| (q - p).norm() <= self.tolerance)
                    });
                    if let Some((_, id)) = near {
                        return *id;
                    }
                }
            }
        }
        let id = self.next;
        self.next += 1;
        self.cells.entry((x, y, z)).or_default().push((*p, id));
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshOptions {
    /// Radians. Neighbouring faces meeting at a smaller angle share smoothed normals.
    pub crease_angle: f64,
    /// Triangles whose squared edge cross product is below this are dropped.
    pub degenerate_epsilon: f64,
    /// Positions closer than this are merged when grouping normals.
    pub weld_tolerance: f64,
}

impl Default for MeshOptions {
    fn default() -> Self {
        Self {
            crease_angle: 30f64.to_radians(),
            degenerate_epsilon: 1e-12,
            weld_tolerance: 1e-5,
        }
    }
}

/// A fan triangle with its flat face normal.
#[derive(Debug, Clone, Copy)]
pub struct Triangle {
    pub vertices: [Point3; 3],
    pub normal: Vector3,
}

#[derive(Debug, Clone, Default)]
pub struct Triangulation {
    pub triangles: Vec<Triangle>,
    /// Triangles dropped as degenerate.
    pub discarded: usize,
}

/// Fan-triangulate every polygon `(v0, vi, vi+1)` and drop slivers.
pub fn triangulate(solid: &Solid, degenerate_epsilon: f64) -> Triangulation {
    let mut out = Triangulation::default();
    for polygon in solid.polygons() {
        let v = polygon.vertices();
        for i in 1..v.len().saturating_sub(1) {
            let (a, b, c) = (v[0], v[i], v[i + 1]);
            let cross = (b - a).cross(&(c - a));
            if cross.norm_squared() < degenerate_epsilon {
                out.discarded += 1;
                continue;
            }
            out.triangles.push(Triangle {
                vertices: [a, b, c],
                normal: cross.normalize(),
            });
        }
    }
    out
}

/// Unindexed render buffers for one solid.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RenderMesh {
    pub positions: Vec<f32>, // Flattened x, y, z
    pub normals: Vec<f32>,   // Flattened nx, ny, nz
    pub triangle_count: usize,
    pub discarded_triangles: usize,
}

impl RenderMesh {
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    fn push(&mut self, p: &Point3, n: &Vector3) {
        self.positions.extend_from_slice(&[p.x as f32, p.y as f32, p.z as f32]);
        self.normals.extend_from_slice(&[n.x as f32, n.y as f32, n.z as f32]);
    }
}

/// Convert a solid into render buffers with crease-aware normals.
pub fn to_mesh(solid: &Solid, options: &MeshOptions) -> RenderMesh {
    let triangulation = triangulate(solid, options.degenerate_epsilon);
    build_render_mesh(&triangulation, options)
}

pub(crate) fn build_render_mesh(triangulation: &Triangulation, options: &MeshOptions) -> RenderMesh {
    let triangles = &triangulation.triangles;

    let mut welder = Welder::new(options.weld_tolerance);
    let ids: Vec<[usize; 3]> = triangles
        .iter()
        .map(|tri| tri.vertices.map(|v| welder.id(&v)))
        .collect();

    // Triangles touching each merged position
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (t, corners) in ids.iter().enumerate() {
        for id in corners {
            let members = groups.entry(*id).or_default();
            if members.last() != Some(&t) {
                members.push(t);
            }
        }
    }

    let cos_crease = options.crease_angle.cos() - 1e-9;
    let mut mesh = RenderMesh {
        positions: Vec::with_capacity(triangles.len() * 9),
        normals: Vec::with_capacity(triangles.len() * 9),
        triangle_count: triangles.len(),
        discarded_triangles: triangulation.discarded,
    };

    for (tri, corners) in triangles.iter().zip(&ids) {
        for (v, id) in tri.vertices.iter().zip(corners) {
            let mut sum = Vector3::zeros();
            if let Some(members) = groups.get(id) {
                for &u in members {
                    let other = triangles[u].normal;
                    if other.dot(&tri.normal) >= cos_crease {
                        sum += other;
                    }
                }
            }
            let normal = if sum.norm_squared() > 0.0 {
                sum.normalize()
            } else {
                tri.normal
            };
            mesh.push(v, &normal);
        }
    }
    mesh
}

/// Render data for one accepted part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartMesh {
    pub name: Option<String>,
    pub color: Option<String>,
    pub mesh: RenderMesh,
    pub stats: MeshStats,
}

impl PartMesh {
    pub fn from_part(part: &Part, options: &MeshOptions) -> Self {
        let triangulation = triangulate(&part.solid, options.degenerate_epsilon);
        Self {
            name: part.name.clone(),
            color: part.color.clone(),
            mesh: build_render_mesh(&triangulation, options),
            stats: analyze(&triangulation.triangles, options.weld_tolerance),
        }
    }
}

/// Mesh every part of a validated shape, in order.
pub fn mesh_parts(shape: &ModelShape, options: &MeshOptions) -> Vec<PartMesh> {
    shape
        .parts()
        .iter()
        .map(|part| PartMesh::from_part(part, options))
        .collect()
}
