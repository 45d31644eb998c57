//! Whole-mesh measurements reported alongside render buffers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::tessellation::{Triangle, Welder};

/// Result of pairing every directed edge with its reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Watertight {
    Verified,
    /// Edges without a matching reverse edge. Boolean results with
    /// T-junctions land here even when the solid is closed.
    Unverified { open_edges: usize },
}

impl Watertight {
    pub fn is_verified(&self) -> bool {
        matches!(self, Watertight::Verified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Aabb {
    pub fn size(&self) -> [f64; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshStats {
    pub triangle_count: usize,
    pub bounds: Option<Aabb>,
    /// Cubic millimeters, from the divergence theorem.
    pub volume: f64,
    pub watertight: Watertight,
}

pub fn analyze(triangles: &[Triangle], weld_tolerance: f64) -> MeshStats {
    MeshStats {
        triangle_count: triangles.len(),
        bounds: bounds(triangles),
        volume: volume(triangles),
        watertight: watertight(triangles, weld_tolerance),
    }
}

pub fn bounds(triangles: &[Triangle]) -> Option<Aabb> {
    let mut iter = triangles.iter().flat_map(|t| t.vertices.iter());
    let first = *iter.next()?;
    let (mut min, mut max) = (first, first);
    for p in iter {
        min = min.inf(p);
        max = max.sup(p);
    }
    Some(Aabb {
        min: [min.x, min.y, min.z],
        max: [max.x, max.y, max.z],
    })
}

pub fn volume(triangles: &[Triangle]) -> f64 {
    triangles
        .iter()
        .map(|t| {
            let [a, b, c] = t.vertices;
            a.coords.dot(&b.coords.cross(&c.coords))
        })
        .sum::<f64>()
        / 6.0
}

pub fn watertight(triangles: &[Triangle], weld_tolerance: f64) -> Watertight {
    let mut welder = Welder::new(weld_tolerance);
    let mut edges: HashMap<(usize, usize), i64> = HashMap::new();
    for tri in triangles {
        let keys = tri.vertices.map(|v| welder.id(&v));
        for i in 0..3 {
            let (a, b) = (keys[i], keys[(i + 1) % 3]);
            if a == b {
                continue;
            }
            // +1 for a -> b, -1 for b -> a, keyed on the ordered pair
            if a < b {
                *edges.entry((a, b)).or_insert(0) += 1;
            } else {
                *edges.entry((b, a)).or_insert(0) -= 1;
            }
        }
    }
    let open_edges: usize = edges.values().map(|c| c.unsigned_abs() as usize).sum();
    if open_edges == 0 && !triangles.is_empty() {
        Watertight::Verified
    } else {
        Watertight::Unverified { open_edges }
    }
}
