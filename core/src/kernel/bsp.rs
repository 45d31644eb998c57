//! Binary space partitioning over planar polygons.
//!
//! Nodes live in an arena and every traversal uses an explicit work list, so
//! deep trees built from finely tessellated solids never grow the call stack.

use super::types::{Plane, Polygon};
use crate::geometry::Point3;

/// Thickness of a splitting plane.
const PLANE_EPSILON: f64 = 1e-5;

const COPLANAR: u8 = 0;
const FRONT: u8 = 1;
const BACK: u8 = 2;
const SPANNING: u8 = 3;

fn classify(plane: &Plane, p: &Point3) -> u8 {
    let t = plane.signed_distance(p);
    if t < -PLANE_EPSILON {
        BACK
    } else if t > PLANE_EPSILON {
        FRONT
    } else {
        COPLANAR
    }
}

/// Split `polygon` by `plane` into the four output lists.
fn split_polygon(
    plane: &Plane,
    polygon: Polygon,
    coplanar_front: &mut Vec<Polygon>,
    coplanar_back: &mut Vec<Polygon>,
    front: &mut Vec<Polygon>,
    back: &mut Vec<Polygon>,
) {
    let types: Vec<u8> = polygon
        .vertices()
        .iter()
        .map(|v| classify(plane, v))
        .collect();
    let polygon_type = types.iter().fold(COPLANAR, |acc, t| acc | t);

    match polygon_type {
        COPLANAR => {
            if plane.normal.dot(&polygon.plane().normal) > 0.0 {
                coplanar_front.push(polygon);
            } else {
                coplanar_back.push(polygon);
            }
        }
        FRONT => front.push(polygon),
        BACK => back.push(polygon),
        _ => {
            let vertices = polygon.vertices();
            let n = vertices.len();
            let mut f = Vec::with_capacity(n + 1);
            let mut b = Vec::with_capacity(n + 1);
            for i in 0..n {
                let j = (i + 1) % n;
                let (ti, tj) = (types[i], types[j]);
                let (vi, vj) = (vertices[i], vertices[j]);
                if ti != BACK {
                    f.push(vi);
                }
                if ti != FRONT {
                    b.push(vi);
                }
                if (ti | tj) == SPANNING {
                    let denom = plane.normal.dot(&(vj - vi));
                    let t = (plane.w - plane.normal.dot(&vi.coords)) / denom;
                    let v = vi + (vj - vi) * t;
                    f.push(v);
                    b.push(v);
                }
            }
            let parent_plane = *polygon.plane();
            if f.len() >= 3 {
                front.push(Polygon::with_plane(f, parent_plane));
            }
            if b.len() >= 3 {
                back.push(Polygon::with_plane(b, parent_plane));
            }
        }
    }
}

#[derive(Debug, Default)]
struct Node {
    plane: Option<Plane>,
    front: Option<usize>,
    back: Option<usize>,
    polygons: Vec<Polygon>,
}

/// A BSP tree whose root is node 0.
#[derive(Debug)]
pub(crate) struct BspTree {
    nodes: Vec<Node>,
}

impl BspTree {
    pub fn new(polygons: Vec<Polygon>) -> Self {
        let mut tree = Self {
            nodes: vec![Node::default()],
        };
        tree.build(polygons);
        tree
    }

    /// Convert solid space to empty space and vice versa.
    pub fn invert(&mut self) {
        for node in &mut self.nodes {
            for polygon in &mut node.polygons {
                polygon.flip();
            }
            if let Some(plane) = node.plane.as_mut() {
                plane.flip();
            }
            std::mem::swap(&mut node.front, &mut node.back);
        }
    }

    /// Remove the parts of `polygons` that lie inside this tree's solid.
    pub fn clip_polygons(&self, polygons: Vec<Polygon>) -> Vec<Polygon> {
        let mut kept = Vec::new();
        let mut work = vec![(0usize, polygons)];
        while let Some((index, polygons)) = work.pop() {
            let node = &self.nodes[index];
            let Some(plane) = node.plane else {
                kept.extend(polygons);
                continue;
            };
            let mut front = Vec::new();
            let mut back = Vec::new();
            let mut coplanar_front = Vec::new();
            let mut coplanar_back = Vec::new();
            for polygon in polygons {
                split_polygon(
                    &plane,
                    polygon,
                    &mut coplanar_front,
                    &mut coplanar_back,
                    &mut front,
                    &mut back,
                );
            }
            front.append(&mut coplanar_front);
            back.append(&mut coplanar_back);

            match node.front {
                Some(child) => work.push((child, front)),
                None => kept.extend(front),
            }
            if let Some(child) = node.back {
                work.push((child, back));
            }
        }
        kept
    }

    /// Remove every polygon in this tree that lies inside `other`.
    pub fn clip_to(&mut self, other: &BspTree) {
        for node in &mut self.nodes {
            let polygons = std::mem::take(&mut node.polygons);
            node.polygons = other.clip_polygons(polygons);
        }
    }

    pub fn all_polygons(&self) -> Vec<Polygon> {
        self.nodes
            .iter()
            .flat_map(|node| node.polygons.iter().cloned())
            .collect()
    }

    /// Insert polygons into the tree, splitting them across existing planes.
    pub fn build(&mut self, polygons: Vec<Polygon>) {
        let mut work = vec![(0usize, polygons)];
        while let Some((index, polygons)) = work.pop() {
            if polygons.is_empty() {
                continue;
            }
            let plane = match self.nodes[index].plane {
                Some(plane) => plane,
                None => {
                    let plane = *polygons[0].plane();
                    self.nodes[index].plane = Some(plane);
                    plane
                }
            };

            let mut coplanar = Vec::new();
            let mut coplanar_back = Vec::new();
            let mut front = Vec::new();
            let mut back = Vec::new();
            for polygon in polygons {
                split_polygon(
                    &plane,
                    polygon,
                    &mut coplanar,
                    &mut coplanar_back,
                    &mut front,
                    &mut back,
                );
            }
            coplanar.append(&mut coplanar_back);
            self.nodes[index].polygons.append(&mut coplanar);

            if !front.is_empty() {
                let child = self.child(index, true);
                work.push((child, front));
            }
            if !back.is_empty() {
                let child = self.child(index, false);
                work.push((child, back));
            }
        }
    }

    fn child(&mut self, index: usize, front: bool) -> usize {
        let existing = if front {
            self.nodes[index].front
        } else {
            self.nodes[index].back
        };
        if let Some(child) = existing {
            return child;
        }
        let child = self.nodes.len();
        self.nodes.push(Node::default());
        if front {
            self.nodes[index].front = Some(child);
        } else {
            self.nodes[index].back = Some(child);
        }
        child
    }
}

/// `a ∪ b`
pub(crate) fn union(a: Vec<Polygon>, b: Vec<Polygon>) -> Vec<Polygon> {
    let mut a = BspTree::new(a);
    let mut b = BspTree::new(b);
    a.clip_to(&b);
    b.clip_to(&a);
    b.invert();
    b.clip_to(&a);
    b.invert();
    a.build(b.all_polygons());
    a.all_polygons()
}

/// `a - b`
pub(crate) fn subtract(a: Vec<Polygon>, b: Vec<Polygon>) -> Vec<Polygon> {
    let mut a = BspTree::new(a);
    let mut b = BspTree::new(b);
    a.invert();
    a.clip_to(&b);
    b.clip_to(&a);
    b.invert();
    b.clip_to(&a);
    b.invert();
    a.build(b.all_polygons());
    a.invert();
    a.all_polygons()
}

/// `a ∩ b`
pub(crate) fn intersect(a: Vec<Polygon>, b: Vec<Polygon>) -> Vec<Polygon> {
    let mut a = BspTree::new(a);
    let mut b = BspTree::new(b);
    a.invert();
    b.clip_to(&a);
    b.invert();
    a.clip_to(&b);
    b.clip_to(&a);
    a.build(b.all_polygons());
    a.invert();
    a.all_polygons()
}
