//! Binary STL writer.
//!
//! Layout: 80-byte header, little-endian `u32` triangle count, then per
//! triangle a normal, three vertices (all `f32` triples) and a `u16` attribute.

use std::io::Write;

use tracing::debug;

use super::{ExportError, ExportResult};
use crate::geometry::tessellation::{triangulate, MeshOptions, Triangle};
use crate::kernel::{GeometryKernel, Solid};
use crate::sandbox::ModelShape;

const HEADER: &[u8] = b"binary STL exported by cadloop";
const HEADER_SIZE: usize = 80;

/// Union every part into one solid.
pub fn merge_parts(shape: &ModelShape, kernel: &dyn GeometryKernel) -> ExportResult<Solid> {
    let mut parts = shape.parts().iter();
    let Some(first) = parts.next() else {
        return Err(ExportError::Empty);
    };
    let mut merged = first.solid.clone();
    for part in parts {
        merged = kernel.boolean_union(&merged, &part.solid)?;
    }
    Ok(merged)
}

pub fn write_triangles<W: Write>(triangles: &[Triangle], mut writer: W) -> ExportResult<()> {
    let mut header = [b' '; HEADER_SIZE];
    header[..HEADER.len()].copy_from_slice(HEADER);
    writer.write_all(&header)?;
    writer.write_all(&(triangles.len() as u32).to_le_bytes())?;

    for triangle in triangles {
        let n = triangle.normal;
        for c in [n.x, n.y, n.z] {
            writer.write_all(&(c as f32).to_le_bytes())?;
        }
        for v in &triangle.vertices {
            for c in [v.x, v.y, v.z] {
                writer.write_all(&(c as f32).to_le_bytes())?;
            }
        }
        writer.write_all(&0u16.to_le_bytes())?;
    }
    Ok(())
}

pub fn write_stl(
    shape: &ModelShape,
    kernel: &dyn GeometryKernel,
    options: &MeshOptions,
) -> ExportResult<Vec<u8>> {
    let merged = merge_parts(shape, kernel)?;
    let triangulation = triangulate(&merged, options.degenerate_epsilon);
    if triangulation.triangles.is_empty() {
        return Err(ExportError::Empty);
    }
    let mut buffer = Vec::with_capacity(HEADER_SIZE + 4 + triangulation.triangles.len() * 50);
    write_triangles(&triangulation.triangles, &mut buffer)?;
    debug!(
        triangles = triangulation.triangles.len(),
        bytes = buffer.len(),
        "wrote STL"
    );
    Ok(buffer)
}
