//! 3MF writer: an OPC ZIP package around a single model document.
//!
//! Each model part becomes its own `<object>`; part colors become a
//! `<basematerials>` group referenced by `pid`/`pindex`.

use std::io::{Cursor, Write};

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use super::{ExportError, ExportResult};
use crate::geometry::tessellation::{triangulate, MeshOptions, Welder};
use crate::geometry::Point3;
use crate::sandbox::{ModelShape, Part};

const NAMESPACE_3MF: &str = "http://schemas.microsoft.com/3dmanufacturing/core/2015/02";
const MATERIALS_ID: &str = "1";

const CONTENT_TYPES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
  <Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
  <Default Extension="model" ContentType="application/vnd.ms-package.3dmanufacturing-3dmodel+xml"/>
</Types>"#;

const RELS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Target="/3D/3dmodel.model" Id="rel0" Type="http://schemas.microsoft.com/3dmanufacturing/2013/01/3dmodel"/>
</Relationships>"#;

/// Indexed mesh of one part.
#[derive(Debug, Default)]
pub struct ObjectMesh {
    pub vertices: Vec<Point3>,
    pub triangles: Vec<[u32; 3]>,
}

impl ObjectMesh {
    /// Triangulate a part and share coincident vertices.
    pub fn from_part(part: &Part, options: &MeshOptions) -> Self {
        let triangulation = triangulate(&part.solid, options.degenerate_epsilon);
        let mut mesh = ObjectMesh::default();
        let mut welder = Welder::new(options.weld_tolerance);
        for triangle in &triangulation.triangles {
            let mut corners = [0u32; 3];
            for (slot, vertex) in corners.iter_mut().zip(&triangle.vertices) {
                let id = welder.id(vertex);
                if id == mesh.vertices.len() {
                    mesh.vertices.push(*vertex);
                }
                *slot = id as u32;
            }
            if corners[0] != corners[1] && corners[1] != corners[2] && corners[0] != corners[2] {
                mesh.triangles.push(corners);
            }
        }
        mesh
    }
}

/// `#RGB`, `#RRGGBB` or `#RRGGBBAA` as an uppercase 3MF display color.
pub fn display_color(color: &str) -> Option<String> {
    let hex = color.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let expanded: String = match hex.len() {
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        6 | 8 => hex.to_string(),
        _ => return None,
    };
    Some(format!("#{}", expanded.to_ascii_uppercase()))
}

fn xml_error(e: impl std::fmt::Display) -> ExportError {
    ExportError::Xml(e.to_string())
}

fn archive_error(e: impl std::fmt::Display) -> ExportError {
    ExportError::Archive(e.to_string())
}

/// The `3D/3dmodel.model` document.
pub fn model_xml(shape: &ModelShape, options: &MeshOptions) -> ExportResult<String> {
    let parts = shape.parts();
    let meshes: Vec<ObjectMesh> = parts.iter().map(|p| ObjectMesh::from_part(p, options)).collect();
    if meshes.iter().all(|m| m.triangles.is_empty()) {
        return Err(ExportError::Empty);
    }
    let colors: Vec<Option<String>> = parts
        .iter()
        .map(|p| p.color.as_deref().and_then(display_color))
        .collect();

    let mut buffer = Vec::new();
    let mut writer = Writer::new_with_indent(Cursor::new(&mut buffer), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_error)?;

    let mut model = BytesStart::new("model");
    model.push_attribute(("xmlns", NAMESPACE_3MF));
    model.push_attribute(("unit", "millimeter"));
    model.push_attribute(("xml:lang", "en-US"));
    writer.write_event(Event::Start(model)).map_err(xml_error)?;
    writer
        .write_event(Event::Start(BytesStart::new("resources")))
        .map_err(xml_error)?;

    // Material index per part, in order of the colored parts.
    let mut material_index: Vec<Option<usize>> = vec![None; parts.len()];
    if colors.iter().any(Option::is_some) {
        let mut materials = BytesStart::new("basematerials");
        materials.push_attribute(("id", MATERIALS_ID));
        writer.write_event(Event::Start(materials)).map_err(xml_error)?;
        let mut next = 0;
        for (i, color) in colors.iter().enumerate() {
            let Some(color) = color else { continue };
            let name = parts[i].name.clone().unwrap_or_else(|| format!("Part {}", i + 1));
            let mut base = BytesStart::new("base");
            base.push_attribute(("name", name.as_str()));
            base.push_attribute(("displaycolor", color.as_str()));
            writer.write_event(Event::Empty(base)).map_err(xml_error)?;
            material_index[i] = Some(next);
            next += 1;
        }
        writer
            .write_event(Event::End(BytesEnd::new("basematerials")))
            .map_err(xml_error)?;
    }

    // Object ids start after the materials group.
    let object_id = |i: usize| (i + 2).to_string();
    for (i, (part, mesh)) in parts.iter().zip(&meshes).enumerate() {
        let id = object_id(i);
        let mut object = BytesStart::new("object");
        object.push_attribute(("id", id.as_str()));
        object.push_attribute(("type", "model"));
        if let Some(name) = &part.name {
            object.push_attribute(("name", name.as_str()));
        }
        if let Some(pindex) = material_index[i] {
            object.push_attribute(("pid", MATERIALS_ID));
            object.push_attribute(("pindex", pindex.to_string().as_str()));
        }
        writer.write_event(Event::Start(object)).map_err(xml_error)?;
        writer
            .write_event(Event::Start(BytesStart::new("mesh")))
            .map_err(xml_error)?;

        writer
            .write_event(Event::Start(BytesStart::new("vertices")))
            .map_err(xml_error)?;
        for v in &mesh.vertices {
            let mut vertex = BytesStart::new("vertex");
            vertex.push_attribute(("x", format!("{:.6}", v.x).as_str()));
            vertex.push_attribute(("y", format!("{:.6}", v.y).as_str()));
            vertex.push_attribute(("z", format!("{:.6}", v.z).as_str()));
            writer.write_event(Event::Empty(vertex)).map_err(xml_error)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("vertices")))
            .map_err(xml_error)?;

        writer
            .write_event(Event::Start(BytesStart::new("triangles")))
            .map_err(xml_error)?;
        for &[v1, v2, v3] in &mesh.triangles {
            let mut triangle = BytesStart::new("triangle");
            triangle.push_attribute(("v1", v1.to_string().as_str()));
            triangle.push_attribute(("v2", v2.to_string().as_str()));
            triangle.push_attribute(("v3", v3.to_string().as_str()));
            writer.write_event(Event::Empty(triangle)).map_err(xml_error)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new("triangles")))
            .map_err(xml_error)?;

        writer
            .write_event(Event::End(BytesEnd::new("mesh")))
            .map_err(xml_error)?;
        writer
            .write_event(Event::End(BytesEnd::new("object")))
            .map_err(xml_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("resources")))
        .map_err(xml_error)?;

    writer
        .write_event(Event::Start(BytesStart::new("build")))
        .map_err(xml_error)?;
    for (i, mesh) in meshes.iter().enumerate() {
        if mesh.triangles.is_empty() {
            continue;
        }
        let id = object_id(i);
        let mut item = BytesStart::new("item");
        item.push_attribute(("objectid", id.as_str()));
        writer.write_event(Event::Empty(item)).map_err(xml_error)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new("build")))
        .map_err(xml_error)?;
    writer
        .write_event(Event::End(BytesEnd::new("model")))
        .map_err(xml_error)?;

    String::from_utf8(buffer).map_err(xml_error)
}

/// Full 3MF package bytes.
pub fn write_3mf(shape: &ModelShape, options: &MeshOptions) -> ExportResult<Vec<u8>> {
    let model = model_xml(shape, options)?;

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let file_options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", file_options)
        .map_err(archive_error)?;
    zip.write_all(CONTENT_TYPES_XML.as_bytes())?;
    zip.start_file("_rels/.rels", file_options).map_err(archive_error)?;
    zip.write_all(RELS_XML.as_bytes())?;
    zip.start_file("3D/3dmodel.model", file_options)
        .map_err(archive_error)?;
    zip.write_all(model.as_bytes())?;

    let bytes = zip.finish().map_err(archive_error)?.into_inner();
    debug!(parts = shape.part_count(), bytes = bytes.len(), "wrote 3MF");
    Ok(bytes)
}
