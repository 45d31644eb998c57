use std::io::{Cursor, Read};

use super::threemf::{display_color, model_xml};
use super::*;
use crate::geometry::Vector3;
use crate::kernel::{CuboidParams, GeometryKernel, PolygonKernel, Solid};
use crate::sandbox::Part;

fn cube(size: f64, x: f64) -> Solid {
    let kernel = PolygonKernel::new();
    let solid = kernel
        .cuboid(&CuboidParams::new(Vector3::new(size, size, size)))
        .unwrap();
    kernel.translate(&solid, [x, 0.0, 0.0]).unwrap()
}

fn triangle_count(stl: &[u8]) -> u32 {
    u32::from_le_bytes([stl[80], stl[81], stl[82], stl[83]])
}

#[test]
fn test_stl_single_cube() {
    let shape = ModelShape::SingleSolid(Part::new(cube(10.0, 0.0)));
    let bytes = export(
        &shape,
        ExportFormat::Stl,
        &PolygonKernel::new(),
        &MeshOptions::default(),
    )
    .unwrap();
    assert_eq!(triangle_count(&bytes), 12);
    assert_eq!(bytes.len(), 84 + 12 * 50);
    assert!(bytes.starts_with(b"binary STL"));
}

#[test]
fn test_stl_merges_parts() {
    let shape = ModelShape::PartList(vec![
        Part::new(cube(10.0, 0.0)),
        Part::new(cube(10.0, 30.0)),
    ]);
    let bytes = export(
        &shape,
        ExportFormat::Stl,
        &PolygonKernel::new(),
        &MeshOptions::default(),
    )
    .unwrap();
    let count = triangle_count(&bytes);
    assert!(count >= 24);
    assert_eq!(bytes.len(), 84 + count as usize * 50);
}

#[test]
fn test_3mf_package_has_one_object_per_part() {
    let shape = ModelShape::PartList(vec![
        Part::new(cube(10.0, 0.0)).with_color("#f00").with_name("base"),
        Part::new(cube(5.0, 30.0)).with_name("knob"),
    ]);
    let bytes = export(
        &shape,
        ExportFormat::ThreeMf,
        &PolygonKernel::new(),
        &MeshOptions::default(),
    )
    .unwrap();

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert!(archive.by_name("[Content_Types].xml").is_ok());
    assert!(archive.by_name("_rels/.rels").is_ok());
    let mut model = String::new();
    archive
        .by_name("3D/3dmodel.model")
        .unwrap()
        .read_to_string(&mut model)
        .unwrap();

    assert!(model.contains("unit=\"millimeter\""));
    assert_eq!(model.matches("<object ").count(), 2);
    assert!(model.contains("name=\"base\""));
    assert!(model.contains("name=\"knob\""));
    assert!(model.contains("displaycolor=\"#FF0000\""));
    assert!(model.contains("pid=\"1\""));
    assert_eq!(model.matches("<item ").count(), 2);
}

#[test]
fn test_3mf_shares_cube_vertices() {
    let shape = ModelShape::SingleSolid(Part::new(cube(10.0, 0.0)));
    let model = model_xml(&shape, &MeshOptions::default()).unwrap();
    assert_eq!(model.matches("<vertex ").count(), 8);
    assert_eq!(model.matches("<triangle ").count(), 12);
    assert!(!model.contains("basematerials"));
}

#[test]
fn test_empty_model_is_refused() {
    let shape = ModelShape::SingleSolid(Part::new(Solid::empty()));
    let kernel = PolygonKernel::new();
    for format in [ExportFormat::Stl, ExportFormat::ThreeMf] {
        assert!(matches!(
            export(&shape, format, &kernel, &MeshOptions::default()),
            Err(ExportError::Empty)
        ));
    }
}

#[test]
fn test_display_color() {
    assert_eq!(display_color("#abc").as_deref(), Some("#AABBCC"));
    assert_eq!(display_color("#8a8d91").as_deref(), Some("#8A8D91"));
    assert_eq!(display_color("#8a8d91ff").as_deref(), Some("#8A8D91FF"));
    assert_eq!(display_color("red"), None);
    assert_eq!(display_color("#12345"), None);
    assert_eq!(display_color("#ggg"), None);
}

#[test]
fn test_format_parsing() {
    assert_eq!("STL".parse::<ExportFormat>().unwrap(), ExportFormat::Stl);
    assert_eq!("3mf".parse::<ExportFormat>().unwrap(), ExportFormat::ThreeMf);
    assert!(matches!(
        "obj".parse::<ExportFormat>(),
        Err(ExportError::UnknownFormat(_))
    ));
    assert_eq!(serde_json::to_value(ExportFormat::ThreeMf).unwrap(), "3mf");
    assert_eq!(ExportFormat::ThreeMf.to_string(), "3mf");
}
