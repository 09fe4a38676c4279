//! Data Layout Tests
//!
//! Tests for:
//! - DataLayout offsets as the running sum of element sizes
//! - BufferLayout construction and lookup
//! - The built-in mesh vertex layout
//! - Primitive geometry uploads on the headless backend

use lumen::renderer::api::{BackendContext, GraphicsApi};
use lumen::renderer::layout::{BufferLayout, DataElement, DataLayout, DataType};
use lumen::renderer::{Renderer, RendererSettings};
use lumen::resources::primitives::{MeshData, SphereOptions, create_cube, create_plane, create_quad, create_sphere};

fn headless() -> Renderer {
    Renderer::new(
        RendererSettings::default().with_api(GraphicsApi::Headless),
        BackendContext::Headless { width: 16, height: 16 },
    )
    .expect("headless renderer")
}

// ============================================================================
// Offsets
// ============================================================================

#[test]
fn offsets_are_prefix_sums_in_insertion_order() {
    let types = [
        DataType::Float,
        DataType::Vec3,
        DataType::Mat4,
        DataType::Int,
        DataType::Vec2,
        DataType::Mat3,
        DataType::Bool,
    ];
    let mut layout = DataLayout::<DataElement>::new();
    for (i, ty) in types.iter().enumerate() {
        layout.add(format!("e{i}"), DataElement::new(*ty));
    }

    let mut expected = 0;
    for (i, ty) in types.iter().enumerate() {
        let element = layout.get(&format!("e{i}")).expect("element present");
        assert_eq!(element.offset, expected, "offset of e{i}");
        assert_eq!(element.size, ty.size(), "size of e{i}");
        expected += ty.size();
    }
    assert_eq!(layout.stride(), expected, "stride is the total size");
}

#[test]
fn empty_layout_has_zero_stride() {
    let layout = BufferLayout::new();
    assert!(layout.is_empty());
    assert_eq!(layout.stride(), 0);
    assert!(!layout.exists("a_Position"));
}

#[test]
fn iteration_follows_insertion_order() {
    let layout = BufferLayout::new()
        .with("z", DataElement::new(DataType::Float))
        .with("a", DataElement::new(DataType::Vec4))
        .with("m", DataElement::normalized(DataType::Vec2));
    let names: Vec<&str> = layout.iter().map(|(name, _)| name).collect();
    assert_eq!(names, ["z", "a", "m"]);
    assert!(layout.get("m").is_some_and(|e| e.normalized));
}

#[test]
fn layouts_compare_by_order() {
    let a = BufferLayout::from_types([("x", DataType::Float), ("y", DataType::Vec2)]);
    let b = BufferLayout::from_types([("y", DataType::Vec2), ("x", DataType::Float)]);
    assert_ne!(a, b, "the same elements in another order form another layout");
    assert_eq!(a.stride(), b.stride());
}

// ============================================================================
// Mesh layout
// ============================================================================

#[test]
fn mesh_layout_interleaves_position_normal_uv() {
    let layout = MeshData::layout();
    assert_eq!(layout.len(), 3);
    assert_eq!(layout.get("a_Position").map(|e| e.offset), Some(0));
    assert_eq!(layout.get("a_Normal").map(|e| e.offset), Some(12));
    assert_eq!(layout.get("a_TexCoord").map(|e| e.offset), Some(24));
    assert_eq!(layout.stride(), 32);
}

#[test]
fn primitives_produce_valid_indices() {
    let meshes = [
        create_cube(1.0),
        create_plane(2.0, 3.0),
        create_quad(),
        create_sphere(&SphereOptions::default()),
    ];
    for mesh in &meshes {
        assert!(!mesh.indices.is_empty());
        assert_eq!(mesh.indices.len() % 3, 0, "indices form whole triangles");
        let count = mesh.vertices.len() as u32;
        assert!(mesh.indices.iter().all(|&i| i < count), "indices stay in range");
    }
}

#[test]
fn sphere_vertices_lie_on_the_radius() {
    let mesh = create_sphere(&SphereOptions {
        radius: 2.5,
        segments: 12,
        rings: 6,
    });
    for vertex in &mesh.vertices {
        let [x, y, z] = vertex.position;
        let length = (x * x + y * y + z * z).sqrt();
        assert!((length - 2.5).abs() < 1e-4, "vertex at distance {length}");
    }
}

#[test]
fn uploaded_cube_reports_its_index_count() {
    let renderer = headless();
    let mesh = create_cube(1.0);
    let drawable = mesh.upload(renderer.api().as_ref()).expect("upload");
    assert_eq!(drawable.index_count(), mesh.indices.len() as u32);
    assert_eq!(drawable.vertex_buffers().len(), 1);
    assert_eq!(drawable.vertex_buffers()[0].layout(), &MeshData::layout());
}
