//! Shader and Uniform Tests
//!
//! Tests for:
//! - Reflected uniform members and their offsets
//! - Set-then-read through the CPU group buffer
//! - Soft failures for unknown names and mismatched types
//! - Sampler reflection and texture binding
//! - Built-in shaders from the embedded bundle

use glam::{Mat3, Mat4, Vec3, Vec4};

use lumen::renderer::api::{BackendContext, GraphicsApi};
use lumen::renderer::layout::DataType;
use lumen::renderer::shader::{Shader, ShaderSource, UniformPacking, UniformValue};
use lumen::renderer::texture::TextureType;
use lumen::renderer::{Renderer, RendererSettings};

const EPSILON: f32 = 1e-6;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn headless() -> Renderer {
    Renderer::new(
        RendererSettings::default().with_api(GraphicsApi::Headless),
        BackendContext::Headless { width: 4, height: 4 },
    )
    .expect("headless renderer")
}

const SAMPLE_SHADER: &str = r"
#version 330 core
#define COUNT 2
struct Item { vec4 Color; float Weight; };
struct Block { mat4 Model; mat3 Normal; Item Items[COUNT]; int Count; };

#shader vertex
layout(location = 0) in vec3 a_Position;
uniform Block u_Block;
void main() { gl_Position = u_Block.Model * vec4(a_Position, 1.0); }

#shader fragment
out vec4 o_Color;
uniform float u_Exposure;
uniform sampler2D u_Albedo;
uniform sampler2DShadow u_Shadow;
void main() { o_Color = texture(u_Albedo, vec2(0.5)) * u_Exposure; }
";

fn sample_shader(renderer: &Renderer) -> std::rc::Rc<dyn Shader> {
    renderer.api().create_shader(&ShaderSource::from_text("sample", SAMPLE_SHADER))
}

// ============================================================================
// Reflection
// ============================================================================

#[test]
fn struct_members_are_flattened_with_running_offsets() {
    let renderer = headless();
    let shader = sample_shader(&renderer);
    assert!(shader.is_loaded());
    let interface = shader.interface();
    let uniforms = &interface.uniforms;
    assert_eq!(uniforms.packing(), UniformPacking::Tight);

    let model = uniforms.element("u_Block.Model").expect("Model");
    let normal = uniforms.element("u_Block.Normal").expect("Normal");
    let color0 = uniforms.element("u_Block.Items[0].Color").expect("Items[0].Color");
    let weight1 = uniforms.element("u_Block.Items[1].Weight").expect("Items[1].Weight");
    let count = uniforms.element("u_Block.Count").expect("Count");

    assert_eq!((model.ty, model.offset), (DataType::Mat4, 0));
    assert_eq!((normal.ty, normal.offset), (DataType::Mat3, 64));
    assert_eq!((color0.ty, color0.offset), (DataType::Vec4, 100));
    assert_eq!((weight1.ty, weight1.offset), (DataType::Float, 100 + 20 + 16));
    assert_eq!((count.ty, count.offset), (DataType::Int, 100 + 2 * 20));
    assert_eq!(uniforms.group("u_Block").map(|g| g.size()), Some(144));
}

#[test]
fn interior_nodes_exist_but_are_not_leaves() {
    let renderer = headless();
    let shader = sample_shader(&renderer);
    let interface = shader.interface();
    assert!(interface.uniforms.exists("u_Block.Items"));
    assert!(interface.uniforms.exists("u_Block.Items[1]"));
    assert!(interface.uniforms.element("u_Block.Items[1]").is_none());
    assert!(!interface.uniforms.exists("u_Block.Items[2]"));
}

#[test]
fn samplers_are_reflected_with_their_kind() {
    let renderer = headless();
    let shader = sample_shader(&renderer);
    let albedo = shader.texture_binding("u_Albedo").expect("u_Albedo");
    assert_eq!(albedo.ty, TextureType::Texture2D);
    assert!(!albedo.depth);
    assert!(shader.texture_binding("u_Shadow").is_some_and(|b| b.depth));
    assert!(shader.texture_binding("u_Missing").is_none());
}

// ============================================================================
// Set and read back
// ============================================================================

#[test]
fn values_read_back_through_element_offsets() {
    let renderer = headless();
    let shader = sample_shader(&renderer);
    let model = Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0));
    let normal = Mat3::from_diagonal(Vec3::new(2.0, 3.0, 4.0));
    assert!(shader.set_uniform("u_Block.Model", model.into()));
    assert!(shader.set_uniform("u_Block.Normal", normal.into()));
    assert!(shader.set_uniform("u_Block.Items[1].Color", Vec4::new(0.1, 0.2, 0.3, 0.4).into()));
    assert!(shader.set_uniform("u_Block.Count", 2_i32.into()));
    assert!(shader.set_uniform("u_Exposure", 1.5_f32.into()));

    let interface = shader.interface();
    let uniforms = &interface.uniforms;
    let packing = uniforms.packing();
    let group = uniforms.group("u_Block").expect("group");

    let element = uniforms.element("u_Block.Items[1].Color").expect("element");
    let start = element.offset as usize;
    let decoded = UniformValue::decode(element.ty, &group.data()[start..], packing);
    assert_eq!(decoded, Some(UniformValue::Vec4(Vec4::new(0.1, 0.2, 0.3, 0.4))));

    assert_eq!(uniforms.get("u_Block.Model"), Some(UniformValue::Mat4(model)));
    assert_eq!(uniforms.get("u_Block.Normal"), Some(UniformValue::Mat3(normal)));
    assert_eq!(uniforms.get("u_Block.Count"), Some(UniformValue::Int(2)));
    match uniforms.get("u_Exposure") {
        Some(UniformValue::Float(v)) => assert!(approx_eq(v, 1.5)),
        other => panic!("unexpected exposure {other:?}"),
    }
}

#[test]
fn writing_one_member_leaves_neighbours_untouched() {
    let renderer = headless();
    let shader = sample_shader(&renderer);
    shader.set_float("u_Block.Items[0].Weight", 7.0);
    shader.set_vec4("u_Block.Items[1].Color", Vec4::ONE);
    let interface = shader.interface();
    assert_eq!(interface.uniforms.get("u_Block.Items[0].Weight"), Some(UniformValue::Float(7.0)));
    assert_eq!(interface.uniforms.get("u_Block.Items[0].Color"), Some(UniformValue::Vec4(Vec4::ZERO)));
}

#[test]
fn unknown_names_and_wrong_types_are_soft_failures() {
    let renderer = headless();
    let shader = sample_shader(&renderer);
    assert!(!shader.set_uniform("u_Nope", 1.0_f32.into()));
    assert!(!shader.set_uniform("u_Block.Count", Vec3::ONE.into()));
    assert!(!shader.set_uniform("u_Block.Items[9].Color", Vec4::ONE.into()));
    assert!(!shader.is_uniform("u_Nope"));
    assert_eq!(shader.interface().uniforms.get("u_Block.Count"), Some(UniformValue::Int(0)));
}

// ============================================================================
// Compilation
// ============================================================================

#[test]
fn missing_entry_point_leaves_shader_unloaded() {
    let renderer = headless();
    let broken = "#shader vertex\nvoid main() {}\n#shader fragment\nuniform float u_X;\n";
    let shader = renderer.api().create_shader(&ShaderSource::from_text("broken", broken));
    assert!(!shader.is_loaded());
    assert!(!shader.set_uniform("u_X", 1.0_f32.into()));
}

#[test]
fn builtin_shaders_load_from_the_bundle() {
    let renderer = headless();
    for name in [
        "simple_color",
        "unlit_texture",
        "phong_color",
        "phong_color_shadow",
        "phong_texture",
        "depth",
        "skybox",
        "equirectangular_to_cube",
        "sh_projection",
        "sh_irradiance",
        "viewport",
        "blit",
    ] {
        let shader = renderer.load_shader(name).expect("built-in shader");
        assert!(shader.is_loaded(), "{name} compiles");
    }
    assert_eq!(renderer.shaders().len(), 12);
    let transform = renderer.load_shader("phong_color").expect("phong_color");
    assert!(transform.interface().uniforms.exists("u_Transform.Model"));
    assert!(transform.interface().uniforms.exists("u_Environment.Lights[0].Color"));
}

#[test]
fn loading_twice_returns_the_cached_shader() {
    let renderer = headless();
    let a = renderer.load_shader("simple_color").expect("shader");
    let b = renderer.load_shader("simple_color").expect("shader");
    assert!(std::rc::Rc::ptr_eq(&a, &b));
}

#[test]
fn unknown_shader_name_is_an_error() {
    let renderer = headless();
    assert!(renderer.load_shader("no_such_shader").is_err());
}
