//! Light Tests
//!
//! Tests for:
//! - Light id uniqueness
//! - Caster blocks written into `u_Environment.Lights[id]`
//! - Directional shadow camera placement
//! - Spherical-harmonic irradiance matrices
//! - Environment light cube map and SH projection on the headless backend

use std::collections::HashSet;
use std::rc::Rc;

use glam::{Mat4, Vec3, Vec4};

use lumen::errors::LumenError;
use lumen::renderer::api::{BackendContext, GraphicsApi};
use lumen::renderer::backend::headless::{FragmentInput, FragmentProgram, HeadlessRendererApi};
use lumen::renderer::shader::{Shader, ShaderSource, UniformValue};
use lumen::renderer::texture::{Texture2D, TextureFormat, TextureSpecification};
use lumen::renderer::{Renderer, RendererSettings};
use lumen::resources::material::LightProperty;
use lumen::scene::light::{irradiance_matrices, isotropic_irradiance_matrix};
use lumen::scene::{DirectionalLight, EnvironmentLight, Light, LightLibrary, PositionalLight};

const EPSILON: f32 = 1e-5;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn headless() -> Renderer {
    Renderer::new(
        RendererSettings::default()
            .with_api(GraphicsApi::Headless)
            .with_shadow_map_size(16),
        BackendContext::Headless { width: 8, height: 8 },
    )
    .expect("headless renderer")
}

fn headless_api(renderer: &Renderer) -> &HeadlessRendererApi {
    renderer
        .api()
        .as_any()
        .downcast_ref::<HeadlessRendererApi>()
        .expect("headless backend")
}

// Light ids are process-wide, so the block is wide enough for every light
// created by this test binary.
const LIT: &str = r"
#define MAX_LIGHTS 64
struct Light { vec4 Vector; vec3 Color; float DiffuseStrength; float SpecularStrength; mat4 ShadowTransform; };
struct Environment { Light Lights[MAX_LIGHTS]; int LightCount; };
uniform Environment u_Environment;

#shader vertex
void main() { gl_Position = vec4(0.0); }

#shader fragment
out vec4 o_Color;
void main() { o_Color = u_Environment.Lights[0].Vector; }
";

fn lit_shader(renderer: &Renderer) -> Rc<dyn Shader> {
    renderer.api().create_shader(&ShaderSource::from_text("lit_sample", LIT))
}

// ============================================================================
// Identity
// ============================================================================

#[test]
fn light_ids_are_unique() {
    let renderer = headless();
    let mut library = LightLibrary::new();
    library
        .create("sun", DirectionalLight::new(&renderer, Vec3::NEG_Y).expect("light"))
        .expect("add");
    library
        .create("lamp", PositionalLight::new(&renderer, Vec3::new(1.0, 2.0, 3.0), 45.0).expect("light"))
        .expect("add");
    library
        .create("rim", DirectionalLight::new(&renderer, Vec3::X).expect("light"))
        .expect("add");
    library
        .create("sky", EnvironmentLight::new(&renderer, 4).expect("light"))
        .expect("add");

    let ids: Vec<u32> = library.iter().filter_map(|(_, light)| light.id()).collect();
    let unique: HashSet<u32> = ids.iter().copied().collect();
    assert_eq!(ids.len(), 3, "only casters carry ids");
    assert_eq!(unique.len(), ids.len());
    assert_eq!(library.caster_count(), 3);
}

#[test]
fn duplicate_light_names_are_rejected() {
    let renderer = headless();
    let mut library = LightLibrary::new();
    library
        .create("sun", DirectionalLight::new(&renderer, Vec3::NEG_Y).expect("light"))
        .expect("add");
    let again = library.create("sun", DirectionalLight::new(&renderer, Vec3::X).expect("light"));
    assert!(again.is_err());
    assert_eq!(library.len(), 1);
}

// ============================================================================
// Uniform blocks
// ============================================================================

#[test]
fn directional_light_writes_its_block() {
    let renderer = headless();
    let shader = lit_shader(&renderer);
    let light = DirectionalLight::new(&renderer, Vec3::new(0.0, -1.0, -1.0)).expect("light");
    let caster = light.caster().expect("caster");
    caster.set_color(Vec3::new(1.0, 0.5, 0.25));
    caster.set_diffuse_strength(0.7);

    light.define_light_properties(
        shader.as_ref(),
        LightProperty::GENERAL_PROPERTIES | LightProperty::DIFFUSE_LIGHTING | LightProperty::SHADOW_PROPERTIES,
    );

    let id = caster.id();
    let interface = shader.interface();
    let block = format!("u_Environment.Lights[{id}]");
    assert_eq!(
        interface.uniforms.get(&format!("{block}.Vector")),
        Some(UniformValue::Vec4(Vec4::new(0.0, -1.0, -1.0, 0.0))),
        "directions carry w = 0"
    );
    assert_eq!(
        interface.uniforms.get(&format!("{block}.Color")),
        Some(UniformValue::Vec3(Vec3::new(1.0, 0.5, 0.25)))
    );
    assert_eq!(
        interface.uniforms.get(&format!("{block}.DiffuseStrength")),
        Some(UniformValue::Float(0.7))
    );
    assert_eq!(
        interface.uniforms.get(&format!("{block}.SpecularStrength")),
        Some(UniformValue::Float(0.0)),
        "specular is only written when asked for"
    );
    assert_eq!(
        interface.uniforms.get(&format!("{block}.ShadowTransform")),
        Some(UniformValue::Mat4(caster.shadow_transform()))
    );
}

#[test]
fn positional_light_vector_is_a_point() {
    let renderer = headless();
    let shader = lit_shader(&renderer);
    let light = PositionalLight::new(&renderer, Vec3::new(2.0, 3.0, 4.0), 60.0).expect("light");
    light.define_light_properties(shader.as_ref(), LightProperty::GENERAL_PROPERTIES);
    let id = light.id().expect("caster id");
    assert_eq!(
        shader.interface().uniforms.get(&format!("u_Environment.Lights[{id}].Vector")),
        Some(UniformValue::Vec4(Vec4::new(2.0, 3.0, 4.0, 1.0)))
    );
}

#[test]
fn shadow_camera_sits_behind_the_target() {
    let renderer = headless();
    let light = DirectionalLight::new(&renderer, Vec3::new(0.0, -1.0, 0.0)).expect("light");
    light.set_target(Vec3::new(1.0, 0.0, 1.0));
    let caster = light.caster().expect("caster");
    let camera = caster.shadow_camera().borrow();
    let expected = Vec3::new(1.0, DirectionalLight::DEFAULT_DISTANCE, 1.0);
    assert!((camera.position() - expected).length() < 1e-4, "camera at {:?}", camera.position());
    assert_eq!(camera.width(), 16, "shadow camera follows the shadow map size");

    let shadow_map = caster.shadow_map();
    assert_eq!(shadow_map.color_attachment_count(), 0);
    assert!(shadow_map.depth_attachment().is_some());
}

// ============================================================================
// Spherical harmonics
// ============================================================================

#[test]
fn constant_term_scales_l00() {
    let mut l = [0.0; 9];
    l[0] = 1.0;
    let m = isotropic_irradiance_matrix(l);
    assert!(approx_eq(m.w_axis.w, 0.886_227));
    for (i, value) in m.to_cols_array().iter().enumerate().take(15) {
        assert!(approx_eq(*value, 0.0), "element {i} is {value}");
    }
}

#[test]
fn l20_feeds_the_z_diagonal_and_constant() {
    let mut l = [0.0; 9];
    l[6] = 1.0;
    let m = isotropic_irradiance_matrix(l);
    assert!(approx_eq(m.z_axis.z, 0.743_125));
    assert!(approx_eq(m.w_axis.w, -0.247_708));
    assert!(approx_eq(m.x_axis.x, 0.0));
}

#[test]
fn irradiance_evaluates_to_a_constant_for_a_uniform_sky() {
    let mut coefficients = [Vec3::ZERO; 9];
    coefficients[0] = Vec3::new(1.0, 2.0, 3.0);
    let [red, green, blue] = irradiance_matrices(&coefficients, false);
    for normal in [Vec3::X, Vec3::NEG_Y, Vec3::new(0.6, 0.0, 0.8)] {
        let n = normal.extend(1.0);
        let e = |m: Mat4| n.dot(m * n);
        assert!(approx_eq(e(red), 0.886_227));
        assert!(approx_eq(e(green), 2.0 * 0.886_227));
        assert!(approx_eq(e(blue), 3.0 * 0.886_227));
    }
}

#[test]
fn environment_light_exposes_matrices_from_coefficients() {
    let renderer = headless();
    let environment = EnvironmentLight::with_spherical_harmonics(&renderer, 4).expect("environment");
    let mut coefficients = [Vec3::ZERO; 9];
    coefficients[0] = Vec3::ONE;
    coefficients[6] = Vec3::new(0.5, 0.0, 0.0);
    environment.set_sh_coefficients(coefficients);
    assert_eq!(environment.sh_coefficients(), coefficients);
    assert_eq!(environment.irradiance_matrices(false), irradiance_matrices(&coefficients, false));
    assert_ne!(environment.irradiance_matrices(true), environment.irradiance_matrices(false));
}

// ============================================================================
// Environment light
// ============================================================================

#[test]
fn environment_map_is_a_half_float_cube() {
    let renderer = headless();
    let environment = EnvironmentLight::new(&renderer, 8).expect("environment");
    let map = environment.environment_map().expect("cube map");
    assert_eq!(map.specification().format, TextureFormat::Rgb16F);
    assert_eq!(map.specification().layers(), 6);
    assert!(!environment.has_spherical_harmonics());
}

#[test]
fn update_without_a_source_image_fails() {
    let renderer = headless();
    let environment = EnvironmentLight::new(&renderer, 4).expect("environment");
    assert!(matches!(
        environment.update_environment(&renderer),
        Err(LumenError::ResourceNotFound { .. })
    ));
}

#[test]
fn projection_reads_nine_coefficients_back() {
    let renderer = headless();
    // Texel (x, y) of the 3x3 target receives coefficient 3y + x.
    let program: FragmentProgram = Rc::new(|input: &FragmentInput<'_>| {
        let x = (input.uv[0] * 3.0).floor();
        let y = (input.uv[1] * 3.0).floor();
        [3.0 * y + x, 0.5, 1.0, 1.0]
    });
    headless_api(&renderer).register_program("sh_projection", program);

    let environment = EnvironmentLight::with_spherical_harmonics(&renderer, 4).expect("environment");
    let source = Texture2D::create(
        renderer.api().as_ref(),
        &TextureSpecification::attachment(TextureFormat::Rgba8).with_size(8, 4),
    )
    .expect("source image");
    environment.set_equirectangular_map(source);
    environment.update_environment(&renderer).expect("update");

    let coefficients = environment.sh_coefficients();
    for (i, c) in coefficients.iter().enumerate() {
        assert_eq!(*c, Vec3::new(i as f32, 0.5, 1.0), "coefficient {i}");
    }

    let faces = headless_api(&renderer)
        .draws()
        .iter()
        .filter(|d| d.shader.as_deref() == Some("equirectangular_to_cube"))
        .count();
    assert_eq!(faces, 6, "one draw per cube face");
}
