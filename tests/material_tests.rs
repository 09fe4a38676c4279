//! Material Tests
//!
//! Tests for:
//! - Binding writes every property into the shader
//! - Binding twice leaves the device in the same state
//! - Texture units assigned in declaration order, skipping unset maps
//! - Material library lookups and light definitions

use std::rc::Rc;

use glam::{Vec3, Vec4};

use lumen::renderer::api::{BackendContext, GraphicsApi};
use lumen::renderer::backend::headless::HeadlessRendererApi;
use lumen::renderer::shader::UniformValue;
use lumen::renderer::texture::{Texture2D, TextureFormat, TextureSpecification};
use lumen::renderer::{Renderer, RendererSettings};
use lumen::resources::material::{
    LightProperty, Material, PhongColorMaterial, PhongTextureMaterial, SimpleColorMaterial, UnlitTextureMaterial,
};
use lumen::scene::{DirectionalLight, LightLibrary};

fn headless() -> Renderer {
    Renderer::new(
        RendererSettings::default()
            .with_api(GraphicsApi::Headless)
            .with_shadow_map_size(16),
        BackendContext::Headless { width: 4, height: 4 },
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

fn texture(renderer: &Renderer) -> Rc<dyn lumen::renderer::Texture> {
    Texture2D::create(
        renderer.api().as_ref(),
        &TextureSpecification::attachment(TextureFormat::Rgba8).with_size(2, 2),
    )
    .expect("texture")
}

// ============================================================================
// Binding
// ============================================================================

#[test]
fn bind_writes_properties() {
    let renderer = headless();
    let material = PhongColorMaterial::new(&renderer).expect("material");
    material.set_diffuse(Vec4::new(0.8, 0.1, 0.1, 1.0));
    material.set_shininess(8.0);
    material.bind();

    let shader = material.shader();
    let interface = shader.interface();
    assert_eq!(
        interface.uniforms.get("u_Material.Diffuse"),
        Some(UniformValue::Vec4(Vec4::new(0.8, 0.1, 0.1, 1.0)))
    );
    assert_eq!(interface.uniforms.get("u_Material.Shininess"), Some(UniformValue::Float(8.0)));
    assert_eq!(
        interface.uniforms.get("u_Material.Ambient"),
        Some(UniformValue::Vec4(Vec4::new(0.1, 0.1, 0.1, 1.0))),
        "defaults are written too"
    );
}

#[test]
fn binding_twice_is_idempotent() {
    let renderer = headless();
    let material = PhongTextureMaterial::new(&renderer).expect("material");
    material.set_diffuse_map(texture(&renderer));
    material.set_specular_map(texture(&renderer));
    material.set_shininess(16.0);

    material.bind();
    let first = headless_api(&renderer).snapshot();
    material.bind();
    let second = headless_api(&renderer).snapshot();

    assert_eq!(first, second);
    assert_eq!(first.program.as_deref(), Some("phong_texture"));
    assert!(first.uniforms.iter().any(|(name, _)| name == "u_Material.Shininess"));
}

#[test]
fn texture_units_follow_declaration_order() {
    let renderer = headless();
    let material = PhongTextureMaterial::new(&renderer).expect("material");
    let diffuse = texture(&renderer);
    let specular = texture(&renderer);
    material.set_diffuse_map(Rc::clone(&diffuse));
    material.set_specular_map(Rc::clone(&specular));
    material.bind();

    let units = headless_api(&renderer).snapshot().texture_units;
    assert!(units.contains(&(0, diffuse.id())));
    assert!(units.contains(&(1, specular.id())));
}

#[test]
fn unset_maps_take_no_unit() {
    let renderer = headless();
    let material = UnlitTextureMaterial::new(&renderer).expect("material");
    material.bind();
    assert!(headless_api(&renderer).snapshot().texture_units.is_empty());
}

#[test]
fn unbind_releases_the_program() {
    let renderer = headless();
    let material = SimpleColorMaterial::new(&renderer).expect("material");
    material.bind();
    assert_eq!(headless_api(&renderer).snapshot().program.as_deref(), Some("simple_color"));
    material.unbind();
    assert!(headless_api(&renderer).snapshot().program.is_none());
}

// ============================================================================
// Library and lighting
// ============================================================================

#[test]
fn registered_materials_are_found_by_name() {
    let renderer = headless();
    let flat = renderer
        .create_material("Flat", SimpleColorMaterial::new(&renderer).expect("material"))
        .expect("register");
    flat.set_color(Vec4::new(0.0, 1.0, 0.0, 1.0));

    let found = renderer.material("Flat").expect("lookup");
    let typed = found.downcast_ref::<SimpleColorMaterial>().expect("concrete type");
    assert_eq!(typed.color(), Vec4::new(0.0, 1.0, 0.0, 1.0));
    assert!(found.downcast_ref::<PhongColorMaterial>().is_none());
    assert!(renderer.material("Missing").is_none());

    let again = renderer.create_material("Flat", SimpleColorMaterial::new(&renderer).expect("material"));
    assert!(again.is_err(), "names are unique");
}

#[test]
fn only_lit_materials_receive_lights() {
    let renderer = headless();
    let phong = PhongColorMaterial::new(&renderer).expect("material");
    let flat = SimpleColorMaterial::new(&renderer).expect("material");
    assert!(phong.lighting().is_some());
    assert!(flat.lighting().is_none());

    let lighting = phong.lighting().expect("lighting");
    assert!(lighting.properties().contains(LightProperty::DIFFUSE_LIGHTING));
    assert!(!lighting.properties().contains(LightProperty::SHADOW_PROPERTIES));
    let shadowed = PhongColorMaterial::with_shader(&renderer, "phong_color_shadow").expect("material");
    assert!(
        shadowed
            .lighting()
            .is_some_and(|l| l.properties().contains(LightProperty::SHADOW_PROPERTIES))
    );

    let mut lights = LightLibrary::new();
    lights
        .create("Sun", DirectionalLight::new(&renderer, Vec3::NEG_Y).expect("light"))
        .expect("add");
    phong.define_light_properties(&lights);
    assert_eq!(
        phong.shader().interface().uniforms.get("u_Environment.LightCount"),
        Some(UniformValue::Int(1))
    );
}
