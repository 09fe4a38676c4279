//! Scene Tests
//!
//! Tests for:
//! - Render pass execution order, clearing and statistics
//! - Inactive passes, missing models and missing materials
//! - Per-pass pipeline state through hooks
//! - Viewport scaling and the final composite
//! - Window resize handling

use std::cell::RefCell;
use std::rc::Rc;

use glam::{Vec3, Vec4};

use lumen::app::events::Event;
use lumen::renderer::api::{BackendContext, FaceCulling, GraphicsApi, RenderTargetMask};
use lumen::renderer::backend::headless::{HeadlessFrameBuffer, HeadlessRendererApi};
use lumen::renderer::texture::{TextureFilterMode, TextureFormat, TextureSpecification};
use lumen::renderer::{FrameBufferSpecification, Renderer, RendererSettings};
use lumen::resources::material::{DepthMaterial, Material, PhongColorMaterial, SimpleColorMaterial};
use lumen::resources::model::{Model, Transform};
use lumen::resources::primitives::{create_cube, create_plane};
use lumen::scene::{Camera, DirectionalLight, RenderPassSpecification, Renderable, SCREEN_BUFFER, Scene};

const EPSILON: f32 = 1.0 / 255.0;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() <= EPSILON
}

fn headless(width: u32, height: u32) -> Renderer {
    Renderer::new(
        RendererSettings::default()
            .with_api(GraphicsApi::Headless)
            .with_shadow_map_size(16),
        BackendContext::Headless { width, height },
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

fn scene(renderer: &Renderer) -> Scene {
    let (width, height) = renderer.api().screen_size();
    Scene::new(renderer, Camera::perspective(45.0, width, height, 0.1, 100.0)).expect("scene")
}

fn add_cube(renderer: &Renderer, scene: &mut Scene, name: &str) {
    let drawable = create_cube(1.0).upload(renderer.api().as_ref()).expect("upload");
    scene.add_model(name, Model::new(drawable)).expect("model");
}

// ============================================================================
// Passes
// ============================================================================

#[test]
fn screen_pass_clears_to_its_color() {
    let renderer = headless(8, 6);
    let mut scene = scene(&renderer);
    let color = Vec4::new(0.2, 0.25, 0.3, 1.0);
    scene
        .add_render_pass("Clear", RenderPassSpecification::new().with_clear(color, None))
        .expect("pass");

    scene.draw(&renderer);

    let stats = renderer.stats();
    assert_eq!((stats.render_passes, stats.draw_calls), (1, 0));
    let screen = headless_api(&renderer).screen();
    for (x, y) in [(0, 0), (7, 5), (3, 2)] {
        let texel = screen.fetch(x, y, 0, 0);
        for c in 0..4 {
            assert!(approx_eq(texel[c], color[c]), "texel ({x}, {y}) channel {c}: {}", texel[c]);
        }
    }
}

#[test]
fn shadow_and_main_passes_run_in_order() {
    let renderer = headless(32, 32);
    let mut scene = scene(&renderer);
    add_cube(&renderer, &mut scene, "Cube");
    let plane = create_plane(10.0, 10.0).upload(renderer.api().as_ref()).expect("upload");
    scene
        .add_model(
            "Floor",
            Model::new(plane).with_transform(Transform::from_position(Vec3::new(0.0, -1.0, 0.0))),
        )
        .expect("model");
    scene
        .add_light("Sun", DirectionalLight::new(&renderer, Vec3::new(-1.0, -1.0, 0.0)).expect("light"))
        .expect("light");

    renderer
        .create_material("Depth", DepthMaterial::new(&renderer).expect("material"))
        .expect("register");
    renderer
        .create_material("Phong", PhongColorMaterial::new(&renderer).expect("material"))
        .expect("register");

    let shadow_map = renderer
        .api()
        .create_framebuffer(&FrameBufferSpecification::new(
            16,
            16,
            vec![TextureSpecification::attachment(TextureFormat::Depth24)],
        ))
        .expect("shadow map");
    let screen_buffer = Rc::clone(scene.framebuffer(SCREEN_BUFFER).expect("screen buffer"));

    scene
        .add_render_pass(
            "Shadow",
            RenderPassSpecification::new()
                .with_framebuffer(Rc::clone(&shadow_map))
                .with_clear(Vec4::ZERO, Some(RenderTargetMask::DEPTH))
                .with_model(Renderable::new("Cube").with_material("Depth"))
                .with_pre_render(|r| r.api().set_face_culling(FaceCulling::Front))
                .with_post_render(|r| r.api().set_face_culling(FaceCulling::None)),
        )
        .expect("pass");
    scene
        .add_render_pass(
            "Main",
            RenderPassSpecification::new()
                .with_framebuffer(screen_buffer)
                .with_model(Renderable::new("Cube").with_material("Phong"))
                .with_model(Renderable::new("Floor").with_material("Phong")),
        )
        .expect("pass");

    scene.draw(&renderer);

    let stats = renderer.stats();
    assert_eq!(stats.render_passes, 2);
    assert_eq!(stats.draw_calls, 3);

    let draws = headless_api(&renderer).draws();
    assert_eq!(draws.len(), 3);
    assert_eq!(draws[0].shader.as_deref(), Some("depth"));
    assert_eq!(draws[0].face_culling, FaceCulling::Front, "shadow draws cull front faces");
    assert_eq!(draws[0].viewport, [0, 0, 16, 16]);
    assert!(draws[1..].iter().all(|d| d.face_culling == FaceCulling::None));
    assert!(draws[1..].iter().all(|d| d.shader.as_deref() == Some("phong_color")));
    assert!(draws.iter().all(|d| d.offscreen));
}

#[test]
fn inactive_passes_are_skipped() {
    let renderer = headless(8, 8);
    let mut scene = scene(&renderer);
    add_cube(&renderer, &mut scene, "Cube");
    renderer
        .create_material("Flat", SimpleColorMaterial::new(&renderer).expect("material"))
        .expect("register");
    scene
        .add_render_pass(
            "Hidden",
            RenderPassSpecification::new().with_model(Renderable::new("Cube").with_material("Flat")),
        )
        .expect("pass");
    scene.render_pass_mut("Hidden").expect("pass").active = false;

    scene.draw(&renderer);

    assert_eq!(renderer.stats().render_passes, 0);
    assert!(headless_api(&renderer).draws().is_empty());
}

#[test]
fn no_framebuffer_stays_bound_after_a_frame() {
    let renderer = headless(8, 8);
    let mut scene = scene(&renderer);
    let screen_buffer = Rc::clone(scene.framebuffer(SCREEN_BUFFER).expect("screen buffer"));
    scene
        .add_render_pass("Offscreen", RenderPassSpecification::new().with_framebuffer(screen_buffer))
        .expect("pass");
    scene.draw(&renderer);
    assert!(renderer.api().active_framebuffer().is_none());
}

#[test]
fn ending_a_pass_refreshes_the_target_mip_chain() {
    let renderer = headless(8, 8);
    let mut scene = scene(&renderer);
    let target = renderer
        .api()
        .create_framebuffer(
            &FrameBufferSpecification::new(8, 8, vec![TextureSpecification::attachment(TextureFormat::Rgba8)])
                .with_mip_maps(true),
        )
        .expect("framebuffer");
    let red = Vec4::new(1.0, 0.0, 0.0, 1.0);
    scene
        .add_render_pass(
            "Mipped",
            RenderPassSpecification::new()
                .with_framebuffer(Rc::clone(&target))
                .with_clear(red, Some(RenderTargetMask::COLOR)),
        )
        .expect("pass");

    scene.draw(&renderer);

    let color = target
        .as_any()
        .downcast_ref::<HeadlessFrameBuffer>()
        .and_then(|fb| fb.color(0))
        .expect("color attachment");
    for level in [0, 1, 3] {
        let texel = color.fetch(0, 0, 0, level);
        for c in 0..4 {
            assert!(approx_eq(texel[c], red[c]), "level {level} channel {c}: {}", texel[c]);
        }
    }
}

#[test]
fn missing_model_or_material_is_skipped() {
    let renderer = headless(8, 8);
    let mut scene = scene(&renderer);
    add_cube(&renderer, &mut scene, "Cube");
    renderer
        .create_material("Flat", SimpleColorMaterial::new(&renderer).expect("material"))
        .expect("register");
    scene
        .add_render_pass(
            "Main",
            RenderPassSpecification::new()
                .with_model(Renderable::new("Ghost").with_material("Flat"))
                .with_model(Renderable::new("Cube").with_material("Nowhere"))
                .with_model(Renderable::new("Cube").with_material("Flat")),
        )
        .expect("pass");

    scene.draw(&renderer);

    assert_eq!(renderer.stats().draw_calls, 1, "only the complete renderable draws");
}

#[test]
fn setup_hook_adjusts_the_material_before_drawing() {
    let renderer = headless(8, 8);
    let mut scene = scene(&renderer);
    add_cube(&renderer, &mut scene, "Cube");
    let flat = renderer
        .create_material("Flat", SimpleColorMaterial::new(&renderer).expect("material"))
        .expect("register");
    scene
        .add_render_pass(
            "Main",
            RenderPassSpecification::new().with_model(Renderable::new("Cube").with_material("Flat").with_setup(
                |material: &dyn Material| {
                    if let Some(flat) = material.downcast_ref::<SimpleColorMaterial>() {
                        flat.set_color(Vec4::new(1.0, 0.0, 0.0, 1.0));
                    }
                },
            )),
        )
        .expect("pass");

    scene.draw(&renderer);

    assert_eq!(flat.color(), Vec4::new(1.0, 0.0, 0.0, 1.0));
    assert_eq!(
        scene.model("Cube").and_then(|m| m.material()).map(|m| m.shader().name().to_string()),
        Some("simple_color".into())
    );
}

#[test]
fn hooks_wrap_the_pass() {
    let renderer = headless(8, 8);
    let mut scene = scene(&renderer);
    let log = Rc::new(RefCell::new(Vec::new()));
    let (pre, post) = (Rc::clone(&log), Rc::clone(&log));
    scene
        .add_render_pass(
            "First",
            RenderPassSpecification::new()
                .without_clear()
                .with_pre_render(move |r| pre.borrow_mut().push(("pre", r.stats().render_passes)))
                .with_post_render(move |r| post.borrow_mut().push(("post", r.stats().render_passes))),
        )
        .expect("pass");

    scene.draw(&renderer);

    assert_eq!(*log.borrow(), [("pre", 0), ("post", 1)]);
}

// ============================================================================
// Viewport
// ============================================================================

#[test]
fn rescale_resizes_the_screen_buffer() {
    let renderer = headless(8, 8);
    let viewport_scene = Scene::new(&renderer, Camera::perspective(45.0, 800, 600, 0.1, 100.0)).expect("scene");
    let viewport = viewport_scene.viewport();
    viewport.rescale(0.5).expect("rescale");
    assert_eq!(viewport.size(), (800, 600));
    assert_eq!(viewport.buffer_size(), (400, 300));
    let spec = viewport.framebuffer().specification();
    assert_eq!((spec.width, spec.height), (400, 300));
    let color = viewport.framebuffer().attachment(0).expect("color");
    assert_eq!((color.specification().width, color.specification().height), (400, 300));
}

#[test]
fn half_scale_buffer_is_stretched_over_the_screen() {
    let renderer = headless(80, 60);
    let scene = scene(&renderer);
    let viewport = scene.viewport();
    viewport.rescale(0.5).expect("rescale");

    let framebuffer = viewport.framebuffer();
    let buffer = framebuffer
        .as_any()
        .downcast_ref::<HeadlessFrameBuffer>()
        .and_then(|fb| fb.color(0))
        .expect("screen buffer color");
    for y in 0..30 {
        for x in 0..40 {
            buffer.store(x, y, 0, 0, [x as f32 / 39.0, y as f32 / 29.0, 0.0, 1.0]);
        }
    }

    scene.render_to_screen(&renderer).expect("composite");

    let screen = headless_api(&renderer).screen();
    for (x, y) in [(0, 0), (10, 7), (41, 33), (79, 59)] {
        let u = (x as f32 + 0.5) / 80.0;
        let v = (y as f32 + 0.5) / 60.0;
        let expected = buffer.sample(u, v, 0, TextureFilterMode::Linear);
        let actual = screen.fetch(x, y, 0, 0);
        for c in 0..4 {
            assert!(
                approx_eq(actual[c], expected[c]),
                "screen ({x}, {y}) channel {c}: {} vs {}",
                actual[c],
                expected[c]
            );
        }
    }

    let composite = headless_api(&renderer).draws().pop().expect("composite draw");
    assert_eq!(composite.shader.as_deref(), Some("viewport"));
    assert!(!composite.offscreen);
    assert!(!composite.depth_test, "the composite ignores depth");
}

#[test]
fn window_resize_follows_through_to_camera_and_viewport() {
    let renderer = headless(8, 8);
    let mut scene = scene(&renderer);
    let resize = Event::WindowResize {
        title: "test".into(),
        width: 64,
        height: 32,
    };
    assert!(!scene.on_event(&resize), "resizes are not consumed");
    assert_eq!(scene.camera().borrow().width(), 64);
    assert_eq!(scene.viewport().size(), (64, 32));
    assert_eq!(scene.viewport().framebuffer().specification().width, 64);

    let minimized = Event::WindowResize {
        title: "test".into(),
        width: 0,
        height: 0,
    };
    scene.on_event(&minimized);
    assert_eq!(scene.viewport().size(), (64, 32));
}
