//! Camera and Cube Map Tests
//!
//! Tests for:
//! - Orientation stays a unit quaternion
//! - View matrix as the inverse of the camera's world placement
//! - look_at, viewport resizing and projection updates
//! - Movement settings driving zoom and roll
//! - Cube map view sets for both coordinate conventions

use glam::{Mat4, Vec3, Vec4};

use lumen::app::events::Event;
use lumen::app::{Input, KeyCode};
use lumen::renderer::api::GraphicsApi;
use lumen::renderer::cubemap::{build_cube_map, rotate_cube_map};
use lumen::scene::{Camera, CameraMovement, Projection};
use lumen::utils::Timestep;

const EPSILON: f32 = 1e-5;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

fn vec3_approx_eq(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < 1e-4
}

// ============================================================================
// Orientation
// ============================================================================

#[test]
fn orientation_is_normalized_for_any_rotation() {
    let mut camera = Camera::perspective(45.0, 800, 600, 0.1, 100.0);
    for rotation in [
        Vec3::ZERO,
        Vec3::new(30.0, 0.0, 0.0),
        Vec3::new(-45.0, 120.0, 10.0),
        Vec3::new(89.0, -270.0, 180.0),
    ] {
        camera.set_rotation(rotation);
        assert!(
            approx_eq(camera.orientation().length(), 1.0),
            "orientation for {rotation:?} has length {}",
            camera.orientation().length()
        );
    }
}

#[test]
fn default_camera_looks_down_negative_z() {
    let camera = Camera::perspective(45.0, 800, 600, 0.1, 100.0);
    assert_eq!(camera.position(), Vec3::new(0.0, 0.0, 5.0));
    assert!(vec3_approx_eq(camera.forward(), Vec3::NEG_Z));
    assert!(vec3_approx_eq(camera.up(), Vec3::Y));
}

// ============================================================================
// View matrix
// ============================================================================

#[test]
fn view_matrix_inverts_world_placement() {
    let mut camera = Camera::perspective(60.0, 640, 480, 0.1, 50.0);
    camera.set_position(Vec3::new(3.0, -2.0, 7.0));
    camera.set_rotation(Vec3::new(15.0, 40.0, 0.0));

    let world = camera.view_matrix().inverse();
    assert!(vec3_approx_eq(world.w_axis.truncate(), camera.position()));

    let origin = camera.view_matrix() * camera.position().extend(1.0);
    assert!(vec3_approx_eq(origin.truncate(), Vec3::ZERO), "camera sits at the view origin");
}

#[test]
fn look_at_puts_the_target_ahead() {
    let mut camera = Camera::perspective(45.0, 800, 600, 0.1, 100.0);
    camera.set_position(Vec3::new(4.0, 3.0, 4.0));
    camera.look_at(Vec3::ZERO);
    assert!(vec3_approx_eq(camera.forward(), (-camera.position()).normalize()));

    let target = camera.view_matrix() * Vec4::new(0.0, 0.0, 0.0, 1.0);
    assert!(approx_eq(target.x, 0.0) && approx_eq(target.y, 0.0));
    assert!(target.z < 0.0, "target lies in front of the camera");
}

// ============================================================================
// Projection
// ============================================================================

#[test]
fn viewport_resize_updates_aspect() {
    let mut camera = Camera::perspective(45.0, 800, 600, 0.1, 100.0);
    let before = camera.projection_matrix();
    assert!(camera.set_viewport_size(1000, 500));
    assert!(approx_eq(camera.aspect_ratio(), 2.0));
    assert_ne!(camera.projection_matrix(), before);
    assert!(!camera.set_viewport_size(1000, 0));
    assert_eq!((camera.width(), camera.height()), (1000, 500));
}

#[test]
fn orthographic_size_spans_the_view_height() {
    let camera = Camera::orthographic(10.0, 200, 100, 0.1, 30.0);
    let top = camera.projection_matrix() * Vec4::new(0.0, 5.0, -1.0, 1.0);
    let right = camera.projection_matrix() * Vec4::new(10.0, 0.0, -1.0, 1.0);
    assert!(approx_eq(top.y, 1.0));
    assert!(approx_eq(right.x, 1.0));
}

#[test]
fn scrolling_narrows_the_field_of_view() {
    let mut camera = Camera::perspective(45.0, 800, 600, 0.1, 100.0);
    assert!(camera.on_event(&Event::MouseScrolled { dx: 0.0, dy: 1.0 }));
    match camera.projection() {
        Projection::Perspective { fov } => assert!(fov < 45.0),
        Projection::Orthographic { .. } => panic!("projection kind changed"),
    }
}

#[test]
fn orthographic_zoom_uses_the_movement_setting() {
    let mut camera = Camera::orthographic(10.0, 200, 100, 0.1, 30.0);
    camera.movement = CameraMovement {
        ortho_zoom: 0.5,
        ..CameraMovement::default()
    };
    assert!(camera.on_event(&Event::MouseScrolled { dx: 0.0, dy: 1.0 }));
    match camera.projection() {
        Projection::Orthographic { size } => assert!(approx_eq(size, 5.0), "size {size}"),
        Projection::Perspective { .. } => panic!("projection kind changed"),
    }
}

#[test]
fn orthographic_roll_uses_the_movement_setting() {
    let mut camera = Camera::orthographic(10.0, 200, 100, 0.1, 30.0);
    camera.movement = CameraMovement {
        roll: 30.0,
        ..CameraMovement::default()
    };
    let mut input = Input::new();
    input.on_event(&Event::KeyPressed { key: KeyCode::E, repeat_count: 0 });
    let before = camera.rotation().z;

    camera.on_update(Timestep::from_seconds(0.5), &input);

    assert!(approx_eq(camera.rotation().z - before, 15.0));
}

// ============================================================================
// Cube maps
// ============================================================================

#[test]
fn cube_views_are_invertible() {
    let eye = Vec3::new(1.0, -2.0, 0.5);
    let cube = build_cube_map(GraphicsApi::OpenGl.convention(), 0.1, 10.0, 90.0, eye);
    for (i, view) in cube.views.iter().enumerate() {
        assert!(view.determinant().abs() > EPSILON, "view {i} is invertible");
        let back = view.inverse() * *view;
        assert!(back.abs_diff_eq(Mat4::IDENTITY, 1e-4), "view {i} round trips");
    }
}

#[test]
fn each_face_axis_projects_to_the_center() {
    let eye = Vec3::new(0.5, 1.0, -3.0);
    let axes = [Vec3::X, Vec3::NEG_X, Vec3::Y, Vec3::NEG_Y, Vec3::Z, Vec3::NEG_Z];
    let cube = build_cube_map(GraphicsApi::OpenGl.convention(), 0.1, 10.0, 90.0, eye);
    for (face, axis) in axes.iter().enumerate() {
        let clip = cube.projection * cube.views[face] * (eye + *axis).extend(1.0);
        let ndc = clip.truncate() / clip.w;
        assert!(approx_eq(ndc.x, 0.0) && approx_eq(ndc.y, 0.0), "face {face}: {ndc:?}");
    }
}

#[test]
fn metal_convention_swaps_the_y_faces() {
    let gl = build_cube_map(GraphicsApi::OpenGl.convention(), 0.1, 10.0, 90.0, Vec3::ZERO);
    let metal = build_cube_map(GraphicsApi::Metal.convention(), 0.1, 10.0, 90.0, Vec3::ZERO);
    assert_eq!(gl.views[2], metal.views[3]);
    assert_eq!(gl.views[3], metal.views[2]);
    for face in [0, 1, 4, 5] {
        assert_eq!(gl.views[face], metal.views[face]);
    }
}

#[test]
fn rotation_applies_to_every_face() {
    let cube = build_cube_map(GraphicsApi::Headless.convention(), 0.1, 10.0, 90.0, Vec3::ZERO);
    let rotation = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_2);
    let rotated = rotate_cube_map(&cube, rotation);
    assert_eq!(rotated.projection, cube.projection);
    for face in 0..6 {
        assert!(rotated.views[face].abs_diff_eq(cube.views[face] * rotation, EPSILON));
    }
}
