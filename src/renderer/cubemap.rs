//! Cube map view sets and face-by-face rendering.

use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::errors::Result;
use crate::renderer::api::{CoordinateConvention, Primitive};
use crate::renderer::framebuffer::FrameBuffer;
use crate::renderer::renderer::Renderer;
use crate::resources::material::Material;

/// Projection plus the six face views, in `+X -X +Y -Y +Z -Z` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeMap {
    pub projection: Mat4,
    pub views: [Mat4; 6],
}

// Face axis and the up vector OpenGL cube sampling expects for it.
const FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// Builds the view set looking out of `eye` along each axis.
///
/// `fov` is in degrees and is normally 90. Backends with
/// `swap_cube_y` get the `+Y` and `-Y` views exchanged.
#[must_use]
pub fn build_cube_map(convention: CoordinateConvention, near: f32, far: f32, fov: f32, eye: Vec3) -> CubeMap {
    let projection = Mat4::perspective_rh_gl(fov.to_radians(), 1.0, near, far);
    let mut views = FACES.map(|(axis, up)| Mat4::look_at_rh(eye, eye + axis, up));
    if convention.swap_cube_y {
        views.swap(2, 3);
    }
    CubeMap { projection, views }
}

/// Right-multiplies every view by `rotation`.
#[must_use]
pub fn rotate_cube_map(cube: &CubeMap, rotation: Mat4) -> CubeMap {
    CubeMap {
        projection: cube.projection,
        views: cube.views.map(|view| view * rotation),
    }
}

/// Renders a unit cube with `material` into each face of color attachment
/// 0 of `framebuffer` at mip `level`.
pub fn render_cube_map(
    renderer: &Renderer,
    cube: &CubeMap,
    material: &dyn Material,
    framebuffer: &Rc<dyn FrameBuffer>,
    width: u32,
    height: u32,
    level: u32,
    generate_mipmaps: bool,
) -> Result<()> {
    let api = renderer.api();
    let geometry = renderer.unit_cube()?;

    api.begin_render_pass(Some(Rc::clone(framebuffer)));
    api.set_viewport(0, 0, width, height);
    let mut outcome = Ok(());
    for (face, view) in (0u32..).zip(cube.views.iter()) {
        if let Err(err) = framebuffer.bind_for_draw_attachment_cube(0, face, level) {
            outcome = Err(err);
            break;
        }
        api.clear();
        renderer.begin_scene_with(*view, cube.projection, Vec3::ZERO);
        renderer.draw(geometry.as_ref(), material, Mat4::IDENTITY, Primitive::Triangle);
        renderer.end_scene();
    }
    api.end_render_pass();

    if outcome.is_ok() && generate_mipmaps {
        framebuffer.generate_mipmaps();
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    const GL: CoordinateConvention = CoordinateConvention {
        depth_zero_to_one: false,
        swap_cube_y: false,
    };

    #[test]
    fn swapped_convention_exchanges_y_faces() {
        let gl = build_cube_map(GL, 0.1, 10.0, 90.0, Vec3::ZERO);
        let metal = build_cube_map(
            CoordinateConvention {
                depth_zero_to_one: true,
                swap_cube_y: true,
            },
            0.1,
            10.0,
            90.0,
            Vec3::ZERO,
        );
        assert_eq!(gl.views[2], metal.views[3]);
        assert_eq!(gl.views[3], metal.views[2]);
        assert_eq!(gl.views[0], metal.views[0]);
    }

    #[test]
    fn identity_rotation_keeps_views() {
        let cube = build_cube_map(GL, 0.1, 10.0, 90.0, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(rotate_cube_map(&cube, Mat4::IDENTITY), cube);
    }
}
