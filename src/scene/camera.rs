//! Fly/orbit camera with perspective or orthographic projection.
//!
//! Orientation is stored as Euler angles in degrees: pitch about X
//! (positive looks down), yaw about Y (positive turns right) and roll
//! about the view axis. Projections use the `[-1, 1]` clip-depth
//! convention on every backend.

use glam::{EulerRot, Mat4, Quat, Vec2, Vec3};

use crate::app::events::Event;
use crate::app::input::{Input, KeyCode, MouseButton};
use crate::utils::Timestep;

const MIN_FOV: f32 = 1.0;
const MAX_FOV: f32 = 160.0;
const MAX_PITCH: f32 = 89.0;
const MIN_ORTHO_SIZE: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Projection {
    /// Vertical field of view in degrees.
    Perspective { fov: f32 },
    /// Height of the view volume in world units.
    Orthographic { size: f32 },
}

/// Speeds of the interactive controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMovement {
    /// World units per second.
    pub translation: f32,
    /// Degrees per pixel of a turning drag.
    pub rotation: f32,
    /// Degrees per second of orthographic keyboard roll.
    pub roll: f32,
    /// Degrees per pixel of an orbit drag.
    pub orbit: f32,
    /// Fov degrees per scroll step.
    pub zoom: f32,
    /// Fraction of the orthographic size per scroll step.
    pub ortho_zoom: f32,
}

impl Default for CameraMovement {
    fn default() -> Self {
        Self {
            translation: 2.5,
            rotation: 0.2,
            roll: 20.0,
            orbit: 0.3,
            zoom: 2.0,
            ortho_zoom: 0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Camera {
    projection: Projection,
    position: Vec3,
    target: Vec3,
    /// `(pitch, yaw, roll)` in degrees.
    rotation: Vec3,
    width: u32,
    height: u32,
    near: f32,
    far: f32,

    view_matrix: Mat4,
    projection_matrix: Mat4,

    pub movement: CameraMovement,
    pub enabled: bool,
    drag: Option<MouseButton>,
    last_cursor: Option<Vec2>,
}

impl Camera {
    #[must_use]
    pub fn new(projection: Projection, width: u32, height: u32, near: f32, far: f32) -> Self {
        let mut camera = Self {
            projection,
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            rotation: Vec3::ZERO,
            width: width.max(1),
            height: height.max(1),
            near,
            far,
            view_matrix: Mat4::IDENTITY,
            projection_matrix: Mat4::IDENTITY,
            movement: CameraMovement::default(),
            enabled: true,
            drag: None,
            last_cursor: None,
        };
        camera.update_projection_matrix();
        camera.update_view_matrix();
        camera
    }

    /// `fov` in degrees.
    #[must_use]
    pub fn perspective(fov: f32, width: u32, height: u32, near: f32, far: f32) -> Self {
        Self::new(Projection::Perspective { fov }, width, height, near, far)
    }

    #[must_use]
    pub fn orthographic(size: f32, width: u32, height: u32, near: f32, far: f32) -> Self {
        Self::new(Projection::Orthographic { size }, width, height, near, far)
    }

    // ========================================================================
    // Matrices
    // ========================================================================

    pub fn update_projection_matrix(&mut self) {
        let aspect = self.aspect_ratio();
        self.projection_matrix = match self.projection {
            Projection::Perspective { fov } => Mat4::perspective_rh_gl(fov.to_radians(), aspect, self.near, self.far),
            Projection::Orthographic { size } => {
                let half_w = size * aspect * 0.5;
                let half_h = size * 0.5;
                Mat4::orthographic_rh_gl(-half_w, half_w, -half_h, half_h, self.near, self.far)
            }
        };
    }

    pub fn update_view_matrix(&mut self) {
        let world = Mat4::from_rotation_translation(self.orientation(), self.position);
        self.view_matrix = world.inverse();
    }

    #[must_use]
    pub fn view_matrix(&self) -> Mat4 {
        self.view_matrix
    }

    #[must_use]
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection_matrix
    }

    #[must_use]
    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix * self.view_matrix
    }

    /// Unit quaternion built from `(-pitch, -yaw, -roll)`.
    #[must_use]
    pub fn orientation(&self) -> Quat {
        let r = self.rotation * (std::f32::consts::PI / 180.0);
        Quat::from_euler(EulerRot::ZYX, -r.z, -r.y, -r.x)
    }

    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.orientation() * Vec3::NEG_Z
    }

    #[must_use]
    pub fn right(&self) -> Vec3 {
        self.orientation() * Vec3::X
    }

    #[must_use]
    pub fn up(&self) -> Vec3 {
        self.orientation() * Vec3::Y
    }

    // ========================================================================
    // Placement
    // ========================================================================

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.update_view_matrix();
    }

    #[must_use]
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Turns the camera towards `target`, keeping its roll.
    pub fn look_at(&mut self, target: Vec3) {
        self.target = target;
        let offset = target - self.position;
        if offset.length_squared() > f32::EPSILON {
            let dir = offset.normalize();
            self.rotation.x = (-dir.y).clamp(-1.0, 1.0).asin().to_degrees();
            self.rotation.y = dir.x.atan2(-dir.z).to_degrees();
        }
        self.update_view_matrix();
    }

    /// `(pitch, yaw, roll)` in degrees.
    #[must_use]
    pub fn rotation(&self) -> Vec3 {
        self.rotation
    }

    pub fn set_rotation(&mut self, rotation: Vec3) {
        self.rotation = rotation;
        self.target = self.position + self.forward() * self.distance();
        self.update_view_matrix();
    }

    fn distance(&self) -> f32 {
        self.position.distance(self.target).max(1.0)
    }

    // ========================================================================
    // Projection parameters
    // ========================================================================

    #[must_use]
    pub fn projection(&self) -> Projection {
        self.projection
    }

    pub fn set_projection(&mut self, projection: Projection) {
        self.projection = projection;
        self.update_projection_matrix();
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    #[must_use]
    pub fn near(&self) -> f32 {
        self.near
    }

    #[must_use]
    pub fn far(&self) -> f32 {
        self.far
    }

    pub fn set_clip_planes(&mut self, near: f32, far: f32) {
        self.near = near;
        self.far = far;
        self.update_projection_matrix();
    }

    /// Returns false, leaving the camera untouched, for a zero-sized
    /// viewport.
    pub fn set_viewport_size(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            log::warn!("Camera viewport size {width}x{height} ignored; both sides must be positive");
            return false;
        }
        self.width = width;
        self.height = height;
        self.update_projection_matrix();
        true
    }

    // ========================================================================
    // Interaction
    // ========================================================================

    /// Keyboard movement: `W`/`S` forward and back, `A`/`D` sideways and
    /// `Q`/`E` down and up. Orthographic cameras pan in the view plane
    /// with `W`/`A`/`S`/`D` and roll with `Q`/`E`.
    pub fn on_update(&mut self, ts: Timestep, input: &Input) {
        if !self.enabled {
            return;
        }
        let step = ts.seconds() * self.movement.translation;
        let axis = |positive: KeyCode, negative: KeyCode| {
            f32::from(u8::from(input.is_key_pressed(positive))) - f32::from(u8::from(input.is_key_pressed(negative)))
        };
        let (forward, right, up) = (axis(KeyCode::W, KeyCode::S), axis(KeyCode::D, KeyCode::A), axis(KeyCode::E, KeyCode::Q));

        match self.projection {
            Projection::Perspective { .. } => {
                let delta = (self.forward() * forward + self.right() * right + self.up() * up) * step;
                if delta != Vec3::ZERO {
                    let distance = self.distance();
                    self.position += delta;
                    self.target = self.position + self.forward() * distance;
                    self.update_view_matrix();
                }
            }
            Projection::Orthographic { .. } => {
                let delta = (self.up() * forward + self.right() * right) * step;
                let roll = up * ts.seconds() * self.movement.roll;
                if delta != Vec3::ZERO || roll != 0.0 {
                    self.position += delta;
                    self.target += delta;
                    self.rotation.z += roll;
                    self.update_view_matrix();
                }
            }
        }
    }

    /// Left drag orbits around the target, right drag turns in place and
    /// scrolling zooms.
    pub fn on_event(&mut self, event: &Event) -> bool {
        if !self.enabled {
            return false;
        }
        match *event {
            Event::MouseButtonPressed { button } if matches!(button, MouseButton::Left | MouseButton::Right) => {
                self.drag = Some(button);
                false
            }
            Event::MouseButtonReleased { button } if self.drag == Some(button) => {
                self.drag = None;
                false
            }
            Event::MouseMoved { x, y } => {
                let cursor = Vec2::new(x, y);
                let delta = self.last_cursor.map_or(Vec2::ZERO, |last| cursor - last);
                self.last_cursor = Some(cursor);
                match self.drag {
                    Some(MouseButton::Left) => self.orbit(delta),
                    Some(MouseButton::Right) => self.turn(delta),
                    _ => return false,
                }
                true
            }
            Event::MouseScrolled { dy, .. } => {
                self.zoom(dy);
                true
            }
            _ => false,
        }
    }

    fn orbit(&mut self, delta: Vec2) {
        let distance = self.position.distance(self.target);
        self.rotation.y += delta.x * self.movement.orbit;
        self.rotation.x = (self.rotation.x + delta.y * self.movement.orbit).clamp(-MAX_PITCH, MAX_PITCH);
        self.position = self.target - self.forward() * distance;
        self.update_view_matrix();
    }

    fn turn(&mut self, delta: Vec2) {
        let distance = self.distance();
        self.rotation.y += delta.x * self.movement.rotation;
        self.rotation.x = (self.rotation.x + delta.y * self.movement.rotation).clamp(-MAX_PITCH, MAX_PITCH);
        self.target = self.position + self.forward() * distance;
        self.update_view_matrix();
    }

    fn zoom(&mut self, steps: f32) {
        self.projection = match self.projection {
            Projection::Perspective { fov } => Projection::Perspective {
                fov: (fov - steps * self.movement.zoom).clamp(MIN_FOV, MAX_FOV),
            },
            Projection::Orthographic { size } => Projection::Orthographic {
                size: (size * (1.0 - steps * self.movement.ortho_zoom)).max(MIN_ORTHO_SIZE),
            },
        };
        self.update_projection_matrix();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_follows_yaw_and_pitch() {
        let mut camera = Camera::perspective(45.0, 800, 600, 0.1, 100.0);
        camera.set_rotation(Vec3::new(0.0, 90.0, 0.0));
        assert!((camera.forward() - Vec3::X).length() < 1e-5);
        camera.set_rotation(Vec3::new(90.0, 0.0, 0.0));
        assert!((camera.forward() - Vec3::NEG_Y).length() < 1e-5);
    }

    #[test]
    fn zero_viewport_is_rejected() {
        let mut camera = Camera::perspective(45.0, 800, 600, 0.1, 100.0);
        assert!(!camera.set_viewport_size(0, 600));
        assert_eq!(camera.width(), 800);
    }
}
