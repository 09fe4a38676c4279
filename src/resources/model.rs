//! Models: a drawable, where it sits and what it is drawn with.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::renderer::Renderer;
use crate::renderer::api::Primitive;
use crate::renderer::drawable::Drawable;
use crate::resources::material::Material;
use crate::utils::Library;

/// Translation, rotation (Euler angles in degrees) and scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_rotation(mut self, degrees: Vec3) -> Self {
        self.rotation = degrees;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Rotation applied X first, then Y, then Z.
    #[must_use]
    pub fn orientation(&self) -> Quat {
        let r = self.rotation * (std::f32::consts::PI / 180.0);
        Quat::from_euler(EulerRot::ZYX, r.z, r.y, r.x)
    }

    /// `T * R * S`.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation(), self.position)
    }
}

/// A drawable placed in the scene.
pub struct Model {
    drawable: Rc<dyn Drawable>,
    transform: Cell<Transform>,
    material: RefCell<Option<Rc<dyn Material>>>,
    primitive: Cell<Primitive>,
}

impl Model {
    #[must_use]
    pub fn new(drawable: Rc<dyn Drawable>) -> Self {
        Self {
            drawable,
            transform: Cell::new(Transform::default()),
            material: RefCell::new(None),
            primitive: Cell::new(Primitive::Triangle),
        }
    }

    #[must_use]
    pub fn with_transform(self, transform: Transform) -> Self {
        self.transform.set(transform);
        self
    }

    #[must_use]
    pub fn with_material(self, material: Rc<dyn Material>) -> Self {
        self.set_material(material);
        self
    }

    #[must_use]
    pub fn drawable(&self) -> &Rc<dyn Drawable> {
        &self.drawable
    }

    #[must_use]
    pub fn transform(&self) -> Transform {
        self.transform.get()
    }

    pub fn set_transform(&self, transform: Transform) {
        self.transform.set(transform);
    }

    pub fn set_position(&self, position: Vec3) {
        let mut transform = self.transform.get();
        transform.position = position;
        self.transform.set(transform);
    }

    #[must_use]
    pub fn material(&self) -> Option<Rc<dyn Material>> {
        self.material.borrow().clone()
    }

    pub fn set_material(&self, material: Rc<dyn Material>) {
        *self.material.borrow_mut() = Some(material);
    }

    #[must_use]
    pub fn primitive(&self) -> Primitive {
        self.primitive.get()
    }

    pub fn set_primitive(&self, primitive: Primitive) {
        self.primitive.set(primitive);
    }

    /// Draws with the assigned material. Returns false, with a warning,
    /// when none is assigned.
    pub fn draw(&self, renderer: &Renderer) -> bool {
        let Some(material) = self.material() else {
            log::warn!("Model drawn without a material; skipped");
            return false;
        };
        renderer.draw(
            self.drawable.as_ref(),
            material.as_ref(),
            self.transform.get().matrix(),
            self.primitive.get(),
        );
        true
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("transform", &self.transform.get())
            .field("primitive", &self.primitive.get())
            .field("has_material", &self.material.borrow().is_some())
            .finish_non_exhaustive()
    }
}

/// Models by name.
pub type ModelLibrary = Library<Rc<Model>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_applies_scale_then_rotation_then_translation() {
        let transform = Transform::from_position(Vec3::new(1.0, 0.0, 0.0))
            .with_rotation(Vec3::new(0.0, 90.0, 0.0))
            .with_scale(Vec3::splat(2.0));
        let p = transform.matrix().transform_point3(Vec3::X);
        // X scaled to 2, yawed onto -Z, then shifted by +X.
        assert!((p - Vec3::new(1.0, 0.0, -2.0)).length() < 1e-5, "got {p}");
    }
}
