//! Materials: one shader plus typed properties.
//!
//! Concrete materials are declared with [`define_material!`](crate::define_material),
//! which generates the property cells, their accessors and the
//! [`Material`] implementation that pushes them into the shader on bind.
//! Lit materials additionally carry a [`Lighting`] mixin that writes the
//! scene's lights into `u_Environment`.

mod basic;
mod harmonics;
mod macros;
mod phong;
mod unlit;

pub use basic::{DepthMaterial, SimpleColorMaterial, ViewportMaterial};
pub use harmonics::{SHIrradianceMaterial, SHProjectionMaterial};
pub use phong::{PhongColorMaterial, PhongTextureMaterial};
pub use unlit::{EquirectangularMaterial, SkyboxMaterial, UnlitTextureMaterial};

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use bitflags::bitflags;

use crate::errors::Result;
use crate::renderer::shader::{Shader, UniformValue};
use crate::renderer::texture::Texture;
use crate::scene::light::LightLibrary;
use crate::utils::Library;

// ============================================================================
// Texture units
// ============================================================================

/// Units `0..MATERIAL_TEXTURE_SLOTS` belong to material textures, assigned
/// in property order on every bind.
pub const MATERIAL_TEXTURE_SLOTS: u32 = 4;
/// Unit of the environment cube map.
pub const ENVIRONMENT_MAP_SLOT: u32 = MATERIAL_TEXTURE_SLOTS;
/// Unit of the shadow map of light caster 0; caster `id` uses
/// `SHADOW_MAP_SLOT_0 + id`.
pub const SHADOW_MAP_SLOT_0: u32 = ENVIRONMENT_MAP_SLOT + 1;

// ============================================================================
// Flags
// ============================================================================

bitflags! {
    /// Per-draw uniforms a material's shader consumes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u8 {
        /// `u_Transform.Model`, `.View` and `.Projection`.
        const TRANSFORM = 1 << 0;
        /// `u_Transform.ViewPosition`.
        const VIEW_DIRECTION = 1 << 1;
        /// `u_Transform.Normal`, the inverse transpose of the model matrix.
        const NORMAL_MATRIX = 1 << 2;
    }
}

bitflags! {
    /// Which light data a lit material's shader reads.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LightProperty: u8 {
        const GENERAL_PROPERTIES = 1 << 0;
        const DIFFUSE_LIGHTING = 1 << 1;
        const SPECULAR_LIGHTING = 1 << 2;
        const SHADOW_PROPERTIES = 1 << 3;
        /// Use the anisotropic spherical-harmonic irradiance matrices.
        const DIRECTION_DEPENDENT = 1 << 4;
    }
}

// ============================================================================
// Property mixins
// ============================================================================

/// A value property written to one uniform leaf.
pub struct Property<T> {
    uniform: &'static str,
    value: Cell<T>,
}

impl<T: Copy + Into<UniformValue>> Property<T> {
    #[must_use]
    pub fn new(uniform: &'static str, value: T) -> Self {
        Self {
            uniform,
            value: Cell::new(value),
        }
    }

    #[must_use]
    pub fn uniform(&self) -> &'static str {
        self.uniform
    }

    pub fn get(&self) -> T {
        self.value.get()
    }

    pub fn set(&self, value: T) {
        self.value.set(value);
    }

    pub fn apply(&self, base: &MaterialBase) {
        base.shader().set_uniform(self.uniform, self.value.get().into());
    }
}

/// A sampled texture property.
pub struct TextureProperty {
    uniform: &'static str,
    texture: RefCell<Option<Rc<dyn Texture>>>,
}

impl TextureProperty {
    #[must_use]
    pub fn new(uniform: &'static str) -> Self {
        Self {
            uniform,
            texture: RefCell::new(None),
        }
    }

    #[must_use]
    pub fn uniform(&self) -> &'static str {
        self.uniform
    }

    #[must_use]
    pub fn get(&self) -> Option<Rc<dyn Texture>> {
        self.texture.borrow().clone()
    }

    pub fn set(&self, texture: Option<Rc<dyn Texture>>) {
        *self.texture.borrow_mut() = texture;
    }

    /// Binds the texture to the next free material unit. Unset textures
    /// take no unit.
    pub fn apply(&self, base: &MaterialBase) {
        if let Some(texture) = self.get() {
            base.bind_texture(self.uniform, &texture);
        }
    }
}

// ============================================================================
// Lighting mixin
// ============================================================================

/// Light-property mask of a lit material.
#[derive(Debug)]
pub struct Lighting {
    properties: Cell<LightProperty>,
}

impl Lighting {
    /// General, diffuse and specular lighting; shadows when the shader name
    /// contains `shadow`.
    #[must_use]
    pub fn for_shader(shader: &str) -> Self {
        let mut properties =
            LightProperty::GENERAL_PROPERTIES | LightProperty::DIFFUSE_LIGHTING | LightProperty::SPECULAR_LIGHTING;
        if shader.contains("shadow") {
            properties |= LightProperty::SHADOW_PROPERTIES;
        }
        Self {
            properties: Cell::new(properties),
        }
    }

    #[must_use]
    pub fn properties(&self) -> LightProperty {
        self.properties.get()
    }

    pub fn set_properties(&self, properties: LightProperty) {
        self.properties.set(properties);
    }

    /// Binds `shader`, writes the caster count and lets every light write
    /// its own block, in library order.
    pub fn define(&self, shader: &dyn Shader, lights: &LightLibrary) {
        shader.bind();
        shader.set_int("u_Environment.LightCount", lights.caster_count() as i32);
        let flags = self.properties.get();
        for (_, light) in lights.iter() {
            light.define_light_properties(shader, flags);
        }
    }
}

// ============================================================================
// Material
// ============================================================================

/// State every material shares: the shader, its flags and the texture unit
/// counter.
pub struct MaterialBase {
    shader: Rc<dyn Shader>,
    flags: MaterialFlags,
    lighting: Option<Lighting>,
    next_slot: Cell<u32>,
}

impl MaterialBase {
    #[must_use]
    pub fn new(shader: Rc<dyn Shader>, flags: MaterialFlags, lighted: bool) -> Self {
        let lighting = lighted.then(|| Lighting::for_shader(shader.name()));
        Self {
            shader,
            flags,
            lighting,
            next_slot: Cell::new(0),
        }
    }

    #[must_use]
    pub fn shader(&self) -> &Rc<dyn Shader> {
        &self.shader
    }

    #[must_use]
    pub fn flags(&self) -> MaterialFlags {
        self.flags
    }

    #[must_use]
    pub fn lighting(&self) -> Option<&Lighting> {
        self.lighting.as_ref()
    }

    /// Binds `texture` to sampler `name` on the next material unit.
    pub fn bind_texture(&self, name: &str, texture: &Rc<dyn Texture>) -> bool {
        let slot = self.next_slot.get();
        if slot >= MATERIAL_TEXTURE_SLOTS {
            log::warn!(
                "Shader '{}': no texture unit left for '{name}' ({MATERIAL_TEXTURE_SLOTS} in use)",
                self.shader.name()
            );
            return false;
        }
        self.next_slot.set(slot + 1);
        self.shader.set_texture(name, texture, slot)
    }

    pub fn reset_slots(&self) {
        self.next_slot.set(0);
    }
}

/// A shader plus the properties it is drawn with.
pub trait Material: Any {
    fn base(&self) -> &MaterialBase;

    /// Pushes every owned property into the (bound) shader.
    fn set_material_properties(&self);

    fn as_any(&self) -> &dyn Any;

    fn shader(&self) -> Rc<dyn Shader> {
        Rc::clone(self.base().shader())
    }

    fn flags(&self) -> MaterialFlags {
        self.base().flags()
    }

    fn lighting(&self) -> Option<&Lighting> {
        self.base().lighting()
    }

    /// Activates the shader and uploads the properties. Texture units
    /// restart at 0, so binding twice produces the same state.
    fn bind(&self) {
        let base = self.base();
        base.shader().bind();
        base.reset_slots();
        self.set_material_properties();
    }

    fn unbind(&self) {
        let base = self.base();
        base.shader().unbind();
        base.reset_slots();
    }

    /// Writes `lights` into the shader when the material is lit.
    fn define_light_properties(&self, lights: &LightLibrary) {
        if let Some(lighting) = self.lighting() {
            lighting.define(self.base().shader().as_ref(), lights);
        }
    }
}

impl dyn Material {
    #[must_use]
    pub fn downcast_ref<T: Material>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for dyn Material {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Material")
            .field("shader", &self.base().shader().name())
            .field("flags", &self.flags())
            .finish()
    }
}

// ============================================================================
// Library
// ============================================================================

/// Materials by name.
pub struct MaterialLibrary {
    materials: Library<Rc<dyn Material>>,
}

impl Default for MaterialLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl MaterialLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self {
            materials: Library::new("material"),
        }
    }

    /// Registers `material` under `name` and hands back a typed handle.
    pub fn create<T: Material>(&mut self, name: impl Into<String>, material: T) -> Result<Rc<T>> {
        let material = Rc::new(material);
        self.materials.add(name, Rc::clone(&material) as Rc<dyn Material>)?;
        Ok(material)
    }

    pub fn add(&mut self, name: impl Into<String>, material: Rc<dyn Material>) -> Result<()> {
        self.materials.add(name, material)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Rc<dyn Material>> {
        self.materials.get(name).cloned()
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.materials.exists(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Rc<dyn Material>> {
        self.materials.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rc<dyn Material>)> {
        self.materials.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_shaders_enable_shadow_properties() {
        let plain = Lighting::for_shader("phong_color");
        let shadowed = Lighting::for_shader("phong_color_shadow");
        assert!(!plain.properties().contains(LightProperty::SHADOW_PROPERTIES));
        assert!(shadowed.properties().contains(LightProperty::SHADOW_PROPERTIES));
        assert!(shadowed.properties().contains(LightProperty::DIFFUSE_LIGHTING));
    }
}
