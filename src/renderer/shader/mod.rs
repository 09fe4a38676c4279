//! Shaders and their reflected interfaces.
//!
//! Every backend shader reflects two tables at construction: a
//! [`UniformLibrary`] for values and a name → [`TextureBinding`] map for
//! samplers. Setters address uniforms by dotted path; names the shader does
//! not declare warn once and are otherwise ignored.

pub mod library;
pub mod reflect;
pub mod source;
pub mod uniform;

use std::any::Any;
use std::cell::Ref;
use std::fmt;
use std::rc::Rc;

use glam::{Mat2, Mat3, Mat4, Vec2, Vec3, Vec4};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::renderer::texture::{Texture, TextureType};

pub use library::ShaderLibrary;
pub use source::{ShaderSource, ShaderStage, ShaderStages};
pub use uniform::{
    GroupBinding, PathSegment, Uniform, UniformElement, UniformLibrary, UniformMember,
    UniformPacking, UniformPath, UniformValue,
};

/// Where a sampled texture binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBinding {
    /// Texture binding index (bind-group slot, or reflection order on
    /// backends that bind through texture units).
    pub index: u32,
    /// Companion sampler binding, on backends with separate samplers.
    pub sampler_index: Option<u32>,
    pub group: u32,
    pub ty: TextureType,
    pub depth: bool,
    pub stages: ShaderStages,
}

/// Reflection tables shared by every backend shader.
#[derive(Debug, Clone, Default)]
pub struct ShaderInterface {
    pub uniforms: UniformLibrary,
    pub textures: FxHashMap<String, TextureBinding>,
    reported_textures: FxHashSet<String>,
}

impl ShaderInterface {
    #[must_use]
    pub fn new(uniforms: UniformLibrary) -> Self {
        Self {
            uniforms,
            ..Self::default()
        }
    }

    /// Looks up a sampler, warning once per missing name.
    pub fn texture(&mut self, shader: &str, name: &str) -> Option<TextureBinding> {
        let binding = self.textures.get(name).copied();
        if binding.is_none() && self.reported_textures.insert(name.to_string()) {
            log::warn!("Shader '{shader}': texture '{name}' not found");
        }
        binding
    }
}

/// A compiled program plus its reflected interface.
///
/// A shader that failed to compile stays alive in a "not loaded" state:
/// binding it and setting values on it do nothing.
pub trait Shader: Any {
    fn name(&self) -> &str;

    fn is_loaded(&self) -> bool;

    fn bind(&self);

    fn unbind(&self);

    fn interface(&self) -> Ref<'_, ShaderInterface>;

    /// Writes one uniform leaf. Returns `false` for soft misses.
    fn set_uniform(&self, name: &str, value: UniformValue) -> bool;

    /// Binds `texture` to the sampler `name` through texture unit `slot`.
    fn set_texture(&self, name: &str, texture: &Rc<dyn Texture>, slot: u32) -> bool;

    fn as_any(&self) -> &dyn Any;

    fn texture_binding(&self, name: &str) -> Option<TextureBinding> {
        self.interface().textures.get(name).copied()
    }

    /// True when the shader declares `name`; warns otherwise.
    fn is_uniform(&self, name: &str) -> bool {
        let exists = self.interface().uniforms.exists(name);
        if !exists {
            log::warn!("Shader '{}': '{}' is not a uniform", self.name(), name);
        }
        exists
    }

    fn set_bool(&self, name: &str, value: bool) {
        self.set_uniform(name, value.into());
    }

    fn set_int(&self, name: &str, value: i32) {
        self.set_uniform(name, value.into());
    }

    fn set_float(&self, name: &str, value: f32) {
        self.set_uniform(name, value.into());
    }

    fn set_vec2(&self, name: &str, value: Vec2) {
        self.set_uniform(name, value.into());
    }

    fn set_vec3(&self, name: &str, value: Vec3) {
        self.set_uniform(name, value.into());
    }

    fn set_vec4(&self, name: &str, value: Vec4) {
        self.set_uniform(name, value.into());
    }

    fn set_mat2(&self, name: &str, value: Mat2) {
        self.set_uniform(name, value.into());
    }

    fn set_mat3(&self, name: &str, value: Mat3) {
        self.set_uniform(name, value.into());
    }

    fn set_mat4(&self, name: &str, value: Mat4) {
        self.set_uniform(name, value.into());
    }
}

impl fmt::Debug for dyn Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("name", &self.name())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}
