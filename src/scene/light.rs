//! Lights and the library the scene keeps them in.
//!
//! Shadow-casting lights ([`DirectionalLight`], [`PositionalLight`]) share
//! a [`LightCaster`]: a process-unique id, color and strengths, a shadow
//! camera and a depth-only shadow map. Each writes its block of
//! `u_Environment.Lights[id]` into lit shaders.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

use glam::{Mat4, Quat, Vec3, Vec4};

use crate::errors::Result;
use crate::renderer::Renderer;
use crate::renderer::api::Primitive;
use crate::renderer::drawable::Drawable;
use crate::renderer::framebuffer::{FrameBuffer, FrameBufferSpecification};
use crate::renderer::shader::Shader;
use crate::renderer::texture::TextureSpecification;
use crate::resources::material::{LightProperty, Material, SHADOW_MAP_SLOT_0, SimpleColorMaterial};
use crate::resources::primitives::{SphereOptions, create_sphere};
use crate::scene::camera::Camera;
use crate::utils::Library;

static NEXT_LIGHT_ID: AtomicU32 = AtomicU32::new(0);

/// Name of the material gizmos are drawn with.
pub const LIGHT_GIZMO_MATERIAL: &str = "LightGizmo";

/// Anything that contributes light to lit materials.
pub trait Light: Any {
    /// Writes this light's uniforms into the bound `shader`.
    fn define_light_properties(&self, shader: &dyn Shader, flags: LightProperty);

    /// Draws a visible marker, if the light has one.
    fn draw_light(&self, _renderer: &Renderer) -> Result<()> {
        Ok(())
    }

    /// Caster state, for lights that cast shadows.
    fn caster(&self) -> Option<&LightCaster> {
        None
    }

    fn id(&self) -> Option<u32> {
        self.caster().map(LightCaster::id)
    }

    fn as_any(&self) -> &dyn Any;
}

impl dyn Light {
    #[must_use]
    pub fn downcast_ref<T: Light>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

impl fmt::Debug for dyn Light {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Light").field("id", &self.id()).finish()
    }
}

// ============================================================================
// Caster
// ============================================================================

/// State shared by shadow-casting lights.
pub struct LightCaster {
    id: u32,
    color: Cell<Vec3>,
    diffuse_strength: Cell<f32>,
    specular_strength: Cell<f32>,
    shadow_camera: Rc<RefCell<Camera>>,
    shadow_map: Rc<dyn FrameBuffer>,
}

impl LightCaster {
    /// Allocates the next light id and a square depth-only shadow map
    /// matching `camera`'s width.
    pub fn new(renderer: &Renderer, camera: Camera) -> Result<Self> {
        let size = camera.width();
        let depth = TextureSpecification::attachment(renderer.settings().depth_format);
        let shadow_map = renderer
            .api()
            .create_framebuffer(&FrameBufferSpecification::new(size, size, vec![depth]))?;
        let id = NEXT_LIGHT_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("Light caster {id} created with a {size}x{size} shadow map");
        Ok(Self {
            id,
            color: Cell::new(Vec3::ONE),
            diffuse_strength: Cell::new(0.8),
            specular_strength: Cell::new(0.5),
            shadow_camera: Rc::new(RefCell::new(camera)),
            shadow_map,
        })
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn color(&self) -> Vec3 {
        self.color.get()
    }

    pub fn set_color(&self, color: Vec3) {
        self.color.set(color);
    }

    #[must_use]
    pub fn diffuse_strength(&self) -> f32 {
        self.diffuse_strength.get()
    }

    pub fn set_diffuse_strength(&self, strength: f32) {
        self.diffuse_strength.set(strength);
    }

    #[must_use]
    pub fn specular_strength(&self) -> f32 {
        self.specular_strength.get()
    }

    pub fn set_specular_strength(&self, strength: f32) {
        self.specular_strength.set(strength);
    }

    #[must_use]
    pub fn shadow_camera(&self) -> &Rc<RefCell<Camera>> {
        &self.shadow_camera
    }

    #[must_use]
    pub fn shadow_map(&self) -> &Rc<dyn FrameBuffer> {
        &self.shadow_map
    }

    /// `projection * view` of the shadow camera.
    #[must_use]
    pub fn shadow_transform(&self) -> Mat4 {
        self.shadow_camera.borrow().view_projection()
    }

    /// Writes `u_Environment.Lights[id]` with `vector` as the light's
    /// position (`w = 1`) or direction (`w = 0`).
    fn define(&self, shader: &dyn Shader, flags: LightProperty, vector: Vec4) {
        let light = format!("u_Environment.Lights[{}]", self.id);
        if flags.contains(LightProperty::GENERAL_PROPERTIES) {
            shader.set_vec4(&format!("{light}.Vector"), vector);
            shader.set_vec3(&format!("{light}.Color"), self.color.get());
        }
        if flags.contains(LightProperty::DIFFUSE_LIGHTING) {
            shader.set_float(&format!("{light}.DiffuseStrength"), self.diffuse_strength.get());
        }
        if flags.contains(LightProperty::SPECULAR_LIGHTING) {
            shader.set_float(&format!("{light}.SpecularStrength"), self.specular_strength.get());
        }
        if flags.contains(LightProperty::SHADOW_PROPERTIES) {
            shader.set_mat4(&format!("{light}.ShadowTransform"), self.shadow_transform());
            if let Some(depth) = self.shadow_map.depth_attachment() {
                shader.set_texture(&format!("u_ShadowMap{}", self.id), &depth, SHADOW_MAP_SLOT_0 + self.id);
            }
        }
    }
}

// ============================================================================
// Directional
// ============================================================================

pub struct DirectionalLight {
    caster: LightCaster,
    direction: Cell<Vec3>,
    target: Cell<Vec3>,
    distance: Cell<f32>,
}

impl DirectionalLight {
    pub const DEFAULT_DISTANCE: f32 = 15.0;
    pub const DEFAULT_SHADOW_SIZE: f32 = 20.0;

    /// A light shining along `direction` onto the origin.
    pub fn new(renderer: &Renderer, direction: Vec3) -> Result<Self> {
        let size = renderer.settings().shadow_map_size;
        let camera = Camera::orthographic(
            Self::DEFAULT_SHADOW_SIZE,
            size,
            size,
            0.1,
            Self::DEFAULT_DISTANCE * 2.0,
        );
        let light = Self {
            caster: LightCaster::new(renderer, camera)?,
            direction: Cell::new(direction),
            target: Cell::new(Vec3::ZERO),
            distance: Cell::new(Self::DEFAULT_DISTANCE),
        };
        light.update_shadow_camera();
        Ok(light)
    }

    #[must_use]
    pub fn direction(&self) -> Vec3 {
        self.direction.get()
    }

    pub fn set_direction(&self, direction: Vec3) {
        self.direction.set(direction);
        self.update_shadow_camera();
    }

    #[must_use]
    pub fn target(&self) -> Vec3 {
        self.target.get()
    }

    pub fn set_target(&self, target: Vec3) {
        self.target.set(target);
        self.update_shadow_camera();
    }

    pub fn set_distance(&self, distance: f32) {
        self.distance.set(distance);
        self.update_shadow_camera();
    }

    /// Places the shadow camera `distance` units against the light
    /// direction from the target.
    fn update_shadow_camera(&self) {
        let direction = self.direction.get().normalize_or(Vec3::NEG_Y);
        let target = self.target.get();
        let mut camera = self.caster.shadow_camera.borrow_mut();
        camera.set_position(target - direction * self.distance.get());
        camera.look_at(target);
    }
}

impl Light for DirectionalLight {
    fn define_light_properties(&self, shader: &dyn Shader, flags: LightProperty) {
        self.caster.define(shader, flags, self.direction.get().extend(0.0));
    }

    fn caster(&self) -> Option<&LightCaster> {
        Some(&self.caster)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Positional
// ============================================================================

pub struct PositionalLight {
    caster: LightCaster,
    position: Cell<Vec3>,
    target: Cell<Vec3>,
    gizmo: RefCell<Option<Rc<dyn Drawable>>>,
}

impl PositionalLight {
    const GIZMO_SCALE: f32 = 0.1;

    /// A light at `position` whose shadow camera spans `angle` degrees.
    pub fn new(renderer: &Renderer, position: Vec3, angle: f32) -> Result<Self> {
        let size = renderer.settings().shadow_map_size;
        let camera = Camera::perspective(angle, size, size, 0.1, 100.0);
        let light = Self {
            caster: LightCaster::new(renderer, camera)?,
            position: Cell::new(position),
            target: Cell::new(Vec3::ZERO),
            gizmo: RefCell::new(None),
        };
        light.update_shadow_camera();
        Ok(light)
    }

    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position.get()
    }

    pub fn set_position(&self, position: Vec3) {
        self.position.set(position);
        self.update_shadow_camera();
    }

    pub fn set_target(&self, target: Vec3) {
        self.target.set(target);
        self.update_shadow_camera();
    }

    fn update_shadow_camera(&self) {
        let mut camera = self.caster.shadow_camera.borrow_mut();
        camera.set_position(self.position.get());
        camera.look_at(self.target.get());
    }

    fn gizmo(&self, renderer: &Renderer) -> Result<Rc<dyn Drawable>> {
        if let Some(gizmo) = self.gizmo.borrow().as_ref() {
            return Ok(Rc::clone(gizmo));
        }
        let sphere = create_sphere(&SphereOptions {
            radius: 1.0,
            segments: 16,
            rings: 8,
        })
        .upload(renderer.api().as_ref())?;
        *self.gizmo.borrow_mut() = Some(Rc::clone(&sphere));
        Ok(sphere)
    }
}

impl Light for PositionalLight {
    fn define_light_properties(&self, shader: &dyn Shader, flags: LightProperty) {
        self.caster.define(shader, flags, self.position.get().extend(1.0));
    }

    fn draw_light(&self, renderer: &Renderer) -> Result<()> {
        let material: Rc<dyn Material> = match renderer.material(LIGHT_GIZMO_MATERIAL) {
            Some(material) => material,
            None => renderer.create_material(LIGHT_GIZMO_MATERIAL, SimpleColorMaterial::new(renderer)?)?,
        };
        if let Some(color) = material.downcast_ref::<SimpleColorMaterial>() {
            color.set_color(self.caster.color().extend(1.0));
        }
        let transform = Mat4::from_scale_rotation_translation(
            Vec3::splat(Self::GIZMO_SCALE),
            Quat::IDENTITY,
            self.position.get(),
        );
        let gizmo = self.gizmo(renderer)?;
        renderer.draw(gizmo.as_ref(), material.as_ref(), transform, Primitive::Triangle);
        Ok(())
    }

    fn caster(&self) -> Option<&LightCaster> {
        Some(&self.caster)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// ============================================================================
// Spherical harmonics
// ============================================================================

/// The nine RGB coefficients of a second-order spherical-harmonic
/// expansion, ordered `L00, L1-1, L10, L11, L2-2, L2-1, L20, L21, L22`.
pub type ShCoefficients = [Vec3; 9];

const L00: usize = 0;
const L1M1: usize = 1;
const L10: usize = 2;
const L11: usize = 3;
const L2M2: usize = 4;
const L2M1: usize = 5;
const L20: usize = 6;
const L21: usize = 7;
const L22: usize = 8;

/// Fills the symmetric matrix shared by both irradiance forms; `w` is the
/// constant term.
fn sh_matrix(l: [f32; 9], quadratic: f32, linear: f32, z2: f32, w: f32) -> Mat4 {
    let m00 = quadratic * l[L22];
    let m01 = quadratic * l[L2M2];
    let m02 = quadratic * l[L21];
    let m03 = linear * l[L11];
    let m12 = quadratic * l[L2M1];
    let m13 = linear * l[L1M1];
    let m22 = z2 * l[L20];
    let m23 = linear * l[L10];
    // Row-major layout, symmetric so column order is identical.
    Mat4::from_cols_array_2d(&[
        [m00, m01, m02, m03],
        [m01, -m00, m12, m13],
        [m02, m12, m22, m23],
        [m03, m13, m23, w],
    ])
}

fn channel(coefficients: &ShCoefficients, index: usize) -> [f32; 9] {
    coefficients.map(|c| c[index])
}

/// Irradiance matrix `M` of one channel such that `E(n) = nᵀ M n` with
/// `n = (x, y, z, 1)`.
#[must_use]
pub fn isotropic_irradiance_matrix(l: [f32; 9]) -> Mat4 {
    const C1: f32 = 0.429_043;
    const C2: f32 = 0.511_664;
    const C3: f32 = 0.743_125;
    const C4: f32 = 0.886_227;
    const C5: f32 = 0.247_708;
    sh_matrix(l, C1, C2, C3, C4 * l[L00] - C5 * l[L20])
}

/// Direction-dependent variant of [`isotropic_irradiance_matrix`].
#[must_use]
pub fn anisotropic_irradiance_matrix(l: [f32; 9]) -> Mat4 {
    const B0: f32 = 0.282_095;
    const B1: f32 = -0.068_284_3;
    const B2: f32 = -0.118_272;
    const B3: f32 = 0.039_423_9;
    sh_matrix(l, B1, B2, B3, B0 * l[L00] + B3 * l[L20])
}

/// Red, green and blue matrices for `coefficients`.
#[must_use]
pub fn irradiance_matrices(coefficients: &ShCoefficients, direction_dependent: bool) -> [Mat4; 3] {
    let build = if direction_dependent {
        anisotropic_irradiance_matrix
    } else {
        isotropic_irradiance_matrix
    };
    [0, 1, 2].map(|c| build(channel(coefficients, c)))
}

// ============================================================================
// Library
// ============================================================================

/// Lights by name, in insertion order.
pub struct LightLibrary {
    lights: Library<Rc<dyn Light>>,
}

impl Default for LightLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl LightLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self {
            lights: Library::new("light"),
        }
    }

    pub fn add(&mut self, name: impl Into<String>, light: Rc<dyn Light>) -> Result<()> {
        self.lights.add(name, light)
    }

    /// Registers `light` and hands back a typed handle.
    pub fn create<T: Light>(&mut self, name: impl Into<String>, light: T) -> Result<Rc<T>> {
        let light = Rc::new(light);
        self.lights.add(name, Rc::clone(&light) as Rc<dyn Light>)?;
        Ok(light)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Rc<dyn Light>> {
        self.lights.get(name).cloned()
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.lights.exists(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Rc<dyn Light>> {
        self.lights.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rc<dyn Light>)> {
        self.lights.iter()
    }

    /// Number of shadow-casting lights.
    #[must_use]
    pub fn caster_count(&self) -> usize {
        self.lights.iter().filter(|(_, light)| light.caster().is_some()).count()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isotropic_matrix_is_symmetric() {
        let l = [0.3, 0.1, -0.2, 0.4, 0.05, -0.15, 0.25, 0.6, -0.35];
        let m = isotropic_irradiance_matrix(l);
        assert_eq!(m, m.transpose());
    }

    #[test]
    fn anisotropic_constant_term_mixes_l00_and_l20() {
        let mut l = [0.0; 9];
        l[L00] = 1.0;
        l[L20] = 1.0;
        let m = anisotropic_irradiance_matrix(l);
        assert!((m.w_axis.w - (0.282_095 + 0.039_423_9)).abs() < 1e-6);
    }
}
