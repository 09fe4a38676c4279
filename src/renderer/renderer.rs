//! The scene-level renderer façade.
//!
//! [`Renderer`] sits between the scene and the backend: it owns the
//! backend handle, the shader and material libraries, the per-scene camera
//! state and the frame statistics. Draws go through
//! [`Renderer::draw`], which binds the material, writes the transform block
//! the material asks for and issues one backend draw.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::rc::Rc;

use glam::{Mat3, Mat4, Vec3};

use crate::errors::Result;
use crate::renderer::api::{BackendContext, Primitive, RendererApi, create_renderer_api};
use crate::renderer::drawable::Drawable;
use crate::renderer::settings::RendererSettings;
use crate::renderer::shader::{Shader, ShaderLibrary};
use crate::resources::material::{Material, MaterialFlags, MaterialLibrary};
use crate::resources::primitives::{MeshData, create_cube, create_quad};
use crate::scene::camera::Camera;

/// Camera state of the scene being drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneData {
    pub view_position: Vec3,
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for SceneData {
    fn default() -> Self {
        Self {
            view_position: Vec3::ZERO,
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

/// Counters since the last [`Renderer::reset_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderStats {
    pub render_passes: u32,
    pub draw_calls: u32,
}

pub struct Renderer {
    api: Rc<dyn RendererApi>,
    settings: RendererSettings,
    scene: Cell<SceneData>,
    in_scene: Cell<bool>,
    stats: Cell<RenderStats>,
    shaders: RefCell<ShaderLibrary>,
    materials: RefCell<MaterialLibrary>,
    quad: RefCell<Option<Rc<dyn Drawable>>>,
    cube: RefCell<Option<Rc<dyn Drawable>>>,
}

impl Renderer {
    /// Creates the backend selected by `settings.api` and initializes it.
    pub fn new(settings: RendererSettings, context: BackendContext) -> Result<Self> {
        let api = create_renderer_api(settings.api, context)?;
        Self::with_api(api, settings)
    }

    /// Wraps an existing backend and runs its one-time setup.
    pub fn with_api(api: Rc<dyn RendererApi>, settings: RendererSettings) -> Result<Self> {
        api.init()?;
        api.set_clear_color(settings.clear_color);
        log::info!("Renderer initialized on {:?}", api.api());
        Ok(Self {
            api,
            settings,
            scene: Cell::new(SceneData::default()),
            in_scene: Cell::new(false),
            stats: Cell::new(RenderStats::default()),
            shaders: RefCell::new(ShaderLibrary::new()),
            materials: RefCell::new(MaterialLibrary::new()),
            quad: RefCell::new(None),
            cube: RefCell::new(None),
        })
    }

    #[must_use]
    pub fn api(&self) -> &Rc<dyn RendererApi> {
        &self.api
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    // ------------------------------------------------------------------
    // Scene bracket
    // ------------------------------------------------------------------

    /// Starts a scene seen through `camera`.
    pub fn begin_scene(&self, camera: &Camera) {
        self.begin_scene_with(camera.view_matrix(), camera.projection_matrix(), camera.position());
    }

    pub fn begin_scene_with(&self, view: Mat4, projection: Mat4, view_position: Vec3) {
        if self.in_scene.replace(true) {
            log::warn!("begin_scene called inside an open scene; restarting it");
        }
        self.scene.set(SceneData {
            view_position,
            view,
            projection,
        });
        self.update_stats(|stats| stats.render_passes += 1);
    }

    pub fn end_scene(&self) {
        if !self.in_scene.replace(false) {
            log::warn!("end_scene called without begin_scene");
        }
    }

    #[must_use]
    pub fn scene_data(&self) -> SceneData {
        self.scene.get()
    }

    // ------------------------------------------------------------------
    // Draws
    // ------------------------------------------------------------------

    /// Binds `material`, writes the transform uniforms its flags request
    /// and issues one draw of `drawable`.
    pub fn draw(&self, drawable: &dyn Drawable, material: &dyn Material, transform: Mat4, primitive: Primitive) {
        let shader = material.shader();
        if drawable.shader().is_none_or(|current| !Rc::ptr_eq(&current, &shader)) {
            drawable.set_shader(Rc::clone(&shader));
        }
        material.bind();
        write_transform(shader.as_ref(), material.flags(), &self.scene.get(), transform);
        self.api.draw(drawable, primitive);
        material.unbind();
        self.update_stats(|stats| stats.draw_calls += 1);
    }

    #[must_use]
    pub fn stats(&self) -> RenderStats {
        self.stats.get()
    }

    pub fn reset_stats(&self) {
        self.stats.set(RenderStats::default());
    }

    fn update_stats(&self, f: impl FnOnce(&mut RenderStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    // ------------------------------------------------------------------
    // Shared resources
    // ------------------------------------------------------------------

    /// Shader `name` from the library, compiled on first use.
    pub fn load_shader(&self, name: &str) -> Result<Rc<dyn Shader>> {
        self.shaders.borrow_mut().load(self.api.as_ref(), name)
    }

    #[must_use]
    pub fn shaders(&self) -> Ref<'_, ShaderLibrary> {
        self.shaders.borrow()
    }

    /// Registers a material; duplicate names fail.
    pub fn create_material<T: Material>(&self, name: impl Into<String>, material: T) -> Result<Rc<T>> {
        self.materials.borrow_mut().create(name, material)
    }

    #[must_use]
    pub fn material(&self, name: &str) -> Option<Rc<dyn Material>> {
        self.materials.borrow().get(name)
    }

    #[must_use]
    pub fn materials(&self) -> Ref<'_, MaterialLibrary> {
        self.materials.borrow()
    }

    pub fn materials_mut(&self) -> RefMut<'_, MaterialLibrary> {
        self.materials.borrow_mut()
    }

    /// The fullscreen quad shared by every post pass.
    pub fn fullscreen_quad(&self) -> Result<Rc<dyn Drawable>> {
        self.shared_geometry(&self.quad, create_quad)
    }

    /// The `[-1, 1]` cube cube-map passes draw.
    pub fn unit_cube(&self) -> Result<Rc<dyn Drawable>> {
        self.shared_geometry(&self.cube, || create_cube(2.0))
    }

    fn shared_geometry(
        &self,
        slot: &RefCell<Option<Rc<dyn Drawable>>>,
        build: impl FnOnce() -> MeshData,
    ) -> Result<Rc<dyn Drawable>> {
        if let Some(drawable) = slot.borrow().as_ref() {
            return Ok(Rc::clone(drawable));
        }
        let drawable = build().upload(self.api.as_ref())?;
        *slot.borrow_mut() = Some(Rc::clone(&drawable));
        Ok(drawable)
    }
}

fn write_transform(shader: &dyn Shader, flags: MaterialFlags, scene: &SceneData, model: Mat4) {
    if flags.contains(MaterialFlags::TRANSFORM) {
        shader.set_mat4("u_Transform.Model", model);
        shader.set_mat4("u_Transform.View", scene.view);
        shader.set_mat4("u_Transform.Projection", scene.projection);
    }
    if flags.contains(MaterialFlags::NORMAL_MATRIX) {
        shader.set_mat3("u_Transform.Normal", Mat3::from_mat4(model).inverse().transpose());
    }
    if flags.contains(MaterialFlags::VIEW_DIRECTION) {
        shader.set_vec3("u_Transform.ViewPosition", scene.view_position);
    }
}
