//! The scene: camera, lights, models, framebuffers and the ordered render
//! passes that draw them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::app::events::Event;
use crate::app::input::Input;
use crate::errors::Result;
use crate::renderer::Renderer;
use crate::renderer::framebuffer::FrameBuffer;
use crate::renderer::viewport::Viewport;
use crate::resources::material::Material;
use crate::resources::model::{Model, ModelLibrary};
use crate::scene::camera::Camera;
use crate::scene::light::{Light, LightLibrary};
use crate::scene::render_pass::{RenderPassSpecification, Renderable};
use crate::utils::{Library, Timestep};

/// Name the viewport's framebuffer is registered under.
pub const SCREEN_BUFFER: &str = "ScreenBuffer";

pub struct Scene {
    camera: Rc<RefCell<Camera>>,
    lights: LightLibrary,
    models: ModelLibrary,
    framebuffers: Library<Rc<dyn FrameBuffer>>,
    render_passes: Library<RenderPassSpecification>,
    viewport: Viewport,
}

impl Scene {
    /// A scene seen through `camera` with a viewport of the camera's size.
    pub fn new(renderer: &Renderer, camera: Camera) -> Result<Self> {
        let viewport = Viewport::new(renderer, camera.width(), camera.height())?;
        let mut framebuffers = Library::new("framebuffer");
        framebuffers.add(SCREEN_BUFFER, Rc::clone(viewport.framebuffer()))?;
        Ok(Self {
            camera: Rc::new(RefCell::new(camera)),
            lights: LightLibrary::new(),
            models: Library::new("model"),
            framebuffers,
            render_passes: Library::new("render pass"),
            viewport,
        })
    }

    #[must_use]
    pub fn camera(&self) -> &Rc<RefCell<Camera>> {
        &self.camera
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    #[must_use]
    pub fn lights(&self) -> &LightLibrary {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut LightLibrary {
        &mut self.lights
    }

    /// Registers a light and hands back a typed handle.
    pub fn add_light<T: Light>(&mut self, name: impl Into<String>, light: T) -> Result<Rc<T>> {
        self.lights.create(name, light)
    }

    pub fn add_model(&mut self, name: impl Into<String>, model: Model) -> Result<Rc<Model>> {
        let model = Rc::new(model);
        self.models.add(name, Rc::clone(&model))?;
        Ok(model)
    }

    #[must_use]
    pub fn model(&self, name: &str) -> Option<&Rc<Model>> {
        self.models.get(name)
    }

    #[must_use]
    pub fn models(&self) -> &ModelLibrary {
        &self.models
    }

    pub fn add_framebuffer(&mut self, name: impl Into<String>, framebuffer: Rc<dyn FrameBuffer>) -> Result<()> {
        self.framebuffers.add(name, framebuffer)
    }

    #[must_use]
    pub fn framebuffer(&self, name: &str) -> Option<&Rc<dyn FrameBuffer>> {
        self.framebuffers.get(name)
    }

    pub fn add_render_pass(&mut self, name: impl Into<String>, pass: RenderPassSpecification) -> Result<()> {
        self.render_passes.add(name, pass)
    }

    #[must_use]
    pub fn render_pass(&self, name: &str) -> Option<&RenderPassSpecification> {
        self.render_passes.get(name)
    }

    pub fn render_pass_mut(&mut self, name: &str) -> Option<&mut RenderPassSpecification> {
        self.render_passes.get_mut(name)
    }

    pub fn remove_render_pass(&mut self, name: &str) -> Option<RenderPassSpecification> {
        self.render_passes.remove(name)
    }

    /// Writes every light into a lit material's shader.
    pub fn define_shadow_properties(&self, material: &dyn Material) {
        material.define_light_properties(&self.lights);
    }

    // ========================================================================
    // Frame
    // ========================================================================

    pub fn on_update(&mut self, ts: Timestep, input: &Input) {
        self.camera.borrow_mut().on_update(ts, input);
    }

    /// Feeds the camera and follows window resizes. Returns whether the
    /// event was consumed.
    pub fn on_event(&mut self, event: &Event) -> bool {
        if let Event::WindowResize { width, height, .. } = *event {
            if self.camera.borrow_mut().set_viewport_size(width, height)
                && let Err(err) = self.viewport.resize(width, height)
            {
                log::error!("Viewport resize to {width}x{height} failed: {err}");
            }
            return false;
        }
        self.camera.borrow_mut().on_event(event)
    }

    /// Executes every active render pass in insertion order.
    pub fn draw(&self, renderer: &Renderer) {
        for (name, pass) in self.render_passes.iter() {
            if pass.active {
                self.execute(renderer, name, pass);
            }
        }
    }

    /// Composites the screen buffer onto the window.
    pub fn render_to_screen(&self, renderer: &Renderer) -> Result<()> {
        self.viewport.render_to_screen(renderer)
    }

    fn execute(&self, renderer: &Renderer, name: &str, pass: &RenderPassSpecification) {
        let api = renderer.api();
        if let Some(hook) = &pass.hooks.pre_render {
            hook(renderer);
        }

        let target = &pass.target;
        api.begin_render_pass(target.framebuffer.clone());
        let (width, height) = match (target.viewport_size, &target.framebuffer) {
            (Some(size), _) => size,
            (None, Some(framebuffer)) => {
                let spec = framebuffer.specification();
                (spec.width, spec.height)
            }
            (None, None) => api.screen_size(),
        };
        api.set_viewport(0, 0, width, height);

        if target.clear_enabled {
            api.set_clear_color(target.clear_color);
            match target.clear_targets {
                Some(mask) => api.clear_targets(mask),
                None => api.clear(),
            }
        }

        let camera = pass.render.camera.as_ref().unwrap_or(&self.camera);
        renderer.begin_scene(&camera.borrow());

        if pass.render.render_lights {
            for (light_name, light) in self.lights.iter() {
                if let Err(err) = light.draw_light(renderer) {
                    log::warn!("Render pass '{name}': light '{light_name}' could not be drawn: {err}");
                }
            }
        }

        for renderable in &pass.render.models {
            self.draw_renderable(renderer, name, renderable);
        }

        renderer.end_scene();
        api.end_render_pass();

        if let Some(hook) = &pass.hooks.post_render {
            hook(renderer);
        }
    }

    fn draw_renderable(&self, renderer: &Renderer, pass: &str, renderable: &Renderable) {
        let Some(model) = self.models.get(&renderable.model_name) else {
            log::warn!("Render pass '{pass}': model '{}' not found; skipped", renderable.model_name);
            return;
        };
        if !renderable.material_name.is_empty() {
            let Some(material) = renderer.material(&renderable.material_name) else {
                log::warn!(
                    "Render pass '{pass}': material '{}' not found; skipped",
                    renderable.material_name
                );
                return;
            };
            if let Some(setup) = &renderable.material_setup {
                setup(material.as_ref());
            }
            model.set_material(material);
        }
        if let Some(material) = model.material()
            && material.lighting().is_some()
        {
            self.define_shadow_properties(material.as_ref());
        }
        model.draw(renderer);
    }
}
