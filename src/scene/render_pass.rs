//! Declarative render passes.
//!
//! A [`RenderPassSpecification`] says where a pass draws (target), what it
//! draws and from where (render), and what runs around it (hooks). The
//! scene executes passes in insertion order.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use glam::Vec4;

use crate::renderer::Renderer;
use crate::renderer::api::RenderTargetMask;
use crate::renderer::framebuffer::FrameBuffer;
use crate::resources::material::Material;
use crate::scene::camera::Camera;

/// Callback run before or after a pass.
pub type PassHook = Box<dyn Fn(&Renderer)>;

/// Per-draw material tweak, run after the material is looked up.
pub type MaterialSetup = Box<dyn Fn(&dyn Material)>;

/// Where a pass renders.
pub struct RenderTarget {
    /// `None` renders to the default framebuffer.
    pub framebuffer: Option<Rc<dyn FrameBuffer>>,
    /// Overrides the framebuffer (or screen) size.
    pub viewport_size: Option<(u32, u32)>,
    pub clear_enabled: bool,
    pub clear_color: Vec4,
    /// `None` clears whatever planes the framebuffer has.
    pub clear_targets: Option<RenderTargetMask>,
}

impl Default for RenderTarget {
    fn default() -> Self {
        Self {
            framebuffer: None,
            viewport_size: None,
            clear_enabled: true,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            clear_targets: None,
        }
    }
}

/// A model drawn by a pass, optionally with a different material.
pub struct Renderable {
    pub model_name: String,
    /// Empty keeps the model's current material.
    pub material_name: String,
    pub material_setup: Option<MaterialSetup>,
}

impl Renderable {
    #[must_use]
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            material_name: String::new(),
            material_setup: None,
        }
    }

    #[must_use]
    pub fn with_material(mut self, material_name: impl Into<String>) -> Self {
        self.material_name = material_name.into();
        self
    }

    #[must_use]
    pub fn with_setup(mut self, setup: impl Fn(&dyn Material) + 'static) -> Self {
        self.material_setup = Some(Box::new(setup));
        self
    }
}

impl fmt::Debug for Renderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Renderable")
            .field("model_name", &self.model_name)
            .field("material_name", &self.material_name)
            .field("material_setup", &self.material_setup.is_some())
            .finish()
    }
}

/// What a pass draws.
#[derive(Default)]
pub struct RenderContent {
    /// `None` uses the scene camera.
    pub camera: Option<Rc<RefCell<Camera>>>,
    pub models: Vec<Renderable>,
    pub render_lights: bool,
}

#[derive(Default)]
pub struct RenderHooks {
    pub pre_render: Option<PassHook>,
    pub post_render: Option<PassHook>,
}

pub struct RenderPassSpecification {
    pub active: bool,
    pub target: RenderTarget,
    pub render: RenderContent,
    pub hooks: RenderHooks,
}

impl Default for RenderPassSpecification {
    fn default() -> Self {
        Self {
            active: true,
            target: RenderTarget::default(),
            render: RenderContent::default(),
            hooks: RenderHooks::default(),
        }
    }
}

impl RenderPassSpecification {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_framebuffer(mut self, framebuffer: Rc<dyn FrameBuffer>) -> Self {
        self.target.framebuffer = Some(framebuffer);
        self
    }

    #[must_use]
    pub fn with_viewport_size(mut self, width: u32, height: u32) -> Self {
        self.target.viewport_size = Some((width, height));
        self
    }

    #[must_use]
    pub fn with_clear(mut self, color: Vec4, targets: Option<RenderTargetMask>) -> Self {
        self.target.clear_enabled = true;
        self.target.clear_color = color;
        self.target.clear_targets = targets;
        self
    }

    #[must_use]
    pub fn without_clear(mut self) -> Self {
        self.target.clear_enabled = false;
        self
    }

    #[must_use]
    pub fn with_camera(mut self, camera: Rc<RefCell<Camera>>) -> Self {
        self.render.camera = Some(camera);
        self
    }

    #[must_use]
    pub fn with_model(mut self, renderable: Renderable) -> Self {
        self.render.models.push(renderable);
        self
    }

    #[must_use]
    pub fn with_lights(mut self, render_lights: bool) -> Self {
        self.render.render_lights = render_lights;
        self
    }

    #[must_use]
    pub fn with_pre_render(mut self, hook: impl Fn(&Renderer) + 'static) -> Self {
        self.hooks.pre_render = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn with_post_render(mut self, hook: impl Fn(&Renderer) + 'static) -> Self {
        self.hooks.post_render = Some(Box::new(hook));
        self
    }
}
