//! The low-level backend interface.
//!
//! [`RendererApi`] is the one capability every backend implements: fixed
//! function state, render-pass bracketing, draws, and factories for every
//! GPU resource kind. [`create_renderer_api`] picks the implementation from
//! a [`GraphicsApi`] value.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::path::PathBuf;
use std::rc::Rc;

use bitflags::bitflags;
use glam::Vec4;

use crate::errors::{LumenError, Result};
use crate::renderer::buffer::{IndexBuffer, VertexBuffer};
use crate::renderer::drawable::Drawable;
use crate::renderer::framebuffer::{BlitSpecification, FrameBuffer, FrameBufferSpecification};
use crate::renderer::layout::BufferLayout;
use crate::renderer::shader::{Shader, ShaderSource};
use crate::renderer::texture::{Texture, TextureSpecification};

// ============================================================================
// Enumerations
// ============================================================================

/// The graphics API a renderer runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GraphicsApi {
    #[default]
    None,
    OpenGl,
    /// The explicit API path, driven through wgpu (Metal on Apple targets).
    Metal,
    /// CPU reference backend without a GPU.
    Headless,
}

impl GraphicsApi {
    /// Extension appended to shader names by the shader factory.
    #[must_use]
    pub const fn shader_extension(self) -> &'static str {
        match self {
            Self::OpenGl | Self::Headless => ".glsl",
            // The Metal backend drives wgpu, which consumes WGSL rather than MSL.
            Self::Metal => ".wgsl",
            Self::None => "",
        }
    }

    #[must_use]
    pub const fn convention(self) -> CoordinateConvention {
        match self {
            Self::Metal => CoordinateConvention {
                depth_zero_to_one: true,
                swap_cube_y: true,
            },
            _ => CoordinateConvention {
                depth_zero_to_one: false,
                swap_cube_y: false,
            },
        }
    }
}

/// Clip-space and cube-face conventions of a backend. The single source for
/// every place that depends on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinateConvention {
    /// Clip depth spans `[0, 1]` instead of `[-1, 1]`. WGSL shaders remap
    /// depth in their vertex stage.
    pub depth_zero_to_one: bool,
    /// Cube face views for `+Y` and `-Y` trade places.
    pub swap_cube_y: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunction {
    Always,
    Never,
    #[default]
    Less,
    Equal,
    LEqual,
    Greater,
    NotEqual,
    GEqual,
}

impl DepthFunction {
    /// Evaluates the comparison `incoming <op> stored`.
    #[must_use]
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Less => incoming < stored,
            Self::Equal => (incoming - stored).abs() <= f32::EPSILON,
            Self::LEqual => incoming <= stored,
            Self::Greater => incoming > stored,
            Self::NotEqual => (incoming - stored).abs() > f32::EPSILON,
            Self::GEqual => incoming >= stored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FaceCulling {
    #[default]
    None,
    Front,
    Back,
    FrontAndBack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Primitive {
    Point,
    Line,
    LineStrip,
    #[default]
    Triangle,
    TriangleStrip,
}

bitflags! {
    /// Which framebuffer planes a clear or blit touches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RenderTargetMask: u8 {
        const COLOR = 1 << 0;
        const DEPTH = 1 << 1;
        const STENCIL = 1 << 2;
    }
}

// ============================================================================
// Shared fixed-function state
// ============================================================================

/// Fixed-function state every backend tracks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineState {
    pub clear_color: Vec4,
    pub viewport: [u32; 4],
    pub depth_test: bool,
    pub depth_function: DepthFunction,
    pub face_culling: FaceCulling,
    pub cube_map_seamless: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            viewport: [0, 0, 1, 1],
            depth_test: true,
            depth_function: DepthFunction::Less,
            face_culling: FaceCulling::None,
            cube_map_seamless: false,
        }
    }
}

/// The nullable "active framebuffer" slot of a render-pass bracket.
#[derive(Default)]
pub struct ActiveFrameBuffer {
    inside_pass: Cell<bool>,
    framebuffer: RefCell<Option<Rc<dyn FrameBuffer>>>,
}

impl ActiveFrameBuffer {
    /// Enters a pass. A pass that is still open is replaced with a warning.
    pub fn begin(&self, framebuffer: Option<Rc<dyn FrameBuffer>>) {
        if self.inside_pass.get() {
            log::warn!("begin_render_pass called while a render pass is active; replacing it");
        }
        self.inside_pass.set(true);
        *self.framebuffer.borrow_mut() = framebuffer;
    }

    /// Leaves the pass, returning the framebuffer that was active.
    pub fn end(&self) -> Option<Rc<dyn FrameBuffer>> {
        if !self.inside_pass.replace(false) {
            log::warn!("end_render_pass called without an active render pass");
        }
        self.framebuffer.borrow_mut().take()
    }

    #[must_use]
    pub fn get(&self) -> Option<Rc<dyn FrameBuffer>> {
        self.framebuffer.borrow().clone()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.inside_pass.get()
    }
}

// ============================================================================
// Backend capability
// ============================================================================

/// The backend-neutral renderer interface.
pub trait RendererApi: Any {
    fn api(&self) -> GraphicsApi;

    /// One-time state setup at bootstrap.
    fn init(&self) -> Result<()>;

    fn set_clear_color(&self, color: Vec4);

    fn set_viewport(&self, x: u32, y: u32, width: u32, height: u32);

    fn enable_depth_testing(&self, enabled: bool);

    fn set_depth_function(&self, function: DepthFunction);

    fn configure_depth_testing(&self, enabled: bool, function: DepthFunction) {
        self.enable_depth_testing(enabled);
        self.set_depth_function(function);
    }

    fn set_face_culling(&self, mode: FaceCulling);

    fn set_cube_map_seamless(&self, enabled: bool);

    fn state(&self) -> PipelineState;

    /// Binds `framebuffer`, or the screen for `None`, and makes it active.
    fn begin_render_pass(&self, framebuffer: Option<Rc<dyn FrameBuffer>>);

    fn active_framebuffer(&self) -> Option<Rc<dyn FrameBuffer>>;

    /// Clears the active framebuffer's planes, or color only on the screen.
    fn clear(&self) {
        let targets = self
            .active_framebuffer()
            .map_or(RenderTargetMask::COLOR, |fb| fb.render_targets());
        self.clear_targets(targets);
    }

    fn clear_targets(&self, targets: RenderTargetMask);

    /// One indexed draw of `drawable` with its current shader.
    fn draw(&self, drawable: &dyn Drawable, primitive: Primitive);

    /// Unbinds the active framebuffer and clears the active slot.
    fn end_render_pass(&self);

    /// Backend half of [`crate::renderer::framebuffer::blit`]; indices are
    /// already validated.
    fn blit(&self, src: &dyn FrameBuffer, dst: &dyn FrameBuffer, spec: &BlitSpecification) -> Result<()>;

    /// Size of the default framebuffer.
    fn screen_size(&self) -> (u32, u32);

    fn resize_screen(&self, width: u32, height: u32);

    /// Reads the default framebuffer as tightly packed RGBA8, bottom row
    /// first.
    fn read_screen_pixels(&self) -> Result<Vec<u8>>;

    /// Shows the finished default framebuffer. Backends that draw straight
    /// into the window have nothing to do here.
    fn present(&self) -> Result<()> {
        Ok(())
    }

    // ------------------------------------------------------------------
    // Factories
    // ------------------------------------------------------------------

    fn create_texture(
        &self,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
        path: Option<PathBuf>,
    ) -> Result<Rc<dyn Texture>>;

    /// The shared 1x1 white texture used when a texture cannot be loaded.
    fn white_texture(&self) -> Rc<dyn Texture>;

    fn create_framebuffer(&self, spec: &FrameBufferSpecification) -> Result<Rc<dyn FrameBuffer>>;

    /// Compiles `source`. Failures are logged with the stage name and yield
    /// a shader that is not loaded.
    fn create_shader(&self, source: &ShaderSource) -> Rc<dyn Shader>;

    fn create_vertex_buffer(&self, data: &[u8], count: u32, layout: BufferLayout) -> Result<Rc<dyn VertexBuffer>>;

    fn create_index_buffer(&self, indices: &[u32]) -> Result<Rc<dyn IndexBuffer>>;

    fn create_drawable(&self) -> Result<Rc<dyn Drawable>>;

    fn as_any(&self) -> &dyn Any;
}

/// Everything a backend needs from the windowing side.
pub enum BackendContext {
    /// No surface.
    None,
    /// Host-memory default framebuffer of the given size.
    Headless { width: u32, height: u32 },
    /// A loaded OpenGL context whose default framebuffer is the window.
    OpenGl {
        gl: Rc<glow::Context>,
        width: u32,
        height: u32,
    },
    /// An initialized wgpu context.
    Metal(crate::renderer::backend::metal::WgpuContext),
}

/// Builds the backend selected by `api`.
pub fn create_renderer_api(api: GraphicsApi, context: BackendContext) -> Result<Rc<dyn RendererApi>> {
    use crate::renderer::backend::{headless, metal, opengl};

    let backend: Rc<dyn RendererApi> = match (api, context) {
        (GraphicsApi::Headless, BackendContext::Headless { width, height }) => {
            Rc::new(headless::HeadlessRendererApi::new(width, height)?)
        }
        (GraphicsApi::Headless, _) => Rc::new(headless::HeadlessRendererApi::new(1, 1)?),
        (GraphicsApi::OpenGl, BackendContext::OpenGl { gl, width, height }) => {
            Rc::new(opengl::OpenGlRendererApi::new(gl, width, height)?)
        }
        (GraphicsApi::Metal, BackendContext::Metal(ctx)) => Rc::new(metal::MetalRendererApi::new(ctx)?),
        (GraphicsApi::None, _) => {
            crate::lumen_critical!("RendererAPI::None is not a drawable backend");
            return Err(LumenError::UnsupportedBackend("RendererAPI::None".into()));
        }
        (api, _) => {
            return Err(LumenError::UnsupportedBackend(format!(
                "{api:?} requires a matching backend context"
            )));
        }
    };
    log::info!("Created {:?} renderer backend", backend.api());
    Ok(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_extension_follows_backend() {
        assert_eq!(GraphicsApi::OpenGl.shader_extension(), ".glsl");
        assert_eq!(GraphicsApi::Metal.shader_extension(), ".wgsl");
        assert_eq!(GraphicsApi::Headless.shader_extension(), ".glsl");
    }

    #[test]
    fn none_backend_is_rejected() {
        let result = create_renderer_api(GraphicsApi::None, BackendContext::None);
        assert!(matches!(result, Err(LumenError::UnsupportedBackend(_))));
    }

    #[test]
    fn depth_functions_compare_incoming_to_stored() {
        assert!(DepthFunction::Less.passes(0.2, 0.5));
        assert!(!DepthFunction::Less.passes(0.5, 0.5));
        assert!(DepthFunction::LEqual.passes(0.5, 0.5));
        assert!(DepthFunction::GEqual.passes(0.7, 0.5));
        assert!(!DepthFunction::Never.passes(0.0, 1.0));
    }
}
