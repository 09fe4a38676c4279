//! OpenGL 3.3 core backend on top of `glow`.
//!
//! The backend owns no window: it receives a loaded [`glow::Context`] whose
//! default framebuffer is the window surface. Buffer swapping stays with the
//! window layer.

mod buffer;
mod convert;
mod framebuffer;
mod shader;
mod texture;

use std::any::Any;
use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use glam::Vec4;
use glow::HasContext;

use crate::errors::{LumenError, Result};
use crate::renderer::api::{
    ActiveFrameBuffer, DepthFunction, FaceCulling, GraphicsApi, PipelineState, Primitive,
    RenderTargetMask, RendererApi,
};
use crate::renderer::buffer::{IndexBuffer, VertexBuffer};
use crate::renderer::drawable::Drawable;
use crate::renderer::framebuffer::{BlitSpecification, FrameBuffer, FrameBufferSpecification};
use crate::renderer::layout::BufferLayout;
use crate::renderer::shader::{Shader, ShaderSource};
use crate::renderer::texture::{
    Texture, TextureFilterMode, TextureFormat, TextureSpecification, TextureType,
};

pub use buffer::{OpenGlDrawable, OpenGlIndexBuffer, OpenGlVertexBuffer};
pub use framebuffer::OpenGlFrameBuffer;
pub use shader::OpenGlShader;
pub use texture::OpenGlTexture;

pub struct OpenGlRendererApi {
    gl: Rc<glow::Context>,
    state: Cell<PipelineState>,
    active: ActiveFrameBuffer,
    screen: Cell<(u32, u32)>,
    white: Rc<dyn Texture>,
}

fn mask_bits(targets: RenderTargetMask) -> u32 {
    let mut bits = 0;
    if targets.contains(RenderTargetMask::COLOR) {
        bits |= glow::COLOR_BUFFER_BIT;
    }
    if targets.contains(RenderTargetMask::DEPTH) {
        bits |= glow::DEPTH_BUFFER_BIT;
    }
    if targets.contains(RenderTargetMask::STENCIL) {
        bits |= glow::STENCIL_BUFFER_BIT;
    }
    bits
}

impl OpenGlRendererApi {
    /// Wraps a current context whose default framebuffer is `width` x `height`.
    pub fn new(gl: Rc<glow::Context>, width: u32, height: u32) -> Result<Self> {
        let white_spec = TextureSpecification::new(TextureType::Texture2D, TextureFormat::Rgba8);
        let white = OpenGlTexture::new(Rc::clone(&gl), &white_spec, Some(&[255; 4]), None)?;
        let state = PipelineState {
            viewport: [0, 0, width.max(1), height.max(1)],
            ..PipelineState::default()
        };
        Ok(Self {
            gl,
            state: Cell::new(state),
            active: ActiveFrameBuffer::default(),
            screen: Cell::new((width.max(1), height.max(1))),
            white: Rc::new(white),
        })
    }

    #[must_use]
    pub fn context(&self) -> &Rc<glow::Context> {
        &self.gl
    }

    fn update(&self, f: impl FnOnce(&mut PipelineState)) {
        let mut state = self.state.get();
        f(&mut state);
        self.state.set(state);
    }
}

impl RendererApi for OpenGlRendererApi {
    fn api(&self) -> GraphicsApi {
        GraphicsApi::OpenGl
    }

    fn init(&self) -> Result<()> {
        let gl = &self.gl;
        unsafe {
            log::info!(
                "OpenGL {} ({})",
                gl.get_parameter_string(glow::VERSION),
                gl.get_parameter_string(glow::RENDERER)
            );
            gl.enable(glow::DEPTH_TEST);
            gl.depth_func(glow::LESS);
            gl.enable(glow::BLEND);
            gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
            let [x, y, w, h] = self.state.get().viewport;
            gl.viewport(x as i32, y as i32, w as i32, h as i32);
        }
        self.update(|s| {
            s.depth_test = true;
            s.depth_function = DepthFunction::Less;
        });
        Ok(())
    }

    fn set_clear_color(&self, color: Vec4) {
        unsafe { self.gl.clear_color(color.x, color.y, color.z, color.w) };
        self.update(|s| s.clear_color = color);
    }

    fn set_viewport(&self, x: u32, y: u32, width: u32, height: u32) {
        unsafe { self.gl.viewport(x as i32, y as i32, width as i32, height as i32) };
        self.update(|s| s.viewport = [x, y, width, height]);
    }

    fn enable_depth_testing(&self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::DEPTH_TEST);
            } else {
                self.gl.disable(glow::DEPTH_TEST);
            }
        }
        self.update(|s| s.depth_test = enabled);
    }

    fn set_depth_function(&self, function: DepthFunction) {
        unsafe { self.gl.depth_func(convert::depth_function(function)) };
        self.update(|s| s.depth_function = function);
    }

    fn set_face_culling(&self, mode: FaceCulling) {
        unsafe {
            match mode {
                FaceCulling::None => self.gl.disable(glow::CULL_FACE),
                FaceCulling::Front => {
                    self.gl.enable(glow::CULL_FACE);
                    self.gl.cull_face(glow::FRONT);
                }
                FaceCulling::Back => {
                    self.gl.enable(glow::CULL_FACE);
                    self.gl.cull_face(glow::BACK);
                }
                FaceCulling::FrontAndBack => {
                    self.gl.enable(glow::CULL_FACE);
                    self.gl.cull_face(glow::FRONT_AND_BACK);
                }
            }
        }
        self.update(|s| s.face_culling = mode);
    }

    fn set_cube_map_seamless(&self, enabled: bool) {
        unsafe {
            if enabled {
                self.gl.enable(glow::TEXTURE_CUBE_MAP_SEAMLESS);
            } else {
                self.gl.disable(glow::TEXTURE_CUBE_MAP_SEAMLESS);
            }
        }
        self.update(|s| s.cube_map_seamless = enabled);
    }

    fn state(&self) -> PipelineState {
        self.state.get()
    }

    fn begin_render_pass(&self, framebuffer: Option<Rc<dyn FrameBuffer>>) {
        match &framebuffer {
            Some(fb) => {
                fb.bind();
                let spec = fb.specification();
                self.update(|s| s.viewport = [0, 0, spec.width, spec.height.max(1)]);
            }
            None => {
                let (w, h) = self.screen.get();
                unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
                self.set_viewport(0, 0, w, h);
            }
        }
        self.active.begin(framebuffer);
    }

    fn active_framebuffer(&self) -> Option<Rc<dyn FrameBuffer>> {
        self.active.get()
    }

    fn clear_targets(&self, targets: RenderTargetMask) {
        unsafe { self.gl.clear(mask_bits(targets)) };
    }

    fn draw(&self, drawable: &dyn Drawable, primitive: Primitive) {
        drawable.bind();
        unsafe {
            self.gl.draw_elements(
                convert::primitive(primitive),
                drawable.index_count() as i32,
                glow::UNSIGNED_INT,
                0,
            );
        }
        drawable.unbind();
    }

    fn end_render_pass(&self) {
        if let Some(fb) = self.active.end() {
            fb.unbind(true);
        }
    }

    fn blit(&self, src: &dyn FrameBuffer, dst: &dyn FrameBuffer, spec: &BlitSpecification) -> Result<()> {
        let (Some(from), Some(to)) = (
            src.as_any().downcast_ref::<OpenGlFrameBuffer>(),
            dst.as_any().downcast_ref::<OpenGlFrameBuffer>(),
        ) else {
            return Err(LumenError::UnsupportedBackend(
                "OpenGL blit between foreign framebuffers".into(),
            ));
        };
        let (s, d) = (src.specification(), dst.specification());
        // Depth and stencil copies only allow nearest filtering.
        let filter = if spec.targets == RenderTargetMask::COLOR && spec.filter == TextureFilterMode::Linear {
            glow::LINEAR
        } else {
            glow::NEAREST
        };
        let gl = &self.gl;
        unsafe {
            gl.bind_framebuffer(glow::READ_FRAMEBUFFER, from.native());
            gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, to.native());
            if spec.targets.contains(RenderTargetMask::COLOR) {
                gl.read_buffer(glow::COLOR_ATTACHMENT0 + spec.src_index as u32);
                gl.draw_buffers(&[glow::COLOR_ATTACHMENT0 + spec.dst_index as u32]);
            }
            gl.blit_framebuffer(
                0,
                0,
                s.width as i32,
                s.height as i32,
                0,
                0,
                d.width as i32,
                d.height as i32,
                mask_bits(spec.targets),
                filter,
            );
            let restore = self
                .active
                .get()
                .and_then(|fb| fb.as_any().downcast_ref::<OpenGlFrameBuffer>().and_then(OpenGlFrameBuffer::native));
            gl.bind_framebuffer(glow::FRAMEBUFFER, restore);
        }
        Ok(())
    }

    fn screen_size(&self) -> (u32, u32) {
        self.screen.get()
    }

    fn resize_screen(&self, width: u32, height: u32) {
        self.screen.set((width.max(1), height.max(1)));
    }

    fn read_screen_pixels(&self) -> Result<Vec<u8>> {
        let (w, h) = self.screen.get();
        let mut pixels = vec![0u8; (w * h * 4) as usize];
        unsafe {
            self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, None);
            self.gl.read_pixels(
                0,
                0,
                w as i32,
                h as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelPackData::Slice(Some(&mut pixels)),
            );
        }
        Ok(pixels)
    }

    fn create_texture(
        &self,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
        path: Option<PathBuf>,
    ) -> Result<Rc<dyn Texture>> {
        let texture = OpenGlTexture::new(Rc::clone(&self.gl), spec, data, path)
            .inspect_err(|err| log::warn!("Texture creation failed: {err}"))?;
        Ok(Rc::new(texture))
    }

    fn white_texture(&self) -> Rc<dyn Texture> {
        Rc::clone(&self.white)
    }

    fn create_framebuffer(&self, spec: &FrameBufferSpecification) -> Result<Rc<dyn FrameBuffer>> {
        let framebuffer = OpenGlFrameBuffer::new(Rc::clone(&self.gl), spec)
            .inspect_err(|err| log::error!("Framebuffer creation failed: {err}"))?;
        Ok(Rc::new(framebuffer))
    }

    fn create_shader(&self, source: &ShaderSource) -> Rc<dyn Shader> {
        Rc::new(OpenGlShader::new(Rc::clone(&self.gl), source))
    }

    fn create_vertex_buffer(&self, data: &[u8], count: u32, layout: BufferLayout) -> Result<Rc<dyn VertexBuffer>> {
        Ok(Rc::new(OpenGlVertexBuffer::new(Rc::clone(&self.gl), data, count, layout)?))
    }

    fn create_index_buffer(&self, indices: &[u32]) -> Result<Rc<dyn IndexBuffer>> {
        Ok(Rc::new(OpenGlIndexBuffer::new(Rc::clone(&self.gl), indices)?))
    }

    fn create_drawable(&self) -> Result<Rc<dyn Drawable>> {
        Ok(Rc::new(OpenGlDrawable::new(Rc::clone(&self.gl))?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
