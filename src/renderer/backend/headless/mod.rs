//! CPU reference backend.
//!
//! Everything lives in host memory: textures are byte vectors, clears and
//! blits write them directly, and draws are appended to a log instead of
//! being rasterized. Shaders registered with a [`FragmentProgram`] are
//! evaluated per pixel over the viewport, which covers fullscreen passes
//! such as the viewport composite.

mod buffer;
mod framebuffer;
mod shader;
mod texture;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::rc::Rc;

use glam::Vec4;
use rustc_hash::FxHashMap;

use crate::errors::{LumenError, Result};
use crate::renderer::api::{
    ActiveFrameBuffer, DepthFunction, FaceCulling, GraphicsApi, PipelineState, Primitive,
    RenderTargetMask, RendererApi,
};
use crate::renderer::buffer::{IndexBuffer, VertexBuffer};
use crate::renderer::drawable::Drawable;
use crate::renderer::framebuffer::{BlitSpecification, DrawSelection, FrameBuffer, FrameBufferSpecification};
use crate::renderer::layout::BufferLayout;
use crate::renderer::shader::{Shader, ShaderSource};
use crate::renderer::texture::{
    Texture, TextureFilterMode, TextureFormat, TextureSpecification, TextureType,
};

pub use buffer::{HeadlessDrawable, HeadlessIndexBuffer, HeadlessVertexBuffer};
pub use framebuffer::HeadlessFrameBuffer;
pub use shader::{FragmentInput, FragmentProgram, HeadlessShader};
pub use texture::HeadlessTexture;

/// The emulated device: fixed-function state plus what is bound.
#[derive(Default)]
pub struct HeadlessDevice {
    state: Cell<PipelineState>,
    program: RefCell<Option<String>>,
    texture_units: RefCell<BTreeMap<u32, u64>>,
    /// Uniform storage per program, as uploaded.
    program_uniforms: RefCell<FxHashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl HeadlessDevice {
    fn set_viewport(&self, viewport: [u32; 4]) {
        let mut state = self.state.get();
        state.viewport = viewport;
        self.state.set(state);
    }

    fn update(&self, f: impl FnOnce(&mut PipelineState)) {
        let mut state = self.state.get();
        f(&mut state);
        self.state.set(state);
    }
}

/// One entry of the draw log.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub shader: Option<String>,
    pub primitive: Primitive,
    pub index_count: u32,
    /// False when the draw went to the default framebuffer.
    pub offscreen: bool,
    pub selection: DrawSelection,
    pub viewport: [u32; 4],
    pub depth_test: bool,
    pub depth_function: DepthFunction,
    pub face_culling: FaceCulling,
}

/// What a state query would report: the bound program, texture units and
/// the uniform values stored in that program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub program: Option<String>,
    pub texture_units: Vec<(u32, u64)>,
    pub uniforms: Vec<(String, Vec<u8>)>,
}

pub struct HeadlessRendererApi {
    device: Rc<HeadlessDevice>,
    active: ActiveFrameBuffer,
    screen: RefCell<Rc<HeadlessTexture>>,
    white: Rc<dyn Texture>,
    programs: RefCell<FxHashMap<String, FragmentProgram>>,
    draws: RefCell<Vec<DrawRecord>>,
}

fn screen_texture(device: &Rc<HeadlessDevice>, width: u32, height: u32) -> Result<Rc<HeadlessTexture>> {
    let spec = TextureSpecification::new(TextureType::Texture2D, TextureFormat::Rgba8)
        .with_size(width.max(1), height.max(1));
    HeadlessTexture::new(Rc::clone(device), &spec, None, None).map(Rc::new)
}

impl HeadlessRendererApi {
    /// A device whose default framebuffer is `width` x `height` RGBA8.
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let device = Rc::new(HeadlessDevice::default());
        let screen = screen_texture(&device, width, height)?;
        let white_spec = TextureSpecification::new(TextureType::Texture2D, TextureFormat::Rgba8);
        let white = HeadlessTexture::new(Rc::clone(&device), &white_spec, Some(&[255; 4]), None)?;
        device.set_viewport([0, 0, width.max(1), height.max(1)]);
        Ok(Self {
            device,
            active: ActiveFrameBuffer::default(),
            screen: RefCell::new(screen),
            white: Rc::new(white),
            programs: RefCell::new(shader::builtin_programs()),
            draws: RefCell::new(Vec::new()),
        })
    }

    /// Evaluates `program` for every shader named `name` created afterwards.
    pub fn register_program(&self, name: impl Into<String>, program: FragmentProgram) {
        self.programs.borrow_mut().insert(name.into(), program);
    }

    #[must_use]
    pub fn draws(&self) -> Vec<DrawRecord> {
        self.draws.borrow().clone()
    }

    pub fn clear_draws(&self) {
        self.draws.borrow_mut().clear();
    }

    /// The default framebuffer's color plane.
    #[must_use]
    pub fn screen(&self) -> Rc<HeadlessTexture> {
        Rc::clone(&self.screen.borrow())
    }

    #[must_use]
    pub fn snapshot(&self) -> DeviceSnapshot {
        let program = self.device.program.borrow().clone();
        let uniforms = program
            .as_ref()
            .and_then(|p| {
                self.device
                    .program_uniforms
                    .borrow()
                    .get(p)
                    .map(|u| u.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            })
            .unwrap_or_default();
        DeviceSnapshot {
            program,
            texture_units: self
                .device
                .texture_units
                .borrow()
                .iter()
                .map(|(k, v)| (*k, *v))
                .collect(),
            uniforms,
        }
    }

    fn active_headless(&self) -> Option<Rc<dyn FrameBuffer>> {
        self.active.get()
    }

    fn run_program(&self, shader: &HeadlessShader, program: &FragmentProgram) {
        let [x, y, w, h] = self.device.state.get().viewport;
        let targets = match self.active_headless() {
            Some(fb) => fb
                .as_any()
                .downcast_ref::<HeadlessFrameBuffer>()
                .map(HeadlessFrameBuffer::draw_targets)
                .unwrap_or_default(),
            None => vec![(self.screen(), 0, 0)],
        };
        for (texture, layer, level) in targets {
            for py in y..y + h {
                for px in x..x + w {
                    let uv = [
                        ((px - x) as f32 + 0.5) / w as f32,
                        ((py - y) as f32 + 0.5) / h as f32,
                    ];
                    let color = program(&FragmentInput { uv, shader });
                    texture.store(px, py, layer, level, color);
                }
            }
        }
    }
}

/// Resamples `src` into every texel of `dst`.
fn resample(src: &HeadlessTexture, dst: &HeadlessTexture, filter: TextureFilterMode) {
    let (w, h) = dst.specification().level_size(0);
    for y in 0..h {
        for x in 0..w {
            let u = (x as f32 + 0.5) / w as f32;
            let v = (y as f32 + 0.5) / h as f32;
            dst.store(x, y, 0, 0, src.sample(u, v, 0, filter));
        }
    }
}

impl RendererApi for HeadlessRendererApi {
    fn api(&self) -> GraphicsApi {
        GraphicsApi::Headless
    }

    fn init(&self) -> Result<()> {
        self.device.update(|s| {
            s.depth_test = true;
            s.depth_function = DepthFunction::Less;
        });
        log::info!("Headless renderer initialized");
        Ok(())
    }

    fn set_clear_color(&self, color: Vec4) {
        self.device.update(|s| s.clear_color = color);
    }

    fn set_viewport(&self, x: u32, y: u32, width: u32, height: u32) {
        self.device.set_viewport([x, y, width, height]);
    }

    fn enable_depth_testing(&self, enabled: bool) {
        self.device.update(|s| s.depth_test = enabled);
    }

    fn set_depth_function(&self, function: DepthFunction) {
        self.device.update(|s| s.depth_function = function);
    }

    fn set_face_culling(&self, mode: FaceCulling) {
        self.device.update(|s| s.face_culling = mode);
    }

    fn set_cube_map_seamless(&self, enabled: bool) {
        self.device.update(|s| s.cube_map_seamless = enabled);
    }

    fn state(&self) -> PipelineState {
        self.device.state.get()
    }

    fn begin_render_pass(&self, framebuffer: Option<Rc<dyn FrameBuffer>>) {
        match &framebuffer {
            Some(fb) => fb.bind(),
            None => {
                let (w, h) = self.screen_size();
                self.device.set_viewport([0, 0, w, h]);
            }
        }
        self.active.begin(framebuffer);
    }

    fn active_framebuffer(&self) -> Option<Rc<dyn FrameBuffer>> {
        self.active.get()
    }

    fn clear_targets(&self, targets: RenderTargetMask) {
        let color = self.device.state.get().clear_color.to_array();
        match self.active_headless() {
            Some(fb) => {
                let Some(fb) = fb.as_any().downcast_ref::<HeadlessFrameBuffer>() else {
                    return;
                };
                if targets.contains(RenderTargetMask::COLOR) {
                    for (texture, layer, level) in fb.draw_targets() {
                        texture.fill(layer, level, color);
                    }
                }
                if targets.intersects(RenderTargetMask::DEPTH | RenderTargetMask::STENCIL)
                    && let Some(depth) = fb.depth()
                {
                    depth.fill_all([1.0, 0.0, 0.0, 1.0]);
                }
            }
            None => {
                if targets.contains(RenderTargetMask::COLOR) {
                    self.screen().fill(0, 0, color);
                }
            }
        }
    }

    fn draw(&self, drawable: &dyn Drawable, primitive: Primitive) {
        drawable.bind();
        let shader = drawable.shader();
        let state = self.device.state.get();
        let active = self.active.get();
        self.draws.borrow_mut().push(DrawRecord {
            shader: shader.as_ref().map(|s| s.name().to_string()),
            primitive,
            index_count: drawable.index_count(),
            offscreen: active.is_some(),
            selection: active.as_ref().map_or(DrawSelection::All, |fb| fb.draw_selection()),
            viewport: state.viewport,
            depth_test: state.depth_test,
            depth_function: state.depth_function,
            face_culling: state.face_culling,
        });
        if let Some(shader) = shader
            && shader.is_loaded()
            && let Some(headless) = shader.as_any().downcast_ref::<HeadlessShader>()
            && let Some(program) = headless.program()
        {
            self.run_program(headless, program);
        }
        drawable.unbind();
    }

    fn end_render_pass(&self) {
        if let Some(fb) = self.active.end() {
            fb.unbind(true);
        }
    }

    fn blit(&self, src: &dyn FrameBuffer, dst: &dyn FrameBuffer, spec: &BlitSpecification) -> Result<()> {
        let (Some(src), Some(dst)) = (
            src.as_any().downcast_ref::<HeadlessFrameBuffer>(),
            dst.as_any().downcast_ref::<HeadlessFrameBuffer>(),
        ) else {
            return Err(LumenError::UnsupportedBackend(
                "headless blit between foreign framebuffers".into(),
            ));
        };
        if spec.targets.contains(RenderTargetMask::COLOR)
            && let (Some(from), Some(to)) = (src.color(spec.src_index), dst.color(spec.dst_index))
        {
            let filter = match spec.filter {
                TextureFilterMode::Linear => TextureFilterMode::Linear,
                _ => TextureFilterMode::Nearest,
            };
            resample(&from, &to, filter);
        }
        if spec.targets.intersects(RenderTargetMask::DEPTH | RenderTargetMask::STENCIL)
            && let (Some(from), Some(to)) = (src.depth(), dst.depth())
        {
            resample(&from, &to, TextureFilterMode::Nearest);
        }
        Ok(())
    }

    fn screen_size(&self) -> (u32, u32) {
        self.screen.borrow().specification().level_size(0)
    }

    fn resize_screen(&self, width: u32, height: u32) {
        match screen_texture(&self.device, width, height) {
            Ok(screen) => *self.screen.borrow_mut() = screen,
            Err(err) => log::error!("Screen resize to {width}x{height} failed: {err}"),
        }
    }

    fn read_screen_pixels(&self) -> Result<Vec<u8>> {
        self.screen().read_pixels(0)
    }

    fn create_texture(
        &self,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
        path: Option<PathBuf>,
    ) -> Result<Rc<dyn Texture>> {
        let texture = HeadlessTexture::new(Rc::clone(&self.device), spec, data, path)
            .inspect_err(|err| log::warn!("Texture creation failed: {err}"))?;
        Ok(Rc::new(texture))
    }

    fn white_texture(&self) -> Rc<dyn Texture> {
        Rc::clone(&self.white)
    }

    fn create_framebuffer(&self, spec: &FrameBufferSpecification) -> Result<Rc<dyn FrameBuffer>> {
        let framebuffer = HeadlessFrameBuffer::new(Rc::clone(&self.device), spec)
            .inspect_err(|err| log::error!("Framebuffer creation failed: {err}"))?;
        Ok(Rc::new(framebuffer))
    }

    fn create_shader(&self, source: &ShaderSource) -> Rc<dyn Shader> {
        let program = self.programs.borrow().get(&source.name).cloned();
        Rc::new(HeadlessShader::new(Rc::clone(&self.device), source, program))
    }

    fn create_vertex_buffer(&self, data: &[u8], count: u32, layout: BufferLayout) -> Result<Rc<dyn VertexBuffer>> {
        Ok(Rc::new(HeadlessVertexBuffer::new(data, count, layout)))
    }

    fn create_index_buffer(&self, indices: &[u32]) -> Result<Rc<dyn IndexBuffer>> {
        Ok(Rc::new(HeadlessIndexBuffer::new(indices)))
    }

    fn create_drawable(&self) -> Result<Rc<dyn Drawable>> {
        Ok(Rc::new(HeadlessDrawable::new()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
