//! The explicit-API backend, driven through wgpu.
//!
//! Draws are recorded into segments: one segment per run of draws with the
//! same target. A segment becomes one render pass when the target changes,
//! when a clear follows draws, or when the pass ends. Uniform group bytes
//! are copied at draw time into a per-segment arena, so a shader can be
//! updated between draws of the same pass.

mod blit;
mod buffer;
mod context;
mod convert;
mod device;
mod framebuffer;
mod shader;
mod texture;

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::rc::Rc;

use glam::Vec4;
use rustc_hash::{FxHashMap, FxHashSet};
use wgpu::util::DeviceExt;

use crate::errors::{LumenError, Result};
use crate::renderer::api::{
    ActiveFrameBuffer, DepthFunction, FaceCulling, GraphicsApi, PipelineState, Primitive,
    RenderTargetMask, RendererApi,
};
use crate::renderer::buffer::{IndexBuffer, VertexBuffer};
use crate::renderer::drawable::Drawable;
use crate::renderer::framebuffer::{BlitSpecification, DrawSelection, FrameBuffer, FrameBufferSpecification};
use crate::renderer::layout::BufferLayout;
use crate::renderer::pipeline::{AttachmentSet, PipelineCache, PipelineCacheStats, PipelineKey};
use crate::renderer::shader::{Shader, ShaderSource};
use crate::renderer::texture::{
    Texture, TextureFilterMode, TextureFormat, TextureSpecification, TextureType,
};

pub use blit::{BlitMode, Blitter};
pub use buffer::{MetalDrawable, MetalIndexBuffer, MetalVertexBuffer};
pub use context::WgpuContext;
pub use device::{MetalDevice, SamplerKind};
pub use framebuffer::{MetalFrameBuffer, PassTargets};
pub use shader::{BindingSlot, MetalShader, ReflectedBinding};
pub use texture::MetalTexture;

/// A bind group entry whose uniform part still points into the arena.
enum PendingResource {
    Uniform { offset: u64, size: u64 },
    View(wgpu::TextureView),
    Sampler(wgpu::Sampler),
}

struct RecordedDraw {
    pipeline: wgpu::RenderPipeline,
    group_layouts: Vec<wgpu::BindGroupLayout>,
    entries: Vec<(u32, u32, PendingResource)>,
    vertex_buffers: Vec<wgpu::Buffer>,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    viewport: [u32; 4],
}

struct Segment {
    selection: DrawSelection,
    targets: PassTargets,
    clear_color: Option<wgpu::Color>,
    clear_depth: Option<f32>,
    clear_stencil: Option<u32>,
    uniforms: Vec<u8>,
    draws: Vec<RecordedDraw>,
}

impl Segment {
    fn is_empty(&self) -> bool {
        self.draws.is_empty()
            && self.clear_color.is_none()
            && self.clear_depth.is_none()
            && self.clear_stencil.is_none()
    }
}

/// Built-in textures bound when a shader samples nothing usable.
struct Fallbacks {
    white: Rc<MetalTexture>,
    cube: Rc<MetalTexture>,
    volume: Rc<MetalTexture>,
    depth: Rc<MetalTexture>,
}

impl Fallbacks {
    fn new(device: &Rc<MetalDevice>) -> Result<Self> {
        let white = |ty: TextureType, layers: usize| {
            let spec = TextureSpecification::new(ty, TextureFormat::Rgba8);
            let pixels = vec![255u8; 4 * layers];
            MetalTexture::new(Rc::clone(device), &spec, Some(&pixels), None).map(Rc::new)
        };
        let depth_spec = TextureSpecification::new(TextureType::Texture2D, TextureFormat::Depth16);
        Ok(Self {
            white: white(TextureType::Texture2D, 1)?,
            cube: white(TextureType::TextureCube, 6)?,
            volume: white(TextureType::Texture3D, 1)?,
            depth: Rc::new(MetalTexture::new(
                Rc::clone(device),
                &depth_spec,
                Some(&u16::MAX.to_le_bytes()),
                None,
            )?),
        })
    }

    fn for_slot(
        &self,
        dimension: wgpu::TextureViewDimension,
        sample_type: wgpu::TextureSampleType,
    ) -> &Rc<MetalTexture> {
        match (dimension, sample_type) {
            (_, wgpu::TextureSampleType::Depth) => &self.depth,
            (wgpu::TextureViewDimension::Cube, _) => &self.cube,
            (wgpu::TextureViewDimension::D3, _) => &self.volume,
            _ => &self.white,
        }
    }
}

/// Whether `texture` can stand in a binding declared as `slot`.
fn fits_slot(texture: &MetalTexture, slot: &BindingSlot) -> bool {
    let BindingSlot::Texture {
        dimension,
        sample_type,
        multisampled,
        ..
    } = slot
    else {
        return false;
    };
    let spec = texture.specification();
    let kind_ok = match sample_type {
        wgpu::TextureSampleType::Depth => spec.format.is_depth(),
        wgpu::TextureSampleType::Uint | wgpu::TextureSampleType::Sint => spec.format.is_integer(),
        wgpu::TextureSampleType::Float { filterable: true } => texture.filterable(),
        wgpu::TextureSampleType::Float { filterable: false } => !spec.format.is_integer(),
    };
    kind_ok
        && texture.is_loaded()
        && convert::view_dimension(spec.ty) == *dimension
        && *multisampled == (spec.ty == TextureType::Texture2DMultisample)
}

fn align_to(value: u64, alignment: u64) -> u64 {
    value.div_ceil(alignment) * alignment
}

/// Depth state for pipelines whose target carries a depth attachment.
fn depth_stencil_state(key: &PipelineKey) -> Option<wgpu::DepthStencilState> {
    let format = convert::texture_format(key.attachments.depth?).ok()?;
    Some(wgpu::DepthStencilState {
        format,
        depth_write_enabled: Some(key.depth_test),
        depth_compare: Some(if key.depth_test {
            convert::compare_function(key.depth_function)
        } else {
            wgpu::CompareFunction::Always
        }),
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    })
}

pub struct MetalRendererApi {
    device: Rc<MetalDevice>,
    state: Cell<PipelineState>,
    active: ActiveFrameBuffer,
    screen: RefCell<Rc<MetalTexture>>,
    screen_depth: RefCell<Rc<MetalTexture>>,
    fallbacks: Fallbacks,
    pipelines: RefCell<PipelineCache<wgpu::RenderPipeline>>,
    recording: RefCell<Option<Segment>>,
    reported: RefCell<FxHashSet<String>>,
}

fn screen_textures(device: &Rc<MetalDevice>, width: u32, height: u32) -> Result<(Rc<MetalTexture>, Rc<MetalTexture>)> {
    let (width, height) = (width.max(1), height.max(1));
    let color = TextureSpecification::new(TextureType::Texture2D, TextureFormat::Rgba8).with_size(width, height);
    let depth = TextureSpecification::new(TextureType::Texture2D, TextureFormat::Depth24).with_size(width, height);
    Ok((
        Rc::new(MetalTexture::new(Rc::clone(device), &color, None, None)?),
        Rc::new(MetalTexture::new(Rc::clone(device), &depth, None, None)?),
    ))
}

impl MetalRendererApi {
    pub fn new(ctx: WgpuContext) -> Result<Self> {
        let (width, height) = ctx.size();
        let device = Rc::new(MetalDevice::new(ctx));
        let (screen, screen_depth) = screen_textures(&device, width, height)?;
        let fallbacks = Fallbacks::new(&device)?;
        let state = PipelineState {
            viewport: [0, 0, width.max(1), height.max(1)],
            ..PipelineState::default()
        };
        Ok(Self {
            device,
            state: Cell::new(state),
            active: ActiveFrameBuffer::default(),
            screen: RefCell::new(screen),
            screen_depth: RefCell::new(screen_depth),
            fallbacks,
            pipelines: RefCell::new(PipelineCache::new()),
            recording: RefCell::new(None),
            reported: RefCell::new(FxHashSet::default()),
        })
    }

    #[must_use]
    pub fn device(&self) -> &Rc<MetalDevice> {
        &self.device
    }

    #[must_use]
    pub fn pipeline_stats(&self) -> PipelineCacheStats {
        self.pipelines.borrow().stats()
    }

    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.borrow().len()
    }

    fn update(&self, f: impl FnOnce(&mut PipelineState)) {
        let mut state = self.state.get();
        f(&mut state);
        self.state.set(state);
    }

    fn warn_once(&self, key: String, message: impl FnOnce() -> String) {
        if self.reported.borrow_mut().insert(key) {
            log::warn!("{}", message());
        }
    }

    fn screen_targets(&self) -> PassTargets {
        let screen = self.screen.borrow();
        let depth = self.screen_depth.borrow();
        PassTargets {
            colors: vec![(screen.target_view(0, 0), screen.wgpu_format())],
            depth: Some((depth.target_view(0, 0), false)),
            attachments: AttachmentSet {
                colors: vec![TextureFormat::Rgba8],
                depth: Some(TextureFormat::Depth24),
                samples: 1,
            },
            size: screen.specification().level_size(0),
        }
    }

    /// Selection and views of whatever draws currently write to.
    fn current_target(&self) -> (DrawSelection, Option<PassTargets>) {
        match self.active.get() {
            None => (DrawSelection::All, Some(self.screen_targets())),
            Some(fb) => {
                let selection = fb.draw_selection();
                let targets = fb
                    .as_any()
                    .downcast_ref::<MetalFrameBuffer>()
                    .map(|fb| fb.pass_targets(selection));
                (selection, targets)
            }
        }
    }

    /// Returns the open segment for the current target, flushing a segment
    /// recorded for a different selection first.
    fn with_segment<R>(&self, f: impl FnOnce(&mut Segment) -> R) -> Option<R> {
        let (selection, targets) = self.current_target();
        let stale = self
            .recording
            .borrow()
            .as_ref()
            .is_some_and(|s| s.selection != selection);
        if stale {
            self.flush();
        }
        let mut recording = self.recording.borrow_mut();
        if recording.is_none() {
            *recording = Some(Segment {
                selection,
                targets: targets?,
                clear_color: None,
                clear_depth: None,
                clear_stencil: None,
                uniforms: Vec::new(),
                draws: Vec::new(),
            });
        }
        recording.as_mut().map(f)
    }

    /// Encodes and submits the open segment.
    fn flush(&self) {
        let Some(segment) = self.recording.borrow_mut().take() else {
            return;
        };
        if segment.is_empty() {
            return;
        }
        let device = &self.device.device;
        let arena = (!segment.uniforms.is_empty()).then(|| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Uniform Arena"),
                contents: &segment.uniforms,
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let bind_groups: Vec<Vec<wgpu::BindGroup>> = segment
            .draws
            .iter()
            .map(|draw| {
                draw.group_layouts
                    .iter()
                    .enumerate()
                    .map(|(group, layout)| {
                        let entries: Vec<wgpu::BindGroupEntry> = draw
                            .entries
                            .iter()
                            .filter(|(g, _, _)| *g as usize == group)
                            .filter_map(|(_, binding, resource)| {
                                let resource = match resource {
                                    PendingResource::Uniform { offset, size } => {
                                        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                            buffer: arena.as_ref()?,
                                            offset: *offset,
                                            size: NonZeroU64::new(*size),
                                        })
                                    }
                                    PendingResource::View(view) => wgpu::BindingResource::TextureView(view),
                                    PendingResource::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                                };
                                Some(wgpu::BindGroupEntry {
                                    binding: *binding,
                                    resource,
                                })
                            })
                            .collect();
                        device.create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some("Draw BG"),
                            layout,
                            entries: &entries,
                        })
                    })
                    .collect()
            })
            .collect();

        let targets = &segment.targets;
        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = targets
            .colors
            .iter()
            .map(|(view, _)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: segment.clear_color.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })
            })
            .collect();
        let depth_stencil_attachment =
            targets
                .depth
                .as_ref()
                .map(|(view, has_stencil)| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: segment.clear_depth.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: has_stencil.then(|| wgpu::Operations {
                        load: segment.clear_stencil.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                });

        let mut encoder = self.device.encoder("Render Encoder");
        {
            let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            let (tw, th) = targets.size;
            for (draw, groups) in segment.draws.iter().zip(&bind_groups) {
                let [x, y, w, h] = draw.viewport;
                let (x, y) = (x.min(tw.saturating_sub(1)), y.min(th.saturating_sub(1)));
                let (w, h) = (w.min(tw - x).max(1), h.min(th - y).max(1));
                rpass.set_viewport(x as f32, y as f32, w as f32, h as f32, 0.0, 1.0);
                rpass.set_pipeline(&draw.pipeline);
                for (i, group) in groups.iter().enumerate() {
                    rpass.set_bind_group(i as u32, group, &[]);
                }
                for (slot, buffer) in draw.vertex_buffers.iter().enumerate() {
                    rpass.set_vertex_buffer(slot as u32, buffer.slice(..));
                }
                rpass.set_index_buffer(draw.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                rpass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }
        self.device.queue.submit(Some(encoder.finish()));
    }

    /// Resolves textures and uniform bytes for `shader`, appending uniform
    /// data to `arena`. `None` when a binding has nothing compatible.
    fn resolve_bindings(&self, shader: &MetalShader, arena: &mut Vec<u8>) -> Option<Vec<(u32, u32, PendingResource)>> {
        let alignment = u64::from(self.device.device.limits().min_uniform_buffer_offset_alignment);
        let mut textures: FxHashMap<&str, Rc<dyn Texture>> = FxHashMap::default();
        for binding in shader.bindings() {
            let BindingSlot::Texture {
                name,
                dimension,
                sample_type,
                ..
            } = &binding.slot
            else {
                continue;
            };
            let bound = shader.bound_texture(name).and_then(|t| {
                let metal = t.as_any().downcast_ref::<MetalTexture>()?;
                fits_slot(metal, &binding.slot).then_some(t)
            });
            let resolved = match bound {
                Some(texture) => texture,
                None => {
                    if shader.bound_texture(name).is_some() {
                        self.warn_once(format!("{}:{name}", shader.name()), || {
                            format!(
                                "Shader '{}': texture bound to '{name}' does not fit the binding; using a fallback",
                                shader.name()
                            )
                        });
                    }
                    let fallback = self.fallbacks.for_slot(*dimension, *sample_type);
                    if !fits_slot(fallback, &binding.slot) {
                        self.warn_once(format!("{}:{name}:none", shader.name()), || {
                            format!("Shader '{}': no texture for '{name}'; draw skipped", shader.name())
                        });
                        return None;
                    }
                    Rc::clone(fallback) as Rc<dyn Texture>
                }
            };
            textures.insert(name.as_str(), resolved);
        }

        let mut entries = Vec::with_capacity(shader.bindings().len());
        for binding in shader.bindings() {
            let resource = match &binding.slot {
                BindingSlot::Uniform { name, size } => {
                    let size = u64::from(*size);
                    let offset = align_to(arena.len() as u64, alignment);
                    arena.resize(offset as usize, 0);
                    let mut data = shader.group_data(name).unwrap_or_default();
                    data.resize(size as usize, 0);
                    arena.extend_from_slice(&data);
                    PendingResource::Uniform { offset, size }
                }
                BindingSlot::Texture { name, .. } => {
                    let texture = textures.get(name.as_str())?;
                    let metal = texture.as_any().downcast_ref::<MetalTexture>()?;
                    PendingResource::View(metal.view().clone())
                }
                BindingSlot::Sampler { texture, kind } => {
                    let spec = textures
                        .get(texture.as_str())
                        .map_or_else(|| *self.fallbacks.white.specification(), |t| *t.specification());
                    PendingResource::Sampler(self.device.sampler(&spec, *kind))
                }
            };
            entries.push((binding.group, binding.binding, resource));
        }
        Some(entries)
    }

    fn create_pipeline(
        &self,
        shader: &MetalShader,
        key: &PipelineKey,
        buffers: &[(u64, Vec<wgpu::VertexAttribute>)],
    ) -> Option<wgpu::RenderPipeline> {
        let (module, layout) = (shader.module()?, shader.pipeline_layout()?);
        let vertex_layouts: Vec<wgpu::VertexBufferLayout> = buffers
            .iter()
            .map(|(stride, attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();
        let targets: Vec<Option<wgpu::ColorTargetState>> = key
            .attachments
            .colors
            .iter()
            .enumerate()
            .map(|(i, format)| {
                let format = convert::texture_format(*format).ok()?;
                let written = shader.writes_location(i as u32);
                Some(wgpu::ColorTargetState {
                    format,
                    blend: (written && !key.attachments.colors[i].is_integer())
                        .then_some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: if written {
                        wgpu::ColorWrites::ALL
                    } else {
                        wgpu::ColorWrites::empty()
                    },
                })
            })
            .collect();
        let depth_stencil = depth_stencil_state(key);
        let pipeline = self.device.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&key.shader),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some(shader::VERTEX_ENTRY),
                buffers: &vertex_layouts,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: shader.has_fragment().then(|| wgpu::FragmentState {
                module,
                entry_point: Some(shader::FRAGMENT_ENTRY),
                targets: &targets,
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: convert::topology(key.primitive),
                strip_index_format: convert::strip_index_format(key.primitive),
                // Clip-space y is mirrored, which reverses winding.
                front_face: wgpu::FrontFace::Cw,
                cull_mode: convert::cull_mode(key.face_culling),
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: key.attachments.samples.max(1),
                ..Default::default()
            },
            multiview_mask: None,
            cache: None,
        });
        Some(pipeline)
    }

    fn record_draw(&self, drawable: &dyn Drawable, primitive: Primitive) -> Option<()> {
        let state = self.state.get();
        if state.face_culling == FaceCulling::FrontAndBack {
            return None;
        }
        let shader_rc = drawable.shader()?;
        if !shader_rc.is_loaded() {
            return None;
        }
        let shader = shader_rc.as_any().downcast_ref::<MetalShader>()?;
        let index_rc = drawable.index_buffer()?;
        let index = index_rc.as_any().downcast_ref::<MetalIndexBuffer>()?;
        if index.count() == 0 {
            return None;
        }

        let vertex_rcs = drawable.vertex_buffers();
        let mut layouts = Vec::with_capacity(vertex_rcs.len());
        let mut buffers = Vec::with_capacity(vertex_rcs.len());
        let mut raw_buffers = Vec::with_capacity(vertex_rcs.len());
        let mut location = 0;
        for vb in &vertex_rcs {
            let metal = vb.as_any().downcast_ref::<MetalVertexBuffer>()?;
            let attributes = metal.attributes(location);
            location += attributes.len() as u32;
            layouts.push(vb.layout().clone());
            buffers.push((u64::from(vb.layout().stride()), attributes));
            raw_buffers.push(metal.raw().clone());
        }

        let shader_key = format!("{}#{}", shader.name(), shader.id());
        self.with_segment(|segment| {
            let key = PipelineKey {
                shader: shader_key,
                layouts,
                attachments: segment.targets.attachments.clone(),
                primitive,
                depth_test: state.depth_test,
                depth_function: state.depth_function,
                face_culling: state.face_culling,
            };
            let pipeline = {
                let mut cache = self.pipelines.borrow_mut();
                let id = cache.try_get_or_create(&key, |key| self.create_pipeline(shader, key, &buffers))?;
                cache.get(id).clone()
            };
            let entries = self.resolve_bindings(shader, &mut segment.uniforms)?;
            segment.draws.push(RecordedDraw {
                pipeline,
                group_layouts: shader.group_layouts().to_vec(),
                entries,
                vertex_buffers: raw_buffers,
                index_buffer: index.raw().clone(),
                index_count: index.count(),
                viewport: state.viewport,
            });
            Some(())
        })
        .flatten()
    }

    fn resolve_multisample(&self, encoder: &mut wgpu::CommandEncoder, texture: &MetalTexture) -> wgpu::Texture {
        let (width, height) = texture.specification().level_size(0);
        let resolved = self.device.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Resolve Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture.wgpu_format(),
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let resolve_view = resolved.create_view(&wgpu::TextureViewDescriptor::default());
        let source = texture.target_view(0, 0);
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Resolve Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &source,
                resolve_target: Some(&resolve_view),
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        resolved
    }

    fn blit_color(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        from: &MetalTexture,
        to: &MetalTexture,
        filter: TextureFilterMode,
    ) -> Result<()> {
        if to.specification().ty == TextureType::Texture2DMultisample {
            return Err(LumenError::UnsupportedFormat(
                "blits into multisample attachments are not supported on Metal".into(),
            ));
        }
        let resolved = (from.specification().ty == TextureType::Texture2DMultisample)
            .then(|| self.resolve_multisample(encoder, from));
        let source = resolved.as_ref().unwrap_or(from.raw());
        let same_shape = from.specification().level_size(0) == to.specification().level_size(0)
            && source.format() == to.wgpu_format();
        if same_shape {
            let (width, height) = to.specification().level_size(0);
            encoder.copy_texture_to_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: source,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyTextureInfo {
                    texture: to.raw(),
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
            return Ok(());
        }
        if from.specification().format.is_integer() || to.specification().format.is_integer() {
            return Err(LumenError::UnsupportedFormat(
                "integer attachments can only be blitted at equal size and format".into(),
            ));
        }
        let src_view = source.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(1),
            ..Default::default()
        });
        self.device.blitter.draw(
            &self.device.device,
            encoder,
            &src_view,
            &to.target_view(0, 0),
            to.wgpu_format(),
            from.filterable(),
            filter == TextureFilterMode::Linear,
            BlitMode::Copy,
        );
        Ok(())
    }
}

impl RendererApi for MetalRendererApi {
    fn api(&self) -> GraphicsApi {
        GraphicsApi::Metal
    }

    fn init(&self) -> Result<()> {
        self.update(|s| {
            s.depth_test = true;
            s.depth_function = DepthFunction::Less;
        });
        let limits = self.device.device.limits();
        log::info!(
            "Metal renderer initialized (max texture {}, uniform alignment {})",
            limits.max_texture_dimension_2d,
            limits.min_uniform_buffer_offset_alignment
        );
        Ok(())
    }

    fn set_clear_color(&self, color: Vec4) {
        self.update(|s| s.clear_color = color);
    }

    fn set_viewport(&self, x: u32, y: u32, width: u32, height: u32) {
        self.update(|s| s.viewport = [x, y, width, height]);
    }

    fn enable_depth_testing(&self, enabled: bool) {
        self.update(|s| s.depth_test = enabled);
    }

    fn set_depth_function(&self, function: DepthFunction) {
        self.update(|s| s.depth_function = function);
    }

    fn set_face_culling(&self, mode: FaceCulling) {
        self.update(|s| s.face_culling = mode);
    }

    // Cube sampling is always seamless on this path.
    fn set_cube_map_seamless(&self, enabled: bool) {
        self.update(|s| s.cube_map_seamless = enabled);
    }

    fn state(&self) -> PipelineState {
        self.state.get()
    }

    fn begin_render_pass(&self, framebuffer: Option<Rc<dyn FrameBuffer>>) {
        self.flush();
        let (width, height) = match &framebuffer {
            Some(fb) => {
                fb.bind();
                let spec = fb.specification();
                (spec.width, spec.height)
            }
            None => self.screen_size(),
        };
        self.update(|s| s.viewport = [0, 0, width.max(1), height.max(1)]);
        self.active.begin(framebuffer);
    }

    fn active_framebuffer(&self) -> Option<Rc<dyn FrameBuffer>> {
        self.active.get()
    }

    fn clear_targets(&self, targets: RenderTargetMask) {
        let has_draws = self.recording.borrow().as_ref().is_some_and(|s| !s.draws.is_empty());
        if has_draws {
            self.flush();
        }
        let [r, g, b, a] = self.state.get().clear_color.to_array();
        self.with_segment(|segment| {
            if targets.contains(RenderTargetMask::COLOR) {
                segment.clear_color = Some(wgpu::Color {
                    r: f64::from(r),
                    g: f64::from(g),
                    b: f64::from(b),
                    a: f64::from(a),
                });
            }
            if targets.contains(RenderTargetMask::DEPTH) {
                segment.clear_depth = Some(1.0);
            }
            if targets.contains(RenderTargetMask::STENCIL) {
                segment.clear_stencil = Some(0);
            }
        });
        if !self.active.is_active() {
            self.flush();
        }
    }

    fn draw(&self, drawable: &dyn Drawable, primitive: Primitive) {
        drawable.bind();
        if self.record_draw(drawable, primitive).is_none() {
            log::trace!("Draw skipped ({:?})", drawable);
        }
        drawable.unbind();
        if !self.active.is_active() {
            self.flush();
        }
    }

    fn end_render_pass(&self) {
        self.flush();
        if let Some(fb) = self.active.end() {
            fb.unbind(true);
        }
    }

    fn blit(&self, src: &dyn FrameBuffer, dst: &dyn FrameBuffer, spec: &BlitSpecification) -> Result<()> {
        let (Some(src), Some(dst)) = (
            src.as_any().downcast_ref::<MetalFrameBuffer>(),
            dst.as_any().downcast_ref::<MetalFrameBuffer>(),
        ) else {
            return Err(LumenError::UnsupportedBackend(
                "Metal blit between foreign framebuffers".into(),
            ));
        };
        self.flush();
        let mut encoder = self.device.encoder("Blit Encoder");
        if spec.targets.contains(RenderTargetMask::COLOR)
            && let (Some(from), Some(to)) = (src.color(spec.src_index), dst.color(spec.dst_index))
        {
            self.blit_color(&mut encoder, &from, &to, spec.filter)?;
        }
        if spec.targets.intersects(RenderTargetMask::DEPTH | RenderTargetMask::STENCIL)
            && let (Some(from), Some(to)) = (src.depth(), dst.depth())
        {
            let (fs, ts) = (from.specification(), to.specification());
            let copyable = fs.level_size(0) == ts.level_size(0)
                && fs.format == ts.format
                && !fs.format.has_stencil()
                && fs.ty != TextureType::Texture2DMultisample
                && ts.ty != TextureType::Texture2DMultisample;
            if copyable {
                let (width, height) = fs.level_size(0);
                encoder.copy_texture_to_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: from.raw(),
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::DepthOnly,
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture: to.raw(),
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::DepthOnly,
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: 1,
                    },
                );
            } else {
                log::warn!(
                    "Depth blit needs equal size and a depth-only format ({} -> {}); skipped",
                    fs.format,
                    ts.format
                );
            }
        }
        self.device.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn screen_size(&self) -> (u32, u32) {
        self.screen.borrow().specification().level_size(0)
    }

    fn resize_screen(&self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.flush();
        match screen_textures(&self.device, width, height) {
            Ok((color, depth)) => {
                *self.screen.borrow_mut() = color;
                *self.screen_depth.borrow_mut() = depth;
            }
            Err(err) => {
                log::error!("Screen resize to {width}x{height} failed: {err}");
                return;
            }
        }
        let mut config = self.device.config.borrow_mut();
        config.width = width;
        config.height = height;
        if let Some(surface) = &self.device.surface {
            surface.configure(&self.device.device, &config);
        }
    }

    fn read_screen_pixels(&self) -> Result<Vec<u8>> {
        self.flush();
        self.screen.borrow().read_pixels(0)
    }

    fn present(&self) -> Result<()> {
        self.flush();
        let Some(surface) = &self.device.surface else {
            return Ok(());
        };
        let output = match surface.get_current_texture() {
            wgpu::CurrentSurfaceTexture::Success(output) => output,
            wgpu::CurrentSurfaceTexture::Suboptimal(output) => {
                surface.configure(&self.device.device, &self.device.config.borrow());
                output
            }
            wgpu::CurrentSurfaceTexture::Timeout | wgpu::CurrentSurfaceTexture::Occluded => return Ok(()),
            wgpu::CurrentSurfaceTexture::Outdated | wgpu::CurrentSurfaceTexture::Lost => {
                surface.configure(&self.device.device, &self.device.config.borrow());
                return Ok(());
            }
            wgpu::CurrentSurfaceTexture::Validation => {
                return Err(LumenError::Surface("validation error acquiring the surface texture".into()));
            }
        };
        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
        let format = self.device.config.borrow().format;
        let mut encoder = self.device.encoder("Present Encoder");
        self.device.blitter.draw(
            &self.device.device,
            &mut encoder,
            self.screen.borrow().view(),
            &view,
            format,
            true,
            false,
            BlitMode::Flip,
        );
        self.device.queue.submit(Some(encoder.finish()));
        output.present();
        Ok(())
    }

    fn create_texture(
        &self,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
        path: Option<PathBuf>,
    ) -> Result<Rc<dyn Texture>> {
        let texture = MetalTexture::new(Rc::clone(&self.device), spec, data, path)
            .inspect_err(|err| log::warn!("Texture creation failed: {err}"))?;
        Ok(Rc::new(texture))
    }

    fn white_texture(&self) -> Rc<dyn Texture> {
        Rc::clone(&self.fallbacks.white) as Rc<dyn Texture>
    }

    fn create_framebuffer(&self, spec: &FrameBufferSpecification) -> Result<Rc<dyn FrameBuffer>> {
        let framebuffer = MetalFrameBuffer::new(Rc::clone(&self.device), spec)
            .inspect_err(|err| log::error!("Framebuffer creation failed: {err}"))?;
        Ok(Rc::new(framebuffer))
    }

    fn create_shader(&self, source: &ShaderSource) -> Rc<dyn Shader> {
        Rc::new(MetalShader::new(&self.device, source))
    }

    fn create_vertex_buffer(&self, data: &[u8], count: u32, layout: BufferLayout) -> Result<Rc<dyn VertexBuffer>> {
        Ok(Rc::new(MetalVertexBuffer::new(&self.device.device, data, count, layout)))
    }

    fn create_index_buffer(&self, indices: &[u32]) -> Result<Rc<dyn IndexBuffer>> {
        Ok(Rc::new(MetalIndexBuffer::new(&self.device.device, indices)))
    }

    fn create_drawable(&self) -> Result<Rc<dyn Drawable>> {
        Ok(Rc::new(MetalDrawable::new()))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_offsets_respect_alignment() {
        assert_eq!(align_to(0, 256), 0);
        assert_eq!(align_to(1, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(300, 64), 320);
    }

    fn pipeline_key(depth: Option<TextureFormat>, depth_test: bool) -> PipelineKey {
        PipelineKey {
            shader: "Test".into(),
            layouts: Vec::new(),
            attachments: AttachmentSet {
                colors: vec![TextureFormat::Rgba8],
                depth,
                samples: 1,
            },
            primitive: Primitive::Triangle,
            depth_test,
            depth_function: DepthFunction::LEqual,
            face_culling: FaceCulling::Back,
        }
    }

    #[test]
    fn depth_state_follows_the_depth_test_flag() {
        let tested = depth_stencil_state(&pipeline_key(Some(TextureFormat::Depth24), true))
            .expect("depth state");
        assert_eq!(tested.format, wgpu::TextureFormat::Depth32Float);
        assert_eq!(tested.depth_write_enabled, Some(true));
        assert_eq!(tested.depth_compare, Some(wgpu::CompareFunction::LessEqual));

        let untested = depth_stencil_state(&pipeline_key(Some(TextureFormat::Depth24Stencil8), false))
            .expect("depth state");
        assert_eq!(untested.depth_write_enabled, Some(false));
        assert_eq!(untested.depth_compare, Some(wgpu::CompareFunction::Always));
    }

    #[test]
    fn color_only_targets_have_no_depth_state() {
        assert!(depth_stencil_state(&pipeline_key(None, true)).is_none());
    }
}
