// ============================================================================
// Fullscreen blitter: mipmaps, framebuffer blits and surface present
// ============================================================================

use std::borrow::Cow;
use std::cell::RefCell;

use rustc_hash::FxHashMap;

/// Which fragment entry point a blit runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlitMode {
    Copy,
    /// Mirrors `v`; turns bottom-row-first targets upright for the surface.
    Flip,
}

impl BlitMode {
    const fn entry_point(self) -> &'static str {
        match self {
            Self::Copy => "fs_main",
            Self::Flip => "fs_flip",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BlitKey {
    format: wgpu::TextureFormat,
    mode: BlitMode,
    filterable: bool,
}

pub struct Blitter {
    shader: wgpu::ShaderModule,
    filtering_layout: wgpu::BindGroupLayout,
    plain_layout: wgpu::BindGroupLayout,
    linear: wgpu::Sampler,
    nearest: wgpu::Sampler,
    pipelines: RefCell<FxHashMap<BlitKey, wgpu::RenderPipeline>>,
}

fn bind_group_layout(device: &wgpu::Device, filterable: bool) -> wgpu::BindGroupLayout {
    let sampler = if filterable {
        wgpu::SamplerBindingType::Filtering
    } else {
        wgpu::SamplerBindingType::NonFiltering
    };
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Blit Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(sampler),
                count: None,
            },
        ],
    })
}

fn sampler(device: &wgpu::Device, filter: wgpu::FilterMode) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Blit Sampler"),
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        ..Default::default()
    })
}

impl Blitter {
    #[must_use]
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(include_str!(
                "../../shader/shaders/blit.wgsl"
            ))),
        });
        Self {
            shader,
            filtering_layout: bind_group_layout(device, true),
            plain_layout: bind_group_layout(device, false),
            linear: sampler(device, wgpu::FilterMode::Linear),
            nearest: sampler(device, wgpu::FilterMode::Nearest),
            pipelines: RefCell::new(FxHashMap::default()),
        }
    }

    fn layout(&self, filterable: bool) -> &wgpu::BindGroupLayout {
        if filterable {
            &self.filtering_layout
        } else {
            &self.plain_layout
        }
    }

    fn pipeline(&self, device: &wgpu::Device, key: BlitKey) -> wgpu::RenderPipeline {
        if let Some(pipeline) = self.pipelines.borrow().get(&key) {
            return pipeline.clone();
        }
        log::debug!("Creating blit pipeline for {:?} ({:?})", key.format, key.mode);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("Blit Pipeline {:?}", key.format)),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Blit Pipeline Layout"),
                bind_group_layouts: &[Some(self.layout(key.filterable))],
                immediate_size: 0,
            })),
            vertex: wgpu::VertexState {
                module: &self.shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &self.shader,
                entry_point: Some(key.mode.entry_point()),
                targets: &[Some(wgpu::ColorTargetState {
                    format: key.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        self.pipelines.borrow_mut().insert(key, pipeline.clone());
        pipeline
    }

    /// Draws `src` over the whole of `dst`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        src: &wgpu::TextureView,
        dst: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        filterable: bool,
        linear: bool,
        mode: BlitMode,
    ) {
        let pipeline = self.pipeline(device, BlitKey { format, mode, filterable });
        let sampler = if linear && filterable { &self.linear } else { &self.nearest };
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit BG"),
            layout: self.layout(filterable),
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blit Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        rpass.set_pipeline(&pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }

    /// Downsamples level `i` into level `i + 1` for every layer.
    pub fn generate_mipmaps(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        texture: &wgpu::Texture,
        filterable: bool,
    ) {
        let mip_count = texture.mip_level_count();
        if mip_count < 2 {
            return;
        }
        let format = texture.format();
        for layer in 0..texture.depth_or_array_layers() {
            for i in 0..mip_count - 1 {
                let view = |level: u32, usage: wgpu::TextureUsages| {
                    texture.create_view(&wgpu::TextureViewDescriptor {
                        label: Some("Mipmap View"),
                        format: None,
                        dimension: Some(wgpu::TextureViewDimension::D2),
                        aspect: wgpu::TextureAspect::All,
                        base_mip_level: level,
                        mip_level_count: Some(1),
                        base_array_layer: layer,
                        array_layer_count: Some(1),
                        usage: Some(usage),
                    })
                };
                let src = view(i, wgpu::TextureUsages::TEXTURE_BINDING);
                let dst = view(i + 1, wgpu::TextureUsages::RENDER_ATTACHMENT);
                self.draw(device, encoder, &src, &dst, format, filterable, true, BlitMode::Copy);
            }
        }
    }
}
