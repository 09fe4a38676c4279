//! Device state shared by every Metal resource.

use std::cell::RefCell;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::errors::{LumenError, Result};
use crate::renderer::api::{CoordinateConvention, GraphicsApi};
use crate::renderer::texture::{TextureFilterMode, TextureSpecification, TextureWrap};

use super::blit::Blitter;
use super::context::WgpuContext;
use super::convert;

/// How a texture binding samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    Filtering,
    /// Integer, depth and unfilterable float textures.
    NonFiltering,
    /// Depth comparison (shadow lookups).
    Comparison,
}

impl SamplerKind {
    #[must_use]
    pub const fn binding_type(self) -> wgpu::SamplerBindingType {
        match self {
            Self::Filtering => wgpu::SamplerBindingType::Filtering,
            Self::NonFiltering => wgpu::SamplerBindingType::NonFiltering,
            Self::Comparison => wgpu::SamplerBindingType::Comparison,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SamplerKey {
    min: TextureFilterMode,
    mag: TextureFilterMode,
    mip: TextureFilterMode,
    wrap: TextureWrap,
    kind: SamplerKind,
}

pub struct MetalDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub surface: Option<wgpu::Surface<'static>>,
    pub config: RefCell<wgpu::SurfaceConfiguration>,
    pub blitter: Blitter,
    samplers: RefCell<FxHashMap<SamplerKey, wgpu::Sampler>>,
    border: bool,
}

impl MetalDevice {
    pub fn new(ctx: WgpuContext) -> Self {
        let WgpuContext {
            device,
            queue,
            surface,
            config,
        } = ctx;
        device.on_uncaptured_error(Arc::new(|err| {
            log::error!("wgpu validation error: {err}");
        }));
        let border = device
            .features()
            .contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        let blitter = Blitter::new(&device);
        Self {
            device,
            queue,
            surface,
            config: RefCell::new(config),
            blitter,
            samplers: RefCell::new(FxHashMap::default()),
            border,
        }
    }

    #[must_use]
    pub const fn convention(&self) -> CoordinateConvention {
        GraphicsApi::Metal.convention()
    }

    #[must_use]
    pub fn float32_filterable(&self) -> bool {
        self.device
            .features()
            .contains(wgpu::Features::FLOAT32_FILTERABLE)
    }

    /// Sampler for `spec` used as `kind`, cached by filter and wrap.
    pub fn sampler(&self, spec: &TextureSpecification, kind: SamplerKind) -> wgpu::Sampler {
        let key = SamplerKey {
            min: spec.filter.min,
            mag: spec.filter.mag,
            mip: spec.filter.mip,
            wrap: spec.wrap,
            kind,
        };
        if let Some(sampler) = self.samplers.borrow().get(&key) {
            return sampler.clone();
        }
        let (min, mag, mip) = if kind == SamplerKind::NonFiltering {
            (
                wgpu::FilterMode::Nearest,
                wgpu::FilterMode::Nearest,
                wgpu::MipmapFilterMode::Nearest,
            )
        } else {
            (
                convert::filter(key.min),
                convert::filter(key.mag),
                convert::mip_filter(key.mip),
            )
        };
        let address = convert::address_mode(key.wrap, self.border);
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("lumen sampler"),
            address_mode_u: address,
            address_mode_v: address,
            address_mode_w: address,
            mag_filter: mag,
            min_filter: min,
            mipmap_filter: mip,
            lod_max_clamp: if key.mip == TextureFilterMode::None { 0.0 } else { 32.0 },
            compare: (kind == SamplerKind::Comparison).then_some(wgpu::CompareFunction::LessEqual),
            border_color: (address == wgpu::AddressMode::ClampToBorder)
                .then_some(wgpu::SamplerBorderColor::OpaqueWhite),
            ..Default::default()
        });
        self.samplers.borrow_mut().insert(key, sampler.clone());
        sampler
    }

    /// Submits `encoder` and waits until the GPU is idle.
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) -> Result<()> {
        self.queue.submit(Some(encoder.finish()));
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| LumenError::BufferMap(e.to_string()))?;
        Ok(())
    }

    /// Maps a `MAP_READ` buffer and copies its contents out.
    pub fn read_buffer(&self, buffer: &wgpu::Buffer) -> Result<Vec<u8>> {
        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| LumenError::BufferMap(e.to_string()))?;
        rx.recv()
            .map_err(|e| LumenError::BufferMap(e.to_string()))?
            .map_err(|e| LumenError::BufferMap(e.to_string()))?;
        let data = slice.get_mapped_range().to_vec();
        buffer.unmap();
        Ok(data)
    }

    pub fn encoder(&self, label: &str) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) })
    }
}
