//! wgpu textures.
//!
//! Row 0 of every level is the bottom row, the same memory order OpenGL
//! uses. Shaders mirror clip-space `y` to keep rendered targets in that
//! order, so no flip happens on upload or readback.

use std::any::Any;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::errors::{LumenError, Result};
use crate::renderer::texture::{
    Texture, TextureFormat, TextureSpecification, TextureType, generate_texture_id,
};
use crate::resources::image::{decode_texel, encode_texel, expand_rgb_to_rgba, shrink_rgba_to_rgb};

use super::convert;
use super::device::{MetalDevice, SamplerKind};

pub struct MetalTexture {
    id: u64,
    device: Rc<MetalDevice>,
    spec: TextureSpecification,
    path: Option<PathBuf>,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    released: Cell<bool>,
}

fn usage(spec: &TextureSpecification) -> wgpu::TextureUsages {
    use wgpu::TextureUsages as U;
    match (spec.ty, spec.format) {
        (TextureType::Texture2DMultisample, _) => U::RENDER_ATTACHMENT | U::TEXTURE_BINDING,
        (_, TextureFormat::Depth24Stencil8) => U::RENDER_ATTACHMENT | U::TEXTURE_BINDING,
        (_, f) if f.is_depth() => U::RENDER_ATTACHMENT | U::TEXTURE_BINDING | U::COPY_SRC | U::COPY_DST,
        (TextureType::Texture3D, _) => U::TEXTURE_BINDING | U::COPY_SRC | U::COPY_DST,
        _ => U::RENDER_ATTACHMENT | U::TEXTURE_BINDING | U::COPY_SRC | U::COPY_DST,
    }
}

fn extent(spec: &TextureSpecification, level: u32) -> wgpu::Extent3d {
    let (width, height) = spec.level_size(level);
    let height = if spec.ty == TextureType::Texture1D { 1 } else { height };
    let layers = match spec.ty {
        TextureType::Texture3D => (spec.depth >> level).max(1),
        other => other.layer_count(),
    };
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: layers,
    }
}

fn aspect(format: TextureFormat) -> wgpu::TextureAspect {
    if format.is_depth() {
        wgpu::TextureAspect::DepthOnly
    } else {
        wgpu::TextureAspect::All
    }
}

impl MetalTexture {
    pub(crate) fn new(
        device: Rc<MetalDevice>,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        let spec = spec.normalized();
        spec.validate()?;
        let format = convert::texture_format(spec.format)?;
        let texture = device.device.create_texture(&wgpu::TextureDescriptor {
            label: path.as_deref().and_then(Path::to_str),
            size: extent(&spec, 0),
            mip_level_count: spec.mip_level_count(),
            sample_count: spec.samples,
            dimension: convert::dimension(spec.ty),
            format,
            usage: usage(&spec),
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(convert::view_dimension(spec.ty)),
            aspect: aspect(spec.format),
            ..Default::default()
        });
        let texture = Self {
            id: generate_texture_id(),
            device,
            spec,
            path,
            texture,
            view,
            released: Cell::new(false),
        };
        if let Some(data) = data {
            texture.set_data(data, 0)?;
            if spec.mip_maps {
                texture.generate_mipmaps();
            }
        }
        Ok(texture)
    }

    #[must_use]
    pub fn raw(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// View over every level and layer, as shaders sample it.
    #[must_use]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Single-level, single-layer view for use as a render attachment.
    #[must_use]
    pub fn target_view(&self, layer: u32, level: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Attachment View"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            aspect: aspect(self.spec.format),
            base_mip_level: level,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    #[must_use]
    pub fn wgpu_format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }

    /// Whether shaders may sample this texture with a filtering sampler.
    #[must_use]
    pub fn filterable(&self) -> bool {
        let format = self.spec.format;
        if format.is_depth() || format.is_integer() {
            return false;
        }
        !matches!(
            format,
            TextureFormat::R32F | TextureFormat::Rg32F | TextureFormat::Rgb32F | TextureFormat::Rgba32F
        ) || self.device.float32_filterable()
    }

    #[must_use]
    pub fn sampler(&self, kind: SamplerKind) -> wgpu::Sampler {
        self.device.sampler(&self.spec, kind)
    }

    fn check_level(&self, level: u32) -> Result<()> {
        let count = self.spec.mip_level_count();
        if level < count {
            Ok(())
        } else {
            Err(LumenError::IndexOutOfBounds {
                what: "mip level".into(),
                index: level as usize,
                len: count as usize,
            })
        }
    }

    fn check_live(&self) -> Result<()> {
        if self.released.get() {
            return Err(LumenError::InvariantViolation(format!(
                "texture {} used after release",
                self.id
            )));
        }
        Ok(())
    }

    /// Converts a level from the engine's host layout into what the GPU
    /// texture holds.
    fn to_device_layout(&self, data: &[u8]) -> Result<Vec<u8>> {
        let format = self.spec.format;
        match format {
            TextureFormat::Depth16 => Ok(data.to_vec()),
            f if f.is_depth() => Err(LumenError::UnsupportedFormat(format!(
                "{f} uploads are not supported on Metal"
            ))),
            f if convert::needs_alpha_expansion(f) => Ok(expand_rgb_to_rgba(data, f)),
            _ => Ok(data.to_vec()),
        }
    }

    /// The inverse of [`Self::to_device_layout`] for readbacks.
    fn to_host_layout(&self, data: Vec<u8>) -> Vec<u8> {
        let format = self.spec.format;
        match format {
            TextureFormat::Depth24 | TextureFormat::Depth32 => data
                .chunks_exact(4)
                .flat_map(|texel| encode_texel(format, decode_texel(TextureFormat::Depth32F, texel)))
                .collect(),
            f if convert::needs_alpha_expansion(f) => shrink_rgba_to_rgb(&data, f),
            _ => data,
        }
    }
}

impl Texture for MetalTexture {
    fn id(&self) -> u64 {
        self.id
    }

    fn specification(&self) -> &TextureSpecification {
        &self.spec
    }

    fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn is_loaded(&self) -> bool {
        !self.released.get()
    }

    // Textures bind through shader bind groups at draw time.
    fn bind(&self) {}

    fn bind_to_texture_unit(&self, _slot: u32) {}

    fn unbind(&self) {}

    fn set_data(&self, data: &[u8], level: u32) -> Result<()> {
        self.check_live()?;
        self.check_level(level)?;
        if self.spec.ty == TextureType::Texture2DMultisample {
            return Err(LumenError::UnsupportedFormat(
                "multisample textures cannot be uploaded".into(),
            ));
        }
        let expected = self.spec.level_byte_size(level);
        if data.len() < expected {
            return Err(LumenError::InvariantViolation(format!(
                "texture level {level} needs {expected} bytes, got {}",
                data.len()
            )));
        }
        let bytes = self.to_device_layout(&data[..expected])?;
        let size = extent(&self.spec, level);
        let device_format = convert::device_format(self.spec.format);
        self.device.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: aspect(self.spec.format),
            },
            &bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(device_format.stride(size.width)),
                rows_per_image: Some(size.height),
            },
            size,
        );
        Ok(())
    }

    fn generate_mipmaps(&self) {
        if self.released.get() || self.spec.mip_level_count() < 2 {
            return;
        }
        if self.spec.format.is_depth() || self.spec.format.is_integer() || self.spec.ty == TextureType::Texture3D {
            log::debug!("Skipping mipmap generation for {} {:?}", self.spec.format, self.spec.ty);
            return;
        }
        let device = &self.device;
        let mut encoder = device.encoder("Mipmap Encoder");
        device
            .blitter
            .generate_mipmaps(&device.device, &mut encoder, &self.texture, self.filterable());
        device.queue.submit(Some(encoder.finish()));
    }

    fn read_pixels(&self, level: u32) -> Result<Vec<u8>> {
        self.check_live()?;
        self.check_level(level)?;
        if self.spec.ty == TextureType::Texture2DMultisample || self.spec.format.has_stencil() {
            return Err(LumenError::UnsupportedFormat(format!(
                "{} {:?} cannot be read back on Metal",
                self.spec.format, self.spec.ty
            )));
        }
        let size = extent(&self.spec, level);
        let row = convert::device_format(self.spec.format).stride(size.width);
        let padded = row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let rows = size.height * size.depth_or_array_layers;
        let buffer = self.device.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Texture Readback"),
            size: u64::from(padded * rows),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.encoder("Readback Encoder");
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: level,
                origin: wgpu::Origin3d::ZERO,
                aspect: aspect(self.spec.format),
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(size.height),
                },
            },
            size,
        );
        self.device.submit_and_wait(encoder)?;
        let mapped = self.device.read_buffer(&buffer)?;
        let mut tight = Vec::with_capacity((row * rows) as usize);
        for chunk in mapped.chunks_exact(padded as usize) {
            tight.extend_from_slice(&chunk[..row as usize]);
        }
        Ok(self.to_host_layout(tight))
    }

    fn release(&self) {
        if !self.released.replace(true) {
            self.texture.destroy();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
