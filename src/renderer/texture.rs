//! Texture description and the backend-neutral texture capability.
//!
//! The format tables here are total functions over [`TextureFormat`]; each
//! backend adds its own projection (GL enums, wgpu formats) as an exhaustive
//! match in its `convert` module.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::{LumenError, Result};
use crate::renderer::api::RendererApi;
use crate::resources::image::{self, DecodedImage};

static NEXT_TEXTURE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique id for backend texture objects.
pub fn generate_texture_id() -> u64 {
    NEXT_TEXTURE_ID.fetch_add(1, Ordering::Relaxed)
}

// ============================================================================
// Enumerations
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureType {
    None,
    Texture1D,
    #[default]
    Texture2D,
    Texture2DMultisample,
    Texture3D,
    TextureCube,
}

impl TextureType {
    /// Number of array layers backing the texture.
    #[must_use]
    pub const fn layer_count(self) -> u32 {
        match self {
            Self::TextureCube => 6,
            _ => 1,
        }
    }
}

/// Pixel formats. [`TextureFormat::as_str`] gives the wire names
/// (`RGBA8`, `DEPTH24STENCIL8`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    None,
    R8,
    Rg8,
    Rgb8,
    #[default]
    Rgba8,
    R16F,
    Rg16F,
    Rgb16F,
    Rgba16F,
    R32F,
    Rg32F,
    Rgb32F,
    Rgba32F,
    R8UI,
    Rg8UI,
    Rgb8UI,
    Rgba8UI,
    Depth16,
    Depth24,
    Depth32,
    Depth32F,
    Depth24Stencil8,
}

/// How one channel is stored in host memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Unorm8,
    Uint8,
    Float16,
    Float32,
    /// 16-bit normalized depth.
    Depth16,
    /// 24 bits of depth in the low bits of a u32 (stencil in the top byte
    /// for `DEPTH24STENCIL8`).
    Depth24,
    /// 32-bit normalized depth.
    Depth32,
    Depth32F,
}

impl TextureFormat {
    pub const ALL: [Self; 21] = [
        Self::R8,
        Self::Rg8,
        Self::Rgb8,
        Self::Rgba8,
        Self::R16F,
        Self::Rg16F,
        Self::Rgb16F,
        Self::Rgba16F,
        Self::R32F,
        Self::Rg32F,
        Self::Rgb32F,
        Self::Rgba32F,
        Self::R8UI,
        Self::Rg8UI,
        Self::Rgb8UI,
        Self::Rgba8UI,
        Self::Depth16,
        Self::Depth24,
        Self::Depth32,
        Self::Depth32F,
        Self::Depth24Stencil8,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::R8 => "R8",
            Self::Rg8 => "RG8",
            Self::Rgb8 => "RGB8",
            Self::Rgba8 => "RGBA8",
            Self::R16F => "R16F",
            Self::Rg16F => "RG16F",
            Self::Rgb16F => "RGB16F",
            Self::Rgba16F => "RGBA16F",
            Self::R32F => "R32F",
            Self::Rg32F => "RG32F",
            Self::Rgb32F => "RGB32F",
            Self::Rgba32F => "RGBA32F",
            Self::R8UI => "R8UI",
            Self::Rg8UI => "RG8UI",
            Self::Rgb8UI => "RGB8UI",
            Self::Rgba8UI => "RGBA8UI",
            Self::Depth16 => "DEPTH16",
            Self::Depth24 => "DEPTH24",
            Self::Depth32 => "DEPTH32",
            Self::Depth32F => "DEPTH32F",
            Self::Depth24Stencil8 => "DEPTH24STENCIL8",
        }
    }

    #[must_use]
    pub const fn channel_count(self) -> u32 {
        match self {
            Self::None => 0,
            Self::R8 | Self::R16F | Self::R32F | Self::R8UI => 1,
            Self::Rg8 | Self::Rg16F | Self::Rg32F | Self::Rg8UI => 2,
            Self::Rgb8 | Self::Rgb16F | Self::Rgb32F | Self::Rgb8UI => 3,
            Self::Rgba8 | Self::Rgba16F | Self::Rgba32F | Self::Rgba8UI => 4,
            Self::Depth16
            | Self::Depth24
            | Self::Depth32
            | Self::Depth32F
            | Self::Depth24Stencil8 => 1,
        }
    }

    #[must_use]
    pub const fn channel_kind(self) -> ChannelKind {
        match self {
            Self::None | Self::R8 | Self::Rg8 | Self::Rgb8 | Self::Rgba8 => ChannelKind::Unorm8,
            Self::R16F | Self::Rg16F | Self::Rgb16F | Self::Rgba16F => ChannelKind::Float16,
            Self::R32F | Self::Rg32F | Self::Rgb32F | Self::Rgba32F => ChannelKind::Float32,
            Self::R8UI | Self::Rg8UI | Self::Rgb8UI | Self::Rgba8UI => ChannelKind::Uint8,
            Self::Depth16 => ChannelKind::Depth16,
            Self::Depth24 | Self::Depth24Stencil8 => ChannelKind::Depth24,
            Self::Depth32 => ChannelKind::Depth32,
            Self::Depth32F => ChannelKind::Depth32F,
        }
    }

    #[must_use]
    pub const fn bytes_per_channel(self) -> u32 {
        match self.channel_kind() {
            ChannelKind::Unorm8 | ChannelKind::Uint8 => 1,
            ChannelKind::Float16 | ChannelKind::Depth16 => 2,
            ChannelKind::Float32
            | ChannelKind::Depth24
            | ChannelKind::Depth32
            | ChannelKind::Depth32F => 4,
        }
    }

    #[must_use]
    pub const fn bytes_per_pixel(self) -> u32 {
        self.channel_count() * self.bytes_per_channel()
    }

    #[must_use]
    pub const fn is_depth(self) -> bool {
        matches!(
            self,
            Self::Depth16 | Self::Depth24 | Self::Depth32 | Self::Depth32F | Self::Depth24Stencil8
        )
    }

    #[must_use]
    pub const fn has_stencil(self) -> bool {
        matches!(self, Self::Depth24Stencil8)
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self.channel_kind(), ChannelKind::Uint8)
    }

    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(
            self.channel_kind(),
            ChannelKind::Float16 | ChannelKind::Float32
        )
    }

    #[must_use]
    pub const fn is_color(self) -> bool {
        !self.is_depth() && !matches!(self, Self::None)
    }

    /// Tightly packed row size.
    #[must_use]
    pub const fn stride(self, width: u32) -> u32 {
        width * self.bytes_per_pixel()
    }

    /// Row size rounded up to a 4-byte boundary, as GL packs readbacks.
    #[must_use]
    pub const fn aligned_stride(self, width: u32) -> u32 {
        self.stride(width).div_ceil(4) * 4
    }

    /// The four-channel format with the same channel storage.
    #[must_use]
    pub const fn with_alpha(self) -> Self {
        match self {
            Self::Rgb8 => Self::Rgba8,
            Self::Rgb16F => Self::Rgba16F,
            Self::Rgb32F => Self::Rgba32F,
            Self::Rgb8UI => Self::Rgba8UI,
            other => other,
        }
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextureFormat {
    type Err = LumenError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| LumenError::UnsupportedFormat(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFilterMode {
    #[default]
    None,
    Nearest,
    Linear,
}

/// Minification, magnification and mip filters. `None` means "pick the
/// default for the format" everywhere except `mip`, where it disables
/// mip sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureFilter {
    pub min: TextureFilterMode,
    pub mag: TextureFilterMode,
    pub mip: TextureFilterMode,
}

impl TextureFilter {
    #[must_use]
    pub const fn new(
        min: TextureFilterMode,
        mag: TextureFilterMode,
        mip: TextureFilterMode,
    ) -> Self {
        Self { min, mag, mip }
    }

    #[must_use]
    pub const fn linear() -> Self {
        Self::new(
            TextureFilterMode::Linear,
            TextureFilterMode::Linear,
            TextureFilterMode::Linear,
        )
    }

    #[must_use]
    pub const fn nearest() -> Self {
        Self::new(
            TextureFilterMode::Nearest,
            TextureFilterMode::Nearest,
            TextureFilterMode::None,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureWrap {
    #[default]
    None,
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

// ============================================================================
// Specification
// ============================================================================

/// Everything needed to allocate a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureSpecification {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub ty: TextureType,
    pub format: TextureFormat,
    pub filter: TextureFilter,
    pub wrap: TextureWrap,
    pub mip_maps: bool,
    pub samples: u32,
}

impl Default for TextureSpecification {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            ty: TextureType::Texture2D,
            format: TextureFormat::Rgba8,
            filter: TextureFilter::default(),
            wrap: TextureWrap::None,
            mip_maps: false,
            samples: 1,
        }
    }
}

impl TextureSpecification {
    #[must_use]
    pub fn new(ty: TextureType, format: TextureFormat) -> Self {
        Self {
            ty,
            format,
            ..Self::default()
        }
    }

    /// Shorthand for attachment lists, where size comes from the framebuffer.
    #[must_use]
    pub fn attachment(format: TextureFormat) -> Self {
        Self::new(TextureType::Texture2D, format)
    }

    #[must_use]
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    #[must_use]
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: TextureFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn with_wrap(mut self, wrap: TextureWrap) -> Self {
        self.wrap = wrap;
        self
    }

    #[must_use]
    pub fn with_mip_maps(mut self, mip_maps: bool) -> Self {
        self.mip_maps = mip_maps;
        self
    }

    #[must_use]
    pub fn with_type(mut self, ty: TextureType) -> Self {
        self.ty = ty;
        self
    }

    /// Resolves every "unspecified" field to its default.
    ///
    /// Depth and integer formats sample with `Nearest`, color formats with
    /// `Linear`; depth wraps `ClampToBorder`, color `ClampToEdge`. A
    /// mipmapped texture always gets a mip filter.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let mut spec = *self;
        let default_filter = if spec.format.is_depth() || spec.format.is_integer() {
            TextureFilterMode::Nearest
        } else {
            TextureFilterMode::Linear
        };
        if spec.filter.min == TextureFilterMode::None {
            spec.filter.min = default_filter;
        }
        if spec.filter.mag == TextureFilterMode::None {
            spec.filter.mag = default_filter;
        }
        if spec.mip_maps && spec.filter.mip == TextureFilterMode::None {
            spec.filter.mip = default_filter;
        }
        if spec.wrap == TextureWrap::None {
            spec.wrap = if spec.format.is_depth() {
                TextureWrap::ClampToBorder
            } else {
                TextureWrap::ClampToEdge
            };
        }
        spec.width = spec.width.max(1);
        spec.height = spec.height.max(1);
        spec.depth = spec.depth.max(1);
        spec.samples = spec.samples.max(1);
        if spec.ty == TextureType::Texture2DMultisample {
            spec.mip_maps = false;
            spec.filter.mip = TextureFilterMode::None;
        }
        spec
    }

    /// Checks the structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.format == TextureFormat::None || self.ty == TextureType::None {
            return Err(LumenError::InvariantViolation(
                "texture type and format must be set".into(),
            ));
        }
        if self.ty == TextureType::Texture2DMultisample && self.samples <= 1 {
            return Err(LumenError::InvariantViolation(format!(
                "multisample texture requires samples > 1 (got {})",
                self.samples
            )));
        }
        if self.mip_maps && self.filter.mip == TextureFilterMode::None {
            return Err(LumenError::InvariantViolation(
                "mipmapped texture needs a mip filter".into(),
            ));
        }
        if self.ty == TextureType::TextureCube && self.width != self.height {
            return Err(LumenError::CubeMap(format!(
                "cube faces must be square ({}x{})",
                self.width, self.height
            )));
        }
        if self.format.is_depth() && matches!(self.ty, TextureType::Texture1D | TextureType::Texture3D) {
            return Err(LumenError::UnsupportedFormat(format!(
                "{} cannot back a {:?}",
                self.format, self.ty
            )));
        }
        Ok(())
    }

    /// Number of mip levels allocated for this specification.
    #[must_use]
    pub fn mip_level_count(&self) -> u32 {
        if !self.mip_maps || self.ty == TextureType::Texture2DMultisample {
            return 1;
        }
        let largest = self.width.max(self.height).max(1);
        32 - largest.leading_zeros()
    }

    #[must_use]
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        ((self.width >> level).max(1), (self.height >> level).max(1))
    }

    /// Depth slices (3D) or faces (cube) per level.
    #[must_use]
    pub fn layers(&self) -> u32 {
        match self.ty {
            TextureType::Texture3D => self.depth.max(1),
            other => other.layer_count(),
        }
    }

    /// Bytes of one full mip level, all layers included.
    #[must_use]
    pub fn level_byte_size(&self, level: u32) -> usize {
        let (w, h) = self.level_size(level);
        let h = if self.ty == TextureType::Texture1D { 1 } else { h };
        (self.format.stride(w) * h * self.layers()) as usize
    }
}

// ============================================================================
// Texture capability
// ============================================================================

/// A GPU texture owned by exactly one creator.
///
/// Binding a texture that failed to load is a no-op. `release` frees the GPU
/// object and may be called more than once.
pub trait Texture: Any {
    fn id(&self) -> u64;

    fn specification(&self) -> &TextureSpecification;

    /// Source file, for textures loaded from disk.
    fn path(&self) -> Option<&Path> {
        None
    }

    fn is_loaded(&self) -> bool;

    fn bind(&self);

    fn bind_to_texture_unit(&self, slot: u32);

    fn unbind(&self);

    /// Uploads one whole mip level. Cube data holds the six faces back to
    /// back in `+X, -X, +Y, -Y, +Z, -Z` order.
    fn set_data(&self, data: &[u8], level: u32) -> Result<()>;

    fn generate_mipmaps(&self);

    /// Reads back one mip level, tightly packed in the texture's format.
    fn read_pixels(&self, level: u32) -> Result<Vec<u8>>;

    fn release(&self);

    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Texture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Texture")
            .field("id", &self.id())
            .field("spec", self.specification())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

// ============================================================================
// Factories
// ============================================================================

/// 1D/2D/3D texture constructors dispatched through the active backend.
pub struct Texture2D;

impl Texture2D {
    pub fn create(api: &dyn RendererApi, spec: &TextureSpecification) -> Result<Rc<dyn Texture>> {
        api.create_texture(spec, None, None)
    }

    pub fn from_data(
        api: &dyn RendererApi,
        data: &[u8],
        spec: &TextureSpecification,
    ) -> Result<Rc<dyn Texture>> {
        let expected = spec.level_byte_size(0);
        if data.len() < expected {
            return Err(LumenError::InvariantViolation(format!(
                "texture data holds {} bytes, {} needed for {}x{} {}",
                data.len(),
                expected,
                spec.width,
                spec.height,
                spec.format
            )));
        }
        api.create_texture(spec, Some(data), None)
    }

    /// Loads an image file. A file that fails to decode yields the backend's
    /// 1x1 white fallback texture and a warning.
    pub fn from_file(api: &dyn RendererApi, path: impl AsRef<Path>, flip: bool) -> Rc<dyn Texture> {
        let path = path.as_ref();
        match image::load_image(path, flip) {
            Ok(decoded) => {
                let spec = image::deduce_specification(&decoded);
                let data = image::pixel_data(&decoded, spec.format);
                match api.create_texture(&spec, Some(&data), Some(path.to_path_buf())) {
                    Ok(texture) => texture,
                    Err(err) => {
                        log::warn!("Texture '{}' could not be created: {err}", path.display());
                        api.white_texture()
                    }
                }
            }
            Err(err) => {
                log::warn!("Texture '{}' failed to load: {err}", path.display());
                api.white_texture()
            }
        }
    }
}

/// Cube texture constructors.
pub struct TextureCube;

impl TextureCube {
    pub fn create(api: &dyn RendererApi, size: u32, format: TextureFormat, mip_maps: bool) -> Result<Rc<dyn Texture>> {
        let spec = TextureSpecification::new(TextureType::TextureCube, format)
            .with_size(size, size)
            .with_wrap(TextureWrap::ClampToEdge)
            .with_mip_maps(mip_maps);
        api.create_texture(&spec, None, None)
    }

    /// Loads six face images in `+X, -X, +Y, -Y, +Z, -Z` order.
    pub fn from_files(api: &dyn RendererApi, paths: &[PathBuf; 6], flip: bool) -> Result<Rc<dyn Texture>> {
        let faces = paths
            .iter()
            .map(|p| image::load_image(p, flip))
            .collect::<Result<Vec<DecodedImage>>>()?;
        let first = &faces[0];
        if let Some((i, face)) = faces
            .iter()
            .enumerate()
            .find(|(_, f)| f.width != first.width || f.height != first.height || f.channels != first.channels)
        {
            return Err(LumenError::CubeMap(format!(
                "face {} ({}) is {}x{}, expected {}x{}",
                i,
                paths[i].display(),
                face.width,
                face.height,
                first.width,
                first.height
            )));
        }
        let spec = image::deduce_specification(first)
            .with_type(TextureType::TextureCube)
            .with_wrap(TextureWrap::ClampToEdge);
        let mut data = Vec::with_capacity(spec.level_byte_size(0));
        for face in &faces {
            data.extend_from_slice(&image::pixel_data(face, spec.format));
        }
        api.create_texture(&spec, Some(&data), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for format in TextureFormat::ALL {
            assert_eq!(format.as_str().parse::<TextureFormat>().unwrap(), format);
        }
        assert!("RGBA9".parse::<TextureFormat>().is_err());
    }

    #[test]
    fn aligned_stride_rounds_to_four() {
        assert_eq!(TextureFormat::Rgb8.stride(3), 9);
        assert_eq!(TextureFormat::Rgb8.aligned_stride(3), 12);
        assert_eq!(TextureFormat::Rgba8.aligned_stride(3), 12);
    }

    #[test]
    fn mip_levels_follow_largest_side() {
        let spec = TextureSpecification::default()
            .with_size(256, 64)
            .with_mip_maps(true);
        assert_eq!(spec.mip_level_count(), 9);
        assert_eq!(spec.level_size(8), (1, 1));
    }

    #[test]
    fn normalization_picks_format_defaults() {
        let depth = TextureSpecification::attachment(TextureFormat::Depth24).normalized();
        assert_eq!(depth.filter.min, TextureFilterMode::Nearest);
        assert_eq!(depth.wrap, TextureWrap::ClampToBorder);

        let color = TextureSpecification::attachment(TextureFormat::Rgba8)
            .with_mip_maps(true)
            .normalized();
        assert_eq!(color.filter.mag, TextureFilterMode::Linear);
        assert_eq!(color.filter.mip, TextureFilterMode::Linear);
        assert_eq!(color.wrap, TextureWrap::ClampToEdge);
    }
}
