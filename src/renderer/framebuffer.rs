//! Framebuffers: a set of attachment textures bound as one render target.

use std::any::Any;
use std::fmt;
use std::path::Path;
use std::rc::Rc;

use crate::errors::{LumenError, Result};
use crate::renderer::api::{RenderTargetMask, RendererApi};
use crate::renderer::texture::{
    Texture, TextureFilterMode, TextureSpecification, TextureType, TextureWrap,
};
use crate::resources::image;

/// Upper bound on color attachments per framebuffer.
pub const MAX_COLOR_ATTACHMENTS: usize = 4;

/// Size, sampling and attachment list of a framebuffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameBufferSpecification {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub samples: u32,
    pub mip_maps: bool,
    pub attachments: Vec<TextureSpecification>,
}

impl Default for FrameBufferSpecification {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            samples: 1,
            mip_maps: false,
            attachments: Vec::new(),
        }
    }
}

impl FrameBufferSpecification {
    #[must_use]
    pub fn new(width: u32, height: u32, attachments: Vec<TextureSpecification>) -> Self {
        Self {
            width,
            height,
            attachments,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_samples(mut self, samples: u32) -> Self {
        self.samples = samples;
        self
    }

    #[must_use]
    pub fn with_mip_maps(mut self, mip_maps: bool) -> Self {
        self.mip_maps = mip_maps;
        self
    }
}

/// Attachments split into color and depth, with framebuffer-wide fields
/// applied and defaults resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBufferAttachments {
    pub colors: Vec<TextureSpecification>,
    pub depth: Option<TextureSpecification>,
}

impl FrameBufferAttachments {
    /// Partitions `spec.attachments`.
    ///
    /// Every attachment inherits the framebuffer's size, depth and mipmap
    /// flag. Wrap defaults to `ClampToBorder` for depth and `ClampToEdge`
    /// for color; filters default to `Nearest` for depth and `Linear` for
    /// color. A second depth format is rejected, as is a fifth color
    /// attachment.
    pub fn partition(spec: &FrameBufferSpecification) -> Result<Self> {
        let mut colors = Vec::new();
        let mut depth = None;
        for attachment in &spec.attachments {
            let mut tex = *attachment;
            tex.width = spec.width.max(1);
            tex.height = spec.height.max(1);
            if tex.ty != TextureType::TextureCube {
                tex.depth = spec.depth.max(1);
            }
            tex.mip_maps = spec.mip_maps;
            tex.samples = spec.samples.max(1);
            if tex.samples > 1 && tex.ty == TextureType::Texture2D {
                tex.ty = TextureType::Texture2DMultisample;
            }
            if tex.wrap == TextureWrap::None {
                tex.wrap = if tex.format.is_depth() {
                    TextureWrap::ClampToBorder
                } else {
                    TextureWrap::ClampToEdge
                };
            }
            let default_filter = if tex.format.is_depth() {
                TextureFilterMode::Nearest
            } else {
                TextureFilterMode::Linear
            };
            if tex.filter.min == TextureFilterMode::None {
                tex.filter.min = default_filter;
            }
            if tex.filter.mag == TextureFilterMode::None {
                tex.filter.mag = default_filter;
            }
            let tex = tex.normalized();

            if tex.format.is_depth() {
                if depth.is_some() {
                    return Err(LumenError::InvariantViolation(
                        "framebuffer declares more than one depth attachment".into(),
                    ));
                }
                depth = Some(tex);
            } else {
                colors.push(tex);
            }
        }
        if colors.len() > MAX_COLOR_ATTACHMENTS {
            return Err(LumenError::InvariantViolation(format!(
                "framebuffer declares {} color attachments (max {MAX_COLOR_ATTACHMENTS})",
                colors.len()
            )));
        }
        Ok(Self { colors, depth })
    }

    /// Planes present in this attachment set.
    #[must_use]
    pub fn render_targets(&self) -> RenderTargetMask {
        let mut mask = RenderTargetMask::empty();
        if !self.colors.is_empty() {
            mask |= RenderTargetMask::COLOR;
        }
        if let Some(depth) = &self.depth {
            mask |= RenderTargetMask::DEPTH;
            if depth.format.has_stencil() {
                mask |= RenderTargetMask::STENCIL;
            }
        }
        mask
    }
}

/// Parameters of a framebuffer-to-framebuffer copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlitSpecification {
    pub filter: TextureFilterMode,
    pub targets: RenderTargetMask,
    pub src_index: usize,
    pub dst_index: usize,
}

impl Default for BlitSpecification {
    fn default() -> Self {
        Self {
            filter: TextureFilterMode::Linear,
            targets: RenderTargetMask::COLOR,
            src_index: 0,
            dst_index: 0,
        }
    }
}

/// Which attachment subsequent draws write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrawSelection {
    #[default]
    All,
    Attachment(usize),
    CubeFace {
        index: usize,
        face: u32,
        level: u32,
    },
}

/// A render target owning its attachment textures.
pub trait FrameBuffer: Any {
    fn specification(&self) -> FrameBufferSpecification;

    fn color_attachment_count(&self) -> usize;

    fn attachment(&self, index: usize) -> Option<Rc<dyn Texture>>;

    fn depth_attachment(&self) -> Option<Rc<dyn Texture>>;

    fn render_targets(&self) -> RenderTargetMask;

    /// Binds all attachments and sets the viewport to the framebuffer size.
    fn bind(&self);

    /// Restores the default target, generating mipmaps first when asked to
    /// and the framebuffer is mipmapped.
    fn unbind(&self, generate_mipmaps: bool);

    fn bind_for_draw_attachment(&self, index: usize) -> Result<()>;

    fn bind_for_read_attachment(&self, index: usize) -> Result<()>;

    /// Targets one face and level of a cube attachment.
    fn bind_for_draw_attachment_cube(&self, index: usize, face: u32, level: u32) -> Result<()>;

    fn draw_selection(&self) -> DrawSelection;

    /// Fills a color attachment with an integer value (ID buffers).
    fn clear_attachment(&self, index: usize, value: i32) -> Result<()>;

    /// Rebuilds every attachment from the current specification.
    fn invalidate(&self) -> Result<()>;

    fn resize(&self, width: u32, height: u32) -> Result<()>;

    fn adjust_sample_count(&self, samples: u32) -> Result<()>;

    fn as_any(&self) -> &dyn Any;

    /// Regenerates the mip chain of every color attachment.
    fn generate_mipmaps(&self) {
        for i in 0..self.color_attachment_count() {
            if let Some(texture) = self.attachment(i) {
                texture.generate_mipmaps();
            }
        }
    }

    /// Writes attachment `index` to an image file, flipped vertically.
    fn save_attachment(&self, index: usize, path: &Path) -> Result<()> {
        let texture = self.attachment(index).ok_or_else(|| LumenError::IndexOutOfBounds {
            what: "framebuffer color attachment".into(),
            index,
            len: self.color_attachment_count(),
        })?;
        let spec = *texture.specification();
        let pixels = texture.read_pixels(0)?;
        image::save_pixels(path, spec.width, spec.height, spec.format, &pixels, true)?;
        log::info!("Saved attachment {index} to '{}'", path.display());
        Ok(())
    }
}

impl fmt::Debug for dyn FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("spec", &self.specification())
            .finish()
    }
}

/// Copies color attachment `spec.src_index` of `src` into
/// `spec.dst_index` of `dst`, plus depth/stencil when requested.
pub fn blit(
    api: &dyn RendererApi,
    src: &dyn FrameBuffer,
    dst: &dyn FrameBuffer,
    spec: &BlitSpecification,
) -> Result<()> {
    if spec.targets.contains(RenderTargetMask::COLOR) {
        check_index("blit source attachment", spec.src_index, src.color_attachment_count())?;
        check_index("blit destination attachment", spec.dst_index, dst.color_attachment_count())?;
    }
    api.blit(src, dst, spec)
}

/// Out-of-range attachment indices are errors everywhere.
pub(crate) fn check_index(what: &str, index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        log::error!("{what} {index} out of range ({len} attachments)");
        Err(LumenError::IndexOutOfBounds {
            what: what.to_string(),
            index,
            len,
        })
    }
}

/// Cube binds require a cube attachment and a face in `0..6`.
pub(crate) fn check_cube_target(texture: &dyn Texture, index: usize, face: u32, level: u32) -> Result<()> {
    let spec = texture.specification();
    if spec.ty != TextureType::TextureCube {
        log::warn!("bind_for_draw_attachment_cube: attachment {index} is not a cube map");
        return Err(LumenError::InvariantViolation(format!(
            "attachment {index} is {:?}, not a cube map",
            spec.ty
        )));
    }
    if face >= 6 {
        return Err(LumenError::IndexOutOfBounds {
            what: "cube face".into(),
            index: face as usize,
            len: 6,
        });
    }
    if level >= spec.mip_level_count() {
        return Err(LumenError::IndexOutOfBounds {
            what: "mip level".into(),
            index: level as usize,
            len: spec.mip_level_count() as usize,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::texture::TextureFormat;

    #[test]
    fn depth_and_color_split() {
        let spec = FrameBufferSpecification::new(
            64,
            32,
            vec![
                TextureSpecification::attachment(TextureFormat::Rgba8),
                TextureSpecification::attachment(TextureFormat::Depth24Stencil8),
                TextureSpecification::attachment(TextureFormat::R32F),
            ],
        );
        let parts = FrameBufferAttachments::partition(&spec).unwrap();
        assert_eq!(parts.colors.len(), 2);
        assert!(parts.depth.is_some());
        assert_eq!(
            parts.render_targets(),
            RenderTargetMask::COLOR | RenderTargetMask::DEPTH | RenderTargetMask::STENCIL
        );
        assert!(parts.colors.iter().all(|c| c.width == 64 && c.height == 32));
    }

    #[test]
    fn samples_promote_to_multisample() {
        let spec = FrameBufferSpecification::new(
            8,
            8,
            vec![TextureSpecification::attachment(TextureFormat::Rgba8)],
        )
        .with_samples(4);
        let parts = FrameBufferAttachments::partition(&spec).unwrap();
        assert_eq!(parts.colors[0].ty, TextureType::Texture2DMultisample);
    }
}
