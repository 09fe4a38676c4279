//! OpenGL texture objects.

use std::any::Any;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use glow::HasContext;

use crate::errors::{LumenError, Result};
use crate::renderer::texture::{
    Texture, TextureFormat, TextureSpecification, TextureType, TextureWrap, generate_texture_id,
};
use crate::resources::image::encode_texel;

use super::convert;

pub struct OpenGlTexture {
    gl: Rc<glow::Context>,
    id: u64,
    spec: TextureSpecification,
    path: Option<PathBuf>,
    native: Cell<Option<glow::Texture>>,
}

impl OpenGlTexture {
    pub(crate) fn new(
        gl: Rc<glow::Context>,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        let spec = spec.normalized();
        spec.validate()?;
        let native = unsafe { gl.create_texture() }.map_err(LumenError::Backend)?;
        let texture = Self {
            gl,
            id: generate_texture_id(),
            spec,
            path,
            native: Cell::new(Some(native)),
        };
        texture.allocate();
        if let Some(data) = data {
            texture.set_data(data, 0)?;
            if spec.mip_maps {
                texture.generate_mipmaps();
            }
        }
        Ok(texture)
    }

    #[must_use]
    pub fn native(&self) -> Option<glow::Texture> {
        self.native.get()
    }

    #[must_use]
    pub fn target(&self) -> u32 {
        convert::texture_target(self.spec.ty)
    }

    /// Allocates every level and sets sampling parameters.
    fn allocate(&self) {
        let gl = &self.gl;
        let spec = &self.spec;
        let target = self.target();
        let internal = convert::internal_format(spec.format);
        let format = convert::base_format(spec.format);
        let ty = convert::pixel_type(spec.format);
        unsafe {
            gl.bind_texture(target, self.native.get());
            match spec.ty {
                TextureType::Texture2DMultisample => {
                    gl.tex_image_2d_multisample(
                        target,
                        spec.samples as i32,
                        internal as i32,
                        spec.width as i32,
                        spec.height as i32,
                        true,
                    );
                    gl.bind_texture(target, None);
                    return;
                }
                TextureType::Texture3D => {
                    for level in 0..spec.mip_level_count() {
                        let (w, h) = spec.level_size(level);
                        gl.tex_image_3d(
                            target,
                            level as i32,
                            internal as i32,
                            w as i32,
                            h as i32,
                            spec.depth as i32,
                            0,
                            format,
                            ty,
                            glow::PixelUnpackData::Slice(None),
                        );
                    }
                }
                TextureType::TextureCube => {
                    for level in 0..spec.mip_level_count() {
                        let (w, h) = spec.level_size(level);
                        for face in 0..6 {
                            gl.tex_image_2d(
                                glow::TEXTURE_CUBE_MAP_POSITIVE_X + face,
                                level as i32,
                                internal as i32,
                                w as i32,
                                h as i32,
                                0,
                                format,
                                ty,
                                glow::PixelUnpackData::Slice(None),
                            );
                        }
                    }
                }
                TextureType::None | TextureType::Texture1D | TextureType::Texture2D => {
                    for level in 0..spec.mip_level_count() {
                        let (w, h) = spec.level_size(level);
                        let h = if spec.ty == TextureType::Texture1D { 1 } else { h };
                        gl.tex_image_2d(
                            target,
                            level as i32,
                            internal as i32,
                            w as i32,
                            h as i32,
                            0,
                            format,
                            ty,
                            glow::PixelUnpackData::Slice(None),
                        );
                    }
                }
            }

            let min = convert::min_filter(spec.filter.min, spec.filter.mip, spec.mip_maps);
            gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, min as i32);
            gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, convert::filter(spec.filter.mag) as i32);
            let wrap = convert::wrap(spec.wrap) as i32;
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap);
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap);
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_R, wrap);
            if spec.wrap == TextureWrap::ClampToBorder {
                gl.tex_parameter_f32_slice(target, glow::TEXTURE_BORDER_COLOR, &[1.0; 4]);
            }
            gl.tex_parameter_i32(target, glow::TEXTURE_MAX_LEVEL, spec.mip_level_count() as i32 - 1);
            gl.bind_texture(target, None);
        }
    }

    fn check_level(&self, level: u32) -> Result<()> {
        if level >= self.spec.mip_level_count() {
            return Err(LumenError::IndexOutOfBounds {
                what: "mip level".into(),
                index: level as usize,
                len: self.spec.mip_level_count() as usize,
            });
        }
        Ok(())
    }

    /// Reads one image (a whole 2D level, a cube face, or every 3D slice).
    fn read_image(&self, image_target: u32, level: u32, out: &mut [u8]) {
        let format = self.spec.format;
        unsafe {
            if format.is_depth() && format != TextureFormat::Depth24Stencil8 {
                // Depth reads back as float and is re-encoded to the host layout.
                let texels = out.len() / format.bytes_per_pixel() as usize;
                let mut floats = vec![0u8; texels * 4];
                self.gl.get_tex_image(
                    image_target,
                    level as i32,
                    glow::DEPTH_COMPONENT,
                    glow::FLOAT,
                    glow::PixelPackData::Slice(Some(&mut floats)),
                );
                let bpp = format.bytes_per_pixel() as usize;
                for (i, d) in floats.chunks_exact(4).enumerate() {
                    let depth = f32::from_le_bytes([d[0], d[1], d[2], d[3]]);
                    let encoded = encode_texel(format, [depth, 0.0, 0.0, 1.0]);
                    out[i * bpp..(i + 1) * bpp].copy_from_slice(&encoded);
                }
            } else {
                self.gl.get_tex_image(
                    image_target,
                    level as i32,
                    convert::base_format(format),
                    convert::pixel_type(format),
                    glow::PixelPackData::Slice(Some(out)),
                );
                if format == TextureFormat::Depth24Stencil8 {
                    // GL packs depth in the high 24 bits; the host keeps it low.
                    for word in out.chunks_exact_mut(4) {
                        let packed = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
                        let host = (packed >> 8) | ((packed & 0xff) << 24);
                        word.copy_from_slice(&host.to_le_bytes());
                    }
                }
            }
        }
    }
}

impl Texture for OpenGlTexture {
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
        self.native.get().is_some()
    }

    fn bind(&self) {
        self.bind_to_texture_unit(0);
    }

    fn bind_to_texture_unit(&self, slot: u32) {
        let Some(native) = self.native.get() else {
            return;
        };
        unsafe {
            self.gl.active_texture(glow::TEXTURE0 + slot);
            self.gl.bind_texture(self.target(), Some(native));
        }
    }

    fn unbind(&self) {
        unsafe { self.gl.bind_texture(self.target(), None) };
    }

    fn set_data(&self, data: &[u8], level: u32) -> Result<()> {
        self.check_level(level)?;
        let expected = self.spec.level_byte_size(level);
        if data.len() < expected {
            return Err(LumenError::InvariantViolation(format!(
                "texture data holds {} bytes, level {level} needs {expected}",
                data.len()
            )));
        }
        if self.spec.ty == TextureType::Texture2DMultisample {
            return Err(LumenError::UnsupportedFormat(
                "multisample textures cannot be uploaded to".into(),
            ));
        }
        let Some(native) = self.native.get() else {
            return Ok(());
        };
        let spec = &self.spec;
        let target = self.target();
        let format = convert::base_format(spec.format);
        let ty = convert::pixel_type(spec.format);
        let (w, h) = spec.level_size(level);
        unsafe {
            self.gl.bind_texture(target, Some(native));
            match spec.ty {
                TextureType::TextureCube => {
                    let face_size = expected / 6;
                    for face in 0..6u32 {
                        let start = face as usize * face_size;
                        self.gl.tex_sub_image_2d(
                            glow::TEXTURE_CUBE_MAP_POSITIVE_X + face,
                            level as i32,
                            0,
                            0,
                            w as i32,
                            h as i32,
                            format,
                            ty,
                            glow::PixelUnpackData::Slice(Some(&data[start..start + face_size])),
                        );
                    }
                }
                TextureType::Texture3D => self.gl.tex_sub_image_3d(
                    target,
                    level as i32,
                    0,
                    0,
                    0,
                    w as i32,
                    h as i32,
                    spec.depth as i32,
                    format,
                    ty,
                    glow::PixelUnpackData::Slice(Some(&data[..expected])),
                ),
                _ => {
                    let h = if spec.ty == TextureType::Texture1D { 1 } else { h };
                    self.gl.tex_sub_image_2d(
                        target,
                        level as i32,
                        0,
                        0,
                        w as i32,
                        h as i32,
                        format,
                        ty,
                        glow::PixelUnpackData::Slice(Some(&data[..expected])),
                    );
                }
            }
            self.gl.bind_texture(target, None);
        }
        Ok(())
    }

    fn generate_mipmaps(&self) {
        let Some(native) = self.native.get() else {
            return;
        };
        if self.spec.ty == TextureType::Texture2DMultisample {
            return;
        }
        unsafe {
            self.gl.bind_texture(self.target(), Some(native));
            self.gl.generate_mipmap(self.target());
            self.gl.bind_texture(self.target(), None);
        }
    }

    fn read_pixels(&self, level: u32) -> Result<Vec<u8>> {
        self.check_level(level)?;
        if self.spec.ty == TextureType::Texture2DMultisample {
            return Err(LumenError::UnsupportedFormat(
                "multisample textures must be resolved before readback".into(),
            ));
        }
        let Some(native) = self.native.get() else {
            return Err(LumenError::ResourceNotFound {
                kind: "texture",
                name: format!("#{}", self.id),
            });
        };
        let mut out = vec![0u8; self.spec.level_byte_size(level)];
        unsafe { self.gl.bind_texture(self.target(), Some(native)) };
        if self.spec.ty == TextureType::TextureCube {
            let face_size = out.len() / 6;
            for (face, chunk) in out.chunks_exact_mut(face_size).enumerate() {
                self.read_image(glow::TEXTURE_CUBE_MAP_POSITIVE_X + face as u32, level, chunk);
            }
        } else {
            self.read_image(self.target(), level, &mut out);
        }
        unsafe { self.gl.bind_texture(self.target(), None) };
        Ok(out)
    }

    fn release(&self) {
        if let Some(native) = self.native.take() {
            unsafe { self.gl.delete_texture(native) };
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for OpenGlTexture {
    fn drop(&mut self) {
        self.release();
    }
}
