//! Host-memory textures.
//!
//! Each mip level is one tightly packed byte vector holding all layers
//! (cube faces or 3D slices) back to back. Row 0 is the bottom row, as with
//! textures uploaded to OpenGL.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::errors::{LumenError, Result};
use crate::renderer::texture::{
    Texture, TextureFilterMode, TextureSpecification, TextureType, generate_texture_id,
};
use crate::resources::image::{decode_texel, encode_texel};

use super::HeadlessDevice;

pub struct HeadlessTexture {
    id: u64,
    device: Rc<HeadlessDevice>,
    spec: TextureSpecification,
    path: Option<PathBuf>,
    levels: RefCell<Vec<Vec<u8>>>,
    loaded: Cell<bool>,
}

impl HeadlessTexture {
    pub(crate) fn new(
        device: Rc<HeadlessDevice>,
        spec: &TextureSpecification,
        data: Option<&[u8]>,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        let spec = spec.normalized();
        spec.validate()?;
        let levels = (0..spec.mip_level_count())
            .map(|level| vec![0; spec.level_byte_size(level)])
            .collect();
        let texture = Self {
            id: generate_texture_id(),
            device,
            spec,
            path,
            levels: RefCell::new(levels),
            loaded: Cell::new(true),
        };
        if let Some(data) = data {
            texture.set_data(data, 0)?;
            if spec.mip_maps {
                texture.generate_mipmaps();
            }
        }
        Ok(texture)
    }

    fn texel_offset(&self, x: u32, y: u32, layer: u32, level: u32) -> usize {
        let (w, h) = self.spec.level_size(level);
        let bpp = self.spec.format.bytes_per_pixel() as usize;
        ((layer * h + y) * w + x) as usize * bpp
    }

    /// Reads one texel as RGBA.
    #[must_use]
    pub fn fetch(&self, x: u32, y: u32, layer: u32, level: u32) -> [f32; 4] {
        if !self.loaded.get() {
            return [0.0, 0.0, 0.0, 1.0];
        }
        let (w, h) = self.spec.level_size(level);
        let (x, y) = (x.min(w - 1), y.min(h - 1));
        let at = self.texel_offset(x, y, layer, level);
        let bpp = self.spec.format.bytes_per_pixel() as usize;
        decode_texel(self.spec.format, &self.levels.borrow()[level as usize][at..at + bpp])
    }

    /// Writes one texel.
    pub fn store(&self, x: u32, y: u32, layer: u32, level: u32, value: [f32; 4]) {
        let (w, h) = self.spec.level_size(level);
        if !self.loaded.get() || x >= w || y >= h {
            return;
        }
        let at = self.texel_offset(x, y, layer, level);
        let bytes = encode_texel(self.spec.format, value);
        self.levels.borrow_mut()[level as usize][at..at + bytes.len()].copy_from_slice(&bytes);
    }

    /// Fills one layer of one level.
    pub fn fill(&self, layer: u32, level: u32, value: [f32; 4]) {
        if !self.loaded.get() {
            return;
        }
        let (w, h) = self.spec.level_size(level);
        let texel = encode_texel(self.spec.format, value);
        let start = self.texel_offset(0, 0, layer, level);
        let end = start + (w * h) as usize * texel.len();
        let mut levels = self.levels.borrow_mut();
        for chunk in levels[level as usize][start..end].chunks_exact_mut(texel.len()) {
            chunk.copy_from_slice(&texel);
        }
    }

    /// Fills every layer of level 0.
    pub fn fill_all(&self, value: [f32; 4]) {
        for layer in 0..self.spec.layers() {
            self.fill(layer, 0, value);
        }
    }

    /// Samples level 0 of one layer at normalized `uv`, clamped to the edge.
    #[must_use]
    pub fn sample(&self, u: f32, v: f32, layer: u32, filter: TextureFilterMode) -> [f32; 4] {
        let (w, h) = self.spec.level_size(0);
        match filter {
            TextureFilterMode::Linear => {
                let x = u * w as f32 - 0.5;
                let y = v * h as f32 - 0.5;
                let (x0, y0) = (x.floor(), y.floor());
                let (fx, fy) = (x - x0, y - y0);
                let clamp_x = |c: f32| c.clamp(0.0, (w - 1) as f32) as u32;
                let clamp_y = |c: f32| c.clamp(0.0, (h - 1) as f32) as u32;
                let t00 = self.fetch(clamp_x(x0), clamp_y(y0), layer, 0);
                let t10 = self.fetch(clamp_x(x0 + 1.0), clamp_y(y0), layer, 0);
                let t01 = self.fetch(clamp_x(x0), clamp_y(y0 + 1.0), layer, 0);
                let t11 = self.fetch(clamp_x(x0 + 1.0), clamp_y(y0 + 1.0), layer, 0);
                let mut out = [0.0; 4];
                for c in 0..4 {
                    let top = t00[c] + (t10[c] - t00[c]) * fx;
                    let bottom = t01[c] + (t11[c] - t01[c]) * fx;
                    out[c] = top + (bottom - top) * fy;
                }
                out
            }
            _ => {
                let x = ((u * w as f32).floor().max(0.0) as u32).min(w - 1);
                let y = ((v * h as f32).floor().max(0.0) as u32).min(h - 1);
                self.fetch(x, y, layer, 0)
            }
        }
    }

    /// Byte copy of one level.
    #[must_use]
    pub fn level_data(&self, level: u32) -> Vec<u8> {
        self.levels
            .borrow()
            .get(level as usize)
            .cloned()
            .unwrap_or_default()
    }
}

impl Texture for HeadlessTexture {
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
        self.loaded.get()
    }

    fn bind(&self) {
        self.bind_to_texture_unit(0);
    }

    fn bind_to_texture_unit(&self, slot: u32) {
        if self.loaded.get() {
            self.device.texture_units.borrow_mut().insert(slot, self.id);
        }
    }

    fn unbind(&self) {
        self.device
            .texture_units
            .borrow_mut()
            .retain(|_, bound| *bound != self.id);
    }

    fn set_data(&self, data: &[u8], level: u32) -> Result<()> {
        let expected = self.spec.level_byte_size(level);
        let mut levels = self.levels.borrow_mut();
        let Some(target) = levels.get_mut(level as usize) else {
            return Err(LumenError::IndexOutOfBounds {
                what: "mip level".into(),
                index: level as usize,
                len: self.spec.mip_level_count() as usize,
            });
        };
        if data.len() < expected {
            return Err(LumenError::InvariantViolation(format!(
                "texture data holds {} bytes, level {level} needs {expected}",
                data.len()
            )));
        }
        target.copy_from_slice(&data[..expected]);
        Ok(())
    }

    /// Box-filters every level from the one above it.
    fn generate_mipmaps(&self) {
        if self.spec.ty == TextureType::Texture3D {
            return;
        }
        for level in 1..self.spec.mip_level_count() {
            let (w, h) = self.spec.level_size(level);
            let (pw, ph) = self.spec.level_size(level - 1);
            for layer in 0..self.spec.layers() {
                for y in 0..h {
                    for x in 0..w {
                        let mut sum = [0.0f32; 4];
                        let mut n = 0.0;
                        for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                            let (sx, sy) = (x * 2 + dx, y * 2 + dy);
                            if sx < pw && sy < ph {
                                let t = self.fetch(sx, sy, layer, level - 1);
                                for c in 0..4 {
                                    sum[c] += t[c];
                                }
                                n += 1.0;
                            }
                        }
                        self.store(x, y, layer, level, sum.map(|s| s / n));
                    }
                }
            }
        }
    }

    fn read_pixels(&self, level: u32) -> Result<Vec<u8>> {
        if level >= self.spec.mip_level_count() {
            return Err(LumenError::IndexOutOfBounds {
                what: "mip level".into(),
                index: level as usize,
                len: self.spec.mip_level_count() as usize,
            });
        }
        Ok(self.level_data(level))
    }

    fn release(&self) {
        if self.loaded.replace(false) {
            self.unbind();
            self.levels.borrow_mut().clear();
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for HeadlessTexture {
    fn drop(&mut self) {
        self.release();
    }
}
