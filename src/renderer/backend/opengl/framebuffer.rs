//! OpenGL framebuffer objects with texture attachments.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glow::HasContext;

use crate::errors::{LumenError, Result};
use crate::renderer::api::RenderTargetMask;
use crate::renderer::framebuffer::{
    DrawSelection, FrameBuffer, FrameBufferAttachments, FrameBufferSpecification, check_cube_target,
    check_index,
};
use crate::renderer::texture::{Texture, TextureType};

use super::texture::OpenGlTexture;

pub struct OpenGlFrameBuffer {
    gl: Rc<glow::Context>,
    native: Cell<Option<glow::Framebuffer>>,
    spec: RefCell<FrameBufferSpecification>,
    colors: RefCell<Vec<Rc<OpenGlTexture>>>,
    depth: RefCell<Option<Rc<OpenGlTexture>>>,
    targets: Cell<RenderTargetMask>,
    selection: Cell<DrawSelection>,
}

fn color_attachment(index: usize) -> u32 {
    glow::COLOR_ATTACHMENT0 + index as u32
}

/// Attaches level 0 of `texture` (face 0 of a cube, slice 0 of a volume).
unsafe fn attach(gl: &glow::Context, attachment: u32, texture: &OpenGlTexture) {
    unsafe {
        match texture.specification().ty {
            TextureType::TextureCube => gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                attachment,
                glow::TEXTURE_CUBE_MAP_POSITIVE_X,
                texture.native(),
                0,
            ),
            TextureType::Texture3D => {
                gl.framebuffer_texture_layer(glow::FRAMEBUFFER, attachment, texture.native(), 0, 0);
            }
            _ => gl.framebuffer_texture_2d(glow::FRAMEBUFFER, attachment, texture.target(), texture.native(), 0),
        }
    }
}

impl OpenGlFrameBuffer {
    pub(crate) fn new(gl: Rc<glow::Context>, spec: &FrameBufferSpecification) -> Result<Self> {
        let framebuffer = Self {
            gl,
            native: Cell::new(None),
            spec: RefCell::new(spec.clone()),
            colors: RefCell::new(Vec::new()),
            depth: RefCell::new(None),
            targets: Cell::new(RenderTargetMask::empty()),
            selection: Cell::new(DrawSelection::All),
        };
        framebuffer.invalidate()?;
        Ok(framebuffer)
    }

    #[must_use]
    pub fn native(&self) -> Option<glow::Framebuffer> {
        self.native.get()
    }

    fn draw_all(&self) {
        let count = self.colors.borrow().len();
        unsafe {
            if count == 0 {
                self.gl.draw_buffer(glow::NONE);
                self.gl.read_buffer(glow::NONE);
            } else {
                let buffers: Vec<u32> = (0..count).map(color_attachment).collect();
                self.gl.draw_buffers(&buffers);
            }
        }
    }

    fn destroy(&self) {
        if let Some(native) = self.native.take() {
            unsafe { self.gl.delete_framebuffer(native) };
        }
    }
}

impl FrameBuffer for OpenGlFrameBuffer {
    fn specification(&self) -> FrameBufferSpecification {
        self.spec.borrow().clone()
    }

    fn color_attachment_count(&self) -> usize {
        self.colors.borrow().len()
    }

    fn attachment(&self, index: usize) -> Option<Rc<dyn Texture>> {
        self.colors
            .borrow()
            .get(index)
            .map(|t| Rc::clone(t) as Rc<dyn Texture>)
    }

    fn depth_attachment(&self) -> Option<Rc<dyn Texture>> {
        self.depth.borrow().clone().map(|t| t as Rc<dyn Texture>)
    }

    fn render_targets(&self) -> RenderTargetMask {
        self.targets.get()
    }

    fn bind(&self) {
        let spec = self.spec.borrow();
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, self.native.get());
            self.gl
                .viewport(0, 0, spec.width as i32, spec.height.max(1) as i32);
        }
        self.draw_all();
        self.selection.set(DrawSelection::All);
    }

    fn unbind(&self, generate_mipmaps: bool) {
        unsafe { self.gl.bind_framebuffer(glow::FRAMEBUFFER, None) };
        if generate_mipmaps && self.spec.borrow().mip_maps {
            self.generate_mipmaps();
        }
        self.selection.set(DrawSelection::All);
    }

    fn bind_for_draw_attachment(&self, index: usize) -> Result<()> {
        check_index("draw attachment", index, self.color_attachment_count())?;
        unsafe {
            self.gl.bind_framebuffer(glow::DRAW_FRAMEBUFFER, self.native.get());
            self.gl.draw_buffers(&[color_attachment(index)]);
        }
        self.selection.set(DrawSelection::Attachment(index));
        Ok(())
    }

    fn bind_for_read_attachment(&self, index: usize) -> Result<()> {
        check_index("read attachment", index, self.color_attachment_count())?;
        unsafe {
            self.gl.bind_framebuffer(glow::READ_FRAMEBUFFER, self.native.get());
            self.gl.read_buffer(color_attachment(index));
        }
        Ok(())
    }

    fn bind_for_draw_attachment_cube(&self, index: usize, face: u32, level: u32) -> Result<()> {
        check_index("cube draw attachment", index, self.color_attachment_count())?;
        let Some(texture) = self.colors.borrow().get(index).cloned() else {
            return Ok(());
        };
        check_cube_target(texture.as_ref(), index, face, level)?;
        let (w, h) = texture.specification().level_size(level);
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, self.native.get());
            self.gl.framebuffer_texture_2d(
                glow::FRAMEBUFFER,
                color_attachment(index),
                glow::TEXTURE_CUBE_MAP_POSITIVE_X + face,
                texture.native(),
                level as i32,
            );
            self.gl.draw_buffers(&[color_attachment(index)]);
            self.gl.viewport(0, 0, w as i32, h as i32);
        }
        self.selection.set(DrawSelection::CubeFace { index, face, level });
        Ok(())
    }

    fn draw_selection(&self) -> DrawSelection {
        self.selection.get()
    }

    fn clear_attachment(&self, index: usize, value: i32) -> Result<()> {
        check_index("clear attachment", index, self.color_attachment_count())?;
        let integer = self.colors.borrow()[index].specification().format.is_integer();
        unsafe {
            self.gl.bind_framebuffer(glow::FRAMEBUFFER, self.native.get());
            self.gl.draw_buffers(&[color_attachment(index)]);
            if integer {
                self.gl.clear_buffer_i32_slice(glow::COLOR, 0, &[value; 4]);
            } else {
                self.gl.clear_buffer_f32_slice(glow::COLOR, 0, &[value as f32; 4]);
            }
        }
        match self.selection.get() {
            DrawSelection::All => self.draw_all(),
            DrawSelection::Attachment(i) | DrawSelection::CubeFace { index: i, .. } => unsafe {
                self.gl.draw_buffers(&[color_attachment(i)]);
            },
        }
        Ok(())
    }

    fn invalidate(&self) -> Result<()> {
        self.destroy();
        let spec = self.spec.borrow().clone();
        let parts = FrameBufferAttachments::partition(&spec)?;
        let colors = parts
            .colors
            .iter()
            .map(|c| OpenGlTexture::new(Rc::clone(&self.gl), c, None, None).map(Rc::new))
            .collect::<Result<Vec<_>>>()?;
        let depth = parts
            .depth
            .as_ref()
            .map(|d| OpenGlTexture::new(Rc::clone(&self.gl), d, None, None).map(Rc::new))
            .transpose()?;

        let gl = &self.gl;
        let native = unsafe { gl.create_framebuffer() }.map_err(LumenError::Backend)?;
        let status = unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(native));
            for (i, color) in colors.iter().enumerate() {
                attach(gl, color_attachment(i), color);
            }
            if let Some(depth) = &depth {
                let point = if depth.specification().format.has_stencil() {
                    glow::DEPTH_STENCIL_ATTACHMENT
                } else {
                    glow::DEPTH_ATTACHMENT
                };
                attach(gl, point, depth);
            }
            gl.check_framebuffer_status(glow::FRAMEBUFFER)
        };
        self.native.set(Some(native));
        *self.colors.borrow_mut() = colors;
        *self.depth.borrow_mut() = depth;
        self.draw_all();
        unsafe { gl.bind_framebuffer(glow::FRAMEBUFFER, None) };

        self.targets.set(parts.render_targets());
        self.selection.set(DrawSelection::All);
        if status != glow::FRAMEBUFFER_COMPLETE {
            return Err(LumenError::Backend(format!("framebuffer incomplete (status 0x{status:x})")));
        }
        Ok(())
    }

    fn resize(&self, width: u32, height: u32) -> Result<()> {
        {
            let mut spec = self.spec.borrow_mut();
            spec.width = width;
            spec.height = height;
        }
        self.invalidate()
    }

    fn adjust_sample_count(&self, samples: u32) -> Result<()> {
        self.spec.borrow_mut().samples = samples;
        self.invalidate()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for OpenGlFrameBuffer {
    fn drop(&mut self) {
        self.destroy();
    }
}
