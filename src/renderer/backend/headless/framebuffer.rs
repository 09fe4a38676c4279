//! Framebuffers whose attachments are host-memory textures.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::errors::Result;
use crate::renderer::api::RenderTargetMask;
use crate::renderer::framebuffer::{
    DrawSelection, FrameBuffer, FrameBufferAttachments, FrameBufferSpecification, check_cube_target,
    check_index,
};
use crate::renderer::texture::Texture;

use super::HeadlessDevice;
use super::texture::HeadlessTexture;

pub struct HeadlessFrameBuffer {
    device: Rc<HeadlessDevice>,
    spec: RefCell<FrameBufferSpecification>,
    colors: RefCell<Vec<Rc<HeadlessTexture>>>,
    depth: RefCell<Option<Rc<HeadlessTexture>>>,
    targets: Cell<RenderTargetMask>,
    selection: Cell<DrawSelection>,
    read_index: Cell<usize>,
}

impl HeadlessFrameBuffer {
    pub(crate) fn new(device: Rc<HeadlessDevice>, spec: &FrameBufferSpecification) -> Result<Self> {
        let framebuffer = Self {
            device,
            spec: RefCell::new(spec.clone()),
            colors: RefCell::new(Vec::new()),
            depth: RefCell::new(None),
            targets: Cell::new(RenderTargetMask::empty()),
            selection: Cell::new(DrawSelection::All),
            read_index: Cell::new(0),
        };
        framebuffer.invalidate()?;
        Ok(framebuffer)
    }

    #[must_use]
    pub fn color(&self, index: usize) -> Option<Rc<HeadlessTexture>> {
        self.colors.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn depth(&self) -> Option<Rc<HeadlessTexture>> {
        self.depth.borrow().clone()
    }

    #[must_use]
    pub fn read_index(&self) -> usize {
        self.read_index.get()
    }

    /// Color textures and `(layer, level)` targets written by draws and
    /// clears under the current selection.
    pub(crate) fn draw_targets(&self) -> Vec<(Rc<HeadlessTexture>, u32, u32)> {
        let colors = self.colors.borrow();
        match self.selection.get() {
            DrawSelection::All => colors.iter().map(|c| (Rc::clone(c), 0, 0)).collect(),
            DrawSelection::Attachment(i) => colors.get(i).map(|c| (Rc::clone(c), 0, 0)).into_iter().collect(),
            DrawSelection::CubeFace { index, face, level } => colors
                .get(index)
                .map(|c| (Rc::clone(c), face, level))
                .into_iter()
                .collect(),
        }
    }
}

impl FrameBuffer for HeadlessFrameBuffer {
    fn specification(&self) -> FrameBufferSpecification {
        self.spec.borrow().clone()
    }

    fn color_attachment_count(&self) -> usize {
        self.colors.borrow().len()
    }

    fn attachment(&self, index: usize) -> Option<Rc<dyn Texture>> {
        self.color(index).map(|t| t as Rc<dyn Texture>)
    }

    fn depth_attachment(&self) -> Option<Rc<dyn Texture>> {
        self.depth().map(|t| t as Rc<dyn Texture>)
    }

    fn render_targets(&self) -> RenderTargetMask {
        self.targets.get()
    }

    fn bind(&self) {
        let spec = self.spec.borrow();
        self.selection.set(DrawSelection::All);
        self.device.set_viewport([0, 0, spec.width, spec.height.max(1)]);
    }

    fn unbind(&self, generate_mipmaps: bool) {
        if generate_mipmaps && self.spec.borrow().mip_maps {
            self.generate_mipmaps();
        }
        self.selection.set(DrawSelection::All);
    }

    fn bind_for_draw_attachment(&self, index: usize) -> Result<()> {
        check_index("draw attachment", index, self.color_attachment_count())?;
        self.selection.set(DrawSelection::Attachment(index));
        Ok(())
    }

    fn bind_for_read_attachment(&self, index: usize) -> Result<()> {
        check_index("read attachment", index, self.color_attachment_count())?;
        self.read_index.set(index);
        Ok(())
    }

    fn bind_for_draw_attachment_cube(&self, index: usize, face: u32, level: u32) -> Result<()> {
        check_index("cube draw attachment", index, self.color_attachment_count())?;
        let Some(texture) = self.color(index) else {
            return Ok(());
        };
        check_cube_target(texture.as_ref(), index, face, level)?;
        self.selection.set(DrawSelection::CubeFace { index, face, level });
        let (w, h) = texture.specification().level_size(level);
        self.device.set_viewport([0, 0, w, h]);
        Ok(())
    }

    fn draw_selection(&self) -> DrawSelection {
        self.selection.get()
    }

    fn clear_attachment(&self, index: usize, value: i32) -> Result<()> {
        check_index("clear attachment", index, self.color_attachment_count())?;
        if let Some(texture) = self.color(index) {
            let v = value as f32;
            for layer in 0..texture.specification().layers() {
                texture.fill(layer, 0, [v, v, v, v]);
            }
        }
        Ok(())
    }

    fn invalidate(&self) -> Result<()> {
        let spec = self.spec.borrow().clone();
        let parts = FrameBufferAttachments::partition(&spec)?;
        let colors = parts
            .colors
            .iter()
            .map(|c| HeadlessTexture::new(Rc::clone(&self.device), c, None, None).map(Rc::new))
            .collect::<Result<Vec<_>>>()?;
        let depth = parts
            .depth
            .as_ref()
            .map(|d| HeadlessTexture::new(Rc::clone(&self.device), d, None, None).map(Rc::new))
            .transpose()?;
        if let Some(depth) = &depth {
            depth.fill_all([1.0, 0.0, 0.0, 1.0]);
        }
        *self.colors.borrow_mut() = colors;
        *self.depth.borrow_mut() = depth;
        self.targets.set(parts.render_targets());
        self.selection.set(DrawSelection::All);
        self.read_index.set(0);
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
