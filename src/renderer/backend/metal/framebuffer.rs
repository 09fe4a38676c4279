//! Framebuffers as sets of wgpu attachment textures.
//!
//! Binding only records which attachments draws target; the render pass
//! itself is encoded by the renderer API when the pass ends or the targets
//! change.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::errors::{LumenError, Result};
use crate::renderer::api::RenderTargetMask;
use crate::renderer::framebuffer::{
    DrawSelection, FrameBuffer, FrameBufferAttachments, FrameBufferSpecification, check_cube_target,
    check_index,
};
use crate::renderer::pipeline::AttachmentSet;
use crate::renderer::texture::{Texture, TextureType};

use super::convert;
use super::device::MetalDevice;
use super::texture::MetalTexture;

/// Views and formats a render pass writes.
pub struct PassTargets {
    pub colors: Vec<(wgpu::TextureView, wgpu::TextureFormat)>,
    pub depth: Option<(wgpu::TextureView, bool)>,
    pub attachments: AttachmentSet,
    pub size: (u32, u32),
}

pub struct MetalFrameBuffer {
    device: Rc<MetalDevice>,
    spec: RefCell<FrameBufferSpecification>,
    colors: RefCell<Vec<Rc<MetalTexture>>>,
    depth: RefCell<Option<Rc<MetalTexture>>>,
    targets: Cell<RenderTargetMask>,
    selection: Cell<DrawSelection>,
}

impl MetalFrameBuffer {
    pub(crate) fn new(device: Rc<MetalDevice>, spec: &FrameBufferSpecification) -> Result<Self> {
        let framebuffer = Self {
            device,
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
    pub fn color(&self, index: usize) -> Option<Rc<MetalTexture>> {
        self.colors.borrow().get(index).cloned()
    }

    #[must_use]
    pub fn depth(&self) -> Option<Rc<MetalTexture>> {
        self.depth.borrow().clone()
    }

    /// Views of the attachments `selection` draws into. Depth joins the pass
    /// only when its size matches the selected color level.
    #[must_use]
    pub fn pass_targets(&self, selection: DrawSelection) -> PassTargets {
        let colors = self.colors.borrow();
        let swap = self.device.convention().swap_cube_y;
        let (selected, layer, level): (Vec<&Rc<MetalTexture>>, u32, u32) = match selection {
            DrawSelection::All => (colors.iter().collect(), 0, 0),
            DrawSelection::Attachment(i) => (colors.get(i).into_iter().collect(), 0, 0),
            DrawSelection::CubeFace { index, face, level } => (
                colors.get(index).into_iter().collect(),
                convert::cube_layer(face, swap),
                level,
            ),
        };
        let spec = self.spec.borrow();
        let size = selected
            .first()
            .map_or((spec.width.max(1), spec.height.max(1)), |t| t.specification().level_size(level));
        let depth = self
            .depth
            .borrow()
            .as_ref()
            .filter(|d| d.specification().level_size(0) == size)
            .map(|d| (d.target_view(0, 0), d.specification().format.has_stencil()));
        PassTargets {
            colors: selected
                .iter()
                .map(|t| (t.target_view(layer, level), t.wgpu_format()))
                .collect(),
            attachments: AttachmentSet {
                colors: selected.iter().map(|t| t.specification().format).collect(),
                depth: depth
                    .as_ref()
                    .and_then(|_| self.depth.borrow().as_ref().map(|d| d.specification().format)),
                samples: spec.samples.max(1),
            },
            depth,
            size,
        }
    }
}

impl FrameBuffer for MetalFrameBuffer {
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
        self.selection.set(DrawSelection::All);
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
        check_index("read attachment", index, self.color_attachment_count())
    }

    fn bind_for_draw_attachment_cube(&self, index: usize, face: u32, level: u32) -> Result<()> {
        check_index("cube draw attachment", index, self.color_attachment_count())?;
        let Some(texture) = self.color(index) else {
            return Ok(());
        };
        check_cube_target(texture.as_ref(), index, face, level)?;
        self.selection.set(DrawSelection::CubeFace { index, face, level });
        Ok(())
    }

    fn draw_selection(&self) -> DrawSelection {
        self.selection.get()
    }

    fn clear_attachment(&self, index: usize, value: i32) -> Result<()> {
        check_index("clear attachment", index, self.color_attachment_count())?;
        let Some(texture) = self.color(index) else {
            return Ok(());
        };
        let v = f64::from(value);
        let view = texture.target_view(0, 0);
        let mut encoder = self.device.encoder("Clear Attachment");
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Attachment Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color { r: v, g: v, b: v, a: v }),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        self.device.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    fn invalidate(&self) -> Result<()> {
        let spec = self.spec.borrow().clone();
        let parts = FrameBufferAttachments::partition(&spec)?;
        if let Some(volume) = parts.colors.iter().find(|c| c.ty == TextureType::Texture3D) {
            return Err(LumenError::UnsupportedFormat(format!(
                "{} 3D attachments cannot be rendered on Metal",
                volume.format
            )));
        }
        let create = |s| MetalTexture::new(Rc::clone(&self.device), s, None, None).map(Rc::new);
        let colors = parts.colors.iter().map(create).collect::<Result<Vec<_>>>()?;
        let depth = parts.depth.as_ref().map(create).transpose()?;

        for old in self.colors.borrow().iter().chain(self.depth.borrow().iter()) {
            old.release();
        }
        *self.colors.borrow_mut() = colors;
        *self.depth.borrow_mut() = depth;
        self.targets.set(parts.render_targets());
        self.selection.set(DrawSelection::All);
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
