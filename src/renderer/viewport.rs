//! The off-screen buffer a scene renders into before it reaches the window.
//!
//! The viewport keeps a logical size (the window's) and a render scale.
//! The screen buffer is allocated at `logical * scale`, so scales above 1
//! supersample and scales below 1 subsample; the final composite stretches
//! it back over the logical size with linear filtering.

use std::cell::Cell;
use std::rc::Rc;

use glam::Mat4;

use crate::errors::Result;
use crate::renderer::api::{Primitive, RenderTargetMask};
use crate::renderer::framebuffer::{FrameBuffer, FrameBufferSpecification};
use crate::renderer::renderer::Renderer;
use crate::renderer::texture::{TextureFilter, TextureFormat, TextureSpecification};
use crate::resources::material::{Material, ViewportMaterial};

pub struct Viewport {
    framebuffer: Rc<dyn FrameBuffer>,
    material: ViewportMaterial,
    logical: Cell<(u32, u32)>,
    scale: Cell<f32>,
}

fn scaled(size: (u32, u32), scale: f32) -> (u32, u32) {
    let apply = |v: u32| ((v as f32 * scale).round() as u32).max(1);
    (apply(size.0), apply(size.1))
}

impl Viewport {
    /// A `width` x `height` viewport at scale 1.
    pub fn new(renderer: &Renderer, width: u32, height: u32) -> Result<Self> {
        let spec = FrameBufferSpecification::new(
            width.max(1),
            height.max(1),
            vec![
                TextureSpecification::attachment(TextureFormat::Rgba8).with_filter(TextureFilter::linear()),
                TextureSpecification::attachment(TextureFormat::Depth16),
            ],
        );
        let framebuffer = renderer.api().create_framebuffer(&spec)?;
        Ok(Self {
            framebuffer,
            material: ViewportMaterial::new(renderer)?,
            logical: Cell::new((width, height)),
            scale: Cell::new(1.0),
        })
    }

    #[must_use]
    pub fn framebuffer(&self) -> &Rc<dyn FrameBuffer> {
        &self.framebuffer
    }

    /// Logical size, independent of the render scale.
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        self.logical.get()
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale.get()
    }

    /// Size of the screen buffer in texels.
    #[must_use]
    pub fn buffer_size(&self) -> (u32, u32) {
        scaled(self.logical.get(), self.scale.get())
    }

    /// Reallocates the screen buffer at `logical * factor`.
    pub fn rescale(&self, factor: f32) -> Result<()> {
        if !(factor.is_finite() && factor > 0.0) {
            log::warn!("Viewport scale {factor} ignored; it must be positive");
            return Ok(());
        }
        self.scale.set(factor);
        let (w, h) = self.buffer_size();
        self.framebuffer.resize(w, h)
    }

    /// Changes the logical size, keeping the current scale.
    pub fn resize(&self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            log::warn!("Viewport resize to {width}x{height} ignored");
            return Ok(());
        }
        self.logical.set((width, height));
        let (w, h) = self.buffer_size();
        self.framebuffer.resize(w, h)
    }

    /// Stretches the screen buffer over the whole default framebuffer.
    pub fn render_to_screen(&self, renderer: &Renderer) -> Result<()> {
        let api = renderer.api();
        api.begin_render_pass(None);
        let (w, h) = api.screen_size();
        api.set_viewport(0, 0, w, h);
        api.clear_targets(RenderTargetMask::COLOR);
        let outcome = self.composite(renderer, &self.material);
        api.end_render_pass();
        outcome
    }

    /// Runs `material` over a fullscreen quad into `target`, with the screen
    /// buffer bound as `u_ScreenTexture` when the material is a
    /// [`ViewportMaterial`].
    pub fn render_to_framebuffer(
        &self,
        renderer: &Renderer,
        target: &Rc<dyn FrameBuffer>,
        material: &dyn Material,
    ) -> Result<()> {
        let api = renderer.api();
        api.begin_render_pass(Some(Rc::clone(target)));
        let spec = target.specification();
        api.set_viewport(0, 0, spec.width, spec.height);
        api.clear();
        if let Some(viewport) = material.downcast_ref::<ViewportMaterial>()
            && let Some(color) = self.framebuffer.attachment(0)
        {
            viewport.set_screen_texture(color);
        }
        let outcome = self.draw_quad(renderer, material);
        api.end_render_pass();
        outcome
    }

    fn composite(&self, renderer: &Renderer, material: &ViewportMaterial) -> Result<()> {
        if let Some(color) = self.framebuffer.attachment(0) {
            material.set_screen_texture(color);
        }
        self.draw_quad(renderer, material)
    }

    fn draw_quad(&self, renderer: &Renderer, material: &dyn Material) -> Result<()> {
        let quad = renderer.fullscreen_quad()?;
        let api = renderer.api();
        let depth = api.state();
        api.enable_depth_testing(false);
        renderer.draw(quad.as_ref(), material, Mat4::IDENTITY, Primitive::Triangle);
        api.enable_depth_testing(depth.depth_test);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaled_size_never_collapses() {
        assert_eq!(scaled((800, 600), 0.5), (400, 300));
        assert_eq!(scaled((800, 600), 2.0), (1600, 1200));
        assert_eq!(scaled((1, 1), 0.25), (1, 1));
    }
}
