//! Framebuffer Tests
//!
//! Tests for:
//! - Attachment partitioning (color/depth limits)
//! - Resize and invalidate
//! - Attachment selection and index checks
//! - Blits between framebuffers with nearest and linear filtering
//! - Saving an attachment and loading it back as a texture

use std::path::PathBuf;
use std::rc::Rc;

use lumen::errors::LumenError;
use lumen::renderer::api::{BackendContext, GraphicsApi, RenderTargetMask};
use lumen::renderer::backend::headless::{HeadlessFrameBuffer, HeadlessRendererApi};
use lumen::renderer::framebuffer::{self, BlitSpecification, DrawSelection, FrameBufferAttachments};
use lumen::renderer::texture::{Texture, Texture2D, TextureFilterMode, TextureFormat, TextureSpecification, TextureType};
use lumen::renderer::{FrameBuffer, FrameBufferSpecification, Renderer, RendererSettings};

const EPSILON: f32 = 2.0 / 255.0;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() <= EPSILON
}

fn headless() -> Renderer {
    Renderer::new(
        RendererSettings::default().with_api(GraphicsApi::Headless),
        BackendContext::Headless { width: 32, height: 32 },
    )
    .expect("headless renderer")
}

fn headless_fb(framebuffer: &Rc<dyn FrameBuffer>) -> &HeadlessFrameBuffer {
    framebuffer
        .as_any()
        .downcast_ref::<HeadlessFrameBuffer>()
        .expect("headless framebuffer")
}

fn color(format: TextureFormat) -> TextureSpecification {
    TextureSpecification::attachment(format)
}

fn scratch_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("lumen-{}-{name}", std::process::id()))
}

// ============================================================================
// Partitioning
// ============================================================================

#[test]
fn attachments_split_into_colors_and_one_depth() {
    let spec = FrameBufferSpecification::new(
        64,
        32,
        vec![
            color(TextureFormat::Rgba8),
            color(TextureFormat::Depth24Stencil8),
            color(TextureFormat::Rgba16F),
        ],
    );
    let parts = FrameBufferAttachments::partition(&spec).expect("valid attachments");
    assert_eq!(parts.colors.len() + usize::from(parts.depth.is_some()), spec.attachments.len());
    assert_eq!(parts.colors.len(), 2);
    assert!(parts.colors.iter().all(|c| (c.width, c.height) == (64, 32)));
    assert_eq!(
        parts.render_targets(),
        RenderTargetMask::COLOR | RenderTargetMask::DEPTH | RenderTargetMask::STENCIL
    );
}

#[test]
fn second_depth_attachment_is_rejected() {
    let spec = FrameBufferSpecification::new(
        8,
        8,
        vec![color(TextureFormat::Depth24), color(TextureFormat::Depth32F)],
    );
    assert!(matches!(
        FrameBufferAttachments::partition(&spec),
        Err(LumenError::InvariantViolation(_))
    ));
}

#[test]
fn fifth_color_attachment_is_rejected() {
    let spec = FrameBufferSpecification::new(8, 8, vec![color(TextureFormat::Rgba8); 5]);
    assert!(FrameBufferAttachments::partition(&spec).is_err());
    let four = FrameBufferSpecification::new(8, 8, vec![color(TextureFormat::Rgba8); 4]);
    assert_eq!(FrameBufferAttachments::partition(&four).map(|p| p.colors.len()).ok(), Some(4));
}

#[test]
fn depth_only_framebuffer_has_no_colors() {
    let renderer = headless();
    let fb = renderer
        .api()
        .create_framebuffer(&FrameBufferSpecification::new(16, 16, vec![color(TextureFormat::Depth16)]))
        .expect("framebuffer");
    assert_eq!(fb.color_attachment_count(), 0);
    assert!(fb.depth_attachment().is_some());
    assert_eq!(fb.render_targets(), RenderTargetMask::DEPTH);
}

// ============================================================================
// Resize and selection
// ============================================================================

#[test]
fn resize_reallocates_every_color_attachment() {
    let renderer = headless();
    let fb = renderer
        .api()
        .create_framebuffer(&FrameBufferSpecification::new(
            10,
            10,
            vec![color(TextureFormat::Rgba8), color(TextureFormat::R8UI), color(TextureFormat::Depth24)],
        ))
        .expect("framebuffer");
    fb.resize(40, 24).expect("resize");
    for i in 0..fb.color_attachment_count() {
        let texture = fb.attachment(i).expect("attachment");
        assert_eq!((texture.specification().width, texture.specification().height), (40, 24));
    }
    let depth = fb.depth_attachment().expect("depth");
    assert_eq!((depth.specification().width, depth.specification().height), (40, 24));
}

#[test]
fn out_of_range_attachment_is_an_error() {
    let renderer = headless();
    let fb = renderer
        .api()
        .create_framebuffer(&FrameBufferSpecification::new(4, 4, vec![color(TextureFormat::Rgba8)]))
        .expect("framebuffer");
    assert!(matches!(
        fb.bind_for_draw_attachment(1),
        Err(LumenError::IndexOutOfBounds { index: 1, len: 1, .. })
    ));
    assert!(fb.bind_for_read_attachment(3).is_err());
    assert!(fb.clear_attachment(2, 0).is_err());
    assert!(fb.save_attachment(5, &scratch_file("never.png")).is_err());
}

#[test]
fn cube_face_selection_requires_a_cube() {
    let renderer = headless();
    let flat = renderer
        .api()
        .create_framebuffer(&FrameBufferSpecification::new(4, 4, vec![color(TextureFormat::Rgba8)]))
        .expect("framebuffer");
    assert!(flat.bind_for_draw_attachment_cube(0, 0, 0).is_err());

    let cube = renderer
        .api()
        .create_framebuffer(&FrameBufferSpecification::new(
            4,
            4,
            vec![color(TextureFormat::Rgba8).with_type(TextureType::TextureCube)],
        ))
        .expect("framebuffer");
    cube.bind_for_draw_attachment_cube(0, 3, 0).expect("face 3");
    assert_eq!(
        cube.draw_selection(),
        DrawSelection::CubeFace {
            index: 0,
            face: 3,
            level: 0
        }
    );
    assert!(cube.bind_for_draw_attachment_cube(0, 6, 0).is_err());
}

#[test]
fn integer_attachment_clears_to_value() {
    let renderer = headless();
    let fb = renderer
        .api()
        .create_framebuffer(&FrameBufferSpecification::new(
            3,
            2,
            vec![color(TextureFormat::Rgba8), color(TextureFormat::R8UI)],
        ))
        .expect("framebuffer");
    fb.clear_attachment(1, 7).expect("clear");
    let ids = headless_fb(&fb).color(1).expect("id buffer");
    assert!(approx_eq(ids.fetch(2, 1, 0, 0)[0], 7.0));
}

// ============================================================================
// Blit
// ============================================================================

#[test]
fn linear_blit_downsamples_into_destination_index() {
    let renderer = headless();
    let api = renderer.api();
    let src = api
        .create_framebuffer(&FrameBufferSpecification::new(800, 600, vec![color(TextureFormat::Rgba8)]))
        .expect("source");
    let dst = api
        .create_framebuffer(&FrameBufferSpecification::new(
            400,
            300,
            vec![color(TextureFormat::Rgba8), color(TextureFormat::Rgba8)],
        ))
        .expect("destination");

    let source = headless_fb(&src).color(0).expect("source color");
    for y in 0..600 {
        for x in 0..800 {
            source.store(x, y, 0, 0, [x as f32 / 799.0, y as f32 / 599.0, 0.5, 1.0]);
        }
    }

    let spec = BlitSpecification {
        filter: TextureFilterMode::Linear,
        targets: RenderTargetMask::COLOR,
        src_index: 0,
        dst_index: 1,
    };
    framebuffer::blit(api.as_ref(), src.as_ref(), dst.as_ref(), &spec).expect("blit");

    let target = headless_fb(&dst).color(1).expect("destination color");
    let expected = source.sample(0.5, 0.5, 0, TextureFilterMode::Linear);
    let actual = target.sample(0.5, 0.5, 0, TextureFilterMode::Linear);
    for c in 0..4 {
        assert!(
            approx_eq(actual[c], expected[c]),
            "channel {c}: {} vs {}",
            actual[c],
            expected[c]
        );
    }
    let untouched = headless_fb(&dst).color(0).expect("attachment 0");
    assert_eq!(untouched.fetch(200, 150, 0, 0), [0.0; 4], "attachment 0 is not written");
}

#[test]
fn blit_checks_attachment_indices() {
    let renderer = headless();
    let api = renderer.api();
    let a = api
        .create_framebuffer(&FrameBufferSpecification::new(4, 4, vec![color(TextureFormat::Rgba8)]))
        .expect("framebuffer");
    let b = api
        .create_framebuffer(&FrameBufferSpecification::new(4, 4, vec![color(TextureFormat::Rgba8)]))
        .expect("framebuffer");
    let spec = BlitSpecification {
        dst_index: 1,
        ..BlitSpecification::default()
    };
    assert!(matches!(
        framebuffer::blit(api.as_ref(), a.as_ref(), b.as_ref(), &spec),
        Err(LumenError::IndexOutOfBounds { .. })
    ));
}

#[test]
fn nearest_blit_copies_same_size_exactly() {
    let renderer = headless();
    let api = renderer.api();
    let spec = FrameBufferSpecification::new(4, 4, vec![color(TextureFormat::Rgba8)]);
    let a = api.create_framebuffer(&spec).expect("framebuffer");
    let b = api.create_framebuffer(&spec).expect("framebuffer");
    headless_fb(&a).color(0).expect("color").store(1, 2, 0, 0, [1.0, 0.0, 0.0, 1.0]);
    let blit = BlitSpecification {
        filter: TextureFilterMode::Nearest,
        ..BlitSpecification::default()
    };
    framebuffer::blit(api.as_ref(), a.as_ref(), b.as_ref(), &blit).expect("blit");
    assert_eq!(
        a.attachment(0).expect("a").read_pixels(0).expect("read a"),
        b.attachment(0).expect("b").read_pixels(0).expect("read b")
    );
}

// ============================================================================
// Save and reload
// ============================================================================

#[test]
fn saved_attachment_reloads_byte_for_byte() -> anyhow::Result<()> {
    let renderer = headless();
    let api = renderer.api();
    let fb = api.create_framebuffer(&FrameBufferSpecification::new(5, 3, vec![color(TextureFormat::Rgba8)]))?;
    let attachment = headless_fb(&fb).color(0).expect("color");
    for y in 0..3 {
        for x in 0..5 {
            attachment.store(x, y, 0, 0, [x as f32 / 4.0, y as f32 / 2.0, 0.25, 1.0]);
        }
    }
    let original = attachment.level_data(0);

    let path = scratch_file("roundtrip.png");
    fb.save_attachment(0, &path)?;
    let reloaded = Texture2D::from_file(api.as_ref(), &path, true);
    std::fs::remove_file(&path)?;

    assert_eq!(reloaded.specification().format, TextureFormat::Rgba8);
    assert_eq!((reloaded.specification().width, reloaded.specification().height), (5, 3));
    assert_eq!(reloaded.read_pixels(0)?, original, "bottom row stays first after the round trip");
    Ok(())
}

#[test]
fn default_framebuffer_is_rgba8() {
    let api = HeadlessRendererApi::new(2, 2).expect("device");
    assert_eq!(api.screen().specification().format, TextureFormat::Rgba8);
}
