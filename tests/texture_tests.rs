//! Texture Tests
//!
//! Tests for:
//! - TextureSpecification equality, hashing and normalization
//! - Mip chain sizes
//! - Texture creation, upload and readback on the headless backend
//! - Load failures falling back to the white texture

use std::collections::HashSet;
use std::hash::{BuildHasher, RandomState};

use lumen::renderer::api::{BackendContext, GraphicsApi};
use lumen::renderer::backend::headless::HeadlessTexture;
use lumen::renderer::texture::{
    Texture2D, TextureCube, TextureFilter, TextureFilterMode, TextureFormat, TextureSpecification, TextureType,
    TextureWrap,
};
use lumen::renderer::{Renderer, RendererSettings};

const EPSILON: f32 = 1.0 / 255.0;

fn approx_eq(a: f32, b: f32) -> bool {
    (a - b).abs() <= EPSILON
}

fn headless() -> Renderer {
    Renderer::new(
        RendererSettings::default().with_api(GraphicsApi::Headless),
        BackendContext::Headless { width: 8, height: 8 },
    )
    .expect("headless renderer")
}

// ============================================================================
// Specification
// ============================================================================

#[test]
fn equal_specifications_hash_equally() {
    let state = RandomState::new();
    let a = TextureSpecification::new(TextureType::Texture2D, TextureFormat::Rgba16F)
        .with_size(512, 256)
        .with_filter(TextureFilter::linear())
        .with_mip_maps(true);
    let b = TextureSpecification::new(TextureType::Texture2D, TextureFormat::Rgba16F)
        .with_mip_maps(true)
        .with_filter(TextureFilter::linear())
        .with_size(512, 256);
    assert_eq!(a, b);
    assert_eq!(state.hash_one(a), state.hash_one(b));
}

#[test]
fn distinct_specifications_are_distinct_keys() {
    let base = TextureSpecification::attachment(TextureFormat::Rgba8).with_size(4, 4);
    let variants = [
        base,
        base.with_size(8, 4),
        base.with_type(TextureType::TextureCube),
        base.with_wrap(TextureWrap::Repeat),
        base.with_filter(TextureFilter::nearest()),
        TextureSpecification::attachment(TextureFormat::Rgb8).with_size(4, 4),
    ];
    let set: HashSet<TextureSpecification> = variants.into_iter().collect();
    assert_eq!(set.len(), variants.len());
}

#[test]
fn normalization_is_idempotent() {
    let spec = TextureSpecification::attachment(TextureFormat::Depth24).with_size(0, 0);
    let once = spec.normalized();
    assert_eq!(once, once.normalized());
    assert_eq!((once.width, once.height), (1, 1));
    assert_eq!(once.filter.mag, TextureFilterMode::Nearest);
}

#[test]
fn mip_chain_halves_to_one_texel() {
    let spec = TextureSpecification::default().with_size(100, 30).with_mip_maps(true);
    assert_eq!(spec.mip_level_count(), 7);
    assert_eq!(spec.level_size(1), (50, 15));
    assert_eq!(spec.level_size(6), (1, 1));
}

#[test]
fn cube_level_size_counts_all_faces() {
    let spec = TextureSpecification::new(TextureType::TextureCube, TextureFormat::Rgba8).with_size(4, 4);
    assert_eq!(spec.level_byte_size(0), 4 * 4 * 4 * 6);
}

#[test]
fn multisample_without_samples_is_rejected() {
    let spec = TextureSpecification::new(TextureType::Texture2DMultisample, TextureFormat::Rgba8);
    assert!(spec.normalized().validate().is_err());
}

// ============================================================================
// Headless textures
// ============================================================================

#[test]
fn uploaded_pixels_read_back_unchanged() {
    let renderer = headless();
    let spec = TextureSpecification::attachment(TextureFormat::Rgba8).with_size(2, 2);
    let data: Vec<u8> = (0..16).map(|i| i * 10).collect();
    let texture = Texture2D::from_data(renderer.api().as_ref(), &data, &spec).expect("texture");
    assert!(texture.is_loaded());
    assert_eq!(texture.read_pixels(0).expect("readback"), data);
}

#[test]
fn short_upload_is_an_error() {
    let renderer = headless();
    let spec = TextureSpecification::attachment(TextureFormat::Rgba8).with_size(4, 4);
    assert!(Texture2D::from_data(renderer.api().as_ref(), &[0; 8], &spec).is_err());
}

#[test]
fn texture_ids_are_unique() {
    let renderer = headless();
    let spec = TextureSpecification::attachment(TextureFormat::Rgba8);
    let a = Texture2D::create(renderer.api().as_ref(), &spec).expect("texture");
    let b = Texture2D::create(renderer.api().as_ref(), &spec).expect("texture");
    assert_ne!(a.id(), b.id());
}

#[test]
fn mipmaps_average_the_level_above() {
    let renderer = headless();
    let spec = TextureSpecification::attachment(TextureFormat::Rgba8)
        .with_size(2, 2)
        .with_mip_maps(true);
    let data = [
        255, 0, 0, 255, //
        0, 0, 0, 255, //
        255, 0, 0, 255, //
        0, 0, 0, 255,
    ];
    let texture = Texture2D::from_data(renderer.api().as_ref(), &data, &spec).expect("texture");
    let headless = texture.as_any().downcast_ref::<HeadlessTexture>().expect("headless texture");
    let [r, g, _, a] = headless.fetch(0, 0, 0, 1);
    assert!(approx_eq(r, 0.5), "red averages to half, got {r}");
    assert!(approx_eq(g, 0.0));
    assert!(approx_eq(a, 1.0));
}

#[test]
fn missing_file_falls_back_to_white() {
    let renderer = headless();
    let texture = Texture2D::from_file(renderer.api().as_ref(), "does/not/exist.png", true);
    assert!(texture.is_loaded());
    assert_eq!((texture.specification().width, texture.specification().height), (1, 1));
    assert_eq!(texture.read_pixels(0).expect("readback"), [255, 255, 255, 255]);
}

#[test]
fn cube_textures_are_square() {
    let renderer = headless();
    let cube = TextureCube::create(renderer.api().as_ref(), 16, TextureFormat::Rgb16F, true).expect("cube");
    let spec = cube.specification();
    assert_eq!(spec.ty, TextureType::TextureCube);
    assert_eq!(spec.layers(), 6);
    assert_eq!(spec.mip_level_count(), 5);
}
