//! Image decoding, encoding and texel conversion.
//!
//! Decoded images keep 8-bit channels for LDR files and 32-bit floats for
//! `.hdr`. [`pixel_data`] converts them into the host layout of a
//! [`TextureFormat`]; 16-bit float formats are stored as `half::f16`.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use half::f16;
use image::{ColorType, DynamicImage, ImageFormat};
use smallvec::SmallVec;

use crate::errors::{LumenError, Result};
use crate::renderer::texture::{
    ChannelKind, TextureFilter, TextureFormat, TextureSpecification, TextureType, TextureWrap,
};

/// Decoded pixel storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagePixels {
    U8(Vec<u8>),
    F32(Vec<f32>),
}

/// A decoded image, rows top-to-bottom unless flipped on load.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub pixels: ImagePixels,
}

impl DecodedImage {
    #[must_use]
    pub fn is_hdr(&self) -> bool {
        matches!(self.pixels, ImagePixels::F32(_))
    }
}

/// Decodes an image file. `.hdr` files decode to 32-bit float RGB, every
/// other extension to 8-bit channels.
pub fn load_image(path: impl AsRef<Path>, flip: bool) -> Result<DecodedImage> {
    let path = path.as_ref();
    let img = image::open(path)?;
    let img = if flip { img.flipv() } else { img };
    Ok(decode_dynamic(img, is_hdr_path(path)))
}

/// Decodes an in-memory encoded image.
pub fn load_image_from_memory(bytes: &[u8], flip: bool) -> Result<DecodedImage> {
    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;
    let img = if flip { img.flipv() } else { img };
    Ok(decode_dynamic(img, format == ImageFormat::Hdr))
}

fn decode_dynamic(img: DynamicImage, hdr: bool) -> DecodedImage {
    let (width, height) = (img.width(), img.height());
    if hdr || matches!(img.color(), ColorType::Rgb32F | ColorType::Rgba32F) {
        let rgb = img.into_rgb32f();
        return DecodedImage {
            width,
            height,
            channels: 3,
            pixels: ImagePixels::F32(rgb.into_raw()),
        };
    }
    let (channels, data) = match img.color().channel_count() {
        1 => (1, img.into_luma8().into_raw()),
        2 => (2, img.into_luma_alpha8().into_raw()),
        3 => (3, img.into_rgb8().into_raw()),
        _ => (4, img.into_rgba8().into_raw()),
    };
    DecodedImage {
        width,
        height,
        channels,
        pixels: ImagePixels::U8(data),
    }
}

fn is_hdr_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("hdr"))
}

/// Picks format, wrap, filter and mipmaps for a decoded image.
#[must_use]
pub fn deduce_specification(img: &DecodedImage) -> TextureSpecification {
    let (format, wrap) = match (img.is_hdr(), img.channels) {
        (true, 4) => (TextureFormat::Rgba16F, TextureWrap::ClampToEdge),
        (true, _) => (TextureFormat::Rgb16F, TextureWrap::ClampToEdge),
        (false, 1) => (TextureFormat::R8, TextureWrap::Repeat),
        (false, 2) => (TextureFormat::Rg8, TextureWrap::Repeat),
        (false, 3) => (TextureFormat::Rgb8, TextureWrap::Repeat),
        (false, _) => (TextureFormat::Rgba8, TextureWrap::Repeat),
    };
    TextureSpecification::new(TextureType::Texture2D, format)
        .with_size(img.width, img.height)
        .with_wrap(wrap)
        .with_filter(TextureFilter::linear())
        .with_mip_maps(true)
}

/// Converts decoded pixels into the host layout of `format`.
#[must_use]
pub fn pixel_data(img: &DecodedImage, format: TextureFormat) -> Vec<u8> {
    let channels = img.channels as usize;
    let target = format.channel_count() as usize;
    if let ImagePixels::U8(data) = &img.pixels
        && format.channel_kind() == ChannelKind::Unorm8
        && channels == target
    {
        return data.clone();
    }

    let pixel_count = (img.width * img.height) as usize;
    let mut out = Vec::with_capacity(pixel_count * format.bytes_per_pixel() as usize);
    for i in 0..pixel_count {
        let mut texel = [0.0, 0.0, 0.0, 1.0];
        for (c, value) in texel.iter_mut().enumerate().take(channels) {
            *value = match &img.pixels {
                ImagePixels::U8(data) => f32::from(data[i * channels + c]) / 255.0,
                ImagePixels::F32(data) => data[i * channels + c],
            };
        }
        out.extend_from_slice(&encode_texel(format, texel));
    }
    out
}

// ============================================================================
// Texel codec
// ============================================================================

const DEPTH24_MAX: f32 = 16_777_215.0;

/// Encodes an RGBA value into one texel of `format`. Missing channels are
/// dropped; depth formats read the first channel.
#[must_use]
pub fn encode_texel(format: TextureFormat, value: [f32; 4]) -> SmallVec<[u8; 16]> {
    let mut out = SmallVec::new();
    let channels = format.channel_count() as usize;
    for &v in value.iter().take(channels) {
        match format.channel_kind() {
            ChannelKind::Unorm8 => out.push((v.clamp(0.0, 1.0) * 255.0).round() as u8),
            ChannelKind::Uint8 => out.push(v.clamp(0.0, 255.0).round() as u8),
            ChannelKind::Float16 => out.extend_from_slice(&f16::from_f32(v).to_le_bytes()),
            ChannelKind::Float32 | ChannelKind::Depth32F => {
                out.extend_from_slice(&v.to_le_bytes());
            }
            ChannelKind::Depth16 => {
                out.extend_from_slice(&((v.clamp(0.0, 1.0) * 65535.0).round() as u16).to_le_bytes());
            }
            ChannelKind::Depth24 => {
                out.extend_from_slice(&((v.clamp(0.0, 1.0) * DEPTH24_MAX).round() as u32).to_le_bytes());
            }
            ChannelKind::Depth32 => {
                let d = f64::from(v.clamp(0.0, 1.0)) * f64::from(u32::MAX);
                out.extend_from_slice(&(d.round() as u32).to_le_bytes());
            }
        }
    }
    out
}

/// Decodes one texel into RGBA. Missing color channels read 0, alpha 1.
#[must_use]
pub fn decode_texel(format: TextureFormat, bytes: &[u8]) -> [f32; 4] {
    let mut out = [0.0, 0.0, 0.0, 1.0];
    let bpc = format.bytes_per_channel() as usize;
    for (c, value) in out.iter_mut().enumerate().take(format.channel_count() as usize) {
        let b = &bytes[c * bpc..(c + 1) * bpc];
        *value = match format.channel_kind() {
            ChannelKind::Unorm8 => f32::from(b[0]) / 255.0,
            ChannelKind::Uint8 => f32::from(b[0]),
            ChannelKind::Float16 => f16::from_le_bytes([b[0], b[1]]).to_f32(),
            ChannelKind::Float32 | ChannelKind::Depth32F => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            ChannelKind::Depth16 => f32::from(u16::from_le_bytes([b[0], b[1]])) / 65535.0,
            ChannelKind::Depth24 => {
                (u32::from_le_bytes([b[0], b[1], b[2], b[3]]) & 0x00FF_FFFF) as f32 / DEPTH24_MAX
            }
            ChannelKind::Depth32 => {
                (f64::from(u32::from_le_bytes([b[0], b[1], b[2], b[3]])) / f64::from(u32::MAX)) as f32
            }
        };
    }
    out
}

/// Adds an opaque alpha channel to 3-channel data of `format`.
#[must_use]
pub fn expand_rgb_to_rgba(data: &[u8], format: TextureFormat) -> Vec<u8> {
    let bpc = format.bytes_per_channel() as usize;
    let alpha = encode_texel(format.with_alpha(), [0.0, 0.0, 0.0, 1.0]);
    let alpha = &alpha[3 * bpc..4 * bpc];
    let mut out = Vec::with_capacity(data.len() / 3 * 4);
    for texel in data.chunks_exact(3 * bpc) {
        out.extend_from_slice(texel);
        out.extend_from_slice(alpha);
    }
    out
}

/// Drops the alpha channel of 4-channel data, the inverse of
/// [`expand_rgb_to_rgba`].
#[must_use]
pub fn shrink_rgba_to_rgb(data: &[u8], format: TextureFormat) -> Vec<u8> {
    let bpc = format.bytes_per_channel() as usize;
    let mut out = Vec::with_capacity(data.len() / 4 * 3);
    for texel in data.chunks_exact(4 * bpc) {
        out.extend_from_slice(&texel[..3 * bpc]);
    }
    out
}

/// Reverses row order in place.
pub fn flip_rows(data: &mut [u8], stride: usize) {
    if stride == 0 {
        return;
    }
    let rows = data.len() / stride;
    for row in 0..rows / 2 {
        let (top, bottom) = data.split_at_mut((rows - 1 - row) * stride);
        top[row * stride..(row + 1) * stride].swap_with_slice(&mut bottom[..stride]);
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Writes tightly packed pixels of `format` to `path`. The encoder follows
/// the extension: `.png`, `.jpg`/`.jpeg` (quality 100) or `.hdr`.
pub fn save_pixels(
    path: impl AsRef<Path>,
    width: u32,
    height: u32,
    format: TextureFormat,
    data: &[u8],
    flip: bool,
) -> Result<()> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let mut data = data.to_vec();
    if flip {
        flip_rows(&mut data, format.stride(width) as usize);
    }
    let texels: Vec<[f32; 4]> = data
        .chunks_exact(format.bytes_per_pixel() as usize)
        .map(|t| decode_texel(format, t))
        .collect();

    match extension.as_str() {
        "png" => {
            let (color, bytes) = ldr_bytes(format, &data, &texels, false);
            image::save_buffer_with_format(path, &bytes, width, height, color, ImageFormat::Png)?;
        }
        "jpg" | "jpeg" => {
            let (color, bytes) = ldr_bytes(format, &data, &texels, true);
            let file = BufWriter::new(File::create(path)?);
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, 100);
            encoder.encode(&bytes, width, height, color.into())?;
        }
        "hdr" => {
            let floats: Vec<f32> = texels.iter().flat_map(|t| [t[0], t[1], t[2]]).collect();
            let buffer = image::Rgb32FImage::from_raw(width, height, floats).ok_or_else(|| {
                LumenError::InvariantViolation(format!("pixel buffer too small for {width}x{height}"))
            })?;
            buffer.save_with_format(path, ImageFormat::Hdr)?;
        }
        other => {
            log::warn!("Unsupported image extension '{other}' for {}", path.display());
            return Err(LumenError::UnsupportedFormat(format!(
                "cannot encode '{}'",
                path.display()
            )));
        }
    }
    Ok(())
}

/// 8-bit view of the pixels for LDR encoders. JPEG has no alpha channel.
fn ldr_bytes(
    format: TextureFormat,
    raw: &[u8],
    texels: &[[f32; 4]],
    drop_alpha: bool,
) -> (ColorType, Vec<u8>) {
    let channels = match format.channel_count() {
        4 if drop_alpha => 3,
        2 if drop_alpha => 1,
        n => n,
    };
    let color = match channels {
        1 => ColorType::L8,
        2 => ColorType::La8,
        3 => ColorType::Rgb8,
        _ => ColorType::Rgba8,
    };
    if format.channel_kind() == ChannelKind::Unorm8 && channels == format.channel_count() {
        return (color, raw.to_vec());
    }
    let bytes = texels
        .iter()
        .flat_map(|t| {
            let encoded = encode_texel(TextureFormat::Rgba8, *t);
            let picked: SmallVec<[u8; 4]> = match channels {
                1 => encoded[..1].into(),
                2 => [encoded[0], encoded[3]].into_iter().collect(),
                3 => encoded[..3].into(),
                _ => encoded[..4].into(),
            };
            picked
        })
        .collect();
    (color, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_float_texel_round_trips() {
        let value = [0.5, 2.0, -1.25, 1.0];
        let bytes = encode_texel(TextureFormat::Rgba16F, value);
        assert_eq!(bytes.len(), 8);
        assert_eq!(decode_texel(TextureFormat::Rgba16F, &bytes), value);
    }

    #[test]
    fn rgb_expansion_appends_opaque_alpha() {
        let rgb = [10u8, 20, 30, 40, 50, 60];
        let rgba = expand_rgb_to_rgba(&rgb, TextureFormat::Rgb8);
        assert_eq!(rgba, [10, 20, 30, 255, 40, 50, 60, 255]);
        assert_eq!(shrink_rgba_to_rgb(&rgba, TextureFormat::Rgb8), rgb);

        let rgb16 = encode_texel(TextureFormat::Rgb16F, [1.0, 2.0, 3.0, 0.0]);
        let rgba16 = expand_rgb_to_rgba(&rgb16, TextureFormat::Rgb16F);
        assert_eq!(decode_texel(TextureFormat::Rgba16F, &rgba16), [1.0, 2.0, 3.0, 1.0]);
    }

    #[test]
    fn flip_rows_reverses_order() {
        let mut data = [1u8, 1, 2, 2, 3, 3];
        flip_rows(&mut data, 2);
        assert_eq!(data, [3, 3, 2, 2, 1, 1]);
    }

    #[test]
    fn depth24_ignores_stencil_byte() {
        let bytes = 0xAB00_0000u32 | 0x00FF_FFFF;
        let d = decode_texel(TextureFormat::Depth24Stencil8, &bytes.to_le_bytes());
        assert!((d[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn hdr_deduces_half_float_clamped() {
        let img = DecodedImage {
            width: 2,
            height: 1,
            channels: 3,
            pixels: ImagePixels::F32(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
        };
        let spec = deduce_specification(&img);
        assert_eq!(spec.format, TextureFormat::Rgb16F);
        assert_eq!(spec.wrap, TextureWrap::ClampToEdge);
        assert!(spec.mip_maps);
        assert_eq!(pixel_data(&img, spec.format).len(), 12);
    }
}
