//! Engine enums to wgpu descriptors.
//!
//! Three-channel color formats have no wgpu counterpart; they are stored
//! with an opaque alpha channel and shrunk again on readback.

use crate::errors::{LumenError, Result};
use crate::renderer::api::{DepthFunction, FaceCulling, Primitive};
use crate::renderer::layout::DataType;
use crate::renderer::texture::{TextureFilterMode, TextureFormat, TextureType, TextureWrap};

pub fn texture_format(format: TextureFormat) -> Result<wgpu::TextureFormat> {
    use wgpu::TextureFormat as W;
    Ok(match format {
        TextureFormat::None => {
            return Err(LumenError::UnsupportedFormat("texture format None".into()));
        }
        TextureFormat::R8 => W::R8Unorm,
        TextureFormat::Rg8 => W::Rg8Unorm,
        TextureFormat::Rgb8 | TextureFormat::Rgba8 => W::Rgba8Unorm,
        TextureFormat::R16F => W::R16Float,
        TextureFormat::Rg16F => W::Rg16Float,
        TextureFormat::Rgb16F | TextureFormat::Rgba16F => W::Rgba16Float,
        TextureFormat::R32F => W::R32Float,
        TextureFormat::Rg32F => W::Rg32Float,
        TextureFormat::Rgb32F | TextureFormat::Rgba32F => W::Rgba32Float,
        TextureFormat::R8UI => W::R8Uint,
        TextureFormat::Rg8UI => W::Rg8Uint,
        TextureFormat::Rgb8UI | TextureFormat::Rgba8UI => W::Rgba8Uint,
        TextureFormat::Depth16 => W::Depth16Unorm,
        // Stored as float so the plane stays copyable.
        TextureFormat::Depth24 | TextureFormat::Depth32 | TextureFormat::Depth32F => W::Depth32Float,
        TextureFormat::Depth24Stencil8 => W::Depth24PlusStencil8,
    })
}

/// Host layout of the data the GPU texture actually holds.
#[must_use]
pub const fn device_format(format: TextureFormat) -> TextureFormat {
    match format {
        TextureFormat::Depth24 | TextureFormat::Depth32 => TextureFormat::Depth32F,
        other => other.with_alpha(),
    }
}

/// True when uploads and readbacks go through an RGB/RGBA conversion.
#[must_use]
pub const fn needs_alpha_expansion(format: TextureFormat) -> bool {
    format.channel_count() == 3
}

#[must_use]
pub const fn dimension(ty: TextureType) -> wgpu::TextureDimension {
    match ty {
        TextureType::Texture3D => wgpu::TextureDimension::D3,
        // 1D textures are one-row 2D textures.
        _ => wgpu::TextureDimension::D2,
    }
}

#[must_use]
pub const fn view_dimension(ty: TextureType) -> wgpu::TextureViewDimension {
    match ty {
        TextureType::Texture3D => wgpu::TextureViewDimension::D3,
        TextureType::TextureCube => wgpu::TextureViewDimension::Cube,
        _ => wgpu::TextureViewDimension::D2,
    }
}

#[must_use]
pub const fn filter(mode: TextureFilterMode) -> wgpu::FilterMode {
    match mode {
        TextureFilterMode::Linear => wgpu::FilterMode::Linear,
        TextureFilterMode::None | TextureFilterMode::Nearest => wgpu::FilterMode::Nearest,
    }
}

#[must_use]
pub const fn mip_filter(mode: TextureFilterMode) -> wgpu::MipmapFilterMode {
    match mode {
        TextureFilterMode::Linear => wgpu::MipmapFilterMode::Linear,
        TextureFilterMode::None | TextureFilterMode::Nearest => wgpu::MipmapFilterMode::Nearest,
    }
}

/// Border clamping needs a device feature; without it edges clamp.
#[must_use]
pub const fn address_mode(wrap: TextureWrap, border: bool) -> wgpu::AddressMode {
    match wrap {
        TextureWrap::Repeat => wgpu::AddressMode::Repeat,
        TextureWrap::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        TextureWrap::ClampToBorder if border => wgpu::AddressMode::ClampToBorder,
        TextureWrap::None | TextureWrap::ClampToEdge | TextureWrap::ClampToBorder => {
            wgpu::AddressMode::ClampToEdge
        }
    }
}

#[must_use]
pub const fn compare_function(function: DepthFunction) -> wgpu::CompareFunction {
    match function {
        DepthFunction::Always => wgpu::CompareFunction::Always,
        DepthFunction::Never => wgpu::CompareFunction::Never,
        DepthFunction::Less => wgpu::CompareFunction::Less,
        DepthFunction::Equal => wgpu::CompareFunction::Equal,
        DepthFunction::LEqual => wgpu::CompareFunction::LessEqual,
        DepthFunction::Greater => wgpu::CompareFunction::Greater,
        DepthFunction::NotEqual => wgpu::CompareFunction::NotEqual,
        DepthFunction::GEqual => wgpu::CompareFunction::GreaterEqual,
    }
}

#[must_use]
pub const fn topology(primitive: Primitive) -> wgpu::PrimitiveTopology {
    match primitive {
        Primitive::Point => wgpu::PrimitiveTopology::PointList,
        Primitive::Line => wgpu::PrimitiveTopology::LineList,
        Primitive::LineStrip => wgpu::PrimitiveTopology::LineStrip,
        Primitive::Triangle => wgpu::PrimitiveTopology::TriangleList,
        Primitive::TriangleStrip => wgpu::PrimitiveTopology::TriangleStrip,
    }
}

#[must_use]
pub const fn strip_index_format(primitive: Primitive) -> Option<wgpu::IndexFormat> {
    match primitive {
        Primitive::LineStrip | Primitive::TriangleStrip => Some(wgpu::IndexFormat::Uint32),
        _ => None,
    }
}

/// `FrontAndBack` culls everything; the caller skips such draws.
#[must_use]
pub const fn cull_mode(mode: FaceCulling) -> Option<wgpu::Face> {
    match mode {
        FaceCulling::Front => Some(wgpu::Face::Front),
        FaceCulling::Back => Some(wgpu::Face::Back),
        FaceCulling::None | FaceCulling::FrontAndBack => None,
    }
}

/// Vertex format of one attribute column. Matrices occupy one location per
/// column.
#[must_use]
pub const fn vertex_format(ty: DataType) -> Option<wgpu::VertexFormat> {
    Some(match ty {
        DataType::None => return None,
        DataType::Bool | DataType::Int => wgpu::VertexFormat::Sint32,
        DataType::Float => wgpu::VertexFormat::Float32,
        DataType::Vec2 | DataType::Mat2 => wgpu::VertexFormat::Float32x2,
        DataType::Vec3 | DataType::Mat3 => wgpu::VertexFormat::Float32x3,
        DataType::Vec4 | DataType::Mat4 => wgpu::VertexFormat::Float32x4,
    })
}

/// Maps a cube face index to its array layer. With swapped `Y` views the
/// `+Y` and `-Y` faces trade layers, so the same view renders into the same
/// layer as on OpenGL.
#[must_use]
pub const fn cube_layer(face: u32, swap_cube_y: bool) -> u32 {
    match face {
        2 if swap_cube_y => 3,
        3 if swap_cube_y => 2,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_formats_gain_alpha() {
        assert_eq!(texture_format(TextureFormat::Rgb16F).unwrap(), wgpu::TextureFormat::Rgba16Float);
        assert_eq!(device_format(TextureFormat::Rgb8), TextureFormat::Rgba8);
        assert!(needs_alpha_expansion(TextureFormat::Rgb32F));
        assert!(!needs_alpha_expansion(TextureFormat::Rgba8));
    }

    #[test]
    fn integer_depth_formats_store_float() {
        assert_eq!(texture_format(TextureFormat::Depth24).unwrap(), wgpu::TextureFormat::Depth32Float);
        assert_eq!(device_format(TextureFormat::Depth32), TextureFormat::Depth32F);
        assert_eq!(device_format(TextureFormat::Depth16), TextureFormat::Depth16);
    }

    #[test]
    fn border_needs_feature() {
        assert_eq!(address_mode(TextureWrap::ClampToBorder, true), wgpu::AddressMode::ClampToBorder);
        assert_eq!(address_mode(TextureWrap::ClampToBorder, false), wgpu::AddressMode::ClampToEdge);
    }

    #[test]
    fn swapped_cube_faces() {
        assert_eq!(cube_layer(2, true), 3);
        assert_eq!(cube_layer(3, true), 2);
        assert_eq!(cube_layer(2, false), 2);
        assert_eq!(cube_layer(5, true), 5);
    }

    #[test]
    fn matrices_split_into_columns() {
        assert_eq!(vertex_format(DataType::Mat3), Some(wgpu::VertexFormat::Float32x3));
        assert_eq!(DataType::Mat3.columns(), 3);
        assert_eq!(vertex_format(DataType::None), None);
    }
}
