//! Exhaustive mappings from engine enums to OpenGL enums.

use crate::renderer::api::{DepthFunction, Primitive};
use crate::renderer::layout::DataType;
use crate::renderer::texture::{TextureFilterMode, TextureFormat, TextureType, TextureWrap};

pub fn texture_target(ty: TextureType) -> u32 {
    match ty {
        // 1D textures are stored as one-row 2D textures.
        TextureType::None | TextureType::Texture1D | TextureType::Texture2D => glow::TEXTURE_2D,
        TextureType::Texture2DMultisample => glow::TEXTURE_2D_MULTISAMPLE,
        TextureType::Texture3D => glow::TEXTURE_3D,
        TextureType::TextureCube => glow::TEXTURE_CUBE_MAP,
    }
}

pub fn internal_format(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::None | TextureFormat::Rgba8 => glow::RGBA8,
        TextureFormat::R8 => glow::R8,
        TextureFormat::Rg8 => glow::RG8,
        TextureFormat::Rgb8 => glow::RGB8,
        TextureFormat::R16F => glow::R16F,
        TextureFormat::Rg16F => glow::RG16F,
        TextureFormat::Rgb16F => glow::RGB16F,
        TextureFormat::Rgba16F => glow::RGBA16F,
        TextureFormat::R32F => glow::R32F,
        TextureFormat::Rg32F => glow::RG32F,
        TextureFormat::Rgb32F => glow::RGB32F,
        TextureFormat::Rgba32F => glow::RGBA32F,
        TextureFormat::R8UI => glow::R8UI,
        TextureFormat::Rg8UI => glow::RG8UI,
        TextureFormat::Rgb8UI => glow::RGB8UI,
        TextureFormat::Rgba8UI => glow::RGBA8UI,
        TextureFormat::Depth16 => glow::DEPTH_COMPONENT16,
        TextureFormat::Depth24 => glow::DEPTH_COMPONENT24,
        TextureFormat::Depth32 => glow::DEPTH_COMPONENT32,
        TextureFormat::Depth32F => glow::DEPTH_COMPONENT32F,
        TextureFormat::Depth24Stencil8 => glow::DEPTH24_STENCIL8,
    }
}

/// Client-side pixel format of uploads and readbacks.
pub fn base_format(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::R8 | TextureFormat::R16F | TextureFormat::R32F => glow::RED,
        TextureFormat::Rg8 | TextureFormat::Rg16F | TextureFormat::Rg32F => glow::RG,
        TextureFormat::Rgb8 | TextureFormat::Rgb16F | TextureFormat::Rgb32F => glow::RGB,
        TextureFormat::None | TextureFormat::Rgba8 | TextureFormat::Rgba16F | TextureFormat::Rgba32F => {
            glow::RGBA
        }
        TextureFormat::R8UI => glow::RED_INTEGER,
        TextureFormat::Rg8UI => glow::RG_INTEGER,
        TextureFormat::Rgb8UI => glow::RGB_INTEGER,
        TextureFormat::Rgba8UI => glow::RGBA_INTEGER,
        TextureFormat::Depth16 | TextureFormat::Depth24 | TextureFormat::Depth32 | TextureFormat::Depth32F => {
            glow::DEPTH_COMPONENT
        }
        TextureFormat::Depth24Stencil8 => glow::DEPTH_STENCIL,
    }
}

/// Client-side component type of uploads and readbacks.
pub fn pixel_type(format: TextureFormat) -> u32 {
    match format {
        TextureFormat::None
        | TextureFormat::R8
        | TextureFormat::Rg8
        | TextureFormat::Rgb8
        | TextureFormat::Rgba8
        | TextureFormat::R8UI
        | TextureFormat::Rg8UI
        | TextureFormat::Rgb8UI
        | TextureFormat::Rgba8UI => glow::UNSIGNED_BYTE,
        TextureFormat::R16F | TextureFormat::Rg16F | TextureFormat::Rgb16F | TextureFormat::Rgba16F => {
            glow::HALF_FLOAT
        }
        TextureFormat::R32F
        | TextureFormat::Rg32F
        | TextureFormat::Rgb32F
        | TextureFormat::Rgba32F
        | TextureFormat::Depth32F => glow::FLOAT,
        TextureFormat::Depth16 => glow::UNSIGNED_SHORT,
        TextureFormat::Depth24 | TextureFormat::Depth32 => glow::UNSIGNED_INT,
        TextureFormat::Depth24Stencil8 => glow::UNSIGNED_INT_24_8,
    }
}

pub fn filter(mode: TextureFilterMode) -> u32 {
    match mode {
        TextureFilterMode::None | TextureFilterMode::Linear => glow::LINEAR,
        TextureFilterMode::Nearest => glow::NEAREST,
    }
}

/// Minification filter combined with the mip filter.
pub fn min_filter(min: TextureFilterMode, mip: TextureFilterMode, mip_maps: bool) -> u32 {
    if !mip_maps {
        return filter(min);
    }
    match (min, mip) {
        (TextureFilterMode::Nearest, TextureFilterMode::Nearest) => glow::NEAREST_MIPMAP_NEAREST,
        (TextureFilterMode::Nearest, _) => glow::NEAREST_MIPMAP_LINEAR,
        (_, TextureFilterMode::Nearest) => glow::LINEAR_MIPMAP_NEAREST,
        _ => glow::LINEAR_MIPMAP_LINEAR,
    }
}

pub fn wrap(mode: TextureWrap) -> u32 {
    match mode {
        TextureWrap::None | TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
        TextureWrap::Repeat => glow::REPEAT,
        TextureWrap::MirroredRepeat => glow::MIRRORED_REPEAT,
        TextureWrap::ClampToBorder => glow::CLAMP_TO_BORDER,
    }
}

pub fn depth_function(function: DepthFunction) -> u32 {
    match function {
        DepthFunction::Always => glow::ALWAYS,
        DepthFunction::Never => glow::NEVER,
        DepthFunction::Less => glow::LESS,
        DepthFunction::Equal => glow::EQUAL,
        DepthFunction::LEqual => glow::LEQUAL,
        DepthFunction::Greater => glow::GREATER,
        DepthFunction::NotEqual => glow::NOTEQUAL,
        DepthFunction::GEqual => glow::GEQUAL,
    }
}

pub fn primitive(primitive: Primitive) -> u32 {
    match primitive {
        Primitive::Point => glow::POINTS,
        Primitive::Line => glow::LINES,
        Primitive::LineStrip => glow::LINE_STRIP,
        Primitive::Triangle => glow::TRIANGLES,
        Primitive::TriangleStrip => glow::TRIANGLE_STRIP,
    }
}

/// Attribute pointer component type.
pub fn attribute_type(ty: DataType) -> u32 {
    if ty.is_integer() { glow::INT } else { glow::FLOAT }
}

/// Maps an active uniform type to a value type, or `None` for samplers and
/// types the engine does not write.
pub fn uniform_type(gl_type: u32) -> Option<DataType> {
    Some(match gl_type {
        glow::BOOL => DataType::Bool,
        glow::INT | glow::UNSIGNED_INT => DataType::Int,
        glow::FLOAT => DataType::Float,
        glow::FLOAT_VEC2 => DataType::Vec2,
        glow::FLOAT_VEC3 => DataType::Vec3,
        glow::FLOAT_VEC4 => DataType::Vec4,
        glow::FLOAT_MAT2 => DataType::Mat2,
        glow::FLOAT_MAT3 => DataType::Mat3,
        glow::FLOAT_MAT4 => DataType::Mat4,
        _ => return None,
    })
}

/// Maps an active sampler type to `(texture type, is depth comparison)`.
pub fn sampler_type(gl_type: u32) -> Option<(TextureType, bool)> {
    Some(match gl_type {
        glow::SAMPLER_1D => (TextureType::Texture1D, false),
        glow::SAMPLER_2D | glow::INT_SAMPLER_2D | glow::UNSIGNED_INT_SAMPLER_2D => {
            (TextureType::Texture2D, false)
        }
        glow::SAMPLER_2D_SHADOW => (TextureType::Texture2D, true),
        glow::SAMPLER_2D_MULTISAMPLE => (TextureType::Texture2DMultisample, false),
        glow::SAMPLER_3D => (TextureType::Texture3D, false),
        glow::SAMPLER_CUBE => (TextureType::TextureCube, false),
        glow::SAMPLER_CUBE_SHADOW => (TextureType::TextureCube, true),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgba8_uses_sized_internal_format() {
        assert_eq!(internal_format(TextureFormat::Rgba8), glow::RGBA8);
        assert_eq!(base_format(TextureFormat::Rgba8), glow::RGBA);
    }

    #[test]
    fn depth16_transfers_as_unsigned_short() {
        assert_eq!(pixel_type(TextureFormat::Depth16), glow::UNSIGNED_SHORT);
        assert_eq!(base_format(TextureFormat::Depth16), glow::DEPTH_COMPONENT);
    }

    #[test]
    fn half_float_formats_transfer_as_half() {
        for format in [TextureFormat::R16F, TextureFormat::Rgb16F, TextureFormat::Rgba16F] {
            assert_eq!(pixel_type(format), glow::HALF_FLOAT, "{format}");
        }
    }

    #[test]
    fn mip_filters_combine() {
        assert_eq!(
            min_filter(TextureFilterMode::Linear, TextureFilterMode::Linear, true),
            glow::LINEAR_MIPMAP_LINEAR
        );
        assert_eq!(
            min_filter(TextureFilterMode::Linear, TextureFilterMode::Linear, false),
            glow::LINEAR
        );
    }
}
