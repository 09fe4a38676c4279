//! Renderer configuration.
//!
//! ```rust,ignore
//! use lumen::renderer::{GraphicsApi, RendererSettings};
//!
//! let settings = RendererSettings::default()
//!     .with_api(GraphicsApi::OpenGl)
//!     .with_vsync(false);
//! ```

use glam::Vec4;

use crate::renderer::api::GraphicsApi;
use crate::renderer::texture::TextureFormat;

/// Global renderer configuration, fixed at bootstrap.
#[derive(Debug, Clone)]
pub struct RendererSettings {
    pub api: GraphicsApi,

    /// Enable vertical sync. Applied by the window on OpenGL and by the
    /// surface present mode on Metal.
    pub vsync: bool,

    /// Initial clear color of the default framebuffer.
    pub clear_color: Vec4,

    /// GPU power preference used when requesting an adapter (Metal).
    pub power_preference: wgpu::PowerPreference,

    /// Device features requested on top of what the backend needs (Metal).
    pub required_features: wgpu::Features,

    /// Device limits (Metal).
    pub required_limits: wgpu::Limits,

    /// Format of depth attachments created without an explicit one.
    pub depth_format: TextureFormat,

    /// Edge length of light shadow maps.
    pub shadow_map_size: u32,

    /// Edge length of environment cube maps.
    pub environment_map_size: u32,

    /// Lights the built-in lit shaders can address.
    pub max_lights: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            api: GraphicsApi::OpenGl,
            vsync: true,
            clear_color: Vec4::new(0.0, 0.0, 0.0, 1.0),
            power_preference: wgpu::PowerPreference::HighPerformance,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            depth_format: TextureFormat::Depth24,
            shadow_map_size: 2048,
            environment_map_size: 2048,
            max_lights: 8,
        }
    }
}

impl RendererSettings {
    #[must_use]
    pub fn with_api(mut self, api: GraphicsApi) -> Self {
        self.api = api;
        self
    }

    #[must_use]
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    #[must_use]
    pub fn with_clear_color(mut self, color: Vec4) -> Self {
        self.clear_color = color;
        self
    }

    #[must_use]
    pub fn with_depth_format(mut self, format: TextureFormat) -> Self {
        self.depth_format = format;
        self
    }

    #[must_use]
    pub fn with_shadow_map_size(mut self, size: u32) -> Self {
        self.shadow_map_size = size;
        self
    }

    #[must_use]
    pub fn with_environment_map_size(mut self, size: u32) -> Self {
        self.environment_map_size = size;
        self
    }

    #[must_use]
    pub fn with_max_lights(mut self, max_lights: u32) -> Self {
        self.max_lights = max_lights;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_conventions() {
        let settings = RendererSettings::default();
        assert_eq!(settings.depth_format, TextureFormat::Depth24);
        assert_eq!(settings.shadow_map_size, 2048);
        assert_eq!(settings.environment_map_size, 2048);
        assert!(settings.vsync);
    }

    #[test]
    fn builders_override_fields() {
        let settings = RendererSettings::default()
            .with_api(GraphicsApi::Headless)
            .with_max_lights(4)
            .with_vsync(false);
        assert_eq!(settings.api, GraphicsApi::Headless);
        assert_eq!(settings.max_lights, 4);
        assert!(!settings.vsync);
    }
}
