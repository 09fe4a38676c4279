//! wgpu context
//!
//! The [`WgpuContext`] holds the core GPU handles: device, queue and, when
//! rendering to a window, the surface and its configuration. Without a
//! surface the default framebuffer only exists as an offscreen texture.

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::errors::{LumenError, Result};
use crate::renderer::settings::RendererSettings;

pub struct WgpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// The window surface, if any.
    pub surface: Option<wgpu::Surface<'static>>,
    /// Surface configuration. Also carries the default framebuffer size
    /// when there is no surface.
    pub config: wgpu::SurfaceConfiguration,
}

fn device_features(adapter: &wgpu::Adapter, settings: &RendererSettings) -> wgpu::Features {
    // Optional features the texture code uses when present.
    let optional = wgpu::Features::FLOAT32_FILTERABLE | wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER;
    settings.required_features | (adapter.features() & optional)
}

async fn request_device(adapter: &wgpu::Adapter, settings: &RendererSettings) -> Result<(wgpu::Device, wgpu::Queue)> {
    let info = adapter.get_info();
    log::info!("wgpu adapter: {} ({:?})", info.name, info.backend);
    if info.backend != wgpu::Backend::Metal {
        log::warn!("Metal path running on {:?}", info.backend);
    }
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("lumen device"),
            required_features: device_features(adapter, settings),
            required_limits: settings.required_limits.clone(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await?;
    Ok((device, queue))
}

impl WgpuContext {
    /// Creates a context presenting to `window`.
    pub async fn new<W>(window: W, settings: &RendererSettings, width: u32, height: u32) -> Result<Self>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| LumenError::AdapterNotFound(e.to_string()))?;

        let (device, queue) = request_device(&adapter, settings).await?;

        let mut config = surface
            .get_default_config(&adapter, width.max(1), height.max(1))
            .ok_or_else(|| LumenError::Surface("surface not supported by adapter".into()))?;
        config.present_mode = if settings.vsync {
            wgpu::PresentMode::AutoVsync
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        surface.configure(&device, &config);

        Ok(Self {
            device,
            queue,
            surface: Some(surface),
            config,
        })
    }

    /// Creates a context without a window.
    pub async fn offscreen(settings: &RendererSettings, width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: settings.power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| LumenError::AdapterNotFound(e.to_string()))?;
        let (device, queue) = request_device(&adapter, settings).await?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: wgpu::TextureFormat::Rgba8Unorm,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            desired_maximum_frame_latency: 2,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: Vec::new(),
        };
        Ok(Self {
            device,
            queue,
            surface: None,
            config,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            if let Some(surface) = &self.surface {
                surface.configure(&self.device, &self.config);
            }
        }
    }

    /// Returns the surface color format.
    #[must_use]
    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }
}
