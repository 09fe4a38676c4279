//! Lumen: a small real-time rendering engine with interchangeable graphics
//! backends.
//!
//! The engine is layered bottom to top:
//!
//! - [`renderer`]: the backend-neutral [`RendererApi`](renderer::RendererApi)
//!   with OpenGL, wgpu (Metal) and headless implementations, plus the
//!   [`Renderer`] façade on top of it
//! - [`resources`]: materials, meshes, models and image helpers
//! - [`scene`]: cameras, lights, environment lighting and multi-pass scenes
//! - [`app`]: windows, events, input and the layered application loop
//!
//! Everything is single-threaded; GPU objects are shared through `Rc`.

pub mod app;
pub mod errors;
pub mod renderer;
pub mod resources;
pub mod scene;
pub mod utils;

pub use app::{Application, ApplicationSpecification, Event, Input, KeyCode, Layer, LayerContext, MouseButton};
pub use errors::{LumenError, Result};
pub use renderer::{
    FrameBuffer, FrameBufferSpecification, GraphicsApi, Renderer, RendererApi, RendererSettings, Shader, Texture,
    TextureFormat, TextureSpecification,
};
pub use resources::{Material, Model, Transform};
pub use scene::{Camera, DirectionalLight, EnvironmentLight, Light, PositionalLight, RenderPassSpecification, Scene};
pub use utils::{Library, Timestep};

#[doc(hidden)]
pub use log as __log;
#[doc(hidden)]
pub use paste as __paste;

/// Installs an `env_logger` backend, defaulting to `info` when `RUST_LOG`
/// is unset. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
