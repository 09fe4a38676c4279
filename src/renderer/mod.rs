//! Rendering System
//!
//! The backend-neutral half of the engine:
//!
//! - [`api`]: the [`RendererApi`] capability and its backend factory
//! - [`layout`], [`buffer`], [`drawable`]: vertex data and draw units
//! - [`texture`], [`framebuffer`]: GPU images and render targets
//! - [`shader`]: shader sources, reflection and uniform storage
//! - [`renderer`]: the scene-level [`Renderer`] façade
//! - [`cubemap`], [`viewport`]: cube face rendering and final composition
//! - [`backend`]: OpenGL, Metal (wgpu) and headless implementations

pub mod api;
pub mod backend;
pub mod buffer;
pub mod cubemap;
pub mod drawable;
pub mod framebuffer;
pub mod layout;
pub mod pipeline;
#[allow(clippy::module_inception)]
pub mod renderer;
pub mod settings;
pub mod shader;
pub mod texture;
pub mod viewport;

pub use api::{
    BackendContext, CoordinateConvention, DepthFunction, FaceCulling, GraphicsApi, PipelineState,
    Primitive, RenderTargetMask, RendererApi, create_renderer_api,
};
pub use buffer::{IndexBuffer, VertexBuffer};
pub use cubemap::CubeMap;
pub use drawable::Drawable;
pub use framebuffer::{BlitSpecification, FrameBuffer, FrameBufferSpecification};
pub use layout::{BufferLayout, DataElement, DataLayout, DataType};
pub use renderer::{RenderStats, Renderer, SceneData};
pub use settings::RendererSettings;
pub use shader::{Shader, ShaderLibrary};
pub use texture::{
    Texture, Texture2D, TextureCube, TextureFilter, TextureFilterMode, TextureFormat,
    TextureSpecification, TextureType, TextureWrap,
};
pub use viewport::Viewport;
