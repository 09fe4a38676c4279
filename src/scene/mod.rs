//! Scene layer:
//! - [`Camera`]: fly/orbit camera
//! - [`light`]: shadow-casting lights, spherical-harmonic irradiance
//! - [`EnvironmentLight`]: image-based lighting
//! - [`RenderPassSpecification`]: declarative passes
//! - [`Scene`]: the container that executes them

pub mod camera;
pub mod environment;
pub mod light;
pub mod render_pass;
#[allow(clippy::module_inception)]
pub mod scene;

pub use camera::{Camera, CameraMovement, Projection};
pub use environment::EnvironmentLight;
pub use light::{DirectionalLight, Light, LightCaster, LightLibrary, PositionalLight, ShCoefficients};
pub use render_pass::{RenderContent, RenderHooks, RenderPassSpecification, RenderTarget, Renderable};
pub use scene::{SCREEN_BUFFER, Scene};
