//! Backend implementations of the renderer capability traits.

pub mod headless;
pub mod metal;
pub mod opengl;
