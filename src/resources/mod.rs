//! Resources the renderer draws with, independent of any backend:
//! - [`image`]: decoding, encoding and texel conversions
//! - [`material`]: shader-plus-properties materials and their library
//! - [`model`]: drawables placed in the world
//! - [`primitives`]: procedural geometry

pub mod image;
pub mod material;
pub mod model;
pub mod primitives;

pub use material::{Material, MaterialFlags, MaterialLibrary};
pub use model::{Model, ModelLibrary, Transform};
pub use primitives::{MeshData, SphereOptions, Vertex};
