//! Vertex and index buffers.

use std::any::Any;
use std::fmt;

use crate::renderer::layout::BufferLayout;

/// Immutable vertex data described by a [`BufferLayout`].
pub trait VertexBuffer: Any {
    fn layout(&self) -> &BufferLayout;

    /// Number of vertices.
    fn count(&self) -> u32;

    /// Size of the uploaded blob in bytes.
    fn size(&self) -> usize;

    fn bind(&self);

    fn unbind(&self);

    fn as_any(&self) -> &dyn Any;
}

/// 32-bit unsigned indices.
pub trait IndexBuffer: Any {
    fn count(&self) -> u32;

    fn bind(&self);

    fn unbind(&self);

    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn VertexBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexBuffer")
            .field("count", &self.count())
            .field("stride", &self.layout().stride())
            .finish()
    }
}

impl fmt::Debug for dyn IndexBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexBuffer")
            .field("count", &self.count())
            .finish()
    }
}

/// Typed host copy of vertex data, cast to bytes for upload.
pub fn vertex_bytes<T: bytemuck::Pod>(vertices: &[T]) -> &[u8] {
    bytemuck::cast_slice(vertices)
}
