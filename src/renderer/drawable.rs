//! Drawables: index buffer, vertex buffers and the shader they feed.

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::errors::{LumenError, Result};
use crate::renderer::buffer::{IndexBuffer, VertexBuffer};
use crate::renderer::shader::Shader;

/// A bindable unit of geometry.
///
/// Backends link vertex attributes (or build a pipeline) when the shader is
/// set, so buffers should be attached first.
pub trait Drawable: Any {
    /// Attaches a vertex buffer. Buffers without a layout are rejected.
    fn add_vertex_buffer(&self, buffer: Rc<dyn VertexBuffer>) -> Result<()>;

    fn set_index_buffer(&self, buffer: Rc<dyn IndexBuffer>);

    fn set_shader(&self, shader: Rc<dyn Shader>);

    fn shader(&self) -> Option<Rc<dyn Shader>>;

    fn vertex_buffers(&self) -> Vec<Rc<dyn VertexBuffer>>;

    fn index_buffer(&self) -> Option<Rc<dyn IndexBuffer>>;

    fn index_count(&self) -> u32 {
        self.index_buffer().map_or(0, |ib| ib.count())
    }

    fn bind(&self);

    fn unbind(&self);

    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Drawable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Drawable")
            .field("vertex_buffers", &self.vertex_buffers().len())
            .field("index_count", &self.index_count())
            .field("shader", &self.shader().map(|s| s.name().to_string()))
            .finish()
    }
}

/// Bookkeeping shared by every backend drawable.
#[derive(Default)]
pub struct DrawableState {
    vertex_buffers: RefCell<Vec<Rc<dyn VertexBuffer>>>,
    index_buffer: RefCell<Option<Rc<dyn IndexBuffer>>>,
    shader: RefCell<Option<Rc<dyn Shader>>>,
}

impl DrawableState {
    /// Validates and stores `buffer`, returning its slot.
    pub fn push_vertex_buffer(&self, buffer: Rc<dyn VertexBuffer>) -> Result<usize> {
        if buffer.layout().is_empty() {
            log::error!("Vertex buffer with {} vertices has no layout", buffer.count());
            return Err(LumenError::InvalidLayout(
                "vertex buffer attached to a drawable must carry a non-empty layout".into(),
            ));
        }
        let mut buffers = self.vertex_buffers.borrow_mut();
        buffers.push(buffer);
        Ok(buffers.len() - 1)
    }

    pub fn set_index_buffer(&self, buffer: Rc<dyn IndexBuffer>) {
        *self.index_buffer.borrow_mut() = Some(buffer);
    }

    pub fn set_shader(&self, shader: Rc<dyn Shader>) {
        *self.shader.borrow_mut() = Some(shader);
    }

    #[must_use]
    pub fn shader(&self) -> Option<Rc<dyn Shader>> {
        self.shader.borrow().clone()
    }

    #[must_use]
    pub fn vertex_buffers(&self) -> Ref<'_, Vec<Rc<dyn VertexBuffer>>> {
        self.vertex_buffers.borrow()
    }

    #[must_use]
    pub fn index_buffer(&self) -> Option<Rc<dyn IndexBuffer>> {
        self.index_buffer.borrow().clone()
    }

    /// True when the shader is a different object than `shader`.
    #[must_use]
    pub fn shader_changed(&self, shader: &Rc<dyn Shader>) -> bool {
        self.shader
            .borrow()
            .as_ref()
            .is_none_or(|current| !Rc::ptr_eq(current, shader))
    }
}
