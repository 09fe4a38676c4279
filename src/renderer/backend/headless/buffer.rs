//! Host-side vertex and index buffers, and the drawable that binds them.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use crate::errors::Result;
use crate::renderer::buffer::{IndexBuffer, VertexBuffer};
use crate::renderer::drawable::{Drawable, DrawableState};
use crate::renderer::layout::BufferLayout;
use crate::renderer::shader::Shader;

pub struct HeadlessVertexBuffer {
    data: Vec<u8>,
    count: u32,
    layout: BufferLayout,
}

impl HeadlessVertexBuffer {
    pub(crate) fn new(data: &[u8], count: u32, layout: BufferLayout) -> Self {
        Self {
            data: data.to_vec(),
            count,
            layout,
        }
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

impl VertexBuffer for HeadlessVertexBuffer {
    fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn bind(&self) {}

    fn unbind(&self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct HeadlessIndexBuffer {
    indices: Vec<u32>,
}

impl HeadlessIndexBuffer {
    pub(crate) fn new(indices: &[u32]) -> Self {
        Self {
            indices: indices.to_vec(),
        }
    }

    #[must_use]
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

impl IndexBuffer for HeadlessIndexBuffer {
    fn count(&self) -> u32 {
        self.indices.len() as u32
    }

    fn bind(&self) {}

    fn unbind(&self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Tracks attribute linkage like a vertex array object.
pub struct HeadlessDrawable {
    state: DrawableState,
    /// `(attribute index, name)` in link order.
    attributes: RefCell<Vec<(u32, String)>>,
}

impl HeadlessDrawable {
    pub(crate) fn new() -> Self {
        Self {
            state: DrawableState::default(),
            attributes: RefCell::new(Vec::new()),
        }
    }

    /// Linked attributes, indices increasing in layout order across buffers.
    #[must_use]
    pub fn attributes(&self) -> Vec<(u32, String)> {
        self.attributes.borrow().clone()
    }

    fn link_attributes(&self) {
        let mut attributes = self.attributes.borrow_mut();
        attributes.clear();
        let mut index = 0;
        for buffer in self.state.vertex_buffers().iter() {
            for (name, element) in buffer.layout().iter() {
                attributes.push((index, name.to_string()));
                index += element.ty.columns();
            }
        }
    }
}

impl Drawable for HeadlessDrawable {
    fn add_vertex_buffer(&self, buffer: Rc<dyn VertexBuffer>) -> Result<()> {
        self.state.push_vertex_buffer(buffer)?;
        if self.state.shader().is_some() {
            self.link_attributes();
        }
        Ok(())
    }

    fn set_index_buffer(&self, buffer: Rc<dyn IndexBuffer>) {
        self.state.set_index_buffer(buffer);
    }

    fn set_shader(&self, shader: Rc<dyn Shader>) {
        if self.state.shader_changed(&shader) {
            self.state.set_shader(shader);
            self.link_attributes();
        }
    }

    fn shader(&self) -> Option<Rc<dyn Shader>> {
        self.state.shader()
    }

    fn vertex_buffers(&self) -> Vec<Rc<dyn VertexBuffer>> {
        self.state.vertex_buffers().clone()
    }

    fn index_buffer(&self) -> Option<Rc<dyn IndexBuffer>> {
        self.state.index_buffer()
    }

    fn bind(&self) {
        if let Some(shader) = self.state.shader() {
            shader.bind();
        }
    }

    fn unbind(&self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}
