//! Vertex buffers, index buffers and vertex array objects.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use glow::HasContext;

use crate::errors::{LumenError, Result};
use crate::renderer::buffer::{IndexBuffer, VertexBuffer};
use crate::renderer::drawable::{Drawable, DrawableState};
use crate::renderer::layout::BufferLayout;
use crate::renderer::shader::Shader;

use super::convert;

pub struct OpenGlVertexBuffer {
    gl: Rc<glow::Context>,
    native: glow::Buffer,
    count: u32,
    size: usize,
    layout: BufferLayout,
}

impl OpenGlVertexBuffer {
    pub(crate) fn new(gl: Rc<glow::Context>, data: &[u8], count: u32, layout: BufferLayout) -> Result<Self> {
        let native = unsafe {
            let buffer = gl.create_buffer().map_err(LumenError::Backend)?;
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(buffer));
            gl.buffer_data_u8_slice(glow::ARRAY_BUFFER, data, glow::STATIC_DRAW);
            gl.bind_buffer(glow::ARRAY_BUFFER, None);
            buffer
        };
        Ok(Self {
            gl,
            native,
            count,
            size: data.len(),
            layout,
        })
    }
}

impl VertexBuffer for OpenGlVertexBuffer {
    fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn size(&self) -> usize {
        self.size
    }

    fn bind(&self) {
        unsafe { self.gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.native)) };
    }

    fn unbind(&self) {
        unsafe { self.gl.bind_buffer(glow::ARRAY_BUFFER, None) };
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for OpenGlVertexBuffer {
    fn drop(&mut self) {
        unsafe { self.gl.delete_buffer(self.native) };
    }
}

pub struct OpenGlIndexBuffer {
    gl: Rc<glow::Context>,
    native: glow::Buffer,
    count: u32,
}

impl OpenGlIndexBuffer {
    pub(crate) fn new(gl: Rc<glow::Context>, indices: &[u32]) -> Result<Self> {
        let native = unsafe {
            let buffer = gl.create_buffer().map_err(LumenError::Backend)?;
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(buffer));
            gl.buffer_data_u8_slice(
                glow::ELEMENT_ARRAY_BUFFER,
                bytemuck::cast_slice(indices),
                glow::STATIC_DRAW,
            );
            gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None);
            buffer
        };
        Ok(Self {
            gl,
            native,
            count: indices.len() as u32,
        })
    }
}

impl IndexBuffer for OpenGlIndexBuffer {
    fn count(&self) -> u32 {
        self.count
    }

    fn bind(&self) {
        unsafe { self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(self.native)) };
    }

    fn unbind(&self) {
        unsafe { self.gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, None) };
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for OpenGlIndexBuffer {
    fn drop(&mut self) {
        unsafe { self.gl.delete_buffer(self.native) };
    }
}

/// A vertex array object plus the buffers and shader it links.
pub struct OpenGlDrawable {
    gl: Rc<glow::Context>,
    vao: glow::VertexArray,
    state: DrawableState,
    /// Attribute slots enabled by the last link.
    linked: Cell<u32>,
}

impl OpenGlDrawable {
    pub(crate) fn new(gl: Rc<glow::Context>) -> Result<Self> {
        let vao = unsafe { gl.create_vertex_array() }.map_err(LumenError::Backend)?;
        Ok(Self {
            gl,
            vao,
            state: DrawableState::default(),
            linked: Cell::new(0),
        })
    }

    /// Re-points every attribute at increasing indices in layout order.
    fn link_attributes(&self) {
        let gl = &self.gl;
        unsafe {
            gl.bind_vertex_array(Some(self.vao));
            for index in 0..self.linked.get() {
                gl.disable_vertex_attrib_array(index);
            }
            let mut index = 0u32;
            for buffer in self.state.vertex_buffers().iter() {
                buffer.bind();
                let stride = buffer.layout().stride() as i32;
                for (_, element) in buffer.layout().iter() {
                    let columns = element.ty.columns();
                    let components = (element.ty.component_count() / columns) as i32;
                    let column_size = (element.size / columns) as i32;
                    for column in 0..columns {
                        let offset = element.offset as i32 + column as i32 * column_size;
                        gl.enable_vertex_attrib_array(index);
                        if element.ty.is_integer() {
                            gl.vertex_attrib_pointer_i32(
                                index,
                                components,
                                convert::attribute_type(element.ty),
                                stride,
                                offset,
                            );
                        } else {
                            gl.vertex_attrib_pointer_f32(
                                index,
                                components,
                                convert::attribute_type(element.ty),
                                element.normalized,
                                stride,
                                offset,
                            );
                        }
                        index += 1;
                    }
                }
            }
            self.linked.set(index);
            gl.bind_vertex_array(None);
        }
    }
}

impl Drawable for OpenGlDrawable {
    fn add_vertex_buffer(&self, buffer: Rc<dyn VertexBuffer>) -> Result<()> {
        self.state.push_vertex_buffer(buffer)?;
        if self.state.shader().is_some() {
            self.link_attributes();
        }
        Ok(())
    }

    fn set_index_buffer(&self, buffer: Rc<dyn IndexBuffer>) {
        unsafe { self.gl.bind_vertex_array(Some(self.vao)) };
        buffer.bind();
        unsafe { self.gl.bind_vertex_array(None) };
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
        unsafe { self.gl.bind_vertex_array(Some(self.vao)) };
    }

    fn unbind(&self) {
        unsafe { self.gl.bind_vertex_array(None) };
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for OpenGlDrawable {
    fn drop(&mut self) {
        unsafe { self.gl.delete_vertex_array(self.vao) };
    }
}
