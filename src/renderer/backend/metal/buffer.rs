//! GPU vertex and index buffers, and the drawable that groups them.

use std::any::Any;
use std::rc::Rc;

use wgpu::util::DeviceExt;

use crate::errors::Result;
use crate::renderer::buffer::{IndexBuffer, VertexBuffer};
use crate::renderer::drawable::{Drawable, DrawableState};
use crate::renderer::layout::BufferLayout;
use crate::renderer::shader::Shader;

use super::convert;

fn create_buffer(device: &wgpu::Device, label: &str, data: &[u8], usage: wgpu::BufferUsages) -> wgpu::Buffer {
    // Zero-sized buffers cannot be bound.
    let padded;
    let contents = if data.is_empty() {
        padded = [0u8; 4];
        &padded[..]
    } else {
        data
    };
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents,
        usage,
    })
}

pub struct MetalVertexBuffer {
    buffer: wgpu::Buffer,
    layout: BufferLayout,
    count: u32,
    size: usize,
}

impl MetalVertexBuffer {
    pub(crate) fn new(device: &wgpu::Device, data: &[u8], count: u32, layout: BufferLayout) -> Self {
        Self {
            buffer: create_buffer(device, "Vertex Buffer", data, wgpu::BufferUsages::VERTEX),
            layout,
            count,
            size: data.len(),
        }
    }

    #[must_use]
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    /// Attribute descriptors starting at shader location `first`. Matrix
    /// attributes take one location per column.
    #[must_use]
    pub fn attributes(&self, first: u32) -> Vec<wgpu::VertexAttribute> {
        let mut location = first;
        let mut attributes = Vec::with_capacity(self.layout.len());
        for (_, element) in self.layout.iter() {
            let Some(format) = convert::vertex_format(element.ty) else {
                continue;
            };
            let column_size = element.size / element.ty.columns();
            for column in 0..element.ty.columns() {
                attributes.push(wgpu::VertexAttribute {
                    format,
                    offset: u64::from(element.offset + column * column_size),
                    shader_location: location,
                });
                location += 1;
            }
        }
        attributes
    }
}

impl VertexBuffer for MetalVertexBuffer {
    fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn size(&self) -> usize {
        self.size
    }

    fn bind(&self) {}

    fn unbind(&self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct MetalIndexBuffer {
    buffer: wgpu::Buffer,
    count: u32,
}

impl MetalIndexBuffer {
    pub(crate) fn new(device: &wgpu::Device, indices: &[u32]) -> Self {
        Self {
            buffer: create_buffer(device, "Index Buffer", bytemuck::cast_slice(indices), wgpu::BufferUsages::INDEX),
            count: indices.len() as u32,
        }
    }

    #[must_use]
    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl IndexBuffer for MetalIndexBuffer {
    fn count(&self) -> u32 {
        self.count
    }

    fn bind(&self) {}

    fn unbind(&self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Buffers plus shader; the pipeline is resolved per draw from the cache.
#[derive(Default)]
pub struct MetalDrawable {
    state: DrawableState,
}

impl MetalDrawable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Drawable for MetalDrawable {
    fn add_vertex_buffer(&self, buffer: Rc<dyn VertexBuffer>) -> Result<()> {
        self.state.push_vertex_buffer(buffer).map(|_| ())
    }

    fn set_index_buffer(&self, buffer: Rc<dyn IndexBuffer>) {
        self.state.set_index_buffer(buffer);
    }

    fn set_shader(&self, shader: Rc<dyn Shader>) {
        self.state.set_shader(shader);
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
