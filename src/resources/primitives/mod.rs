//! Procedural geometry.
//!
//! Every shape produces interleaved `position normal uv` vertices with
//! counter-clockwise front faces and 32-bit indices, ready for
//! [`MeshData::upload`].

mod cube;
mod plane;
mod sphere;

use std::rc::Rc;

use bytemuck::{Pod, Zeroable};

use crate::errors::Result;
use crate::renderer::api::RendererApi;
use crate::renderer::buffer::vertex_bytes;
use crate::renderer::drawable::Drawable;
use crate::renderer::layout::{BufferLayout, DataType};

pub use cube::create_cube;
pub use plane::{create_plane, create_quad};
pub use sphere::{SphereOptions, create_sphere};

/// One interleaved vertex.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// CPU-side geometry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// The attribute layout shared by every built-in shape.
    #[must_use]
    pub fn layout() -> BufferLayout {
        BufferLayout::from_types([
            ("a_Position", DataType::Vec3),
            ("a_Normal", DataType::Vec3),
            ("a_TexCoord", DataType::Vec2),
        ])
    }

    /// Creates GPU buffers and a drawable holding them.
    pub fn upload(&self, api: &dyn RendererApi) -> Result<Rc<dyn Drawable>> {
        let vertices = api.create_vertex_buffer(
            vertex_bytes(&self.vertices),
            self.vertices.len() as u32,
            Self::layout(),
        )?;
        let indices = api.create_index_buffer(&self.indices)?;
        let drawable = api.create_drawable()?;
        drawable.add_vertex_buffer(vertices)?;
        drawable.set_index_buffer(indices);
        Ok(drawable)
    }

    /// Appends a flat quad `center ± u ± v` facing `u × v`.
    fn push_quad(&mut self, center: [f32; 3], u: [f32; 3], v: [f32; 3]) {
        let normal = glam::Vec3::from(u).cross(glam::Vec3::from(v)).normalize().to_array();
        let base = self.vertices.len() as u32;
        for (su, sv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let position = [0, 1, 2].map(|i| center[i] + su * u[i] + sv * v[i]);
            self.vertices.push(Vertex {
                position,
                normal,
                uv: [(su + 1.0) * 0.5, (sv + 1.0) * 0.5],
            });
        }
        self.indices
            .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use glam::Vec3;

    /// Every triangle's winding must agree with its vertex normals.
    fn assert_outward(mesh: &MeshData) {
        for tri in mesh.indices.chunks_exact(3) {
            let [a, b, c] = [0, 1, 2].map(|i| mesh.vertices[tri[i] as usize]);
            let (pa, pb, pc) = (Vec3::from(a.position), Vec3::from(b.position), Vec3::from(c.position));
            let face = (pb - pa).cross(pc - pa);
            if face.length_squared() < 1e-12 {
                continue;
            }
            let normal = Vec3::from(a.normal) + Vec3::from(b.normal) + Vec3::from(c.normal);
            assert!(face.dot(normal) > 0.0, "triangle {tri:?} winds against its normal");
        }
    }

    #[test]
    fn layout_is_interleaved() {
        let layout = MeshData::layout();
        assert_eq!(layout.stride(), std::mem::size_of::<Vertex>() as u32);
        assert_eq!(layout.get("a_TexCoord").map(|e| e.offset), Some(24));
    }

    #[test]
    fn cube_has_six_outward_faces() {
        let cube = create_cube(2.0);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert_outward(&cube);
        assert!(cube.vertices.iter().all(|v| v.position.iter().all(|c| c.abs() == 1.0)));
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let sphere = create_sphere(&SphereOptions {
            radius: 0.5,
            segments: 16,
            rings: 8,
        });
        assert_eq!(sphere.vertices.len(), 17 * 9);
        assert_eq!(sphere.indices.len(), 16 * 8 * 6);
        for v in &sphere.vertices {
            assert!((Vec3::from(v.position).length() - 0.5).abs() < 1e-5);
        }
        assert_outward(&sphere);
    }

    #[test]
    fn quad_covers_clip_space() {
        let quad = create_quad();
        assert_outward(&quad);
        let min = quad.vertices.iter().map(|v| v.position[0]).fold(f32::MAX, f32::min);
        let max = quad.vertices.iter().map(|v| v.position[1]).fold(f32::MIN, f32::max);
        assert_eq!((min, max), (-1.0, 1.0));
    }
}
