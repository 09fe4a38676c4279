use std::f32::consts::{PI, TAU};

use super::{MeshData, Vertex};

#[derive(Debug, Clone, Copy)]
pub struct SphereOptions {
    pub radius: f32,
    /// Longitude subdivisions.
    pub segments: u32,
    /// Latitude subdivisions.
    pub rings: u32,
}

impl Default for SphereOptions {
    fn default() -> Self {
        Self {
            radius: 1.0,
            segments: 32,
            rings: 16,
        }
    }
}

/// A UV sphere. Rings run from the north pole down; the seam column is
/// duplicated so uvs wrap cleanly.
#[must_use]
pub fn create_sphere(options: &SphereOptions) -> MeshData {
    let segments = options.segments.max(3);
    let rings = options.rings.max(2);
    let radius = options.radius;

    let mut mesh = MeshData::default();
    for y in 0..=rings {
        let v = y as f32 / rings as f32;
        let theta = v * PI;
        for x in 0..=segments {
            let u = x as f32 / segments as f32;
            let phi = u * TAU;
            let normal = [-phi.cos() * theta.sin(), theta.cos(), phi.sin() * theta.sin()];
            mesh.vertices.push(Vertex {
                position: normal.map(|n| n * radius),
                normal,
                uv: [u, 1.0 - v],
            });
        }
    }

    let stride = segments + 1;
    for y in 0..rings {
        for x in 0..segments {
            let v0 = y * stride + x;
            let v1 = v0 + 1;
            let v2 = v0 + stride;
            let v3 = v2 + 1;
            mesh.indices.extend_from_slice(&[v0, v2, v1, v1, v2, v3]);
        }
    }
    mesh
}
