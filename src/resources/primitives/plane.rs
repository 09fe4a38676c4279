use super::MeshData;

/// A `width` x `depth` plane in XZ facing `+Y`.
#[must_use]
pub fn create_plane(width: f32, depth: f32) -> MeshData {
    let mut mesh = MeshData::default();
    mesh.push_quad([0.0; 3], [width * 0.5, 0.0, 0.0], [0.0, 0.0, -depth * 0.5]);
    mesh
}

/// The fullscreen quad: `[-1, 1]` in XY, facing `+Z`, uv `(0, 0)` at the
/// bottom left.
#[must_use]
pub fn create_quad() -> MeshData {
    let mut mesh = MeshData::default();
    mesh.push_quad([0.0; 3], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
    mesh
}
