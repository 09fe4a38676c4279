use super::MeshData;

/// An axis-aligned cube of edge `size` centered on the origin, 4 vertices
/// per face so each face keeps a flat normal.
#[must_use]
pub fn create_cube(size: f32) -> MeshData {
    let h = size * 0.5;
    // (normal axis, u axis, v axis) with u × v pointing outward.
    let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([h, 0.0, 0.0], [0.0, 0.0, -h], [0.0, h, 0.0]),
        ([-h, 0.0, 0.0], [0.0, 0.0, h], [0.0, h, 0.0]),
        ([0.0, h, 0.0], [h, 0.0, 0.0], [0.0, 0.0, -h]),
        ([0.0, -h, 0.0], [h, 0.0, 0.0], [0.0, 0.0, h]),
        ([0.0, 0.0, h], [h, 0.0, 0.0], [0.0, h, 0.0]),
        ([0.0, 0.0, -h], [-h, 0.0, 0.0], [0.0, h, 0.0]),
    ];
    let mut mesh = MeshData::default();
    for (center, u, v) in faces {
        mesh.push_quad(center, u, v);
    }
    mesh
}
