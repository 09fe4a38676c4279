use glam::Vec4;

use crate::define_material;
use crate::resources::material::MaterialFlags;

define_material! {
    /// Blinn-Phong shading with constant colors.
    ///
    /// Load it over `phong_color_shadow` to sample the casters' shadow maps.
    pub struct PhongColorMaterial {
        shader: "phong_color",
        flags: MaterialFlags::TRANSFORM
            .union(MaterialFlags::VIEW_DIRECTION)
            .union(MaterialFlags::NORMAL_MATRIX),
        lighted: true,
        uniforms: [
            ambient: Vec4 = ("u_Material.Ambient", Vec4::new(0.1, 0.1, 0.1, 1.0)),
            diffuse: Vec4 = ("u_Material.Diffuse", Vec4::ONE),
            specular: Vec4 = ("u_Material.Specular", Vec4::ONE),
            /// Specular exponent.
            shininess: f32 = ("u_Material.Shininess", 32.0),
        ],
        textures: [],
    }
}

define_material! {
    /// Blinn-Phong shading with diffuse and specular maps.
    pub struct PhongTextureMaterial {
        shader: "phong_texture",
        flags: MaterialFlags::TRANSFORM
            .union(MaterialFlags::VIEW_DIRECTION)
            .union(MaterialFlags::NORMAL_MATRIX),
        lighted: true,
        uniforms: [
            /// Ambient share of the diffuse map.
            ambient_strength: f32 = ("u_Material.AmbientStrength", 0.1),
            shininess: f32 = ("u_Material.Shininess", 32.0),
        ],
        textures: [
            diffuse_map = "u_DiffuseMap",
            specular_map = "u_SpecularMap",
        ],
    }
}
