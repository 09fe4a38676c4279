use glam::Vec4;

use crate::define_material;
use crate::resources::material::MaterialFlags;

define_material! {
    /// A texture modulated by a tint, without lighting.
    pub struct UnlitTextureMaterial {
        shader: "unlit_texture",
        flags: MaterialFlags::TRANSFORM,
        lighted: false,
        uniforms: [
            /// Multiplies every sampled texel.
            color: Vec4 = ("u_Material.Color", Vec4::ONE),
        ],
        textures: [
            /// Color map.
            texture_map = "u_TextureMap",
        ],
    }
}

define_material! {
    /// Draws a cube map around the camera. The shader drops the view
    /// translation, so the skybox follows the eye.
    pub struct SkyboxMaterial {
        shader: "skybox",
        flags: MaterialFlags::TRANSFORM,
        lighted: false,
        uniforms: [
            /// Mip level sampled from the cube map.
            level: f32 = ("u_Material.Level", 0.0),
        ],
        textures: [
            environment_map = "u_EnvironmentMap",
        ],
    }
}

define_material! {
    /// Projects an equirectangular image onto the faces of a cube.
    pub struct EquirectangularMaterial {
        shader: "equirectangular_to_cube",
        flags: MaterialFlags::TRANSFORM,
        lighted: false,
        uniforms: [],
        textures: [
            equirectangular_map = "u_EquirectangularMap",
        ],
    }
}
