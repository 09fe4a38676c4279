use glam::Vec4;

use crate::define_material;
use crate::resources::material::MaterialFlags;

define_material! {
    /// A single flat color. Also used for light gizmos.
    pub struct SimpleColorMaterial {
        shader: "simple_color",
        flags: MaterialFlags::TRANSFORM,
        lighted: false,
        uniforms: [
            /// Surface color.
            color: Vec4 = ("u_Material.Color", Vec4::ONE),
        ],
        textures: [],
    }
}

define_material! {
    /// Writes depth only; used by shadow passes.
    pub struct DepthMaterial {
        shader: "depth",
        flags: MaterialFlags::TRANSFORM,
        lighted: false,
        uniforms: [],
        textures: [],
    }
}

define_material! {
    /// Samples the screen buffer onto a fullscreen quad.
    pub struct ViewportMaterial {
        shader: "viewport",
        flags: MaterialFlags::empty(),
        lighted: false,
        uniforms: [],
        textures: [
            /// The composited frame.
            screen_texture = "u_ScreenTexture",
        ],
    }
}
