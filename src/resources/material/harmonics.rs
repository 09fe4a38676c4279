use glam::Mat4;

use crate::define_material;
use crate::resources::material::MaterialFlags;

define_material! {
    /// Projects an environment cube map onto the first nine real spherical
    /// harmonics. Drawn as a fullscreen quad into a 3x3 target, one
    /// coefficient per texel.
    pub struct SHProjectionMaterial {
        shader: "sh_projection",
        flags: MaterialFlags::empty(),
        lighted: false,
        uniforms: [
            /// Samples per axis of the integration grid.
            samples: i32 = ("u_Projection.Samples", 64),
        ],
        textures: [
            environment_map = "u_EnvironmentMap",
        ],
    }
}

define_material! {
    /// Evaluates irradiance `nᵀ M n` per channel from spherical-harmonic
    /// matrices, drawn on a cube around the camera.
    pub struct SHIrradianceMaterial {
        shader: "sh_irradiance",
        flags: MaterialFlags::TRANSFORM,
        lighted: false,
        uniforms: [
            red: Mat4 = ("u_Irradiance.Red", Mat4::ZERO),
            green: Mat4 = ("u_Irradiance.Green", Mat4::ZERO),
            blue: Mat4 = ("u_Irradiance.Blue", Mat4::ZERO),
        ],
        textures: [],
    }
}

impl SHIrradianceMaterial {
    /// Sets all three channel matrices.
    pub fn set_matrices(&self, [red, green, blue]: [Mat4; 3]) {
        self.set_red(red);
        self.set_green(green);
        self.set_blue(blue);
    }
}
