//! Image-based environment lighting.
//!
//! An [`EnvironmentLight`] turns an equirectangular HDR image into a cube
//! map and binds it for skyboxes and reflections. With spherical harmonics
//! enabled it also projects the cube map onto nine SH coefficients, which
//! lit shaders consume as three irradiance matrices.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::path::Path;
use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::errors::{LumenError, Result};
use crate::renderer::Renderer;
use crate::renderer::api::Primitive;
use crate::renderer::cubemap::{build_cube_map, render_cube_map};
use crate::renderer::framebuffer::{FrameBuffer, FrameBufferSpecification};
use crate::renderer::shader::Shader;
use crate::renderer::texture::{Texture, Texture2D, TextureFilter, TextureFormat, TextureSpecification, TextureType};
use crate::resources::image::decode_texel;
use crate::resources::material::{ENVIRONMENT_MAP_SLOT, EquirectangularMaterial, LightProperty, SHProjectionMaterial};
use crate::scene::light::{Light, ShCoefficients, irradiance_matrices};

const SH_FORMAT: TextureFormat = TextureFormat::Rgb16F;
const ENVIRONMENT_FORMAT: TextureFormat = TextureFormat::Rgb16F;

/// SH projection state: a 3x3 target holding one coefficient per texel.
struct SphericalHarmonics {
    framebuffer: Rc<dyn FrameBuffer>,
    coefficients: Cell<ShCoefficients>,
}

pub struct EnvironmentLight {
    environment: Rc<dyn FrameBuffer>,
    size: u32,
    equirectangular: RefCell<Option<Rc<dyn Texture>>>,
    sh: Option<SphericalHarmonics>,
}

impl EnvironmentLight {
    /// An environment with a `size`² cube map per face.
    pub fn new(renderer: &Renderer, size: u32) -> Result<Self> {
        let cube = TextureSpecification::attachment(ENVIRONMENT_FORMAT)
            .with_type(TextureType::TextureCube)
            .with_mip_maps(true);
        let environment = renderer
            .api()
            .create_framebuffer(&FrameBufferSpecification::new(size, size, vec![cube]).with_mip_maps(true))?;
        Ok(Self {
            environment,
            size,
            equirectangular: RefCell::new(None),
            sh: None,
        })
    }

    /// Like [`Self::new`], also keeping spherical-harmonic coefficients.
    pub fn with_spherical_harmonics(renderer: &Renderer, size: u32) -> Result<Self> {
        let mut light = Self::new(renderer, size)?;
        let target = TextureSpecification::attachment(SH_FORMAT).with_filter(TextureFilter::nearest());
        let framebuffer = renderer
            .api()
            .create_framebuffer(&FrameBufferSpecification::new(3, 3, vec![target]))?;
        light.sh = Some(SphericalHarmonics {
            framebuffer,
            coefficients: Cell::new([Vec3::ZERO; 9]),
        });
        Ok(light)
    }

    #[must_use]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[must_use]
    pub fn framebuffer(&self) -> &Rc<dyn FrameBuffer> {
        &self.environment
    }

    /// The environment cube map.
    #[must_use]
    pub fn environment_map(&self) -> Option<Rc<dyn Texture>> {
        self.environment.attachment(0)
    }

    /// Loads the equirectangular source image. A file that fails to decode
    /// leaves the previous source in place.
    pub fn load_hdr(&self, renderer: &Renderer, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let texture = Texture2D::from_file(renderer.api().as_ref(), path, true);
        if !texture.is_loaded() {
            log::warn!("Environment image '{}' could not be loaded", path.display());
            return false;
        }
        self.set_equirectangular_map(texture);
        true
    }

    pub fn set_equirectangular_map(&self, texture: Rc<dyn Texture>) {
        *self.equirectangular.borrow_mut() = Some(texture);
    }

    /// Renders the equirectangular source onto the cube faces and, with
    /// spherical harmonics enabled, refreshes the coefficients.
    pub fn update_environment(&self, renderer: &Renderer) -> Result<()> {
        let source = self.equirectangular.borrow().clone().ok_or_else(|| LumenError::ResourceNotFound {
            kind: "environment image",
            name: "equirectangular map".into(),
        })?;
        let material = EquirectangularMaterial::new(renderer)?;
        material.set_equirectangular_map(source);

        let convention = renderer.api().api().convention();
        let cube = build_cube_map(convention, 0.1, 10.0, 90.0, Vec3::ZERO);
        let api = renderer.api();
        let depth = api.state().depth_test;
        api.enable_depth_testing(false);
        let rendered = render_cube_map(renderer, &cube, &material, &self.environment, self.size, self.size, 0, true);
        api.enable_depth_testing(depth);
        rendered?;

        if self.sh.is_some() {
            self.update_spherical_harmonics(renderer)?;
        }
        Ok(())
    }

    /// Projects the cube map onto the SH target and reads the nine
    /// coefficients back.
    pub fn update_spherical_harmonics(&self, renderer: &Renderer) -> Result<()> {
        let Some(sh) = &self.sh else {
            log::warn!("Spherical harmonics are not enabled on this environment light");
            return Ok(());
        };
        let environment = self.environment_map().ok_or_else(|| LumenError::ResourceNotFound {
            kind: "attachment",
            name: "environment cube map".into(),
        })?;
        let material = SHProjectionMaterial::new(renderer)?;
        material.set_environment_map(environment);

        let api = renderer.api();
        let quad = renderer.fullscreen_quad()?;
        api.begin_render_pass(Some(Rc::clone(&sh.framebuffer)));
        api.set_viewport(0, 0, 3, 3);
        api.clear();
        renderer.draw(quad.as_ref(), &material, Mat4::IDENTITY, Primitive::Triangle);
        api.end_render_pass();

        let target = sh.framebuffer.attachment(0).ok_or_else(|| LumenError::ResourceNotFound {
            kind: "attachment",
            name: "spherical harmonics target".into(),
        })?;
        let pixels = target.read_pixels(0)?;
        sh.coefficients.set(coefficients_from_texels(&pixels));
        Ok(())
    }

    #[must_use]
    pub fn has_spherical_harmonics(&self) -> bool {
        self.sh.is_some()
    }

    /// Current coefficients; zero when spherical harmonics are disabled.
    #[must_use]
    pub fn sh_coefficients(&self) -> ShCoefficients {
        self.sh.as_ref().map_or([Vec3::ZERO; 9], |sh| sh.coefficients.get())
    }

    pub fn set_sh_coefficients(&self, coefficients: ShCoefficients) {
        match &self.sh {
            Some(sh) => sh.coefficients.set(coefficients),
            None => log::warn!("Spherical harmonics are not enabled on this environment light"),
        }
    }

    #[must_use]
    pub fn irradiance_matrices(&self, direction_dependent: bool) -> [Mat4; 3] {
        irradiance_matrices(&self.sh_coefficients(), direction_dependent)
    }
}

/// Coefficient `i` lives at texel `(i % 3, i / 3)`.
fn coefficients_from_texels(pixels: &[u8]) -> ShCoefficients {
    let stride = SH_FORMAT.bytes_per_pixel() as usize;
    let mut coefficients = [Vec3::ZERO; 9];
    for (coefficient, texel) in coefficients.iter_mut().zip(pixels.chunks_exact(stride)) {
        let [r, g, b, _] = decode_texel(SH_FORMAT, texel);
        *coefficient = Vec3::new(r, g, b);
    }
    coefficients
}

impl Light for EnvironmentLight {
    fn define_light_properties(&self, shader: &dyn Shader, flags: LightProperty) {
        if shader.texture_binding("u_EnvironmentMap").is_some()
            && let Some(map) = self.environment_map()
        {
            shader.set_texture("u_EnvironmentMap", &map, ENVIRONMENT_MAP_SLOT);
        }
        if self.sh.is_some() && shader.is_uniform("u_Irradiance.Red") {
            let [red, green, blue] = self.irradiance_matrices(flags.contains(LightProperty::DIRECTION_DEPENDENT));
            shader.set_mat4("u_Irradiance.Red", red);
            shader.set_mat4("u_Irradiance.Green", green);
            shader.set_mat4("u_Irradiance.Blue", blue);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::image::encode_texel;

    #[test]
    fn texels_map_to_coefficients_in_row_order() {
        let mut pixels = Vec::new();
        for i in 0..9 {
            pixels.extend_from_slice(&encode_texel(SH_FORMAT, [i as f32, 0.5, -1.0, 1.0]));
        }
        let coefficients = coefficients_from_texels(&pixels);
        assert_eq!(coefficients[0], Vec3::new(0.0, 0.5, -1.0));
        assert_eq!(coefficients[7], Vec3::new(7.0, 0.5, -1.0));
    }
}
