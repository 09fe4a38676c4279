//! GLSL shaders reflected from source, with optional CPU fragment programs.

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::errors::LumenError;
use crate::renderer::shader::reflect::GlslInterface;
use crate::renderer::shader::{
    Shader, ShaderInterface, ShaderSource, ShaderStage, TextureBinding, UniformLibrary,
    UniformPacking, UniformValue,
};
use crate::renderer::texture::Texture;

use super::HeadlessDevice;
use super::texture::HeadlessTexture;

/// Per-pixel inputs of a CPU fragment program.
pub struct FragmentInput<'a> {
    /// Normalized position inside the viewport, origin bottom-left.
    pub uv: [f32; 2],
    pub shader: &'a HeadlessShader,
}

impl FragmentInput<'_> {
    /// Samples the texture bound to sampler `name` with its own mag filter.
    #[must_use]
    pub fn sample(&self, name: &str) -> [f32; 4] {
        self.shader
            .bound_texture(name)
            .and_then(|texture| {
                let filter = texture.specification().filter.mag;
                texture
                    .as_any()
                    .downcast_ref::<HeadlessTexture>()
                    .map(|t| t.sample(self.uv[0], self.uv[1], 0, filter))
            })
            .unwrap_or([0.0, 0.0, 0.0, 1.0])
    }

    #[must_use]
    pub fn uniform(&self, name: &str) -> Option<UniformValue> {
        self.shader.interface.borrow().uniforms.get(name)
    }
}

/// A fullscreen fragment stage evaluated on the CPU.
pub type FragmentProgram = Rc<dyn Fn(&FragmentInput<'_>) -> [f32; 4]>;

pub struct HeadlessShader {
    name: String,
    device: Rc<HeadlessDevice>,
    loaded: bool,
    interface: RefCell<ShaderInterface>,
    samplers: RefCell<FxHashMap<String, Rc<dyn Texture>>>,
    program: Option<FragmentProgram>,
}

impl HeadlessShader {
    pub(crate) fn new(device: Rc<HeadlessDevice>, source: &ShaderSource, program: Option<FragmentProgram>) -> Self {
        let mut shader = Self {
            name: source.name.clone(),
            device,
            loaded: false,
            interface: RefCell::new(ShaderInterface::new(UniformLibrary::new(UniformPacking::Tight))),
            samplers: RefCell::new(FxHashMap::default()),
            program,
        };
        match compile(source) {
            Ok(interface) => {
                *shader.interface.get_mut() = interface;
                shader.loaded = true;
                log::debug!("Shader '{}' reflected", shader.name);
            }
            Err(err) => log::error!("{err}"),
        }
        shader
    }

    #[must_use]
    pub fn program(&self) -> Option<&FragmentProgram> {
        self.program.as_ref()
    }

    #[must_use]
    pub fn bound_texture(&self, name: &str) -> Option<Rc<dyn Texture>> {
        self.samplers.borrow().get(name).cloned()
    }
}

/// Splits, checks and reflects the stages. Each stage needs an entry point.
fn compile(source: &ShaderSource) -> Result<ShaderInterface, LumenError> {
    let sections = source.sections()?;
    for (stage, text) in &sections {
        if !text.contains("void main") {
            return Err(LumenError::ShaderCompilation {
                shader: source.name.clone(),
                stage: stage.name().into(),
                log: "missing entry point 'void main'".into(),
            });
        }
    }
    if !sections.iter().any(|(s, _)| *s == ShaderStage::Vertex)
        || !sections.iter().any(|(s, _)| *s == ShaderStage::Fragment)
    {
        return Err(LumenError::ShaderCompilation {
            shader: source.name.clone(),
            stage: "link".into(),
            log: "a program needs a vertex and a fragment stage".into(),
        });
    }

    let reflected = GlslInterface::reflect(&sections);
    let mut uniforms = UniformLibrary::new(UniformPacking::Tight);
    for (location, uniform) in reflected.uniforms.iter().enumerate() {
        uniforms.push_element(&uniform.name, uniform.ty, Some(location as u32))?;
    }
    let mut interface = ShaderInterface::new(uniforms);
    for (index, texture) in reflected.textures.iter().enumerate() {
        interface.textures.insert(
            texture.name.clone(),
            TextureBinding {
                index: index as u32,
                sampler_index: None,
                group: 0,
                ty: texture.ty,
                depth: texture.depth,
                stages: texture.stages,
            },
        );
    }
    Ok(interface)
}

impl Shader for HeadlessShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_loaded(&self) -> bool {
        self.loaded
    }

    fn bind(&self) {
        if self.loaded {
            *self.device.program.borrow_mut() = Some(self.name.clone());
        }
    }

    fn unbind(&self) {
        let mut program = self.device.program.borrow_mut();
        if program.as_deref() == Some(self.name.as_str()) {
            *program = None;
        }
    }

    fn interface(&self) -> Ref<'_, ShaderInterface> {
        self.interface.borrow()
    }

    fn set_uniform(&self, name: &str, value: UniformValue) -> bool {
        if !self.loaded {
            return false;
        }
        let mut interface = self.interface.borrow_mut();
        let Some(element) = interface.uniforms.set(name, value) else {
            return false;
        };
        // Mirror the upload into the program's "GPU" storage.
        let bytes = value.encode(UniformPacking::Tight);
        let len = (element.size as usize).min(bytes.len());
        self.device
            .program_uniforms
            .borrow_mut()
            .entry(self.name.clone())
            .or_default()
            .insert(name.to_string(), bytes[..len].to_vec());
        true
    }

    fn set_texture(&self, name: &str, texture: &Rc<dyn Texture>, slot: u32) -> bool {
        if !self.loaded {
            return false;
        }
        if self.interface.borrow_mut().texture(&self.name, name).is_none() {
            return false;
        }
        texture.bind_to_texture_unit(slot);
        self.samplers
            .borrow_mut()
            .insert(name.to_string(), Rc::clone(texture));
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Built-in fullscreen programs keyed by shader name.
pub(crate) fn builtin_programs() -> FxHashMap<String, FragmentProgram> {
    let mut programs: FxHashMap<String, FragmentProgram> = FxHashMap::default();
    programs.insert(
        "viewport".into(),
        Rc::new(|input: &FragmentInput<'_>| input.sample("u_ScreenTexture")),
    );
    programs.insert(
        "blit".into(),
        Rc::new(|input: &FragmentInput<'_>| input.sample("u_Texture")),
    );
    programs
}
