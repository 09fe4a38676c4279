//! GLSL programs reflected through the active-uniform query.

use std::any::Any;
use std::cell::{Ref, RefCell};
use std::rc::Rc;

use glow::HasContext;
use rustc_hash::FxHashMap;

use crate::errors::{LumenError, Result};
use crate::renderer::shader::{
    Shader, ShaderInterface, ShaderSource, ShaderStage, ShaderStages, TextureBinding,
    UniformLibrary, UniformPacking, UniformValue,
};
use crate::renderer::texture::Texture;

use super::convert;

pub struct OpenGlShader {
    gl: Rc<glow::Context>,
    name: String,
    program: Option<glow::Program>,
    interface: RefCell<ShaderInterface>,
    /// Location of every reflected uniform and sampler by full name.
    locations: FxHashMap<String, glow::UniformLocation>,
}

impl OpenGlShader {
    pub(crate) fn new(gl: Rc<glow::Context>, source: &ShaderSource) -> Self {
        let mut shader = Self {
            gl,
            name: source.name.clone(),
            program: None,
            interface: RefCell::new(ShaderInterface::new(UniformLibrary::new(UniformPacking::Tight))),
            locations: FxHashMap::default(),
        };
        match shader.compile(source) {
            Ok(program) => {
                shader.program = Some(program);
                if let Err(err) = shader.reflect(program) {
                    log::error!("Shader '{}' reflection failed: {err}", shader.name);
                }
                log::debug!("Shader '{}' compiled", shader.name);
            }
            Err(err) => log::error!("{err}"),
        }
        shader
    }

    fn compile(&self, source: &ShaderSource) -> Result<glow::Program> {
        let gl = &self.gl;
        let sections = source.sections()?;
        let error = |stage: &str, log: String| LumenError::ShaderCompilation {
            shader: self.name.clone(),
            stage: stage.into(),
            log,
        };
        unsafe {
            let mut stages = Vec::with_capacity(sections.len());
            for (stage, text) in &sections {
                let kind = match stage {
                    ShaderStage::Vertex => glow::VERTEX_SHADER,
                    ShaderStage::Fragment => glow::FRAGMENT_SHADER,
                    ShaderStage::Geometry => glow::GEOMETRY_SHADER,
                };
                let handle = gl.create_shader(kind).map_err(LumenError::Backend)?;
                gl.shader_source(handle, text);
                gl.compile_shader(handle);
                if !gl.get_shader_compile_status(handle) {
                    let log = gl.get_shader_info_log(handle);
                    gl.delete_shader(handle);
                    for (_, compiled) in stages {
                        gl.delete_shader(compiled);
                    }
                    return Err(error(stage.name(), log));
                }
                stages.push((*stage, handle));
            }

            let program = gl.create_program().map_err(LumenError::Backend)?;
            for (_, handle) in &stages {
                gl.attach_shader(program, *handle);
            }
            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            for (_, handle) in stages {
                gl.detach_shader(program, handle);
                gl.delete_shader(handle);
            }
            if !linked {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(error("link", log));
            }
            Ok(program)
        }
    }

    /// Builds the uniform tables from every active uniform. Array entries
    /// are expanded to one leaf per element.
    fn reflect(&mut self, program: glow::Program) -> Result<()> {
        let gl = Rc::clone(&self.gl);
        let mut uniforms = UniformLibrary::new(UniformPacking::Tight);
        let mut interface_textures = FxHashMap::default();
        let count = unsafe { gl.get_active_uniforms(program) };
        let mut sampler_index = 0;
        for index in 0..count {
            let Some(active) = (unsafe { gl.get_active_uniform(program, index) }) else {
                continue;
            };
            let names: Vec<String> = match active.name.strip_suffix("[0]") {
                Some(base) if active.size > 1 => (0..active.size).map(|i| format!("{base}[{i}]")).collect(),
                _ => vec![active.name.clone()],
            };
            for name in names {
                let Some(location) = (unsafe { gl.get_uniform_location(program, &name) }) else {
                    continue;
                };
                if let Some(ty) = convert::uniform_type(active.utype) {
                    uniforms.push_element(&name, ty, Some(index))?;
                } else if let Some((ty, depth)) = convert::sampler_type(active.utype) {
                    interface_textures.insert(
                        name.clone(),
                        TextureBinding {
                            index: sampler_index,
                            sampler_index: None,
                            group: 0,
                            ty,
                            depth,
                            stages: ShaderStages::VERTEX | ShaderStages::FRAGMENT,
                        },
                    );
                    sampler_index += 1;
                } else {
                    log::debug!("Shader '{}': skipping uniform '{name}' of type 0x{:x}", self.name, active.utype);
                    continue;
                }
                self.locations.insert(name, location);
            }
        }
        let mut interface = ShaderInterface::new(uniforms);
        interface.textures = interface_textures;
        *self.interface.get_mut() = interface;
        Ok(())
    }

    /// Uploads one value to `location` of the bound program.
    fn upload(&self, location: &glow::UniformLocation, value: UniformValue) {
        let gl = &self.gl;
        let location = Some(location);
        unsafe {
            match value {
                UniformValue::Bool(v) => gl.uniform_1_i32(location, i32::from(v)),
                UniformValue::Int(v) => gl.uniform_1_i32(location, v),
                UniformValue::Float(v) => gl.uniform_1_f32(location, v),
                UniformValue::Vec2(v) => gl.uniform_2_f32(location, v.x, v.y),
                UniformValue::Vec3(v) => gl.uniform_3_f32(location, v.x, v.y, v.z),
                UniformValue::Vec4(v) => gl.uniform_4_f32(location, v.x, v.y, v.z, v.w),
                UniformValue::Mat2(m) => gl.uniform_matrix_2_f32_slice(location, false, &m.to_cols_array()),
                UniformValue::Mat3(m) => gl.uniform_matrix_3_f32_slice(location, false, &m.to_cols_array()),
                UniformValue::Mat4(m) => gl.uniform_matrix_4_f32_slice(location, false, &m.to_cols_array()),
            }
        }
    }
}

impl Shader for OpenGlShader {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_loaded(&self) -> bool {
        self.program.is_some()
    }

    fn bind(&self) {
        if let Some(program) = self.program {
            unsafe { self.gl.use_program(Some(program)) };
        }
    }

    fn unbind(&self) {
        unsafe { self.gl.use_program(None) };
    }

    fn interface(&self) -> Ref<'_, ShaderInterface> {
        self.interface.borrow()
    }

    fn set_uniform(&self, name: &str, value: UniformValue) -> bool {
        if self.program.is_none() {
            return false;
        }
        if self.interface.borrow_mut().uniforms.set(name, value).is_none() {
            return false;
        }
        if let Some(location) = self.locations.get(name) {
            self.bind();
            self.upload(location, value);
        }
        true
    }

    fn set_texture(&self, name: &str, texture: &Rc<dyn Texture>, slot: u32) -> bool {
        if self.program.is_none() {
            return false;
        }
        if self.interface.borrow_mut().texture(&self.name, name).is_none() {
            return false;
        }
        texture.bind_to_texture_unit(slot);
        if let Some(location) = self.locations.get(name) {
            self.bind();
            unsafe { self.gl.uniform_1_i32(Some(location), slot as i32) };
        }
        true
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for OpenGlShader {
    fn drop(&mut self) {
        if let Some(program) = self.program.take() {
            unsafe { self.gl.delete_program(program) };
        }
    }
}
