//! Named shader storage and the built-in shader bundle.
//!
//! Shader names carry no extension; the backend's extension (`.glsl` or
//! `.wgsl`) is appended on load. Files are looked up under
//! `<general path>shaders/` first and in the embedded bundle second, so an
//! application can override any built-in shader by shipping a file with the
//! same name.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use rust_embed::RustEmbed;

use crate::errors::{LumenError, Result};
use crate::renderer::api::{GraphicsApi, RendererApi};
use crate::renderer::shader::{Shader, ShaderSource};
use crate::utils::{Library, ResourcesManager};

#[derive(RustEmbed)]
#[folder = "src/renderer/shader/shaders"]
struct BuiltinShaders;

/// Reads a shader file given its path relative to the shader root.
pub fn read_shader_file(relative: &Path) -> Result<String> {
    let key = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    let disk = ResourcesManager::general_path(&format!("shaders/{key}"));
    if disk.is_file() {
        return std::fs::read_to_string(&disk).map_err(LumenError::from);
    }

    if let Some(file) = BuiltinShaders::get(&key)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(source.to_string());
    }

    Err(LumenError::ResourceNotFound {
        kind: "shader file",
        name: key,
    })
}

/// Preprocessed source of shader `name` for `api`.
pub fn load_source(api: GraphicsApi, name: &str) -> Result<ShaderSource> {
    let relative = PathBuf::from(format!("{name}{}", api.shader_extension()));
    let text = read_shader_file(&relative)?;
    ShaderSource::from_text_with(name, &text, Some(&relative), &read_shader_file)
}

/// Shaders by name, in load order.
pub struct ShaderLibrary {
    shaders: Library<Rc<dyn Shader>>,
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl ShaderLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shaders: Library::new("shader"),
        }
    }

    /// Registers a shader under its own name.
    pub fn add(&mut self, shader: Rc<dyn Shader>) -> Result<()> {
        let name = shader.name().to_string();
        self.shaders.add(name, shader)
    }

    /// Returns shader `name`, compiling it on first use.
    ///
    /// A missing source file is an error. A source that fails to compile
    /// still yields a (not loaded) shader, which is cached like any other.
    pub fn load(&mut self, api: &dyn RendererApi, name: &str) -> Result<Rc<dyn Shader>> {
        if let Some(shader) = self.shaders.get(name) {
            return Ok(Rc::clone(shader));
        }
        let source = load_source(api.api(), name).inspect_err(|err| {
            log::error!("Shader '{name}' could not be read: {err}");
        })?;
        let shader = api.create_shader(&source);
        self.shaders.add(name, Rc::clone(&shader))?;
        Ok(shader)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Rc<dyn Shader>> {
        self.shaders.get(name).cloned()
    }

    #[must_use]
    pub fn exists(&self, name: &str) -> bool {
        self.shaders.exists(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Rc<dyn Shader>)> {
        self.shaders.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_glsl_sources_are_embedded() {
        for name in ["simple_color", "phong_color_shadow", "viewport", "sh_projection"] {
            let source = load_source(GraphicsApi::OpenGl, name).unwrap();
            assert!(source.sections().unwrap().len() >= 2, "{name} has vertex and fragment stages");
        }
    }

    #[test]
    fn builtin_wgsl_sources_are_embedded() {
        let source = load_source(GraphicsApi::Metal, "unlit_texture").unwrap();
        assert!(source.text.contains("fn vs_main"));
        assert!(!source.text.contains("#include"));
    }

    #[test]
    fn missing_shader_is_not_found() {
        let result = load_source(GraphicsApi::OpenGl, "does_not_exist");
        assert!(matches!(result, Err(LumenError::ResourceNotFound { .. })));
    }
}
