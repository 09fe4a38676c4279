//! Declaration-level GLSL reflection.
//!
//! Backends without a driver to query (the headless renderer) reflect the
//! uniform interface straight from source: `struct` definitions, `uniform`
//! declarations and integer `#define`s used as array sizes. Structs and
//! arrays are expanded into flat leaf names such as
//! `u_Environment.Lights[0].Color`, in declaration order.

use rustc_hash::FxHashMap;

use crate::renderer::layout::DataType;
use crate::renderer::shader::source::{ShaderStage, ShaderStages};
use crate::renderer::texture::TextureType;

/// One reflected sampler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedTexture {
    pub name: String,
    pub ty: TextureType,
    pub depth: bool,
    pub stages: ShaderStages,
}

/// One reflected uniform leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedUniform {
    pub name: String,
    pub ty: DataType,
    pub stages: ShaderStages,
}

/// The uniform interface of a program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlslInterface {
    pub uniforms: Vec<ReflectedUniform>,
    pub textures: Vec<ReflectedTexture>,
}

impl GlslInterface {
    /// Reflects every stage and merges the results; a name used by several
    /// stages appears once with the union of their flags.
    #[must_use]
    pub fn reflect(sections: &[(ShaderStage, String)]) -> Self {
        let mut interface = Self::default();
        for (stage, text) in sections {
            let flags = stage.flag();
            let declared = reflect_source(text);
            for (name, kind) in declared {
                match kind {
                    Declared::Value(ty) => {
                        if let Some(existing) = interface.uniforms.iter_mut().find(|u| u.name == name) {
                            existing.stages |= flags;
                        } else {
                            interface.uniforms.push(ReflectedUniform { name, ty, stages: flags });
                        }
                    }
                    Declared::Sampler(ty, depth) => {
                        if let Some(existing) = interface.textures.iter_mut().find(|t| t.name == name) {
                            existing.stages |= flags;
                        } else {
                            interface.textures.push(ReflectedTexture {
                                name,
                                ty,
                                depth,
                                stages: flags,
                            });
                        }
                    }
                }
            }
        }
        interface
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Declared {
    Value(DataType),
    Sampler(TextureType, bool),
}

fn builtin_type(name: &str) -> Option<Declared> {
    let value = |ty| Some(Declared::Value(ty));
    let sampler = |ty, depth| Some(Declared::Sampler(ty, depth));
    match name {
        "bool" => value(DataType::Bool),
        "int" | "uint" => value(DataType::Int),
        "float" => value(DataType::Float),
        "vec2" => value(DataType::Vec2),
        "vec3" => value(DataType::Vec3),
        "vec4" => value(DataType::Vec4),
        "mat2" => value(DataType::Mat2),
        "mat3" => value(DataType::Mat3),
        "mat4" => value(DataType::Mat4),
        "sampler1D" => sampler(TextureType::Texture1D, false),
        "sampler2D" | "isampler2D" | "usampler2D" => sampler(TextureType::Texture2D, false),
        "sampler2DShadow" => sampler(TextureType::Texture2D, true),
        "sampler2DMS" => sampler(TextureType::Texture2DMultisample, false),
        "sampler3D" => sampler(TextureType::Texture3D, false),
        "samplerCube" => sampler(TextureType::TextureCube, false),
        _ => None,
    }
}

const QUALIFIERS: [&str; 6] = ["lowp", "mediump", "highp", "flat", "smooth", "const"];

// ============================================================================
// Tokenizer
// ============================================================================

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '/' && chars.peek() == Some(&'/') {
            for c in chars.by_ref() {
                if c == '\n' {
                    out.push('\n');
                    break;
                }
            }
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            let mut prev = '\0';
            for c in chars.by_ref() {
                if prev == '*' && c == '/' {
                    break;
                }
                prev = c;
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() || c == '_' || c == '.' {
            current.push(c);
            continue;
        }
        if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
        if !c.is_whitespace() {
            tokens.push(c.to_string());
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

// ============================================================================
// Parser
// ============================================================================

#[derive(Debug, Clone)]
struct Field {
    ty: String,
    name: String,
    count: Option<u32>,
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
    defines: FxHashMap<String, u32>,
    structs: FxHashMap<String, Vec<Field>>,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn next(&mut self) -> Option<String> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_balanced(&mut self, open: &str, close: &str) {
        let mut depth = 0usize;
        while let Some(token) = self.next() {
            if token == open {
                depth += 1;
            } else if token == close {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return;
                }
            }
        }
    }

    fn skip_statement(&mut self) {
        while let Some(token) = self.peek() {
            match token {
                ";" => {
                    self.pos += 1;
                    return;
                }
                "{" => {
                    self.skip_balanced("{", "}");
                    return;
                }
                _ => self.pos += 1,
            }
        }
    }

    fn array_count(&mut self) -> Option<u32> {
        if !self.eat("[") {
            return None;
        }
        let size = self.next().unwrap_or_default();
        self.eat("]");
        size.parse()
            .ok()
            .or_else(|| self.defines.get(&size).copied())
            .or(Some(1))
    }

    fn skip_qualifiers(&mut self) {
        loop {
            if self.peek() == Some("layout") {
                self.pos += 1;
                self.skip_balanced("(", ")");
            } else if self.peek().is_some_and(|t| QUALIFIERS.contains(&t)) {
                self.pos += 1;
            } else {
                return;
            }
        }
    }

    /// `type a[, b[N]...];` inside a struct or block body.
    fn fields_until(&mut self, close: &str) -> Vec<Field> {
        let mut fields = Vec::new();
        while let Some(token) = self.peek() {
            if token == close {
                self.pos += 1;
                break;
            }
            self.skip_qualifiers();
            let Some(ty) = self.next() else { break };
            loop {
                let Some(name) = self.next() else { break };
                let count = self.array_count();
                fields.push(Field {
                    ty: ty.clone(),
                    name,
                    count,
                });
                if !self.eat(",") {
                    break;
                }
            }
            self.eat(";");
        }
        fields
    }

    fn parse(mut self) -> Vec<(String, Declared)> {
        let mut out = Vec::new();
        while let Some(token) = self.peek().map(str::to_string) {
            match token.as_str() {
                "struct" => {
                    self.pos += 1;
                    let name = self.next().unwrap_or_default();
                    if self.eat("{") {
                        let fields = self.fields_until("}");
                        self.structs.insert(name, fields);
                    }
                    self.eat(";");
                }
                "uniform" => {
                    self.pos += 1;
                    self.skip_qualifiers();
                    let ty = self.next().unwrap_or_default();
                    if self.eat("{") {
                        let fields = self.fields_until("}");
                        let instance = if self.peek() == Some(";") { None } else { self.next() };
                        self.eat(";");
                        match instance {
                            Some(root) => {
                                for field in &fields {
                                    self.expand(&format!("{root}.{}", field.name), field, &mut out);
                                }
                            }
                            None => {
                                for field in &fields {
                                    self.expand(&field.name, field, &mut out);
                                }
                            }
                        }
                        continue;
                    }
                    loop {
                        let Some(name) = self.next() else { break };
                        let count = self.array_count();
                        let field = Field { ty: ty.clone(), name: name.clone(), count };
                        self.expand(&name, &field, &mut out);
                        if !self.eat(",") {
                            break;
                        }
                    }
                    self.eat(";");
                }
                "layout" => {
                    self.pos += 1;
                    self.skip_balanced("(", ")");
                }
                _ => self.skip_statement(),
            }
        }
        out
    }

    fn expand(&self, path: &str, field: &Field, out: &mut Vec<(String, Declared)>) {
        match field.count {
            Some(count) => {
                for i in 0..count {
                    self.expand_single(&format!("{path}[{i}]"), &field.ty, out);
                }
            }
            None => self.expand_single(path, &field.ty, out),
        }
    }

    fn expand_single(&self, path: &str, ty: &str, out: &mut Vec<(String, Declared)>) {
        if let Some(declared) = builtin_type(ty) {
            out.push((path.to_string(), declared));
        } else if let Some(fields) = self.structs.get(ty) {
            for field in fields {
                self.expand(&format!("{path}.{}", field.name), field, out);
            }
        } else {
            log::warn!("Unsupported uniform type '{ty}' for '{path}'");
        }
    }
}

fn reflect_source(text: &str) -> Vec<(String, Declared)> {
    let text = strip_comments(text);
    let mut defines = FxHashMap::default();
    let mut body = String::with_capacity(text.len());
    for line in text.lines() {
        let trimmed = line.trim_start();
        if let Some(rest) = trimmed.strip_prefix("#define") {
            let mut parts = rest.split_whitespace();
            if let (Some(name), Some(value)) = (parts.next(), parts.next())
                && let Ok(value) = value.parse::<u32>()
            {
                defines.insert(name.to_string(), value);
            }
            continue;
        }
        if trimmed.starts_with('#') {
            continue;
        }
        body.push_str(line);
        body.push('\n');
    }
    Parser {
        tokens: tokenize(&body),
        pos: 0,
        defines,
        structs: FxHashMap::default(),
    }
    .parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_structs_arrays_and_defines() {
        let src = r"
            #version 330 core
            #define MAX_LIGHTS 2
            struct Light { vec4 Vector; vec4 Color; float Strength; };
            struct Environment { Light Lights[MAX_LIGHTS]; int LightCount; };
            uniform Environment u_Environment; // lights
            uniform mat4 u_Model, u_View;
            uniform samplerCube u_EnvironmentMap;
            void main() { gl_Position = vec4(0.0); }
        ";
        let interface = GlslInterface::reflect(&[(ShaderStage::Vertex, src.to_string())]);
        let names: Vec<_> = interface.uniforms.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "u_Environment.Lights[0].Vector",
                "u_Environment.Lights[0].Color",
                "u_Environment.Lights[0].Strength",
                "u_Environment.Lights[1].Vector",
                "u_Environment.Lights[1].Color",
                "u_Environment.Lights[1].Strength",
                "u_Environment.LightCount",
                "u_Model",
                "u_View",
            ]
        );
        assert_eq!(interface.textures.len(), 1);
        assert_eq!(interface.textures[0].ty, TextureType::TextureCube);
    }

    #[test]
    fn stages_merge() {
        let vs = "uniform mat4 u_Model;".to_string();
        let fs = "uniform mat4 u_Model; uniform sampler2D u_Texture;".to_string();
        let interface = GlslInterface::reflect(&[(ShaderStage::Vertex, vs), (ShaderStage::Fragment, fs)]);
        assert_eq!(interface.uniforms.len(), 1);
        assert_eq!(interface.uniforms[0].stages, ShaderStages::VERTEX | ShaderStages::FRAGMENT);
        assert_eq!(interface.textures[0].stages, ShaderStages::FRAGMENT);
    }
}
