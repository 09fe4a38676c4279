//! Shader source files.
//!
//! GLSL files hold one or more `#shader vertex|fragment|geometry` sections.
//! Any file may pull in others with `#include "path"`; includes resolve
//! relative to the including file and may nest.

use std::path::{Path, PathBuf};

use bitflags::bitflags;

use crate::errors::{LumenError, Result};

const MAX_INCLUDE_DEPTH: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Geometry,
}

impl ShaderStage {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
        }
    }

    #[must_use]
    pub const fn flag(self) -> ShaderStages {
        match self {
            Self::Vertex => ShaderStages::VERTEX,
            Self::Fragment => ShaderStages::FRAGMENT,
            Self::Geometry => ShaderStages::GEOMETRY,
        }
    }
}

bitflags! {
    /// Stages that reference a binding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStages: u8 {
        const VERTEX = 1 << 0;
        const FRAGMENT = 1 << 1;
        const GEOMETRY = 1 << 2;
    }
}

/// Loads the text of an included file given its resolved path.
pub type IncludeLoader<'a> = dyn Fn(&Path) -> Result<String> + 'a;

/// Preprocessed shader text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderSource {
    pub name: String,
    pub path: Option<PathBuf>,
    /// The whole file with includes substituted.
    pub text: String,
}

impl ShaderSource {
    /// Reads `path` from disk, resolving includes from disk.
    pub fn from_file(name: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let loader = |p: &Path| std::fs::read_to_string(p).map_err(LumenError::from);
        let text = loader(path)?;
        Self::from_text_with(name, &text, Some(path), &loader)
    }

    /// Preprocesses `text` with a custom include loader.
    pub fn from_text_with(
        name: &str,
        text: &str,
        path: Option<&Path>,
        loader: &IncludeLoader<'_>,
    ) -> Result<Self> {
        let base = path.and_then(Path::parent).unwrap_or_else(|| Path::new(""));
        let mut stack = Vec::new();
        let text = expand_includes(text, base, loader, &mut stack)?;
        Ok(Self {
            name: name.to_string(),
            path: path.map(Path::to_path_buf),
            text,
        })
    }

    /// Source without include support.
    #[must_use]
    pub fn from_text(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            path: None,
            text: text.to_string(),
        }
    }

    /// Splits GLSL text by `#shader` markers. Text before the first marker
    /// is shared and prepended to every section.
    pub fn sections(&self) -> Result<Vec<(ShaderStage, String)>> {
        let mut shared = String::new();
        let mut sections: Vec<(ShaderStage, String)> = Vec::new();
        for line in self.text.lines() {
            if let Some(kind) = line.trim_start().strip_prefix("#shader") {
                let stage = match kind.trim() {
                    "vertex" => ShaderStage::Vertex,
                    "fragment" | "pixel" => ShaderStage::Fragment,
                    "geometry" => ShaderStage::Geometry,
                    other => {
                        return Err(LumenError::ShaderCompilation {
                            shader: self.name.clone(),
                            stage: "parse".into(),
                            log: format!("unknown shader section '{other}'"),
                        });
                    }
                };
                sections.push((stage, String::new()));
                continue;
            }
            let target = match sections.last_mut() {
                Some((_, body)) => body,
                None => &mut shared,
            };
            target.push_str(line);
            target.push('\n');
        }
        if sections.is_empty() {
            return Err(LumenError::ShaderCompilation {
                shader: self.name.clone(),
                stage: "parse".into(),
                log: "no #shader sections found".into(),
            });
        }
        if shared.trim().is_empty() {
            return Ok(sections);
        }
        Ok(sections
            .into_iter()
            .map(|(stage, body)| (stage, with_shared_prelude(&shared, &body)))
            .collect())
    }
}

/// Keeps `#version` as the first line when a shared prelude is prepended.
fn with_shared_prelude(shared: &str, body: &str) -> String {
    let mut lines = body.lines();
    let mut out = String::with_capacity(shared.len() + body.len());
    let first = body.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if first.trim_start().starts_with("#version") {
        for line in lines.by_ref() {
            out.push_str(line);
            out.push('\n');
            if line.trim_start().starts_with("#version") {
                break;
            }
        }
    }
    out.push_str(shared);
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

fn expand_includes(
    text: &str,
    base: &Path,
    loader: &IncludeLoader<'_>,
    stack: &mut Vec<PathBuf>,
) -> Result<String> {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let Some(target) = parse_include(line) else {
            out.push_str(line);
            out.push('\n');
            continue;
        };
        let path = base.join(target);
        if stack.contains(&path) || stack.len() >= MAX_INCLUDE_DEPTH {
            return Err(LumenError::InvariantViolation(format!(
                "recursive #include of '{}'",
                path.display()
            )));
        }
        let included = loader(&path)?;
        stack.push(path.clone());
        let nested_base = path.parent().unwrap_or(base).to_path_buf();
        out.push_str(&expand_includes(&included, &nested_base, loader, stack)?);
        stack.pop();
    }
    Ok(out)
}

fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("#include")?.trim();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    Some(&rest[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_includes(p: &Path) -> Result<String> {
        Err(LumenError::ResourceNotFound {
            kind: "include",
            name: p.display().to_string(),
        })
    }

    #[test]
    fn splits_sections_and_keeps_version_first() {
        let src = ShaderSource::from_text(
            "t",
            "#define N 2\n#shader vertex\n#version 330 core\nvoid main() {}\n#shader fragment\n#version 330 core\nvoid main() {}\n",
        );
        let sections = src.sections().unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].0, ShaderStage::Vertex);
        assert!(sections[0].1.starts_with("#version 330 core\n#define N 2\n"));
        assert_eq!(sections[1].0, ShaderStage::Fragment);
    }

    #[test]
    fn includes_expand_recursively() {
        let loader = |p: &Path| -> Result<String> {
            match p.to_str() {
                Some("lib/a.glsl") => Ok("#include \"b.glsl\"\nfloat a;".into()),
                Some("lib/b.glsl") => Ok("float b;".into()),
                _ => no_includes(p),
            }
        };
        let src = ShaderSource::from_text_with(
            "t",
            "#include \"lib/a.glsl\"\nvoid main() {}",
            None,
            &loader,
        )
        .unwrap();
        assert_eq!(src.text, "float b;\nfloat a;\nvoid main() {}\n");
    }

    #[test]
    fn include_cycles_are_rejected() {
        let loader = |_: &Path| -> Result<String> { Ok("#include \"self.glsl\"".into()) };
        let result = ShaderSource::from_text_with("t", "#include \"self.glsl\"", None, &loader);
        assert!(result.is_err());
    }
}
