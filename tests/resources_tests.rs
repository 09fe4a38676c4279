//! Resources Tests
//!
//! Tests for:
//! - General and specific asset roots and path concatenation
//! - Shader files on disk shadowing the embedded bundle

use std::fs;
use std::path::{Path, PathBuf};

use lumen::renderer::api::GraphicsApi;
use lumen::renderer::shader::library::{load_source, read_shader_file};
use lumen::utils::ResourcesManager;
use parking_lot::Mutex;

// The roots are process-wide; tests in this binary take turns.
static ROOTS: Mutex<()> = Mutex::new(());

/// Fresh directory under the system temp dir, with a trailing separator.
fn scratch_root(name: &str) -> (PathBuf, String) {
    let dir = std::env::temp_dir().join(format!("lumen-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(dir.join("shaders")).expect("create scratch root");
    let root = format!("{}/", dir.display());
    (dir, root)
}

// ============================================================================
// Path concatenation
// ============================================================================

#[test]
fn roots_are_prefixed_verbatim() {
    let _guard = ROOTS.lock();
    ResourcesManager::set_general_path("assets/engine/");
    ResourcesManager::set_specific_path("assets/game/");

    assert_eq!(ResourcesManager::general_root(), "assets/engine/");
    assert_eq!(ResourcesManager::specific_root(), "assets/game/");
    assert_eq!(
        ResourcesManager::general_path("shaders/depth.glsl"),
        PathBuf::from("assets/engine/shaders/depth.glsl")
    );
    assert_eq!(
        ResourcesManager::specific_path("models/cube.obj"),
        PathBuf::from("assets/game/models/cube.obj")
    );

    ResourcesManager::set_general_path("");
    ResourcesManager::set_specific_path("");
}

#[test]
fn roots_without_a_separator_are_not_patched() {
    let _guard = ROOTS.lock();
    ResourcesManager::set_specific_path("textures");

    assert_eq!(ResourcesManager::specific_path("wood.png"), PathBuf::from("textureswood.png"));

    ResourcesManager::set_specific_path("");
}

// ============================================================================
// Shader overrides
// ============================================================================

#[test]
fn disk_shader_shadows_the_embedded_copy() {
    let _guard = ROOTS.lock();
    let (dir, root) = scratch_root("override");
    let embedded = load_source(GraphicsApi::OpenGl, "simple_color").expect("embedded source");

    let marker = "// local simple_color";
    let text = format!("{marker}\n{}", fs::read_to_string(Path::new("src/renderer/shader/shaders/simple_color.glsl"))
        .expect("bundled file"));
    fs::write(dir.join("shaders/simple_color.glsl"), text).expect("write override");
    ResourcesManager::set_general_path(root);

    let overridden = load_source(GraphicsApi::OpenGl, "simple_color");
    ResourcesManager::set_general_path("");
    let _ = fs::remove_dir_all(&dir);

    let overridden = overridden.expect("overridden source");
    assert!(!embedded.text.contains(marker));
    assert!(overridden.text.contains(marker));
    // Includes missing from disk still resolve from the bundle.
    assert!(overridden.text.contains("u_Transform"));
    assert!(!overridden.text.contains("#include"));
}

#[test]
fn shaders_absent_from_disk_fall_back_to_the_bundle() {
    let _guard = ROOTS.lock();
    let (dir, root) = scratch_root("fallback");
    ResourcesManager::set_general_path(root);

    let source = read_shader_file(Path::new("depth.wgsl"));
    ResourcesManager::set_general_path("");
    let _ = fs::remove_dir_all(&dir);

    assert!(source.expect("bundled depth shader").contains("fn vs_main"));
}
