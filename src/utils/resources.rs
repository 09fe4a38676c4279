//! Process-wide asset roots.
//!
//! The application sets the two roots once at bootstrap; every loader reads
//! them afterwards. `general` holds engine assets (built-in shaders), while
//! `specific` holds the application's own assets.

use std::path::PathBuf;

use parking_lot::RwLock;

struct ResourcePaths {
    general: String,
    specific: String,
}

static PATHS: RwLock<ResourcePaths> = RwLock::new(ResourcePaths {
    general: String::new(),
    specific: String::new(),
});

/// Resolves asset-relative paths against the configured roots.
pub struct ResourcesManager;

impl ResourcesManager {
    pub fn set_general_path(path: impl Into<String>) {
        let path = path.into();
        log::info!("General resources path: {path}");
        PATHS.write().general = path;
    }

    pub fn set_specific_path(path: impl Into<String>) {
        let path = path.into();
        log::info!("Specific resources path: {path}");
        PATHS.write().specific = path;
    }

    #[must_use]
    pub fn general_root() -> String {
        PATHS.read().general.clone()
    }

    #[must_use]
    pub fn specific_root() -> String {
        PATHS.read().specific.clone()
    }

    /// `general` root concatenated with `relative`.
    #[must_use]
    pub fn general_path(relative: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", PATHS.read().general, relative))
    }

    /// `specific` root concatenated with `relative`.
    #[must_use]
    pub fn specific_path(relative: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", PATHS.read().specific, relative))
    }
}
