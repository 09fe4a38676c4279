//! Error Types
//!
//! This module defines the error types used throughout the engine.
//!
//! # Overview
//!
//! The main error type [`LumenError`] covers the failure modes of the renderer:
//! - Invariant violations (duplicate library names, out-of-range attachment indices)
//! - Missing resources and assets
//! - Shader compilation and image decoding failures
//! - Backend initialization failures
//!
//! # Usage
//!
//! Fallible APIs return [`Result<T>`] which is an alias for `std::result::Result<T, LumenError>`.
//!
//! ```rust,ignore
//! use lumen::errors::{LumenError, Result};
//!
//! fn load_asset() -> Result<()> {
//!     Ok(())
//! }
//! ```
//!
//! Operations that cannot return an error (for example nested render passes)
//! go through [`lumen_assert!`](crate::lumen_assert): a panic in debug builds,
//! a warning and a no-op in release builds.

use thiserror::Error;

/// The main error type for the Lumen engine.
#[derive(Error, Debug)]
pub enum LumenError {
    // ========================================================================
    // Invariant Violations
    // ========================================================================
    /// A generic broken invariant, with an explanation.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// A library already holds a resource with this name.
    #[error("Duplicate {kind} '{name}'")]
    DuplicateResource {
        /// Resource kind ("shader", "material", ...)
        kind: &'static str,
        /// The offending name
        name: String,
    },

    /// An index was outside the valid range.
    #[error("Index out of bounds: {what} (index: {index}, len: {len})")]
    IndexOutOfBounds {
        /// Description of what was being accessed
        what: String,
        /// The invalid index
        index: usize,
        /// Number of valid entries
        len: usize,
    },

    /// A vertex buffer without a layout was attached to a drawable.
    #[error("Invalid vertex layout: {0}")]
    InvalidLayout(String),

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// The requested resource is not registered.
    #[error("{kind} not found: '{name}'")]
    ResourceNotFound {
        /// Resource kind
        kind: &'static str,
        /// The name that was looked up
        name: String,
    },

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding error.
    #[error("Image error: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The requested operation does not support this format or extension.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Cube map faces are inconsistent.
    #[error("Cube map error: {0}")]
    CubeMap(String),

    // ========================================================================
    // Shader Errors
    // ========================================================================
    /// A shader stage failed to compile or the program failed to link.
    #[error("Failed to compile {stage} stage of shader '{shader}': {log}")]
    ShaderCompilation {
        /// Shader name
        shader: String,
        /// Stage name ("vertex", "fragment", "geometry", "link", ...)
        stage: String,
        /// Compiler output
        log: String,
    },

    // ========================================================================
    // Backend Errors
    // ========================================================================
    /// The selected graphics API cannot be used.
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// A graphics API call failed (object creation, incomplete framebuffer).
    #[error("Graphics backend error: {0}")]
    Backend(String),

    /// No compatible GPU adapter was found.
    #[error("Failed to request WGPU adapter: {0}")]
    AdapterNotFound(String),

    /// Failed to create the GPU device.
    #[error("Failed to create WGPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    /// Failed to create the presentation surface.
    #[error("Failed to create surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    /// The surface could not provide a frame.
    #[error("Surface error: {0}")]
    Surface(String),

    /// Window system error.
    #[error("Window system error: {0}")]
    Window(#[from] raw_window_handle::HandleError),

    /// Event loop error (winit).
    #[cfg(feature = "winit")]
    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    /// GPU buffer mapping failed during readback.
    #[error("Buffer mapping failed: {0}")]
    BufferMap(String),
}

/// Alias for `Result<T, LumenError>`.
pub type Result<T> = std::result::Result<T, LumenError>;

/// Checks an invariant that has no error channel.
///
/// Debug builds panic with the message. Release builds log a warning and
/// evaluate to `false` so the caller can skip the operation.
#[macro_export]
macro_rules! lumen_assert {
    ($cond:expr, $($arg:tt)+) => {{
        let ok: bool = $cond;
        if !ok {
            if cfg!(debug_assertions) {
                panic!($($arg)+);
            }
            $crate::__log::warn!($($arg)+);
        }
        ok
    }};
}

/// Logs at the highest severity. `log` has no critical level, so these are
/// error records tagged with a `CRITICAL:` prefix.
#[macro_export]
macro_rules! lumen_critical {
    ($($arg:tt)+) => {
        $crate::__log::error!("CRITICAL: {}", format_args!($($arg)+))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_resource_names_kind_and_name() {
        let err = LumenError::DuplicateResource {
            kind: "material",
            name: "Phong".into(),
        };
        assert_eq!(err.to_string(), "Duplicate material 'Phong'");
    }

    #[test]
    fn assert_macro_passes_through_true() {
        let ok = lumen_assert!(1 + 1 == 2, "math is broken");
        assert!(ok);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "nested pass")]
    fn assert_macro_panics_in_debug() {
        let _ = lumen_assert!(false, "nested pass");
    }
}
