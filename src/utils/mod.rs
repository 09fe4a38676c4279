//! Utility Module
//!
//! - [`Library`]: insertion-ordered named resource storage
//! - [`ResourcesManager`]: process-wide asset roots
//! - [`time`]: frame timing ([`Timer`], [`Timestep`])

pub mod library;
pub mod resources;
pub mod time;

pub use library::Library;
pub use resources::ResourcesManager;
pub use time::{Timer, Timestep};
