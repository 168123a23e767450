//! System management for the Trellis framework
//!
//! This module provides framework bootstrap, configuration and shutdown.

pub mod bootstrap;
pub mod config;
pub mod shutdown;

// Re-export key types for convenience
pub use bootstrap::{FRAMEWORK_UUID, FRAMEWORK_VERSION};
pub use config::{ConfigError, FrameworkConfig};
