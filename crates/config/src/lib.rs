//! Typed configuration: schema with defaults, loader with env substitution,
//! and validation diagnostics.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{discover_and_load, load_config},
    schema::ClipbotConfig,
    validate::{Diagnostic, Severity, ValidationResult},
};
