//! Configuration module
//!
//! Loads and validates timer definitions from YAML, and validates the
//! partial configurations used for dynamic create and update.

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{ConfigLimits, ConfigLoader, LoadResult, LoadWarning, LoaderOptions};
pub use schema::*;
pub use validation::{ValidationResult, Validator, merge, slugify};
