//! # forme-core
//!
//! Error types, settings, and logging shared by every forme crate. This crate
//! has no forme dependencies and provides the foundation for the others.
//!
//! ## Modules
//!
//! - [`error`] - The [`FormeError`] enum and result alias
//! - [`settings`] - Style configuration ([`FormeSettings`])
//! - [`settings_loader`] - Loading settings from TOML/JSON files and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{FormeError, FormeResult};
pub use settings::FormeSettings;
