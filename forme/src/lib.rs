//! # forme
//!
//! Form templates for template designers.
//!
//! This is the meta-crate that re-exports the sub-crates for convenient
//! access, plus a few helpers that wire them together. Depend on `forme`
//! to get everything, or on individual crates for finer-grained control.

use std::path::Path;

use forme_core::error::{FormeError, FormeResult};
use forme_core::settings::FormeSettings;
use forme_template::{Context, ContextValue, Engine};

/// Error types, settings, and logging setup.
pub use forme_core as core;

/// The template engine hosting the tags.
pub use forme_template as template;

/// The forme tag library.
pub use forme_tags as tags;

/// Forms and bound fields.
#[cfg(feature = "forms")]
pub use forme_forms as forms;

pub use tracing;
pub use tracing_subscriber;

/// Builds an engine from `settings` with the forme tags installed.
pub fn engine(settings: FormeSettings) -> Engine {
    let mut engine = Engine::from_settings(&settings);
    forme_tags::install(&mut engine, settings);
    engine
}

/// Loads settings from a TOML file (when given) and the environment,
/// initializes logging, and builds an engine.
///
/// # Errors
///
/// Returns a `ConfigurationError` if the file cannot be read or parsed.
pub fn init(config: Option<&Path>) -> FormeResult<Engine> {
    let settings = match config {
        Some(path) => forme_core::settings_loader::from_toml_file_with_env(path)?,
        None => forme_core::settings_loader::from_env(),
    };
    forme_core::logging::setup_logging(&settings);
    tracing::info!(
        styles = settings.styles.len(),
        default_style = ?settings.default_style,
        "forme initialized"
    );
    Ok(engine(settings))
}

/// Renders `form` with the default style, or with the named `style`.
///
/// # Errors
///
/// Returns `InvalidStyle` for a style name that cannot be written as a
/// quoted target, and any render error.
pub fn render_form(engine: &Engine, form: ContextValue, style: Option<&str>) -> FormeResult<String> {
    let source = match style {
        Some(name)
            if name.is_empty() || name.contains(|c: char| c == '"' || c == '\'' || c.is_whitespace()) =>
        {
            return Err(FormeError::InvalidStyle(format!("Invalid style name '{name}'")));
        }
        Some(name) => format!("{{% forme form \"{name}\" %}}"),
        None => "{% forme form %}".to_string(),
    };
    let mut context = Context::new();
    context.set("form", form);
    engine.render_string(&source, &mut context)
}

/// Renders the template `name` with `form` bound in its context.
///
/// # Errors
///
/// Returns loading, compile and render errors.
pub fn render_template_with_form(engine: &Engine, name: &str, form: ContextValue) -> FormeResult<String> {
    let mut context = Context::new();
    context.set("form", form);
    engine.render_to_string(name, &mut context)
}
