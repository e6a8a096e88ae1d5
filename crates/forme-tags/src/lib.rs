//! # forme-tags
//!
//! The forme template tags. A form layout is written with eight tags
//! (`forme`, `fieldset`, `row`, `field`, `label`, `errors`,
//! `nonfielderrors`, `hiddenfields`). Each occurrence either renders
//! (`{% field %}`) or defines how a tag renders further down
//! (`{% field "email" using %}...{% endfield %}`). Definitions cascade:
//! the nearest enclosing definition wins, then the form's root tag, then
//! the configured style template.
//!
//! ## Modules
//!
//! - [`grammar`] - Tag kinds and which kinds may nest inside which
//! - [`styles`] - Per-node template stores and target keys
//! - [`nodes`] - Compiled tags and render-time template resolution
//! - [`parser`] - Tag syntax and compilation
//! - [`label`] - The `label` value bound by `{% label %}`
//! - [`loader`] - Style templates
//!
//! ## Example
//!
//! ```
//! use forme_core::settings::FormeSettings;
//! use forme_forms::{FieldDef, Form, WidgetType};
//! use forme_template::{Context, ContextValue, Engine};
//!
//! let mut engine = Engine::new();
//! forme_tags::install(&mut engine, FormeSettings::default());
//!
//! let form = Form::new(vec![FieldDef::new("email", WidgetType::EmailInput)]);
//! let mut ctx = Context::new();
//! ctx.set("form", ContextValue::object(form));
//!
//! let out = engine
//!     .render_string(
//!         "{% forme form using %}\
//!            {% label using %}<b>{{ label.label }}</b>{% endlabel %}\
//!            {% fieldset %}\
//!          {% endforme %}",
//!         &mut ctx,
//!     )
//!     .unwrap();
//! assert!(out.contains("<b>Email</b>"));
//! assert!(out.contains(r#"<input type="email" name="email" id="id_email" required="required">"#));
//! ```

use std::sync::Arc;

use forme_core::settings::{FormeSettings, BARE_STYLE_TEMPLATE};
use forme_template::{Engine, Library};

use crate::parser::compile_tag;

pub mod grammar;
pub mod label;
pub mod loader;
pub mod nodes;
pub mod parser;
pub mod styles;

pub use grammar::TagKind;
pub use nodes::{Action, FormeNode, FormeTag};
pub use styles::{Key, StyleStore};

/// The name the tag library is registered under.
pub const LIBRARY_NAME: &str = "forme";

/// Source of the bundled `bare` style.
pub const BARE_TEMPLATE: &str = include_str!("../templates/forme/bare.html");

/// Builds the tag library. Every tag compiled from it shares `settings`.
pub fn library(settings: FormeSettings) -> Library {
    let settings = Arc::new(settings);
    let mut library = Library::new(LIBRARY_NAME);
    for kind in TagKind::ALL {
        let settings = Arc::clone(&settings);
        library.register_tag(kind.name(), move |p, token| compile_tag(p, token, &settings));
    }
    library
}

/// Registers the forme tags and the bundled `bare` style with `engine`.
pub fn install(engine: &mut Engine, settings: FormeSettings) {
    engine.add_string_template(BARE_STYLE_TEMPLATE, BARE_TEMPLATE);
    engine.register_library(library(settings));
    tracing::debug!(library = LIBRARY_NAME, "Installed forme tags");
}
