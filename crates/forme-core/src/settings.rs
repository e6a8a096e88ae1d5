//! Settings for the forme tag library.
//!
//! [`FormeSettings`] holds the configuration the tags consume from the host:
//! the named-style-to-template-path mapping and the default style, plus the
//! engine options needed to find and render those templates.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// The name of the style shipped with the crate.
pub const BARE_STYLE: &str = "bare";

/// The template path of the style shipped with the crate.
pub const BARE_STYLE_TEMPLATE: &str = "forme/bare.html";

/// The complete set of forme settings.
///
/// # Examples
///
/// ```
/// use forme_core::settings::FormeSettings;
///
/// let settings = FormeSettings::default();
/// assert_eq!(settings.default_style.as_deref(), Some("bare"));
/// assert_eq!(settings.style_template("bare"), Some("forme/bare.html"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormeSettings {
    // ── Styles ───────────────────────────────────────────────────────

    /// Named styles, mapping a style name to the template that defines it.
    pub styles: BTreeMap<String, String>,
    /// The style consulted when a form does not define a tag's template.
    /// `None` disables the fallback entirely.
    pub default_style: Option<String>,

    // ── Engine ───────────────────────────────────────────────────────

    /// Directories searched for template files.
    pub template_dirs: Vec<PathBuf>,
    /// Whether variable output is HTML-escaped by default.
    pub auto_escape: bool,

    // ── Logging ──────────────────────────────────────────────────────

    /// Whether debug mode (human-readable logs) is enabled.
    pub debug: bool,
    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,
}

impl Default for FormeSettings {
    fn default() -> Self {
        let mut styles = BTreeMap::new();
        styles.insert(BARE_STYLE.to_string(), BARE_STYLE_TEMPLATE.to_string());

        Self {
            styles,
            default_style: Some(BARE_STYLE.to_string()),
            template_dirs: Vec::new(),
            auto_escape: true,
            debug: true,
            log_level: "info".to_string(),
        }
    }
}

impl FormeSettings {
    /// Returns the template path registered for a named style.
    pub fn style_template(&self, name: &str) -> Option<&str> {
        self.styles.get(name).map(String::as_str)
    }

    /// Returns the template path of the default style, if one is configured
    /// and registered.
    pub fn default_style_template(&self) -> Option<&str> {
        self.default_style
            .as_deref()
            .and_then(|name| self.style_template(name))
    }

    /// Returns `true` if `name` is a registered style name.
    pub fn has_style(&self, name: &str) -> bool {
        self.styles.contains_key(name)
    }

    /// Registers (or replaces) a named style.
    #[must_use]
    pub fn with_style(mut self, name: impl Into<String>, template: impl Into<String>) -> Self {
        self.styles.insert(name.into(), template.into());
        self
    }

    /// Sets the default style. `None` disables the style fallback.
    #[must_use]
    pub fn with_default_style(mut self, name: Option<&str>) -> Self {
        self.default_style = name.map(str::to_string);
        self
    }
}
