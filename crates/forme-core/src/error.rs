//! Core error types for the forme crates.
//!
//! [`FormeError`] covers the whole surface: host template syntax and loading
//! failures, the grammar and style-resolution failures raised by the forme
//! tags, and configuration problems. Every failure is fail-fast; nothing is
//! retried and no partial output is produced.

use thiserror::Error;

/// The primary error type shared by all forme crates.
///
/// Variants are grouped by the phase they are raised in. Template syntax,
/// nesting and missing-parameter errors abort template compilation; the rest
/// abort the current render call. See [`FormeError::is_syntax_error`].
#[derive(Error, Debug)]
pub enum FormeError {
    // ── Template compilation ─────────────────────────────────────────

    /// A template contains invalid syntax.
    #[error("Template syntax error: {0}")]
    TemplateSyntaxError(String),

    /// The requested template could not be found by any loader.
    #[error("Template does not exist: {0}")]
    TemplateDoesNotExist(String),

    /// A forme tag was nested under a tag that does not permit it.
    #[error("Invalid nesting: {{% {tag} %}} cannot contain {}", .children.join(", "))]
    InvalidNesting {
        /// The enclosing tag name.
        tag: String,
        /// The offending child tag names, in source order.
        children: Vec<String>,
    },

    /// The root tag was declared with neither a target nor an action.
    #[error("Missing form parameter: {{% {0} %}} requires a target or an action")]
    MissingFormParameter(String),

    /// A tag factory was asked for a tag name outside the grammar.
    #[error("Unknown tag kind: '{0}'")]
    UnknownTagKind(String),

    // ── Rendering ────────────────────────────────────────────────────

    /// No template body was found for a tag in the node, its ancestors,
    /// or the configured style.
    #[error("Template for tag {0} is missing.")]
    MissingTemplate(String),

    /// A tag was rendered where a variable it depends on is not bound.
    #[error("Invalid context: {{% {tag} %}} requires '{variable}' in context")]
    InvalidContext {
        /// The tag being rendered.
        tag: String,
        /// The context variable that was expected.
        variable: String,
    },

    /// The root tag's target resolved to nothing.
    #[error("Missing form: {{% {0} %}} target resolved to an empty value")]
    MissingForm(String),

    /// A style template does not contain exactly one root tag.
    #[error("Invalid style template: {0}")]
    InvalidStyle(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FormeError {
    /// Returns `true` for errors raised while compiling a template, as
    /// opposed to errors raised while rendering one.
    pub const fn is_syntax_error(&self) -> bool {
        matches!(
            self,
            Self::TemplateSyntaxError(_)
                | Self::InvalidNesting { .. }
                | Self::MissingFormParameter(_)
                | Self::UnknownTagKind(_)
        )
    }

    /// Creates an [`FormeError::InvalidContext`] error.
    pub fn invalid_context(tag: impl Into<String>, variable: impl Into<String>) -> Self {
        Self::InvalidContext {
            tag: tag.into(),
            variable: variable.into(),
        }
    }
}

/// A convenience type alias for `Result<T, FormeError>`.
pub type FormeResult<T> = Result<T, FormeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_template_display() {
        let err = FormeError::MissingTemplate("field".into());
        assert_eq!(err.to_string(), "Template for tag field is missing.");
    }

    #[test]
    fn test_invalid_nesting_display() {
        let err = FormeError::InvalidNesting {
            tag: "field".into(),
            children: vec!["row".into(), "label".into()],
        };
        assert_eq!(
            err.to_string(),
            "Invalid nesting: {% field %} cannot contain row, label"
        );
    }

    #[test]
    fn test_invalid_context_display() {
        let err = FormeError::invalid_context("label", "field");
        assert_eq!(
            err.to_string(),
            "Invalid context: {% label %} requires 'field' in context"
        );
    }

    #[test]
    fn test_syntax_error_classification() {
        assert!(FormeError::TemplateSyntaxError("x".into()).is_syntax_error());
        assert!(FormeError::MissingFormParameter("forme".into()).is_syntax_error());
        assert!(FormeError::UnknownTagKind("42_fish".into()).is_syntax_error());
        assert!(!FormeError::MissingTemplate("field".into()).is_syntax_error());
        assert!(!FormeError::MissingForm("forme".into()).is_syntax_error());
        assert!(!FormeError::invalid_context("row", "fieldset").is_syntax_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: FormeError = io_err.into();
        assert!(err.to_string().contains("file missing"));
    }
}
