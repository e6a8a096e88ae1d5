//! Field definitions.
//!
//! A [`FieldDef`] describes one field of a [`Form`](crate::form::Form): its
//! name, label, help text and widget. Builder methods follow the usual
//! `FieldDef::new(..).label(..).help_text(..)` chain.

use crate::widgets::WidgetType;

/// Complete definition of a form field.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// The field name.
    pub name: String,
    /// Human-readable label.
    pub label: String,
    /// Help text displayed alongside the field.
    pub help_text: String,
    /// The widget used for rendering.
    pub widget: WidgetType,
    /// Whether this field is required.
    pub required: bool,
    /// Whether the field is disabled (rendered but not editable).
    pub disabled: bool,
    /// Value rendered when the form has no data for the field.
    pub initial: Option<String>,
}

impl FieldDef {
    /// Creates a new field. The label defaults to the name with underscores
    /// replaced by spaces and the first letter capitalized.
    pub fn new(name: impl Into<String>, widget: WidgetType) -> Self {
        let name = name.into();
        let label = pretty_name(&name);
        Self {
            name,
            label,
            help_text: String::new(),
            widget,
            required: true,
            disabled: false,
            initial: None,
        }
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the help text.
    #[must_use]
    pub fn help_text(mut self, text: impl Into<String>) -> Self {
        self.help_text = text.into();
        self
    }

    /// Renders the field with a hidden input.
    #[must_use]
    pub const fn hidden(mut self) -> Self {
        self.widget = WidgetType::HiddenInput;
        self
    }

    /// Sets whether this field is required.
    #[must_use]
    pub const fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets whether this field is disabled.
    #[must_use]
    pub const fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    /// Sets the initial value.
    #[must_use]
    pub fn initial(mut self, value: impl Into<String>) -> Self {
        self.initial = Some(value.into());
        self
    }
}

/// Turns `first_name` into `First name`.
pub fn pretty_name(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_def_defaults() {
        let f = FieldDef::new("first_name", WidgetType::TextInput);
        assert_eq!(f.label, "First name");
        assert!(f.required);
        assert!(!f.disabled);
        assert!(f.help_text.is_empty());
    }

    #[test]
    fn test_field_def_builders() {
        let f = FieldDef::new("token", WidgetType::TextInput)
            .label("Token")
            .help_text("Leave empty")
            .required(false)
            .initial("abc")
            .hidden();
        assert_eq!(f.label, "Token");
        assert_eq!(f.help_text, "Leave empty");
        assert_eq!(f.widget, WidgetType::HiddenInput);
        assert!(!f.required);
        assert_eq!(f.initial.as_deref(), Some("abc"));
    }

    #[test]
    fn test_pretty_name() {
        assert_eq!(pretty_name("email"), "Email");
        assert_eq!(pretty_name("last_name"), "Last name");
        assert_eq!(pretty_name(""), "");
    }
}
