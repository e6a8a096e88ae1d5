//! Widgets render a field's HTML element.
//!
//! Each widget knows how to render itself for a given name and value, and
//! which `id` its `<label>` should point at.

use std::collections::BTreeMap;
use std::fmt;

use forme_template::context::escape_html;

/// Enumerates the built-in widget types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetType {
    /// `<input type="text">`.
    TextInput,
    /// `<input type="number">`.
    NumberInput,
    /// `<input type="email">`.
    EmailInput,
    /// `<input type="password">`. Never echoes the submitted value.
    PasswordInput,
    /// `<input type="hidden">`.
    HiddenInput,
    /// `<input type="checkbox">`.
    CheckboxInput,
    /// `<textarea>`.
    Textarea,
}

impl WidgetType {
    /// The `type` attribute for `<input>` widgets.
    const fn input_type(self) -> Option<&'static str> {
        match self {
            Self::TextInput => Some("text"),
            Self::NumberInput => Some("number"),
            Self::EmailInput => Some("email"),
            Self::PasswordInput => Some("password"),
            Self::HiddenInput => Some("hidden"),
            Self::CheckboxInput => Some("checkbox"),
            Self::Textarea => None,
        }
    }
}

impl fmt::Display for WidgetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TextInput => "TextInput",
            Self::NumberInput => "NumberInput",
            Self::EmailInput => "EmailInput",
            Self::PasswordInput => "PasswordInput",
            Self::HiddenInput => "HiddenInput",
            Self::CheckboxInput => "CheckboxInput",
            Self::Textarea => "Textarea",
        };
        write!(f, "{name}")
    }
}

/// An HTML form widget.
pub trait Widget: Send + Sync + fmt::Debug {
    /// Returns the widget type.
    fn widget_type(&self) -> WidgetType;

    /// Renders the widget as an HTML string.
    fn render(&self, name: &str, value: Option<&str>, attrs: &BTreeMap<String, String>) -> String;

    /// Returns the `id` a `<label>` for this widget should target.
    fn id_for_label(&self, id: &str) -> String {
        id.to_string()
    }

    /// Returns `true` for widgets that render no visible element.
    fn is_hidden(&self) -> bool {
        self.widget_type() == WidgetType::HiddenInput
    }
}

/// Formats attributes as ` key="value"`, in key order.
fn render_attrs(attrs: &BTreeMap<String, String>) -> String {
    attrs
        .iter()
        .map(|(k, v)| format!(r#" {k}="{}""#, escape_html(v)))
        .collect()
}

/// A single `<input>` element of any `type`.
#[derive(Debug, Clone)]
pub struct Input {
    widget_type: WidgetType,
}

impl Widget for Input {
    fn widget_type(&self) -> WidgetType {
        self.widget_type
    }

    fn render(&self, name: &str, value: Option<&str>, attrs: &BTreeMap<String, String>) -> String {
        let input_type = self.widget_type.input_type().unwrap_or("text");
        let value = match self.widget_type {
            WidgetType::PasswordInput | WidgetType::CheckboxInput => None,
            _ => value.filter(|v| !v.is_empty()),
        };
        let value_attr = value
            .map(|v| format!(r#" value="{}""#, escape_html(v)))
            .unwrap_or_default();
        format!(
            r#"<input type="{input_type}" name="{name}"{value_attr}{}>"#,
            render_attrs(attrs)
        )
    }
}

/// A `<textarea>` widget.
#[derive(Debug, Clone)]
pub struct Textarea;

impl Widget for Textarea {
    fn widget_type(&self) -> WidgetType {
        WidgetType::Textarea
    }

    fn render(&self, name: &str, value: Option<&str>, attrs: &BTreeMap<String, String>) -> String {
        format!(
            r#"<textarea name="{name}"{}>{}</textarea>"#,
            render_attrs(attrs),
            escape_html(value.unwrap_or_default())
        )
    }
}

/// Creates the widget for a widget type.
pub fn create_widget(widget_type: WidgetType) -> Box<dyn Widget> {
    match widget_type {
        WidgetType::Textarea => Box::new(Textarea),
        other => Box::new(Input { widget_type: other }),
    }
}
