//! Bound fields: form fields populated with data and errors.
//!
//! A [`BoundField`] pairs a field definition with its current value, its
//! validation errors and the widget used for rendering. It is what the
//! forme tags bind to `field` while rendering a form, and what templates
//! reach through `{{ field.label }}`, `{{ field.errors }}` and friends.

use std::any::Any;
use std::collections::BTreeMap;

use forme_template::context::{escape_html, ContextValue, TemplateObject};

use crate::fields::FieldDef;
use crate::widgets::{self, Widget};

/// A form field bound to data and validation state.
#[derive(Debug)]
pub struct BoundField {
    /// The field's HTML name attribute (prefixed when the form has a prefix).
    pub html_name: String,
    /// The field definition.
    pub field: FieldDef,
    /// The value rendered in the widget.
    pub data: Option<String>,
    /// Validation error messages for this field.
    pub errors: Vec<String>,
    widget: Box<dyn Widget>,
}

impl BoundField {
    /// Creates a new `BoundField` from a field definition and current state.
    pub fn new(
        field: &FieldDef,
        data: Option<String>,
        errors: Vec<String>,
        prefix: Option<&str>,
    ) -> Self {
        let html_name = match prefix {
            Some(p) => format!("{p}-{}", field.name),
            None => field.name.clone(),
        };

        Self {
            html_name,
            widget: widgets::create_widget(field.widget),
            data: data.or_else(|| field.initial.clone()),
            errors,
            field: field.clone(),
        }
    }

    /// The unprefixed field name.
    pub fn name(&self) -> &str {
        &self.field.name
    }

    /// The human-readable label.
    pub fn label(&self) -> &str {
        &self.field.label
    }

    /// Returns the auto-generated HTML `id` for this field.
    pub fn auto_id(&self) -> String {
        format!("id_{}", self.html_name)
    }

    /// The `id` a `<label>` for this field should point at.
    pub fn id_for_label(&self) -> String {
        self.widget.id_for_label(&self.auto_id())
    }

    /// Returns `true` if the field renders with a hidden widget.
    pub fn is_hidden(&self) -> bool {
        self.widget.is_hidden()
    }

    /// Returns `true` if this field has any errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Renders the widget HTML for this bound field.
    pub fn render(&self, extra_attrs: &BTreeMap<String, String>) -> String {
        let mut attrs = extra_attrs.clone();
        attrs.entry("id".to_string()).or_insert_with(|| self.auto_id());
        if self.field.required && !self.is_hidden() {
            attrs.insert("required".to_string(), "required".to_string());
        }
        if self.field.disabled {
            attrs.insert("disabled".to_string(), "disabled".to_string());
        }
        self.widget.render(&self.html_name, self.data.as_deref(), &attrs)
    }

    /// Renders a `<label>` element for this field.
    pub fn label_tag(&self) -> String {
        let label = escape_html(&self.field.label);
        let label_id = self.id_for_label();
        if label_id.is_empty() {
            format!("<label>{label}</label>")
        } else {
            format!(r#"<label for="{label_id}">{label}</label>"#)
        }
    }

    /// Renders the error list as an HTML `<ul>` element.
    pub fn errors_as_ul(&self) -> String {
        if self.errors.is_empty() {
            return String::new();
        }
        let items: String = self
            .errors
            .iter()
            .map(|e| format!("<li>{}</li>", escape_html(e)))
            .collect();
        format!(r#"<ul class="errorlist">{items}</ul>"#)
    }
}

impl TemplateObject for BoundField {
    fn attr(&self, name: &str) -> Option<ContextValue> {
        let value = match name {
            "name" => ContextValue::from(self.name()),
            "html_name" => ContextValue::from(self.html_name.as_str()),
            "label" => ContextValue::from(self.label()),
            "auto_id" => ContextValue::from(self.auto_id()),
            "id_for_label" => ContextValue::from(self.id_for_label()),
            "label_tag" => ContextValue::SafeString(self.label_tag()),
            "errors" => ContextValue::from(self.errors.clone()),
            "errors_as_ul" => ContextValue::SafeString(self.errors_as_ul()),
            "help_text" => ContextValue::from(self.field.help_text.as_str()),
            "is_hidden" => ContextValue::Bool(self.is_hidden()),
            "required" => ContextValue::Bool(self.field.required),
            "value" => ContextValue::from(self.data.clone()),
            "widget_type" => ContextValue::from(self.widget.widget_type().to_string()),
            _ => return None,
        };
        Some(value)
    }

    fn render_html(&self) -> String {
        self.render(&BTreeMap::new())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::WidgetType;

    fn text_field(name: &str) -> FieldDef {
        FieldDef::new(name, WidgetType::TextInput)
    }

    #[test]
    fn test_bound_field_new() {
        let bf = BoundField::new(&text_field("username"), Some("alice".into()), vec![], None);
        assert_eq!(bf.name(), "username");
        assert_eq!(bf.html_name, "username");
        assert_eq!(bf.data.as_deref(), Some("alice"));
        assert!(!bf.has_errors());
    }

    #[test]
    fn test_bound_field_with_prefix() {
        let bf = BoundField::new(&text_field("username"), None, vec![], Some("login"));
        assert_eq!(bf.html_name, "login-username");
        assert_eq!(bf.name(), "username");
        assert_eq!(bf.auto_id(), "id_login-username");
    }

    #[test]
    fn test_bound_field_initial_value() {
        let field = text_field("city").initial("Prague");
        let bf = BoundField::new(&field, None, vec![], None);
        assert_eq!(bf.data.as_deref(), Some("Prague"));
    }

    #[test]
    fn test_bound_field_render() {
        let bf = BoundField::new(&text_field("username"), Some("alice".into()), vec![], None);
        assert_eq!(
            bf.render_html(),
            r#"<input type="text" name="username" value="alice" id="id_username" required="required">"#
        );
    }

    #[test]
    fn test_bound_field_label_tag() {
        let bf = BoundField::new(&text_field("first_name").label("First Name"), None, vec![], None);
        assert_eq!(bf.label_tag(), r#"<label for="id_first_name">First Name</label>"#);
    }

    #[test]
    fn test_bound_field_errors_as_ul() {
        let bf = BoundField::new(
            &text_field("email"),
            None,
            vec!["This field is required.".to_string()],
            None,
        );
        assert_eq!(
            bf.errors_as_ul(),
            r#"<ul class="errorlist"><li>This field is required.</li></ul>"#
        );
        let clean = BoundField::new(&text_field("email"), None, vec![], None);
        assert_eq!(clean.errors_as_ul(), "");
    }

    #[test]
    fn test_bound_field_hidden() {
        let bf = BoundField::new(&text_field("next").hidden(), Some("/".into()), vec![], None);
        assert!(bf.is_hidden());
        assert!(!bf.render_html().contains("required"));
    }

    #[test]
    fn test_bound_field_attrs() {
        let bf = BoundField::new(
            &text_field("email").help_text("We never share it"),
            None,
            vec!["Bad".into()],
            None,
        );
        assert_eq!(bf.attr("name").unwrap().to_display_string(), "email");
        assert_eq!(bf.attr("label").unwrap().to_display_string(), "Email");
        assert_eq!(bf.attr("id_for_label").unwrap().to_display_string(), "id_email");
        assert!(bf.attr("label_tag").unwrap().is_safe());
        assert_eq!(bf.attr("errors").unwrap().len(), Some(1));
        assert_eq!(bf.attr("help_text").unwrap().to_display_string(), "We never share it");
        assert_eq!(bf.attr("is_hidden").unwrap(), ContextValue::Bool(false));
        assert!(bf.attr("value").unwrap() == ContextValue::None);
        assert!(bf.attr("unknown").is_none());
    }
}
