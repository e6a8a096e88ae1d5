//! The `label` value bound while rendering `{% label %}`.

use std::any::Any;
use std::fmt;

use forme_template::context::{ContextValue, TemplateObject};

/// A field label: the id it points at, its text, and the ready-made
/// `<label>` markup. Displays as the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    /// The `for` target.
    pub id: String,
    /// The label text.
    pub label: String,
    /// The rendered `<label>` element.
    pub tag: String,
}

impl Label {
    /// Builds the label of a bound field value.
    pub fn from_field(field: &ContextValue) -> Self {
        let attr = |name: &str| {
            field
                .resolve_path(name)
                .map(|value| value.to_display_string())
                .unwrap_or_default()
        };
        Self {
            id: attr("id_for_label"),
            label: attr("label"),
            tag: attr("label_tag"),
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag)
    }
}

impl TemplateObject for Label {
    fn attr(&self, name: &str) -> Option<ContextValue> {
        match name {
            "id" => Some(ContextValue::from(self.id.as_str())),
            "label" => Some(ContextValue::from(self.label.as_str())),
            "tag" => Some(ContextValue::SafeString(self.tag.clone())),
            _ => None,
        }
    }

    fn render_html(&self) -> String {
        self.tag.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_label_from_dict_field() {
        let field = ContextValue::Dict(HashMap::from([
            ("id_for_label".to_string(), ContextValue::from("id_email")),
            ("label".to_string(), ContextValue::from("Email")),
            (
                "label_tag".to_string(),
                ContextValue::SafeString(r#"<label for="id_email">Email</label>"#.to_string()),
            ),
        ]));
        let label = Label::from_field(&field);
        assert_eq!(label.id, "id_email");
        assert_eq!(label.label, "Email");
        assert_eq!(label.to_string(), r#"<label for="id_email">Email</label>"#);
    }

    #[test]
    fn test_label_attrs_and_display() {
        let label = Label {
            id: "id_a".into(),
            label: "A & B".into(),
            tag: "<label>A &amp; B</label>".into(),
        };
        let value = ContextValue::object(label);
        assert!(value.is_safe());
        assert_eq!(value.to_display_string(), "<label>A &amp; B</label>");
        assert_eq!(value.resolve_path("label").unwrap().to_display_string(), "A & B");
        assert!(value.resolve_path("tag").unwrap().is_safe());
        assert!(value.resolve_path("missing").is_none());
    }

    #[test]
    fn test_label_from_missing_field_is_empty() {
        let label = Label::from_field(&ContextValue::None);
        assert_eq!(label, Label { id: String::new(), label: String::new(), tag: String::new() });
    }
}
