//! Forms exposed to templates.
//!
//! A [`Form`] is a list of field definitions plus the state a view hands
//! to the template: submitted data, per-field errors and form-level
//! (non-field) errors. Validation itself belongs to the host application;
//! the form only carries its outcome.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use forme_template::context::{ContextValue, TemplateObject};

use crate::bound_field::BoundField;
use crate::fields::FieldDef;

/// A form together with its data and validation state.
///
/// # Examples
///
/// ```
/// use forme_forms::fields::FieldDef;
/// use forme_forms::form::Form;
/// use forme_forms::widgets::WidgetType;
///
/// let form = Form::new(vec![
///     FieldDef::new("email", WidgetType::EmailInput),
///     FieldDef::new("next", WidgetType::TextInput).hidden(),
/// ])
/// .with_errors([("email", vec!["Enter a valid email address."])]);
///
/// assert_eq!(form.visible_fields().len(), 1);
/// assert_eq!(form.hidden_fields().len(), 1);
/// assert!(form.field("email").unwrap().has_errors());
/// ```
#[derive(Debug)]
pub struct Form {
    field_defs: Vec<FieldDef>,
    data: HashMap<String, String>,
    errors: HashMap<String, Vec<String>>,
    non_field_errors: Vec<String>,
    prefix: Option<String>,
    bound_fields: Vec<Arc<BoundField>>,
}

impl Form {
    /// Creates a form with the given field definitions and no data.
    pub fn new(fields: Vec<FieldDef>) -> Self {
        let mut form = Self {
            field_defs: fields,
            data: HashMap::new(),
            errors: HashMap::new(),
            non_field_errors: Vec::new(),
            prefix: None,
            bound_fields: Vec::new(),
        };
        form.rebind();
        form
    }

    /// Sets the submitted values, keyed by unprefixed field name.
    #[must_use]
    pub fn with_data<K, V>(mut self, data: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.rebind();
        self
    }

    /// Sets per-field validation errors.
    #[must_use]
    pub fn with_errors<K, E>(mut self, errors: impl IntoIterator<Item = (K, Vec<E>)>) -> Self
    where
        K: Into<String>,
        E: Into<String>,
    {
        self.errors = errors
            .into_iter()
            .map(|(k, errs)| (k.into(), errs.into_iter().map(Into::into).collect()))
            .collect();
        self.rebind();
        self
    }

    /// Sets the form-level errors.
    #[must_use]
    pub fn with_non_field_errors<E: Into<String>>(mut self, errors: impl IntoIterator<Item = E>) -> Self {
        self.non_field_errors = errors.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the form prefix, applied to every field's HTML name.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self.rebind();
        self
    }

    fn rebind(&mut self) {
        self.bound_fields = self
            .field_defs
            .iter()
            .map(|field| {
                Arc::new(BoundField::new(
                    field,
                    self.data.get(&field.name).cloned(),
                    self.errors.get(&field.name).cloned().unwrap_or_default(),
                    self.prefix.as_deref(),
                ))
            })
            .collect();
    }

    /// Returns the bound fields in declaration order.
    pub fn fields(&self) -> &[Arc<BoundField>] {
        &self.bound_fields
    }

    /// Looks up a bound field by its unprefixed name.
    pub fn field(&self, name: &str) -> Option<&Arc<BoundField>> {
        self.bound_fields.iter().find(|f| f.name() == name)
    }

    /// Returns the fields rendered with a visible widget.
    pub fn visible_fields(&self) -> Vec<Arc<BoundField>> {
        self.bound_fields.iter().filter(|f| !f.is_hidden()).cloned().collect()
    }

    /// Returns the fields rendered with a hidden widget.
    pub fn hidden_fields(&self) -> Vec<Arc<BoundField>> {
        self.bound_fields.iter().filter(|f| f.is_hidden()).cloned().collect()
    }

    /// Returns the form-level errors.
    pub fn non_field_errors(&self) -> &[String] {
        &self.non_field_errors
    }

    /// Returns the per-field errors.
    pub const fn errors(&self) -> &HashMap<String, Vec<String>> {
        &self.errors
    }

    /// Returns the form prefix.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Returns `true` if the form carries no errors at all.
    pub fn is_valid(&self) -> bool {
        self.non_field_errors.is_empty() && self.errors.values().all(Vec::is_empty)
    }
}

fn field_list(fields: &[Arc<BoundField>]) -> ContextValue {
    ContextValue::List(
        fields
            .iter()
            .map(|f| ContextValue::Object(Arc::clone(f) as Arc<dyn TemplateObject>))
            .collect(),
    )
}

impl TemplateObject for Form {
    fn attr(&self, name: &str) -> Option<ContextValue> {
        match name {
            "fields" => Some(field_list(&self.bound_fields)),
            "visible_fields" => Some(field_list(&self.visible_fields())),
            "hidden_fields" => Some(field_list(&self.hidden_fields())),
            "non_field_errors" => Some(ContextValue::from(self.non_field_errors.clone())),
            "errors" => Some(ContextValue::Dict(
                self.errors
                    .iter()
                    .map(|(k, v)| (k.clone(), ContextValue::from(v.clone())))
                    .collect(),
            )),
            "prefix" => Some(ContextValue::from(self.prefix.clone())),
            "is_valid" => Some(ContextValue::Bool(self.is_valid())),
            _ => self
                .field(name)
                .map(|f| ContextValue::Object(Arc::clone(f) as Arc<dyn TemplateObject>)),
        }
    }

    fn render_html(&self) -> String {
        self.bound_fields
            .iter()
            .map(|f| {
                if f.is_hidden() {
                    f.render_html()
                } else {
                    format!("<p>{}{} {}</p>", f.errors_as_ul(), f.label_tag(), f.render_html())
                }
            })
            .collect()
    }

    fn items(&self) -> Option<Vec<ContextValue>> {
        match field_list(&self.bound_fields) {
            ContextValue::List(items) => Some(items),
            _ => None,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widgets::WidgetType;

    fn login_form() -> Form {
        Form::new(vec![
            FieldDef::new("username", WidgetType::TextInput),
            FieldDef::new("password", WidgetType::PasswordInput),
            FieldDef::new("next", WidgetType::TextInput).hidden(),
        ])
    }

    #[test]
    fn test_form_fields_in_order() {
        let form = login_form();
        let names: Vec<&str> = form.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["username", "password", "next"]);
    }

    #[test]
    fn test_form_visible_and_hidden() {
        let form = login_form();
        assert_eq!(form.visible_fields().len(), 2);
        assert_eq!(form.hidden_fields().len(), 1);
        assert_eq!(form.hidden_fields()[0].name(), "next");
    }

    #[test]
    fn test_form_with_data_and_errors() {
        let form = login_form()
            .with_data([("username", "alice")])
            .with_errors([("password", vec!["This field is required."])])
            .with_non_field_errors(["Invalid login"]);
        assert_eq!(form.field("username").unwrap().data.as_deref(), Some("alice"));
        assert!(form.field("password").unwrap().has_errors());
        assert_eq!(form.non_field_errors(), &["Invalid login".to_string()]);
        assert!(!form.is_valid());
    }

    #[test]
    fn test_form_prefix() {
        let form = login_form().with_prefix("login");
        assert_eq!(form.prefix(), Some("login"));
        assert_eq!(form.field("username").unwrap().html_name, "login-username");
    }

    #[test]
    fn test_form_attr_field_lookup_is_stable() {
        let form = login_form();
        let a = form.attr("username").unwrap();
        let b = form.attr("username").unwrap();
        assert_eq!(a, b);
        assert!(form.attr("missing").is_none());
    }

    #[test]
    fn test_form_attr_lists() {
        let form = login_form().with_non_field_errors(["x"]);
        assert_eq!(form.attr("fields").unwrap().len(), Some(3));
        assert_eq!(form.attr("visible_fields").unwrap().len(), Some(2));
        assert_eq!(form.attr("hidden_fields").unwrap().len(), Some(1));
        assert_eq!(form.attr("non_field_errors").unwrap().len(), Some(1));
        assert_eq!(form.items().unwrap().len(), 3);
    }

    #[test]
    fn test_form_render_html() {
        let form = Form::new(vec![FieldDef::new("email", WidgetType::EmailInput)]);
        assert_eq!(
            form.render_html(),
            r#"<p><label for="id_email">Email</label> <input type="email" name="email" id="id_email" required="required"></p>"#
        );
    }
}
