//! # forme-forms
//!
//! The form objects the forme tags render. A [`Form`] owns its field
//! definitions together with submitted data and validation errors, and
//! exposes [`BoundField`]s to templates through
//! [`TemplateObject`](forme_template::context::TemplateObject).
//!
//! ## Modules
//!
//! - [`fields`] - Field definitions and builders
//! - [`widgets`] - HTML widgets
//! - [`bound_field`] - Fields bound to data and errors
//! - [`form`] - The [`Form`] container

pub mod bound_field;
pub mod fields;
pub mod form;
pub mod widgets;

pub use bound_field::BoundField;
pub use fields::FieldDef;
pub use form::Form;
pub use widgets::WidgetType;
