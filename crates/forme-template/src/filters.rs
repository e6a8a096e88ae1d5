//! Built-in template filters.
//!
//! The small set of filters form-layout templates reach for. Each filter is
//! registered in a [`FilterRegistry`].

use std::collections::HashMap;
use std::sync::OnceLock;

use forme_core::error::FormeError;

use crate::context::{escape_html, ContextValue};

/// A template filter function.
///
/// Takes a value and optional arguments, and returns a transformed value.
pub trait Filter: Send + Sync {
    /// Returns the filter name.
    fn name(&self) -> &'static str;

    /// Applies the filter to a value with the given arguments.
    fn apply(&self, value: &ContextValue, args: &[ContextValue])
        -> Result<ContextValue, FormeError>;
}

/// A registry of available template filters.
pub struct FilterRegistry {
    filters: HashMap<String, Box<dyn Filter>>,
}

impl FilterRegistry {
    /// Creates a new empty filter registry.
    pub fn new() -> Self {
        Self {
            filters: HashMap::new(),
        }
    }

    /// Registers a filter.
    pub fn register(&mut self, filter: Box<dyn Filter>) {
        self.filters.insert(filter.name().to_string(), filter);
    }

    /// Returns `true` if a filter with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    /// Applies a named filter to a value.
    ///
    /// # Errors
    ///
    /// Returns a `TemplateSyntaxError` for an unknown filter name.
    pub fn apply(
        &self,
        name: &str,
        value: &ContextValue,
        args: &[ContextValue],
    ) -> Result<ContextValue, FormeError> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| FormeError::TemplateSyntaxError(format!("Unknown filter: '{name}'")))?;
        filter.apply(value, args)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns the default filter registry with all built-in filters.
pub fn default_registry() -> &'static FilterRegistry {
    static REGISTRY: OnceLock<FilterRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut r = FilterRegistry::new();
        r.register(Box::new(DefaultFilter));
        r.register(Box::new(LengthFilter));
        r.register(Box::new(LowerFilter));
        r.register(Box::new(UpperFilter));
        r.register(Box::new(SafeFilter));
        r.register(Box::new(EscapeFilter));
        r.register(Box::new(JoinFilter));
        r
    })
}

/// `default:"x"` - substitutes the argument when the value is falsy.
struct DefaultFilter;

impl Filter for DefaultFilter {
    fn name(&self) -> &'static str {
        "default"
    }

    fn apply(
        &self,
        value: &ContextValue,
        args: &[ContextValue],
    ) -> Result<ContextValue, FormeError> {
        if value.is_truthy() {
            return Ok(value.clone());
        }
        args.first().cloned().ok_or_else(|| {
            FormeError::TemplateSyntaxError("default filter requires an argument".to_string())
        })
    }
}

struct LengthFilter;

impl Filter for LengthFilter {
    fn name(&self) -> &'static str {
        "length"
    }

    fn apply(
        &self,
        value: &ContextValue,
        _args: &[ContextValue],
    ) -> Result<ContextValue, FormeError> {
        Ok(ContextValue::from(value.len().unwrap_or(0)))
    }
}

struct LowerFilter;

impl Filter for LowerFilter {
    fn name(&self) -> &'static str {
        "lower"
    }

    fn apply(
        &self,
        value: &ContextValue,
        _args: &[ContextValue],
    ) -> Result<ContextValue, FormeError> {
        Ok(preserve_safety(value, value.to_display_string().to_lowercase()))
    }
}

struct UpperFilter;

impl Filter for UpperFilter {
    fn name(&self) -> &'static str {
        "upper"
    }

    fn apply(
        &self,
        value: &ContextValue,
        _args: &[ContextValue],
    ) -> Result<ContextValue, FormeError> {
        Ok(preserve_safety(value, value.to_display_string().to_uppercase()))
    }
}

struct SafeFilter;

impl Filter for SafeFilter {
    fn name(&self) -> &'static str {
        "safe"
    }

    fn apply(
        &self,
        value: &ContextValue,
        _args: &[ContextValue],
    ) -> Result<ContextValue, FormeError> {
        Ok(match value {
            ContextValue::Object(_) | ContextValue::SafeString(_) => value.clone(),
            other => ContextValue::SafeString(other.to_display_string()),
        })
    }
}

struct EscapeFilter;

impl Filter for EscapeFilter {
    fn name(&self) -> &'static str {
        "escape"
    }

    fn apply(
        &self,
        value: &ContextValue,
        _args: &[ContextValue],
    ) -> Result<ContextValue, FormeError> {
        Ok(ContextValue::SafeString(escape_html(&value.to_display_string())))
    }
}

/// `join:", "` - joins list items, escaping each unless it is safe.
struct JoinFilter;

impl Filter for JoinFilter {
    fn name(&self) -> &'static str {
        "join"
    }

    fn apply(
        &self,
        value: &ContextValue,
        args: &[ContextValue],
    ) -> Result<ContextValue, FormeError> {
        let sep = args.first().map(ContextValue::to_display_string).unwrap_or_default();
        let joined = value
            .iter_items()
            .iter()
            .map(|item| {
                if item.is_safe() {
                    item.to_display_string()
                } else {
                    escape_html(&item.to_display_string())
                }
            })
            .collect::<Vec<_>>()
            .join(&escape_html(&sep));
        Ok(ContextValue::SafeString(joined))
    }
}

fn preserve_safety(original: &ContextValue, s: String) -> ContextValue {
    if original.is_safe() {
        ContextValue::SafeString(s)
    } else {
        ContextValue::String(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(name: &str, value: ContextValue, args: &[ContextValue]) -> ContextValue {
        default_registry().apply(name, &value, args).unwrap()
    }

    #[test]
    fn test_default_filter() {
        let fallback = ContextValue::from("n/a");
        assert_eq!(
            apply("default", ContextValue::None, &[fallback.clone()]).to_display_string(),
            "n/a"
        );
        assert_eq!(
            apply("default", ContextValue::from("x"), &[fallback]).to_display_string(),
            "x"
        );
    }

    #[test]
    fn test_length_filter() {
        let v = ContextValue::from(vec!["a", "b", "c"]);
        assert_eq!(apply("length", v, &[]).to_display_string(), "3");
        assert_eq!(apply("length", ContextValue::None, &[]).to_display_string(), "0");
    }

    #[test]
    fn test_case_filters() {
        assert_eq!(apply("lower", ContextValue::from("ABC"), &[]).to_display_string(), "abc");
        assert_eq!(apply("upper", ContextValue::from("abc"), &[]).to_display_string(), "ABC");
        assert!(apply("upper", ContextValue::SafeString("a".into()), &[]).is_safe());
    }

    #[test]
    fn test_safe_and_escape() {
        assert!(apply("safe", ContextValue::from("<b>"), &[]).is_safe());
        let escaped = apply("escape", ContextValue::from("<b>"), &[]);
        assert_eq!(escaped.to_display_string(), "&lt;b&gt;");
        assert!(escaped.is_safe());
    }

    #[test]
    fn test_join_filter() {
        let v = ContextValue::from(vec!["a<", "b"]);
        let joined = apply("join", v, &[ContextValue::from(", ")]);
        assert_eq!(joined.to_display_string(), "a&lt;, b");
    }

    #[test]
    fn test_unknown_filter() {
        let result = default_registry().apply("nope", &ContextValue::None, &[]);
        assert!(matches!(result, Err(FormeError::TemplateSyntaxError(_))));
    }
}
