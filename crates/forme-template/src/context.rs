//! Template context for variable resolution and rendering.
//!
//! Provides [`Context`], a stack of scoped binding frames queried with
//! innermost-frame-wins semantics, [`ContextValue`] for dynamic template
//! values, and [`TemplateObject`] for host objects (forms, fields, labels)
//! that templates reach through attribute access.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A host object exposed to templates.
///
/// Attribute access (`{{ obj.name }}`) is duck-typed through [`attr`]; an
/// object displays as its [`render_html`] markup, which is never escaped.
///
/// [`attr`]: TemplateObject::attr
/// [`render_html`]: TemplateObject::render_html
pub trait TemplateObject: fmt::Debug + Send + Sync {
    /// Looks up an attribute by name.
    fn attr(&self, name: &str) -> Option<ContextValue>;

    /// Renders the object for `{{ obj }}` output.
    fn render_html(&self) -> String;

    /// Truthiness in `{% if %}` tests.
    fn is_truthy(&self) -> bool {
        true
    }

    /// The values yielded by `{% for x in obj %}`, if the object is iterable.
    fn items(&self) -> Option<Vec<ContextValue>> {
        None
    }

    /// Allows callers to recover the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Represents a dynamic value in a template context.
#[derive(Debug, Clone)]
pub enum ContextValue {
    /// A string value, escaped on output when auto-escaping is on.
    String(String),
    /// A string marked as safe; auto-escaping will not be applied.
    SafeString(String),
    /// A 64-bit integer.
    Integer(i64),
    /// A 64-bit floating point number.
    Float(f64),
    /// A boolean value.
    Bool(bool),
    /// An ordered list of values.
    List(Vec<ContextValue>),
    /// A key-value mapping.
    Dict(HashMap<String, ContextValue>),
    /// A host object.
    Object(Arc<dyn TemplateObject>),
    /// The absence of a value.
    None,
}

impl ContextValue {
    /// Wraps a host object.
    pub fn object<T: TemplateObject + 'static>(object: T) -> Self {
        Self::Object(Arc::new(object))
    }

    /// Returns `true` if this value is considered "truthy" in template logic.
    ///
    /// `None`, `false`, zero, and empty strings, lists and dicts are falsy;
    /// objects decide for themselves.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) | Self::SafeString(s) => !s.is_empty(),
            Self::List(l) => !l.is_empty(),
            Self::Dict(d) => !d.is_empty(),
            Self::Object(o) => o.is_truthy(),
        }
    }

    /// Converts this value to a display string (without HTML escaping).
    pub fn to_display_string(&self) -> String {
        match self {
            Self::String(s) | Self::SafeString(s) => s.clone(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => {
                if f.fract() == 0.0 {
                    format!("{f:.1}")
                } else {
                    f.to_string()
                }
            }
            Self::Bool(b) => if *b { "True" } else { "False" }.to_string(),
            Self::List(items) => {
                let inner: Vec<String> = items.iter().map(Self::to_repr).collect();
                format!("[{}]", inner.join(", "))
            }
            Self::Dict(map) => {
                let mut inner: Vec<String> = map
                    .iter()
                    .map(|(k, v)| format!("'{k}': {}", v.to_repr()))
                    .collect();
                inner.sort();
                format!("{{{}}}", inner.join(", "))
            }
            Self::Object(o) => o.render_html(),
            Self::None => String::new(),
        }
    }

    fn to_repr(&self) -> String {
        match self {
            Self::String(s) | Self::SafeString(s) => format!("'{s}'"),
            Self::None => "None".to_string(),
            other => other.to_display_string(),
        }
    }

    /// Returns `true` if this value bypasses auto-escaping.
    pub const fn is_safe(&self) -> bool {
        matches!(self, Self::SafeString(_) | Self::Object(_))
    }

    /// Marks a string value as safe, bypassing auto-escaping.
    #[must_use]
    pub fn mark_safe(self) -> Self {
        match self {
            Self::String(s) => Self::SafeString(s),
            other => other,
        }
    }

    /// Resolves one segment of a dotted path (e.g. `name`, `0`).
    pub fn resolve_path(&self, key: &str) -> Option<Self> {
        match self {
            Self::Dict(map) => map.get(key).cloned(),
            Self::List(list) => key.parse::<usize>().ok().and_then(|i| list.get(i).cloned()),
            Self::Object(o) => o.attr(key),
            _ => None,
        }
    }

    /// Returns the values a `{% for %}` loop iterates over.
    pub fn iter_items(&self) -> Vec<Self> {
        match self {
            Self::List(list) => list.clone(),
            Self::Dict(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter().map(|k| Self::String(k.clone())).collect()
            }
            Self::Object(o) => o.items().unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Returns the length of a list, string, dict or iterable object.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::String(s) | Self::SafeString(s) => Some(s.chars().count()),
            Self::List(l) => Some(l.len()),
            Self::Dict(d) => Some(d.len()),
            Self::Object(o) => o.items().map(|items| items.len()),
            _ => None,
        }
    }

    /// Returns `true` if this is an empty collection or empty string.
    pub fn is_empty(&self) -> Option<bool> {
        self.len().map(|l| l == 0)
    }

    /// Attempts to convert this value to an f64.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Self::Integer(i) => Some(*i as f64),
            Self::String(s) | Self::SafeString(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Returns the string contents if this is a `String` or `SafeString`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::SafeString(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the host object if this is an `Object`.
    pub fn as_object(&self) -> Option<&Arc<dyn TemplateObject>> {
        match self {
            Self::Object(o) => Some(o),
            _ => None,
        }
    }

    /// Downcasts an `Object` value to a concrete host type.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.as_object().and_then(|o| o.as_any().downcast_ref::<T>())
    }
}

impl fmt::Display for ContextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_display_string())
    }
}

impl PartialEq for ContextValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a) | Self::SafeString(a), Self::String(b) | Self::SafeString(b)) => {
                a == b
            }
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            #[allow(clippy::cast_precision_loss)]
            (Self::Integer(a), Self::Float(b)) | (Self::Float(b), Self::Integer(a)) => {
                (*a as f64) == *b
            }
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::None, Self::None) => true,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Dict(a), Self::Dict(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

// -- From implementations --

impl From<&str> for ContextValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for ContextValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for ContextValue {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<usize> for ContextValue {
    fn from(i: usize) -> Self {
        Self::Integer(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for ContextValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for ContextValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<Self>> From<Vec<T>> for ContextValue {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Self>> From<Option<T>> for ContextValue {
    fn from(o: Option<T>) -> Self {
        o.map_or(Self::None, Into::into)
    }
}

impl From<Arc<dyn TemplateObject>> for ContextValue {
    fn from(o: Arc<dyn TemplateObject>) -> Self {
        Self::Object(o)
    }
}

impl From<serde_json::Value> for ContextValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Self::None,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Integer)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::None),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => Self::List(arr.into_iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Dict(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

/// A template context that holds variables in a stack of scopes.
///
/// Lookups search from the innermost scope outward. Scopes are pushed with
/// [`Context::push_scope`], which returns a guard that pops the scope when it
/// is dropped, so a binding never outlives the render that made it, even
/// when that render fails.
///
/// The context also carries a per-render cache (see [`Context::cached`]) for
/// values that must be computed at most once per render call without
/// touching shared, compiled template state.
///
/// # Examples
///
/// ```
/// use forme_template::context::{Context, ContextValue};
///
/// let mut ctx = Context::new();
/// ctx.set("field", ContextValue::from("Foo"));
/// {
///     let mut scope = ctx.push_scope();
///     scope.set("field", ContextValue::from("Bar"));
///     assert_eq!(scope.get("field").unwrap().to_display_string(), "Bar");
/// }
/// assert_eq!(ctx.get("field").unwrap().to_display_string(), "Foo");
/// ```
#[derive(Debug)]
pub struct Context {
    stack: Vec<HashMap<String, ContextValue>>,
    auto_escape: bool,
    render_cache: HashMap<String, String>,
    render_depth: usize,
}

impl Context {
    /// Creates a new empty context with a single scope.
    pub fn new() -> Self {
        Self {
            stack: vec![HashMap::new()],
            auto_escape: true,
            render_cache: HashMap::new(),
            render_depth: 0,
        }
    }

    /// Creates a context whose outermost scope holds the given bindings.
    pub fn from_bindings<K: Into<String>>(bindings: impl IntoIterator<Item = (K, ContextValue)>) -> Self {
        let mut ctx = Self::new();
        for (key, value) in bindings {
            ctx.set(key, value);
        }
        ctx
    }

    /// Pushes a new scope and returns a guard that pops it on drop.
    pub fn push_scope(&mut self) -> ContextGuard<'_> {
        self.stack.push(HashMap::new());
        ContextGuard { context: self }
    }

    /// Pushes a scope holding `bindings` and returns its guard.
    pub fn push_bindings<K: Into<String>>(
        &mut self,
        bindings: impl IntoIterator<Item = (K, ContextValue)>,
    ) -> ContextGuard<'_> {
        let mut guard = self.push_scope();
        for (key, value) in bindings {
            guard.set(key, value);
        }
        guard
    }

    /// Pops the innermost scope. The outermost scope is never popped.
    fn pop(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }

    /// Returns the number of scopes on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Sets a variable in the innermost scope.
    pub fn set(&mut self, key: impl Into<String>, value: ContextValue) {
        if let Some(top) = self.stack.last_mut() {
            top.insert(key.into(), value);
        }
    }

    /// Looks up a variable by name, searching from the innermost scope outward.
    ///
    /// Supports dot-separated paths like `form.username.errors` or `items.0`.
    pub fn get(&self, key: &str) -> Option<ContextValue> {
        let mut parts = key.split('.');
        let root_key = parts.next()?;

        let mut current = self
            .stack
            .iter()
            .rev()
            .find_map(|scope| scope.get(root_key))
            .cloned()?;

        for part in parts {
            current = current.resolve_path(part)?;
        }

        Some(current)
    }

    /// Returns `true` if `key` is bound to a value other than `None`.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !matches!(v, ContextValue::None))
    }

    /// Returns whether auto-escaping is enabled.
    pub const fn auto_escape(&self) -> bool {
        self.auto_escape
    }

    /// Sets whether auto-escaping is enabled.
    pub fn set_auto_escape(&mut self, enabled: bool) {
        self.auto_escape = enabled;
    }

    /// Returns a value cached earlier in this render call.
    pub fn cached(&self, key: &str) -> Option<&str> {
        self.render_cache.get(key).map(String::as_str)
    }

    /// Caches a value for the rest of this render call.
    pub fn cache(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.render_cache.insert(key.into(), value.into());
    }

    /// Marks the start of a template render. The outermost render starts
    /// with an empty cache.
    pub fn begin_render(&mut self) {
        if self.render_depth == 0 {
            self.render_cache.clear();
        }
        self.render_depth += 1;
    }

    /// Marks the end of a template render. The cache is dropped when the
    /// outermost render ends.
    pub fn end_render(&mut self) {
        self.render_depth = self.render_depth.saturating_sub(1);
        if self.render_depth == 0 {
            self.render_cache.clear();
        }
    }

    /// Flattens all scopes into a single map, inner scopes overriding outer ones.
    pub fn flatten(&self) -> HashMap<String, ContextValue> {
        let mut result = HashMap::new();
        for scope in &self.stack {
            for (k, v) in scope {
                result.insert(k.clone(), v.clone());
            }
        }
        result
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Scope guard returned by [`Context::push_scope`]. Derefs to the context
/// and pops the scope it pushed when dropped.
#[derive(Debug)]
pub struct ContextGuard<'a> {
    context: &'a mut Context,
}

impl Deref for ContextGuard<'_> {
    type Target = Context;

    fn deref(&self) -> &Context {
        self.context
    }
}

impl DerefMut for ContextGuard<'_> {
    fn deref_mut(&mut self) -> &mut Context {
        self.context
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.context.pop();
    }
}

/// Escapes HTML special characters in a string.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Widget {
        name: &'static str,
    }

    impl TemplateObject for Widget {
        fn attr(&self, name: &str) -> Option<ContextValue> {
            (name == "name").then(|| ContextValue::from(self.name))
        }

        fn render_html(&self) -> String {
            format!("<input name=\"{}\">", self.name)
        }

        fn items(&self) -> Option<Vec<ContextValue>> {
            Some(vec![ContextValue::from("a"), ContextValue::from("b")])
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_context_value_truthiness() {
        assert!(ContextValue::Bool(true).is_truthy());
        assert!(!ContextValue::Bool(false).is_truthy());
        assert!(!ContextValue::Integer(0).is_truthy());
        assert!(ContextValue::String("x".into()).is_truthy());
        assert!(!ContextValue::String(String::new()).is_truthy());
        assert!(!ContextValue::None.is_truthy());
        assert!(!ContextValue::List(vec![]).is_truthy());
        assert!(ContextValue::object(Widget { name: "w" }).is_truthy());
    }

    #[test]
    fn test_context_value_display() {
        assert_eq!(ContextValue::from(42i64).to_display_string(), "42");
        assert_eq!(ContextValue::Float(3.0).to_display_string(), "3.0");
        assert_eq!(ContextValue::Bool(true).to_display_string(), "True");
        assert_eq!(ContextValue::from(vec!["a", "b"]).to_display_string(), "['a', 'b']");
        assert_eq!(ContextValue::None.to_display_string(), "");
    }

    #[test]
    fn test_object_attr_and_display() {
        let v = ContextValue::object(Widget { name: "email" });
        assert_eq!(v.resolve_path("name").unwrap().to_display_string(), "email");
        assert!(v.resolve_path("missing").is_none());
        assert_eq!(v.to_display_string(), "<input name=\"email\">");
        assert!(v.is_safe());
        assert_eq!(v.iter_items().len(), 2);
        assert!(v.downcast_ref::<Widget>().is_some());
    }

    #[test]
    fn test_object_equality_is_identity() {
        let a = ContextValue::object(Widget { name: "x" });
        let b = a.clone();
        let c = ContextValue::object(Widget { name: "x" });
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_context_value_from_json() {
        let v: ContextValue = serde_json::json!({"name": "forme", "tags": ["a"], "n": null}).into();
        assert_eq!(v.resolve_path("name").unwrap().to_display_string(), "forme");
        assert_eq!(v.resolve_path("tags").unwrap().len(), Some(1));
        assert!(matches!(v.resolve_path("n"), Some(ContextValue::None)));
    }

    #[test]
    fn test_push_scope_pops_on_drop() {
        let mut ctx = Context::new();
        ctx.set("field", ContextValue::from("Foo"));
        {
            let mut scope = ctx.push_scope();
            scope.set("field", ContextValue::from("Bar"));
            assert_eq!(scope.get("field").unwrap().to_display_string(), "Bar");
            assert_eq!(scope.depth(), 2);
        }
        assert_eq!(ctx.get("field").unwrap().to_display_string(), "Foo");
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_push_scope_pops_on_error_path() {
        fn failing(ctx: &mut Context) -> Result<(), String> {
            let mut scope = ctx.push_bindings([("label", ContextValue::from("x"))]);
            scope.set("errors", ContextValue::from("y"));
            Err("boom".to_string())
        }

        let mut ctx = Context::new();
        assert!(failing(&mut ctx).is_err());
        assert!(ctx.get("label").is_none());
        assert!(ctx.get("errors").is_none());
        assert_eq!(ctx.depth(), 1);
    }

    #[test]
    fn test_outermost_scope_survives() {
        let mut ctx = Context::new();
        ctx.set("x", ContextValue::from(1i64));
        ctx.pop();
        assert_eq!(ctx.get("x").unwrap().to_display_string(), "1");
    }

    #[test]
    fn test_dot_notation_through_object() {
        let mut ctx = Context::new();
        ctx.set("w", ContextValue::object(Widget { name: "email" }));
        assert_eq!(ctx.get("w.name").unwrap().to_display_string(), "email");
        assert!(ctx.get("w.name.more").is_none());
    }

    #[test]
    fn test_contains_ignores_none() {
        let mut ctx = Context::new();
        ctx.set("form", ContextValue::None);
        assert!(!ctx.contains("form"));
        ctx.set("form", ContextValue::from("f"));
        assert!(ctx.contains("form"));
    }

    #[test]
    fn test_render_cache() {
        let mut ctx = Context::new();
        assert!(ctx.cached("k").is_none());
        ctx.cache("k", "v");
        {
            let scope = ctx.push_scope();
            assert_eq!(scope.cached("k"), Some("v"));
        }
        assert_eq!(ctx.cached("k"), Some("v"));
    }

    #[test]
    fn test_render_cache_is_scoped_to_outermost_render() {
        let mut ctx = Context::new();
        ctx.begin_render();
        ctx.cache("k", "v");
        ctx.begin_render();
        assert_eq!(ctx.cached("k"), Some("v"));
        ctx.end_render();
        assert_eq!(ctx.cached("k"), Some("v"));
        ctx.end_render();
        assert!(ctx.cached("k").is_none());

        ctx.cache("stale", "v");
        ctx.begin_render();
        assert!(ctx.cached("stale").is_none());
        ctx.end_render();
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("<b>bold</b>"), "&lt;b&gt;bold&lt;/b&gt;");
        assert_eq!(escape_html("a & b"), "a &amp; b");
        assert_eq!(escape_html("it's"), "it&#x27;s");
    }
}
