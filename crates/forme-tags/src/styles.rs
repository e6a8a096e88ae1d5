//! Per-node style stores.
//!
//! Every forme node owns a [`StyleStore`]: the template bodies its `using`
//! children defined, keyed by tag kind and target. A store is filled once
//! while its node is compiled and is read-only afterwards, so compiled
//! templates can be rendered concurrently.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use forme_core::error::{FormeError, FormeResult};
use forme_template::context::{Context, ContextValue};
use forme_template::expression::Expression;
use forme_template::parser::Node;

use crate::grammar::TagKind;

/// A template body shared between the node that declared it and every
/// store it was registered in.
pub type Body = Arc<Vec<Node>>;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// The target a template body is registered under, or a tag is rendered for.
#[derive(Debug, Clone)]
pub enum Key {
    /// No target. Matches whenever nothing more specific does.
    Default,
    /// A quoted name, known at compile time.
    Literal(String),
    /// An unquoted expression, resolved against the render context.
    Deferred {
        /// The parsed expression.
        expression: Expression,
        /// Its source text, used while it is unresolved.
        text: String,
    },
}

impl Key {
    /// Creates a literal key.
    pub fn literal(name: impl Into<String>) -> Self {
        Self::Literal(name.into())
    }

    /// Creates a key resolved at render time.
    pub fn deferred(expression: Expression) -> Self {
        let text = expression.text();
        Self::Deferred { expression, text }
    }

    /// The key's source text. `None` for the default key.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Default => None,
            Self::Literal(name) => Some(name),
            Self::Deferred { text, .. } => Some(text),
        }
    }

    /// The value the key refers to in `context`.
    ///
    /// Literal keys are their own value.
    pub fn value(&self, context: &Context) -> ContextValue {
        match self {
            Self::Default => ContextValue::None,
            Self::Literal(name) => ContextValue::from(name.as_str()),
            Self::Deferred { expression, .. } => expression.resolve(context),
        }
    }

    /// Resolves the key to the name it matches against.
    ///
    /// A deferred key that resolves to nothing usable falls back to its
    /// source text.
    pub fn resolve(&self, context: &Context) -> Option<String> {
        match self {
            Self::Default => None,
            Self::Literal(name) => Some(name.clone()),
            Self::Deferred { expression, text } => {
                Some(key_from_value(&expression.resolve(context)).unwrap_or_else(|| text.clone()))
            }
        }
    }
}

/// Unresolved keys compare by source text.
impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.text() == other.text()
    }
}

impl Eq for Key {}

/// Turns a resolved context value into a lookup name.
///
/// Strings and numbers are used as they are. Host objects (bound fields)
/// are identified by their `name` attribute.
pub fn key_from_value(value: &ContextValue) -> Option<String> {
    match value {
        ContextValue::String(s) | ContextValue::SafeString(s) if !s.is_empty() => Some(s.clone()),
        ContextValue::Integer(i) => Some(i.to_string()),
        ContextValue::Object(object) => object
            .attr("name")
            .map(|name| name.to_display_string())
            .filter(|name| !name.is_empty()),
        _ => None,
    }
}

/// Template bodies keyed by tag kind and target, in insertion order.
#[derive(Debug)]
pub struct StyleStore {
    id: u64,
    entries: BTreeMap<TagKind, Vec<(Key, Body)>>,
}

impl StyleStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
            entries: BTreeMap::new(),
        }
    }

    /// A process-unique id, used to scope render-time caches.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Registers `body` for `tag` under `key`.
    ///
    /// Registering an existing key again replaces its body and keeps its
    /// position.
    pub fn set(&mut self, tag: TagKind, key: Key, body: Body) {
        let variants = self.entries.entry(tag).or_default();
        if let Some(entry) = variants.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = body;
        } else {
            variants.push((key, body));
        }
    }

    /// Registers `body` for `tag` under each of `targets`, or under the
    /// default key when there are none.
    pub fn set_all(&mut self, tag: TagKind, targets: &[Key], body: &Body) {
        if targets.is_empty() {
            self.set(tag, Key::Default, Arc::clone(body));
        }
        for key in targets {
            self.set(tag, key.clone(), Arc::clone(body));
        }
    }

    /// Returns the body for `tag` and `target`, falling back to the
    /// default body.
    ///
    /// # Errors
    ///
    /// Returns `MissingTemplate` if neither exists.
    pub fn get(&self, tag: TagKind, target: Option<&str>, context: &mut Context) -> FormeResult<Body> {
        self.lookup(tag, target, context)
            .ok_or_else(|| FormeError::MissingTemplate(tag.name().to_string()))
    }

    /// Like [`StyleStore::get`], without the error.
    pub fn lookup(&self, tag: TagKind, target: Option<&str>, context: &mut Context) -> Option<Body> {
        target
            .and_then(|target| self.find_exact(tag, target, context))
            .or_else(|| self.find_default(tag))
    }

    /// Returns the body registered for exactly `target`.
    pub fn find_exact(&self, tag: TagKind, target: &str, context: &mut Context) -> Option<Body> {
        let variants = self.entries.get(&tag)?;
        variants.iter().find_map(|(key, body)| {
            let matches = match key {
                Key::Default => false,
                Key::Literal(name) => name == target,
                Key::Deferred { .. } => self.resolve_key(key, context).as_deref() == Some(target),
            };
            matches.then(|| Arc::clone(body))
        })
    }

    /// Returns the default body for `tag`.
    pub fn find_default(&self, tag: TagKind) -> Option<Body> {
        self.entries
            .get(&tag)?
            .iter()
            .find(|(key, _)| matches!(key, Key::Default))
            .map(|(_, body)| Arc::clone(body))
    }

    /// Resolves a registered key against `context`.
    ///
    /// Resolved deferred keys are remembered until the outermost template
    /// render on `context` ends. Keys that do not resolve fall back to their text and are
    /// retried on the next lookup.
    pub fn resolve_key(&self, key: &Key, context: &mut Context) -> Option<String> {
        let Key::Deferred { expression, text } = key else {
            return key.text().map(str::to_string);
        };

        let cache_key = format!("forme:{}:{text}", self.id);
        if let Some(resolved) = context.cached(&cache_key) {
            return Some(resolved.to_string());
        }

        match key_from_value(&expression.resolve(context)) {
            Some(resolved) => {
                tracing::trace!(store = self.id, key = %text, resolved = %resolved, "Resolved deferred style key");
                context.cache(cache_key, resolved.clone());
                Some(resolved)
            }
            None => Some(text.clone()),
        }
    }

    /// The keys registered for `tag`, in insertion order.
    pub fn variants(&self, tag: TagKind) -> Vec<&Key> {
        self.entries
            .get(&tag)
            .map(|variants| variants.iter().map(|(key, _)| key).collect())
            .unwrap_or_default()
    }

    /// The tag kinds with at least one registered body.
    pub fn tags(&self) -> impl Iterator<Item = TagKind> + '_ {
        self.entries.keys().copied()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The number of registered bodies across all tags.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

impl Default for StyleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Something that can supply the template body for a tag.
pub trait TemplateResolver {
    /// Returns the body for `tag` and `target`, or `None` if this resolver
    /// has nothing for it.
    fn resolve(&self, tag: TagKind, target: Option<&str>, context: &mut Context) -> Option<Body>;
}

impl TemplateResolver for StyleStore {
    fn resolve(&self, tag: TagKind, target: Option<&str>, context: &mut Context) -> Option<Body> {
        self.lookup(tag, target, context)
    }
}
