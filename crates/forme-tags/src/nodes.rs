//! Compiled forme tags.
//!
//! A [`FormeNode`] is built once per tag occurrence while its template is
//! compiled. Building validates the tag's children against the grammar,
//! registers the bodies of its `using` children in its own [`StyleStore`]
//! and strips those definitions from the body it renders.
//!
//! Rendering a node that has no literal body looks its template up:
//!
//! 1. in the node's own store, then in each ancestor's store, stopping
//!    before the root `{% forme %}` tag;
//! 2. along the chain of render sites whose resolved bodies are being
//!    expanded, innermost first, each consulted the same way as step 1;
//! 3. in the active root tag, then in its style template.
//!
//! Each step tries the exact target before the default body. Nothing is
//! mutated while rendering, so a compiled template can be shared between
//! threads.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use forme_core::error::{FormeError, FormeResult};
use forme_core::settings::FormeSettings;
use forme_template::context::{Context, ContextValue, TemplateObject};
use forme_template::engine::TemplateRenderer;
use forme_template::parser::{find_custom_nodes, is_blank, render_nodes, retain_nodes, CustomNode, Node};

use crate::grammar::{grammar, TagKind};
use crate::label::Label;
use crate::loader::load_style_template;
use crate::styles::{key_from_value, Body, Key, StyleStore, TemplateResolver};

/// Context variable holding the innermost render site that is expanding a
/// resolved template body.
pub const STYLE_SCOPE_VAR: &str = "forme_style";

/// Context variable holding the root tag being rendered and its style.
pub const ROOT_SCOPE_VAR: &str = "forme_root";

/// What a tag occurrence does with its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// A render site. Takes no body.
    Default,
    /// Defines the template for its tag and target, and is also rendered
    /// when it is the root tag.
    Using,
    /// Defines templates for nested tags without rendering anything itself.
    Replace,
}

impl Action {
    /// Parses a trailing action keyword.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "using" => Some(Self::Using),
            "replace" => Some(Self::Replace),
            _ => None,
        }
    }

    /// The keyword, empty for [`Action::Default`].
    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Default => "",
            Self::Using => "using",
            Self::Replace => "replace",
        }
    }

    /// Returns `true` if the tag takes a body and an end tag.
    pub const fn is_paired(self) -> bool {
        !matches!(self, Self::Default)
    }
}

/// A compiled forme tag.
pub struct FormeNode {
    kind: TagKind,
    targets: Vec<Key>,
    action: Action,
    body: Body,
    parent: OnceLock<Weak<FormeNode>>,
    children: Vec<Arc<FormeNode>>,
    store: StyleStore,
    settings: Arc<FormeSettings>,
}

impl FormeNode {
    /// Builds a node from a parsed tag occurrence and its raw body.
    ///
    /// # Errors
    ///
    /// Returns `MissingFormParameter` for a root tag with neither targets
    /// nor an action, and `InvalidNesting` if the body contains forme tags
    /// this kind does not allow.
    pub fn build(
        kind: TagKind,
        targets: Vec<Key>,
        action: Action,
        mut body: Vec<Node>,
        settings: Arc<FormeSettings>,
    ) -> FormeResult<Arc<Self>> {
        if kind.is_root() && targets.is_empty() && action == Action::Default {
            return Err(FormeError::MissingFormParameter(kind.name().to_string()));
        }

        let children = direct_children(&body);
        let child_kinds: Vec<TagKind> = children.iter().map(|child| child.kind).collect();
        grammar().validate(kind, &child_kinds)?;

        let body: Body = if action == Action::Replace {
            Arc::new(Vec::new())
        } else {
            retain_nodes(&mut body, &|node: &Node| !is_definition(node));
            Arc::new(body)
        };

        let mut store = StyleStore::new();
        for child in children.iter().filter(|child| child.action == Action::Using) {
            store.set_all(child.kind, &child.targets, &child.body);
        }
        if kind.is_root() && action == Action::Using && !is_blank(&body) {
            store.set(kind, Key::Default, Arc::clone(&body));
        }

        tracing::debug!(
            tag = %kind,
            action = action.keyword(),
            children = children.len(),
            templates = store.len(),
            "Built forme node"
        );

        Ok(Arc::new_cyclic(|this| {
            for child in &children {
                // A child is compiled inside exactly one body, so this is
                // the first and only set.
                let _ = child.parent.set(Weak::clone(this));
            }
            Self {
                kind,
                targets,
                action,
                body,
                parent: OnceLock::new(),
                children,
                store,
                settings,
            }
        }))
    }

    /// The tag kind.
    pub const fn kind(&self) -> TagKind {
        self.kind
    }

    /// The targets, in source order.
    pub fn targets(&self) -> &[Key] {
        &self.targets
    }

    /// The action.
    pub const fn action(&self) -> Action {
        self.action
    }

    /// The literal body, without template definitions.
    pub const fn body(&self) -> &Body {
        &self.body
    }

    /// The enclosing forme tag, if any.
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.get().and_then(Weak::upgrade)
    }

    /// The forme tags found directly in the body, in source order.
    pub fn children(&self) -> &[Arc<Self>] {
        &self.children
    }

    /// The templates defined by this node's `using` children.
    pub const fn store(&self) -> &StyleStore {
        &self.store
    }

    /// Finds the template body for rendering this node with `target`.
    ///
    /// # Errors
    ///
    /// Returns `MissingTemplate` when no scope defines one.
    pub fn find_template(&self, target: Option<&str>, context: &mut Context) -> FormeResult<Body> {
        let tag = self.kind;
        if let Some(body) = self.resolve(tag, target, context) {
            return Ok(body);
        }

        let mut scope = context.get(STYLE_SCOPE_VAR);
        while let Some(value) = scope {
            let Some(site) = value.downcast_ref::<StyleScope>() else {
                break;
            };
            if let Some(body) = site.node.resolve(tag, target, context) {
                return Ok(body);
            }
            scope = site.outer.clone();
        }

        let root = context.get(ROOT_SCOPE_VAR);
        if let Some(active) = root.as_ref().and_then(|v| v.downcast_ref::<ActiveForme>()) {
            if let Some(body) = active.resolve(tag, target, context) {
                return Ok(body);
            }
        }

        tracing::debug!(tag = %tag, target = ?target, "No template found");
        Err(FormeError::MissingTemplate(tag.name().to_string()))
    }

    /// Renders the node.
    ///
    /// # Errors
    ///
    /// Returns `InvalidContext` when a variable the tag needs is unbound,
    /// `MissingForm` when the root tag's form is empty, `MissingTemplate`
    /// when no template is found, and any error raised by the rendered body.
    pub fn render(self: &Arc<Self>, context: &mut Context, renderer: &dyn TemplateRenderer) -> FormeResult<String> {
        if self.action.is_paired() && !self.kind.is_root() {
            return Ok(String::new());
        }

        match self.kind {
            TagKind::Forme => self.render_forme(context, renderer),
            TagKind::Fieldset => self.render_fieldset(context, renderer),
            TagKind::Row => self.render_row(context, renderer),
            TagKind::Field => {
                let field = require(context, self.kind, "field")?;
                let key = self.field_key(context, &field);
                self.render_site(context, renderer, key.as_deref(), Vec::new())
            }
            TagKind::Label => {
                let field = require(context, self.kind, "field")?;
                let key = self.field_key(context, &field);
                let label = ContextValue::object(Label::from_field(&field));
                self.render_site(context, renderer, key.as_deref(), vec![("label", label)])
            }
            TagKind::Errors => {
                let field = require(context, self.kind, "field")?;
                let errors = field.resolve_path("errors").unwrap_or(ContextValue::None);
                if !errors.is_truthy() {
                    return Ok(String::new());
                }
                let key = self.field_key(context, &field);
                self.render_site(context, renderer, key.as_deref(), vec![("errors", errors)])
            }
            TagKind::NonFieldErrors => self.render_form_list(context, renderer, "non_field_errors"),
            TagKind::HiddenFields => self.render_form_list(context, renderer, "hidden_fields"),
        }
    }

    /// Renders with `bindings` pushed: the literal body if there is one,
    /// otherwise the template found for `target`.
    fn render_site(
        self: &Arc<Self>,
        context: &mut Context,
        renderer: &dyn TemplateRenderer,
        target: Option<&str>,
        bindings: Vec<(&str, ContextValue)>,
    ) -> FormeResult<String> {
        let mut scope = context.push_bindings(bindings);
        if !is_blank(&self.body) {
            return render_nodes(&self.body, &mut scope, renderer);
        }

        let body = self.find_template(target, &mut scope)?;
        let outer = scope.get(STYLE_SCOPE_VAR);
        scope.set(
            STYLE_SCOPE_VAR,
            ContextValue::object(StyleScope {
                node: Arc::clone(self),
                outer,
            }),
        );
        render_nodes(&body, &mut scope, renderer)
    }

    fn render_forme(self: &Arc<Self>, context: &mut Context, renderer: &dyn TemplateRenderer) -> FormeResult<String> {
        let mut style_name = None;
        let mut forms = Vec::new();
        for target in &self.targets {
            match target {
                Key::Literal(name) if self.settings.has_style(name) => style_name = Some(name.as_str()),
                Key::Literal(name) => {
                    return Err(FormeError::InvalidStyle(format!("Unknown style '{name}'")));
                }
                _ => {
                    let form = target.value(context);
                    if !form.is_truthy() {
                        return Err(FormeError::MissingForm(self.kind.name().to_string()));
                    }
                    forms.push(form);
                }
            }
        }

        let mut bindings = match forms.len() {
            0 => {
                context
                    .get("form")
                    .filter(ContextValue::is_truthy)
                    .ok_or_else(|| FormeError::MissingForm(self.kind.name().to_string()))?;
                Vec::new()
            }
            1 => vec![("form", forms.remove(0))],
            _ => vec![("form", forms[0].clone()), ("forms", ContextValue::List(forms))],
        };

        let style_template = match style_name {
            Some(name) => self.settings.style_template(name),
            None => self.settings.default_style_template(),
        };
        let style = match style_template {
            Some(name) => Some(load_style_template(renderer, name)?),
            None => None,
        };
        tracing::debug!(style = ?style_template, forms = bindings.len(), "Rendering forme");

        bindings.push((
            ROOT_SCOPE_VAR,
            ContextValue::object(ActiveForme {
                root: Arc::clone(self),
                style,
            }),
        ));
        self.render_site(context, renderer, None, bindings)
    }

    fn render_fieldset(self: &Arc<Self>, context: &mut Context, renderer: &dyn TemplateRenderer) -> FormeResult<String> {
        let form = require(context, self.kind, "form")?;
        let fields = if self.targets.is_empty() {
            form.resolve_path("visible_fields")
                .or_else(|| form.resolve_path("fields"))
                .map_or_else(|| form.iter_items(), |fields| fields.iter_items())
        } else {
            let available = form_fields(&form);
            let mut selected = Vec::new();
            for target in &self.targets {
                selected.extend(select_fields(self.kind, target, &available, Some(&form), context)?);
            }
            selected
        };

        let key = self.first_key(context);
        let fields = ContextValue::List(fields);
        self.render_site(
            context,
            renderer,
            key.as_deref(),
            vec![("fieldset", fields.clone()), ("fieldset_fields", fields)],
        )
    }

    fn render_row(self: &Arc<Self>, context: &mut Context, renderer: &dyn TemplateRenderer) -> FormeResult<String> {
        let fieldset = ["fieldset", "fieldset_fields"]
            .into_iter()
            .find_map(|variable| require(context, self.kind, variable).ok())
            .ok_or_else(|| FormeError::invalid_context(self.kind.name(), "fieldset"))?;
        let available = fieldset.iter_items();
        let form = context.get("form");

        match self.targets.as_slice() {
            [] => {
                let mut output = String::new();
                for field in available {
                    let key = key_from_value(&field);
                    output.push_str(&self.render_site(
                        context,
                        renderer,
                        key.as_deref(),
                        vec![("field", field), ("fields", ContextValue::None)],
                    )?);
                }
                Ok(output)
            }
            [target] => {
                let mut fields = select_fields(self.kind, target, &available, form.as_ref(), context)?;
                let key = target.resolve(context);
                let bindings = if fields.len() == 1 {
                    vec![("field", fields.remove(0)), ("fields", ContextValue::None)]
                } else {
                    vec![("fields", ContextValue::List(fields))]
                };
                self.render_site(context, renderer, key.as_deref(), bindings)
            }
            targets => {
                let mut output = String::new();
                for target in targets {
                    let fields = select_fields(self.kind, target, &available, form.as_ref(), context)?;
                    let key = target.resolve(context);
                    output.push_str(&self.render_site(
                        context,
                        renderer,
                        key.as_deref(),
                        vec![("fields", ContextValue::List(fields))],
                    )?);
                }
                Ok(output)
            }
        }
    }

    fn render_form_list(
        self: &Arc<Self>,
        context: &mut Context,
        renderer: &dyn TemplateRenderer,
        variable: &str,
    ) -> FormeResult<String> {
        let form = require(context, self.kind, "form")?;
        let items = form.resolve_path(variable).unwrap_or(ContextValue::None);
        if !items.is_truthy() {
            return Ok(String::new());
        }
        let key = self.first_key(context);
        self.render_site(context, renderer, key.as_deref(), vec![(variable, items)])
    }

    fn first_key(&self, context: &Context) -> Option<String> {
        self.targets.first().and_then(|key| key.resolve(context))
    }

    /// The first target, else the name of the current field.
    fn field_key(&self, context: &Context, field: &ContextValue) -> Option<String> {
        self.first_key(context).or_else(|| key_from_value(field))
    }
}

/// Looks through this node's store, then its ancestors', stopping before
/// the root tag.
impl TemplateResolver for FormeNode {
    fn resolve(&self, tag: TagKind, target: Option<&str>, context: &mut Context) -> Option<Body> {
        if self.kind.is_root() {
            return None;
        }
        self.store
            .lookup(tag, target, context)
            .or_else(|| self.parent().and_then(|parent| parent.resolve(tag, target, context)))
    }
}

impl fmt::Debug for FormeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormeNode")
            .field("kind", &self.kind)
            .field("targets", &self.targets)
            .field("action", &self.action)
            .field("children", &self.children)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// The custom node registered with the template engine for every forme tag.
#[derive(Debug)]
pub struct FormeTag {
    node: Arc<FormeNode>,
}

impl FormeTag {
    /// Wraps a compiled node.
    pub const fn new(node: Arc<FormeNode>) -> Self {
        Self { node }
    }

    /// The compiled node.
    pub const fn node(&self) -> &Arc<FormeNode> {
        &self.node
    }
}

impl CustomNode for FormeTag {
    fn tag_name(&self) -> &str {
        self.node.kind.name()
    }

    fn render(&self, context: &mut Context, renderer: &dyn TemplateRenderer) -> FormeResult<String> {
        self.node.render(context, renderer)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The forme tags reachable from `nodes` without passing through another
/// forme tag.
pub fn direct_children(nodes: &[Node]) -> Vec<Arc<FormeNode>> {
    find_custom_nodes(nodes)
        .into_iter()
        .filter_map(|custom| custom.as_any().downcast_ref::<FormeTag>())
        .map(|tag| Arc::clone(&tag.node))
        .collect()
}

fn is_definition(node: &Node) -> bool {
    node.as_custom::<FormeTag>()
        .is_some_and(|tag| tag.node.action.is_paired())
}

fn require(context: &Context, tag: TagKind, variable: &str) -> FormeResult<ContextValue> {
    context
        .get(variable)
        .filter(|value| !matches!(value, ContextValue::None))
        .ok_or_else(|| FormeError::invalid_context(tag.name(), variable))
}

fn form_fields(form: &ContextValue) -> Vec<ContextValue> {
    form.resolve_path("fields")
        .map_or_else(|| form.iter_items(), |fields| fields.iter_items())
}

/// Resolves a target to the fields it names: a bound field, a list of
/// fields, or the name of a field in `available` or on the form.
fn select_fields(
    tag: TagKind,
    target: &Key,
    available: &[ContextValue],
    form: Option<&ContextValue>,
    context: &Context,
) -> FormeResult<Vec<ContextValue>> {
    let value = target.value(context);
    match value {
        ContextValue::Object(_) => return Ok(vec![value]),
        ContextValue::List(fields) => return Ok(fields),
        _ => {}
    }

    let name = key_from_value(&value)
        .or_else(|| target.text().map(str::to_string))
        .unwrap_or_default();
    available
        .iter()
        .find(|field| {
            field
                .resolve_path("name")
                .is_some_and(|n| n.to_display_string() == name)
        })
        .cloned()
        .or_else(|| {
            form.and_then(|form| form.resolve_path(&name))
                .filter(|field| matches!(field, ContextValue::Object(_) | ContextValue::Dict(_)))
        })
        .map(|field| vec![field])
        .ok_or_else(|| FormeError::invalid_context(tag.name(), name))
}

/// A render site expanding a resolved body. Bound to [`STYLE_SCOPE_VAR`].
struct StyleScope {
    node: Arc<FormeNode>,
    outer: Option<ContextValue>,
}

impl fmt::Debug for StyleScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StyleScope")
            .field("tag", &self.node.kind)
            .finish_non_exhaustive()
    }
}

impl TemplateObject for StyleScope {
    fn attr(&self, name: &str) -> Option<ContextValue> {
        (name == "tag").then(|| ContextValue::from(self.node.kind.name()))
    }

    fn render_html(&self) -> String {
        String::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// The root tag being rendered and its style. Bound to [`ROOT_SCOPE_VAR`].
struct ActiveForme {
    root: Arc<FormeNode>,
    style: Option<Arc<FormeNode>>,
}

/// Exact matches in the root, then the style, before default bodies in
/// the same order.
impl TemplateResolver for ActiveForme {
    fn resolve(&self, tag: TagKind, target: Option<&str>, context: &mut Context) -> Option<Body> {
        let style = self.style.as_deref();
        if let Some(target) = target {
            let exact = self
                .root
                .store
                .find_exact(tag, target, context)
                .or_else(|| style.and_then(|style| style.store.find_exact(tag, target, context)));
            if exact.is_some() {
                return exact;
            }
        }
        self.root
            .store
            .find_default(tag)
            .or_else(|| style.and_then(|style| style.store.find_default(tag)))
    }
}

impl fmt::Debug for ActiveForme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveForme")
            .field("has_style", &self.style.is_some())
            .finish_non_exhaustive()
    }
}

impl TemplateObject for ActiveForme {
    fn attr(&self, _name: &str) -> Option<ContextValue> {
        None
    }

    fn render_html(&self) -> String {
        String::new()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forme_forms::{FieldDef, Form, WidgetType};
    use forme_template::{Engine, Template};
    use std::collections::HashMap;

    fn engine(settings: FormeSettings) -> Engine {
        let mut engine = Engine::new();
        crate::install(&mut engine, settings);
        engine
    }

    fn compile(source: &str) -> FormeResult<Template> {
        engine(FormeSettings::default()).from_string(source)
    }

    fn root(template: &Template) -> Arc<FormeNode> {
        direct_children(&template.nodes).remove(0)
    }

    fn text(body: &[Node]) -> String {
        body.iter()
            .map(|node| match node {
                Node::Text(text) => text.as_str(),
                _ => "",
            })
            .collect()
    }

    fn dict_field(name: &str, errors: Vec<&str>) -> ContextValue {
        ContextValue::Dict(HashMap::from([
            ("name".to_string(), ContextValue::from(name)),
            ("errors".to_string(), ContextValue::from(errors)),
        ]))
    }

    #[test]
    fn test_using_child_registers_body_under_each_target() {
        let template = compile(r#"{% forme form replace %}{% field "a b" using %}X{% endfield %}{% endforme %}"#).unwrap();
        let root = root(&template);
        let child = &root.children()[0];

        let targets: Vec<Option<&str>> = root.store().variants(TagKind::Field).iter().map(|k| k.text()).collect();
        assert_eq!(targets, vec![Some("a"), Some("b")]);

        let mut ctx = Context::new();
        let a = root.store().get(TagKind::Field, Some("a"), &mut ctx).unwrap();
        let b = root.store().get(TagKind::Field, Some("b"), &mut ctx).unwrap();
        assert!(Arc::ptr_eq(&a, child.body()));
        assert!(Arc::ptr_eq(&b, child.body()));
        assert!(root.store().find_default(TagKind::Field).is_none());
    }

    #[test]
    fn test_replace_child_registers_nothing() {
        let template = compile("{% forme form replace %}{% field replace %}X{% endfield %}{% endforme %}").unwrap();
        let root = root(&template);
        assert!(root.store().is_empty());
        assert!(root.children()[0].body().is_empty());
    }

    #[test]
    fn test_definitions_are_stripped_from_body() {
        let template = compile("{% forme form using %}A{% field using %}X{% endfield %}B{% field %}{% endforme %}").unwrap();
        let root = root(&template);
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.body().len(), 3);
        assert_eq!(text(root.body()), "AB");
    }

    #[test]
    fn test_root_using_registers_its_own_body() {
        let template = compile("{% forme form using %}layout{% endforme %}").unwrap();
        let root = root(&template);
        let own = root.store().find_default(TagKind::Forme).unwrap();
        assert!(Arc::ptr_eq(&own, root.body()));
        assert_eq!(text(&own), "layout");
    }

    #[test]
    fn test_blank_root_using_registers_nothing() {
        let template = compile("{% forme form using %}\n  {% field using %}F{% endfield %}\n{% endforme %}").unwrap();
        let root = root(&template);
        assert!(root.store().find_default(TagKind::Forme).is_none());
        assert!(root.store().find_default(TagKind::Field).is_some());
    }

    #[test]
    fn test_root_replace_has_empty_body() {
        let template = compile("{% forme form replace %}ignored{% endforme %}").unwrap();
        let root = root(&template);
        assert!(root.body().is_empty());
        assert!(root.store().find_default(TagKind::Forme).is_none());
    }

    #[test]
    fn test_children_point_back_to_parent() {
        let template = compile("{% forme form using %}{% fieldset using %}{% row %}{% endfieldset %}{% endforme %}").unwrap();
        let root = root(&template);
        let fieldset = &root.children()[0];
        let row = &fieldset.children()[0];
        assert!(root.parent().is_none());
        assert!(Arc::ptr_eq(&fieldset.parent().unwrap(), &root));
        assert!(Arc::ptr_eq(&row.parent().unwrap(), fieldset));
        assert_eq!(row.kind(), TagKind::Row);
        assert_eq!(row.action(), Action::Default);
    }

    #[test]
    fn test_invalid_nesting_is_a_compile_error() {
        let err = compile("{% row using %}{% label %}{% fieldset %}{% endrow %}").unwrap_err();
        match err {
            FormeError::InvalidNesting { tag, children } => {
                assert_eq!(tag, "row");
                assert_eq!(children, vec!["fieldset"]);
            }
            other => panic!("expected InvalidNesting, got {other:?}"),
        }
    }

    #[test]
    fn test_nesting_is_checked_through_builtin_tags() {
        let err = compile("{% label using %}{% if x %}{% for y in z %}{% row %}{% endfor %}{% endif %}{% endlabel %}")
            .unwrap_err();
        assert!(matches!(err, FormeError::InvalidNesting { ref tag, .. } if tag == "label"));
    }

    #[test]
    fn test_forme_without_target_or_action() {
        let err = compile("{% forme %}").unwrap_err();
        assert!(matches!(err, FormeError::MissingFormParameter(ref tag) if tag == "forme"));
        assert!(compile("{% forme using %}{% endforme %}").is_ok());
        assert!(compile("{% forme form %}").is_ok());
    }

    #[test]
    fn test_cascade_resolves_nearest_definition() {
        let source = "{% forme form replace %}\
            {% fieldset using %}\
              {% field using %}FIELDSET{% endfield %}\
              {% row using %}{% label using %}{% field %}{% endlabel %}{% endrow %}\
            {% endfieldset %}\
          {% endforme %}";
        let template = compile(source).unwrap();
        let fieldset = Arc::clone(&root(&template).children()[0]);
        let row = Arc::clone(&fieldset.children()[1]);
        let label = Arc::clone(&row.children()[0]);
        let field = Arc::clone(&label.children()[0]);

        let body = field.find_template(Some("email"), &mut Context::new()).unwrap();
        assert_eq!(text(&body), "FIELDSET");
    }

    #[test]
    fn test_cascade_prefers_closer_ancestor() {
        let source = "{% forme form replace %}\
            {% fieldset using %}\
              {% field using %}FIELDSET{% endfield %}\
              {% row using %}\
                {% field using %}ROW{% endfield %}\
                {% label using %}{% field %}{% endlabel %}\
              {% endrow %}\
            {% endfieldset %}\
          {% endforme %}";
        let template = compile(source).unwrap();
        let fieldset = Arc::clone(&root(&template).children()[0]);
        let row = Arc::clone(&fieldset.children()[1]);
        let label = Arc::clone(&row.children()[1]);
        let field = Arc::clone(&label.children()[0]);

        let body = field.find_template(None, &mut Context::new()).unwrap();
        assert_eq!(text(&body), "ROW");
    }

    #[test]
    fn test_exact_target_beats_nearer_default() {
        let source = r#"{% forme form replace %}{% fieldset using %}{% field "email" using %}EMAIL{% endfield %}{% row using %}{% field using %}ROW{% endfield %}{% label using %}{% field %}{% endlabel %}{% endrow %}{% endfieldset %}{% endforme %}"#;
        let template = compile(source).unwrap();
        let fieldset = Arc::clone(&root(&template).children()[0]);
        let row = Arc::clone(&fieldset.children()[1]);
        let field = Arc::clone(&row.children()[1].children()[0]);

        // Each ancestor is tried exact-then-default before moving up.
        let body = field.find_template(Some("email"), &mut Context::new()).unwrap();
        assert_eq!(text(&body), "ROW");
    }

    #[test]
    fn test_root_definitions_not_part_of_structural_chain() {
        let source = "{% forme form using %}{% field using %}ROOT{% endfield %}{% fieldset using %}{% row %}{% endfieldset %}{% endforme %}";
        let template = compile(source).unwrap();
        let row = Arc::clone(&root(&template).children()[1].children()[0]);
        let err = row.find_template(None, &mut Context::new()).unwrap_err();
        assert!(matches!(err, FormeError::MissingTemplate(ref tag) if tag == "row"));
    }

    #[test]
    fn test_standalone_definition_renders_nothing() {
        let engine = engine(FormeSettings::default());
        let mut ctx = Context::new();
        ctx.set("field", dict_field("email", vec![]));
        let out = engine
            .render_string("[{% field using %}X{% endfield %}]", &mut ctx)
            .unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_field_requires_field_in_context() {
        let engine = engine(FormeSettings::default());
        let err = engine.render_string("{% field %}", &mut Context::new()).unwrap_err();
        assert!(matches!(
            err,
            FormeError::InvalidContext { ref tag, ref variable } if tag == "field" && variable == "field"
        ));
    }

    #[test]
    fn test_row_and_fieldset_require_context() {
        let engine = engine(FormeSettings::default());
        let err = engine.render_string("{% row %}", &mut Context::new()).unwrap_err();
        assert!(matches!(err, FormeError::InvalidContext { ref variable, .. } if variable == "fieldset"));
        let err = engine.render_string("{% fieldset %}", &mut Context::new()).unwrap_err();
        assert!(matches!(err, FormeError::InvalidContext { ref variable, .. } if variable == "form"));
        let err = engine.render_string("{% hiddenfields %}", &mut Context::new()).unwrap_err();
        assert!(matches!(err, FormeError::InvalidContext { ref tag, .. } if tag == "hiddenfields"));
    }

    #[test]
    fn test_errors_without_errors_is_a_no_op() {
        let engine = engine(FormeSettings::default().with_default_style(None));
        let mut ctx = Context::new();
        ctx.set("field", dict_field("email", vec![]));
        assert_eq!(engine.render_string("[{% errors %}]", &mut ctx).unwrap(), "[]");

        ctx.set("field", dict_field("email", vec!["Bad"]));
        let err = engine.render_string("[{% errors %}]", &mut ctx).unwrap_err();
        assert!(matches!(err, FormeError::MissingTemplate(ref tag) if tag == "errors"));
    }

    #[test]
    fn test_missing_template_without_default_style() {
        let engine = engine(FormeSettings::default().with_default_style(None));
        let form = Form::new(vec![FieldDef::new("email", WidgetType::EmailInput)]);
        let mut ctx = Context::new();
        ctx.set("form", ContextValue::object(form));

        let err = engine
            .render_string("{% forme form using %}{% for field in form %}{% field %}{% endfor %}{% endforme %}", &mut ctx)
            .unwrap_err();
        assert!(matches!(err, FormeError::MissingTemplate(ref tag) if tag == "field"));
        assert_eq!(err.to_string(), "Template for tag field is missing.");
    }

    #[test]
    fn test_forme_with_empty_target_fails() {
        let engine = engine(FormeSettings::default());
        let err = engine
            .render_string("{% forme missing using %}x{% endforme %}", &mut Context::new())
            .unwrap_err();
        assert!(matches!(err, FormeError::MissingForm(_)));

        let err = engine
            .render_string("{% forme using %}x{% endforme %}", &mut Context::new())
            .unwrap_err();
        assert!(matches!(err, FormeError::MissingForm(_)));
    }

    #[test]
    fn test_forme_unknown_literal_style() {
        let engine = engine(FormeSettings::default());
        let mut ctx = Context::new();
        ctx.set("form", ContextValue::object(Form::new(vec![])));
        let err = engine
            .render_string(r#"{% forme form "fancy" using %}x{% endforme %}"#, &mut ctx)
            .unwrap_err();
        assert!(matches!(err, FormeError::InvalidStyle(_)));
    }

    #[test]
    fn test_scopes_are_popped_after_render() {
        let engine = engine(FormeSettings::default());
        let form = Form::new(vec![FieldDef::new("email", WidgetType::EmailInput)]);
        let mut ctx = Context::new();
        ctx.set("form", ContextValue::object(form));
        let depth = ctx.depth();
        engine.render_string("{% forme form %}", &mut ctx).unwrap();
        assert_eq!(ctx.depth(), depth);
        assert!(!ctx.contains(STYLE_SCOPE_VAR));
        assert!(!ctx.contains(ROOT_SCOPE_VAR));
    }

    #[test]
    fn test_scopes_are_popped_when_render_fails() {
        let engine = engine(FormeSettings::default().with_default_style(None));
        let form = Form::new(vec![FieldDef::new("email", WidgetType::EmailInput)]);
        let mut ctx = Context::new();
        ctx.set("form", ContextValue::object(form));
        let depth = ctx.depth();

        let err = engine
            .render_string(
                concat!(
                    "{% forme form using %}",
                    "{% fieldset using %}{% for field in fieldset %}{% field %}{% endfor %}{% endfieldset %}",
                    "{% fieldset %}",
                    "{% endforme %}",
                ),
                &mut ctx,
            )
            .unwrap_err();
        assert!(matches!(err, FormeError::MissingTemplate(ref tag) if tag == "field"));
        assert_eq!(ctx.depth(), depth);
        assert!(!ctx.contains(STYLE_SCOPE_VAR));
        assert!(!ctx.contains(ROOT_SCOPE_VAR));
        assert!(!ctx.contains("fieldset"));
        assert!(!ctx.contains("field"));
    }

    #[test]
    fn test_action_keywords() {
        assert_eq!(Action::from_token("using"), Some(Action::Using));
        assert_eq!(Action::from_token("replace"), Some(Action::Replace));
        assert_eq!(Action::from_token("form"), None);
        assert!(!Action::Default.is_paired());
        assert_eq!(Action::Replace.keyword(), "replace");
    }
}
