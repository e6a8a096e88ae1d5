//! Template parser.
//!
//! Converts a stream of lexer [`Token`]s into a tree of [`Node`]s that can be
//! rendered by the engine. Built-in tags are parsed here; any other block tag
//! is handed to the compiler registered for it in a tag [`Library`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;

use forme_core::error::{FormeError, FormeResult};

use crate::context::{escape_html, Context, ContextValue};
use crate::engine::TemplateRenderer;
use crate::expression::{parse_expression, Expression, FilterExpression};
use crate::lexer::{Token, TokenKind};
use crate::library::{find_tag, Library};

/// A node contributed by a tag library.
///
/// Custom nodes are compiled once and shared by every render of their
/// template, so `render` must not mutate the node.
pub trait CustomNode: fmt::Debug + Send + Sync {
    /// The tag name this node was compiled from.
    fn tag_name(&self) -> &str;

    /// Renders the node against the context.
    fn render(&self, context: &mut Context, renderer: &dyn TemplateRenderer) -> FormeResult<String>;

    /// Allows callers to recover the concrete node type.
    fn as_any(&self) -> &dyn Any;
}

/// A node in the parsed template tree.
#[derive(Debug)]
pub enum Node {
    /// A literal text segment.
    Text(String),
    /// A variable with optional filter chain.
    Variable(FilterExpression),
    /// An `{% if %}` conditional with `elif` branches and an optional `else`.
    If {
        /// Conditions and their node lists, in source order.
        branches: Vec<(IfCondition, Vec<Node>)>,
        /// Rendered when no branch matches.
        else_body: Vec<Node>,
    },
    /// A `{% for var in iterable %}` loop.
    For {
        /// The loop variable name(s).
        loop_vars: Vec<String>,
        /// The iterable expression.
        iterable: FilterExpression,
        /// Body nodes.
        body: Vec<Node>,
        /// Nodes to render when the iterable is empty (`{% empty %}`).
        empty_body: Vec<Node>,
    },
    /// A `{% with %}` scope.
    With {
        /// Variable assignments.
        assignments: Vec<(String, FilterExpression)>,
        /// Body nodes.
        body: Vec<Node>,
    },
    /// An `{% include "template.html" %}` directive.
    Include {
        /// Template name to include.
        template_name: Expression,
        /// Extra context assignments (`with key=value`).
        extra_context: Vec<(String, FilterExpression)>,
        /// If true, only the extra context is available.
        only: bool,
    },
    /// A `{% block name %}...{% endblock %}` section, rendered in place.
    Block {
        /// The block name.
        name: String,
        /// The block content.
        body: Vec<Node>,
    },
    /// `{% comment %}...{% endcomment %}`, suppressed output.
    Comment,
    /// `{% load lib %}`. Libraries are registered on the engine, so this is a no-op.
    Load(Vec<String>),
    /// A node compiled by a tag library.
    Custom(Box<dyn CustomNode>),
}

impl Node {
    /// Returns the nested node lists of a built-in node.
    ///
    /// Custom nodes are opaque and report none.
    pub fn child_nodelists(&self) -> Vec<&[Self]> {
        match self {
            Self::If {
                branches,
                else_body,
            } => branches
                .iter()
                .map(|(_, body)| body.as_slice())
                .chain(std::iter::once(else_body.as_slice()))
                .collect(),
            Self::For {
                body, empty_body, ..
            } => vec![body.as_slice(), empty_body.as_slice()],
            Self::With { body, .. } | Self::Block { body, .. } => vec![body.as_slice()],
            _ => Vec::new(),
        }
    }

    /// Mutable counterpart of [`Node::child_nodelists`].
    pub fn child_nodelists_mut(&mut self) -> Vec<&mut Vec<Self>> {
        match self {
            Self::If {
                branches,
                else_body,
            } => branches
                .iter_mut()
                .map(|(_, body)| body)
                .chain(std::iter::once(else_body))
                .collect(),
            Self::For {
                body, empty_body, ..
            } => vec![body, empty_body],
            Self::With { body, .. } | Self::Block { body, .. } => vec![body],
            _ => Vec::new(),
        }
    }

    /// Downcasts a custom node to its concrete type.
    pub fn as_custom<T: 'static>(&self) -> Option<&T> {
        match self {
            Self::Custom(custom) => custom.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Returns `true` if this is a text node holding only whitespace.
    pub fn is_blank_text(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }
}

/// Returns the custom nodes reachable from `nodes` through built-in nodes,
/// without descending into the custom nodes themselves.
pub fn find_custom_nodes(nodes: &[Node]) -> Vec<&dyn CustomNode> {
    let mut found = Vec::new();
    collect_custom_nodes(nodes, &mut found);
    found
}

fn collect_custom_nodes<'a>(nodes: &'a [Node], found: &mut Vec<&'a dyn CustomNode>) {
    for node in nodes {
        if let Node::Custom(custom) = node {
            found.push(custom.as_ref());
        } else {
            for list in node.child_nodelists() {
                collect_custom_nodes(list, found);
            }
        }
    }
}

/// Removes every node for which `keep` returns `false`, descending into
/// built-in nodes.
pub fn retain_nodes(nodes: &mut Vec<Node>, keep: &dyn Fn(&Node) -> bool) {
    nodes.retain(|node| keep(node));
    for node in nodes.iter_mut() {
        for list in node.child_nodelists_mut() {
            retain_nodes(list, keep);
        }
    }
}

/// Returns `true` if rendering `nodes` can only ever produce whitespace.
pub fn is_blank(nodes: &[Node]) -> bool {
    nodes
        .iter()
        .all(|node| node.is_blank_text() || matches!(node, Node::Comment | Node::Load(_)))
}

/// A condition in an `{% if %}` branch.
#[derive(Debug, Clone)]
pub enum IfCondition {
    /// A simple expression truthiness test.
    Expr(FilterExpression),
    /// Negation of a condition.
    Not(Box<IfCondition>),
    /// Both conditions must hold.
    And(Box<IfCondition>, Box<IfCondition>),
    /// Either condition must hold.
    Or(Box<IfCondition>, Box<IfCondition>),
    /// `a == b`.
    Equal(FilterExpression, FilterExpression),
    /// `a != b`.
    NotEqual(FilterExpression, FilterExpression),
}

impl IfCondition {
    /// Evaluates the condition against a context.
    ///
    /// # Errors
    ///
    /// Propagates filter failures.
    pub fn evaluate(&self, context: &Context) -> FormeResult<bool> {
        Ok(match self {
            Self::Expr(expr) => expr.resolve(context)?.is_truthy(),
            Self::Not(inner) => !inner.evaluate(context)?,
            Self::And(a, b) => a.evaluate(context)? && b.evaluate(context)?,
            Self::Or(a, b) => a.evaluate(context)? || b.evaluate(context)?,
            Self::Equal(a, b) => a.resolve(context)? == b.resolve(context)?,
            Self::NotEqual(a, b) => a.resolve(context)? != b.resolve(context)?,
        })
    }
}

/// A parsed template.
#[derive(Debug)]
pub struct Template {
    /// The template name (usually the file path).
    pub name: String,
    /// The parsed node tree.
    pub nodes: Vec<Node>,
}

impl Template {
    /// Renders the whole template.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any node.
    pub fn render(&self, context: &mut Context, renderer: &dyn TemplateRenderer) -> FormeResult<String> {
        let span = forme_core::logging::render_span(&self.name);
        let _enter = span.enter();
        context.begin_render();
        let result = render_nodes(&self.nodes, context, renderer);
        context.end_render();
        result
    }

    /// Returns the content of the first `{% block name %}` found.
    pub fn find_block(&self, name: &str) -> Option<&[Node]> {
        find_block_in(&self.nodes, name)
    }

    /// Renders just the content of one `{% block %}`.
    ///
    /// # Errors
    ///
    /// Returns a `TemplateSyntaxError` if the block does not exist.
    pub fn render_block(
        &self,
        name: &str,
        context: &mut Context,
        renderer: &dyn TemplateRenderer,
    ) -> FormeResult<String> {
        let body = self.find_block(name).ok_or_else(|| {
            FormeError::TemplateSyntaxError(format!(
                "Block '{name}' not found in template '{}'",
                self.name
            ))
        })?;
        render_nodes(body, context, renderer)
    }

    /// Returns the top-level custom nodes of the template.
    pub fn custom_nodes(&self) -> Vec<&dyn CustomNode> {
        find_custom_nodes(&self.nodes)
    }
}

fn find_block_in<'a>(nodes: &'a [Node], name: &str) -> Option<&'a [Node]> {
    nodes.iter().find_map(|node| match node {
        Node::Block { name: n, body } if n == name => Some(body.as_slice()),
        other => other
            .child_nodelists()
            .into_iter()
            .find_map(|list| find_block_in(list, name)),
    })
}

/// Parses a list of tokens into a `Template`.
///
/// # Errors
///
/// Returns `TemplateSyntaxError` for invalid tag structures, or whatever a
/// library tag compiler reports.
pub fn parse(name: &str, tokens: &[Token], libraries: &[Library]) -> FormeResult<Template> {
    let mut parser = Parser::new(tokens, libraries);
    let nodes = parser.parse_until(&[])?;
    Ok(Template {
        name: name.to_string(),
        nodes,
    })
}

/// The parser state handed to tag compilers.
pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    libraries: &'a [Library],
}

impl<'a> Parser<'a> {
    /// Creates a parser over `tokens` that consults `libraries` for custom tags.
    pub const fn new(tokens: &'a [Token], libraries: &'a [Library]) -> Self {
        Self {
            tokens,
            pos: 0,
            libraries,
        }
    }

    /// Parses nodes until one of `end_tags` is reached (or the token stream
    /// ends). The end tag itself is left unconsumed.
    ///
    /// # Errors
    ///
    /// Propagates the first compile error.
    pub fn parse_until(&mut self, end_tags: &[&str]) -> FormeResult<Vec<Node>> {
        let tokens = self.tokens;
        let mut nodes = Vec::new();

        while let Some(token) = tokens.get(self.pos) {
            match &token.kind {
                TokenKind::Text(text) => {
                    nodes.push(Node::Text(text.clone()));
                    self.pos += 1;
                }
                TokenKind::Comment(_) => {
                    self.pos += 1;
                }
                TokenKind::Variable(expr) => {
                    let expression = FilterExpression::parse(expr).map_err(|e| at_line(e, token.line))?;
                    nodes.push(Node::Variable(expression));
                    self.pos += 1;
                }
                TokenKind::Block { name, .. } => {
                    if end_tags.contains(&name.as_str()) {
                        break;
                    }
                    self.pos += 1;
                    nodes.push(self.parse_block_tag(token)?);
                }
            }
        }

        Ok(nodes)
    }

    /// Consumes `end_tag`, failing if the next token is anything else.
    ///
    /// # Errors
    ///
    /// Returns a `TemplateSyntaxError` naming the missing end tag.
    pub fn expect_end_tag(&mut self, end_tag: &str) -> FormeResult<()> {
        match self.tokens.get(self.pos) {
            Some(token) if token.block_name() == Some(end_tag) => {
                self.pos += 1;
                Ok(())
            }
            Some(token) => Err(FormeError::TemplateSyntaxError(format!(
                "Expected '{{% {end_tag} %}}' on line {}",
                token.line
            ))),
            None => Err(FormeError::TemplateSyntaxError(format!(
                "Unclosed tag: expected '{{% {end_tag} %}}' before end of template"
            ))),
        }
    }

    /// Parses a paired tag body up to and including `end_tag`.
    ///
    /// # Errors
    ///
    /// Fails if the body does not compile or the end tag is missing.
    pub fn parse_body(&mut self, end_tag: &str) -> FormeResult<Vec<Node>> {
        let body = self.parse_until(&[end_tag])?;
        self.expect_end_tag(end_tag)?;
        Ok(body)
    }

    /// Returns the next unconsumed token.
    pub fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn parse_block_tag(&mut self, token: &'a Token) -> FormeResult<Node> {
        let TokenKind::Block { name, args } = &token.kind else {
            return Err(FormeError::TemplateSyntaxError(format!(
                "Expected a block tag on line {}",
                token.line
            )));
        };

        let node = match name.as_str() {
            "if" => self.parse_if(args),
            "for" => self.parse_for(args),
            "with" => self.parse_with(args),
            "include" => self.parse_include(args),
            "block" => {
                let block_name = args.first().ok_or_else(|| {
                    FormeError::TemplateSyntaxError("{% block %} requires a name".to_string())
                })?;
                let body = self.parse_body("endblock")?;
                Ok(Node::Block {
                    name: block_name.clone(),
                    body,
                })
            }
            "comment" => self.skip_comment(),
            "load" => Ok(Node::Load(args.clone())),
            _ => {
                let libraries = self.libraries;
                return match find_tag(libraries, name) {
                    Some(compiler) => compiler(self, token),
                    None => Err(FormeError::TemplateSyntaxError(format!(
                        "Invalid block tag on line {}: '{name}'",
                        token.line
                    ))),
                };
            }
        };

        node.map_err(|e| at_line(e, token.line))
    }

    fn skip_comment(&mut self) -> FormeResult<Node> {
        let end = self.tokens[self.pos..]
            .iter()
            .position(|t| t.block_name() == Some("endcomment"))
            .ok_or_else(|| {
                FormeError::TemplateSyntaxError(
                    "Unclosed tag: expected '{% endcomment %}' before end of template".to_string(),
                )
            })?;
        self.pos += end + 1;
        Ok(Node::Comment)
    }

    fn parse_if(&mut self, args: &[String]) -> FormeResult<Node> {
        let tokens = self.tokens;
        let mut branches = Vec::new();
        let mut condition = parse_if_condition(args)?;

        loop {
            let body = self.parse_until(&["elif", "else", "endif"])?;
            let Some(token) = tokens.get(self.pos) else {
                return Err(FormeError::TemplateSyntaxError(
                    "Unclosed tag: expected '{% endif %}' before end of template".to_string(),
                ));
            };
            self.pos += 1;
            branches.push((condition, body));

            match &token.kind {
                TokenKind::Block { name, args } if name == "elif" => {
                    condition = parse_if_condition(args)?;
                }
                TokenKind::Block { name, .. } if name == "else" => {
                    let else_body = self.parse_body("endif")?;
                    return Ok(Node::If {
                        branches,
                        else_body,
                    });
                }
                _ => {
                    return Ok(Node::If {
                        branches,
                        else_body: Vec::new(),
                    });
                }
            }
        }
    }

    fn parse_for(&mut self, args: &[String]) -> FormeResult<Node> {
        let in_pos = args.iter().position(|a| a == "in").ok_or_else(|| {
            FormeError::TemplateSyntaxError("{% for %} requires 'in' keyword".to_string())
        })?;

        let loop_vars: Vec<String> = args[..in_pos]
            .iter()
            .flat_map(|v| v.split(','))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect();
        if loop_vars.is_empty() {
            return Err(FormeError::TemplateSyntaxError(
                "{% for %} requires a loop variable".to_string(),
            ));
        }

        let iterable = FilterExpression::parse(&args[in_pos + 1..].join(" "))?;

        let body = self.parse_until(&["empty", "endfor"])?;
        let empty_body = if self.peek().and_then(Token::block_name) == Some("empty") {
            self.pos += 1;
            self.parse_until(&["endfor"])?
        } else {
            Vec::new()
        };
        self.expect_end_tag("endfor")?;

        Ok(Node::For {
            loop_vars,
            iterable,
            body,
            empty_body,
        })
    }

    fn parse_with(&mut self, args: &[String]) -> FormeResult<Node> {
        let assignments = parse_assignments(args)?;
        if assignments.is_empty() {
            return Err(FormeError::TemplateSyntaxError(
                "{% with %} expects at least one 'name=value' assignment".to_string(),
            ));
        }
        let body = self.parse_body("endwith")?;
        Ok(Node::With { assignments, body })
    }

    fn parse_include(&mut self, args: &[String]) -> FormeResult<Node> {
        let (first, rest) = args.split_first().ok_or_else(|| {
            FormeError::TemplateSyntaxError("{% include %} requires a template name".to_string())
        })?;
        let template_name = parse_expression(first)?;

        let only = rest.iter().any(|a| a == "only");
        let extra_context = match rest.iter().position(|a| a == "with") {
            Some(pos) => {
                let assigns: Vec<String> =
                    rest[pos + 1..].iter().filter(|a| *a != "only").cloned().collect();
                parse_assignments(&assigns)?
            }
            None => Vec::new(),
        };

        Ok(Node::Include {
            template_name,
            extra_context,
            only,
        })
    }
}

fn parse_assignments(args: &[String]) -> FormeResult<Vec<(String, FilterExpression)>> {
    args.iter()
        .map(|arg| {
            let (key, value) = arg.split_once('=').ok_or_else(|| {
                FormeError::TemplateSyntaxError(format!("Expected 'name=value', got '{arg}'"))
            })?;
            Ok((key.to_string(), FilterExpression::parse(value)?))
        })
        .collect()
}

fn at_line(err: FormeError, line: usize) -> FormeError {
    match err {
        FormeError::TemplateSyntaxError(msg) if !msg.contains(" line ") => {
            FormeError::TemplateSyntaxError(format!("{msg} (line {line})"))
        }
        other => other,
    }
}

fn parse_if_condition(args: &[String]) -> FormeResult<IfCondition> {
    if args.is_empty() {
        return Err(FormeError::TemplateSyntaxError(
            "{% if %} requires a condition".to_string(),
        ));
    }

    let mut pos = 0;
    let condition = parse_or_condition(args, &mut pos)?;
    if pos < args.len() {
        return Err(FormeError::TemplateSyntaxError(format!(
            "Unused '{}' at end of if expression",
            args[pos]
        )));
    }
    Ok(condition)
}

fn parse_or_condition(args: &[String], pos: &mut usize) -> FormeResult<IfCondition> {
    let left = parse_and_condition(args, pos)?;
    if args.get(*pos).is_some_and(|a| a == "or") {
        *pos += 1;
        let right = parse_or_condition(args, pos)?;
        Ok(IfCondition::Or(Box::new(left), Box::new(right)))
    } else {
        Ok(left)
    }
}

fn parse_and_condition(args: &[String], pos: &mut usize) -> FormeResult<IfCondition> {
    let left = parse_not_condition(args, pos)?;
    if args.get(*pos).is_some_and(|a| a == "and") {
        *pos += 1;
        let right = parse_and_condition(args, pos)?;
        Ok(IfCondition::And(Box::new(left), Box::new(right)))
    } else {
        Ok(left)
    }
}

fn parse_not_condition(args: &[String], pos: &mut usize) -> FormeResult<IfCondition> {
    if args.get(*pos).is_some_and(|a| a == "not") {
        *pos += 1;
        let inner = parse_not_condition(args, pos)?;
        Ok(IfCondition::Not(Box::new(inner)))
    } else {
        parse_comparison(args, pos)
    }
}

fn parse_comparison(args: &[String], pos: &mut usize) -> FormeResult<IfCondition> {
    let left = args.get(*pos).ok_or_else(|| {
        FormeError::TemplateSyntaxError("Unexpected end of if expression".to_string())
    })?;
    let left = FilterExpression::parse(left)?;
    *pos += 1;

    let Some(op) = args.get(*pos).filter(|op| *op == "==" || *op == "!=") else {
        return Ok(IfCondition::Expr(left));
    };
    *pos += 1;
    let right = args.get(*pos).ok_or_else(|| {
        FormeError::TemplateSyntaxError(format!("Expected a value after '{op}'"))
    })?;
    let right = FilterExpression::parse(right)?;
    *pos += 1;

    Ok(if op == "==" {
        IfCondition::Equal(left, right)
    } else {
        IfCondition::NotEqual(left, right)
    })
}

/// Renders a node list to a string.
///
/// # Errors
///
/// Returns the first error raised by any node; partial output is discarded.
pub fn render_nodes(
    nodes: &[Node],
    context: &mut Context,
    renderer: &dyn TemplateRenderer,
) -> FormeResult<String> {
    let mut output = String::new();
    for node in nodes {
        output.push_str(&render_node(node, context, renderer)?);
    }
    Ok(output)
}

fn render_node(
    node: &Node,
    context: &mut Context,
    renderer: &dyn TemplateRenderer,
) -> FormeResult<String> {
    match node {
        Node::Text(text) => Ok(text.clone()),
        Node::Variable(expression) => {
            let value = expression.resolve(context)?;
            if context.auto_escape() && !value.is_safe() {
                Ok(escape_html(&value.to_display_string()))
            } else {
                Ok(value.to_display_string())
            }
        }
        Node::If {
            branches,
            else_body,
        } => {
            for (condition, body) in branches {
                if condition.evaluate(context)? {
                    return render_nodes(body, context, renderer);
                }
            }
            render_nodes(else_body, context, renderer)
        }
        Node::For {
            loop_vars,
            iterable,
            body,
            empty_body,
        } => render_for(loop_vars, iterable, body, empty_body, context, renderer),
        Node::With { assignments, body } => {
            let values = assignments
                .iter()
                .map(|(key, expr)| Ok((key.clone(), expr.resolve(context)?)))
                .collect::<FormeResult<Vec<_>>>()?;
            let mut scope = context.push_bindings(values);
            render_nodes(body, &mut scope, renderer)
        }
        Node::Include {
            template_name,
            extra_context,
            only,
        } => {
            let name = template_name.resolve(context).to_display_string();
            let template = renderer.get_template(&name)?;
            let values = extra_context
                .iter()
                .map(|(key, expr)| Ok((key.clone(), expr.resolve(context)?)))
                .collect::<FormeResult<Vec<_>>>()?;
            if *only {
                let mut isolated = Context::from_bindings(values);
                isolated.set_auto_escape(context.auto_escape());
                template.render(&mut isolated, renderer)
            } else {
                let mut scope = context.push_bindings(values);
                template.render(&mut scope, renderer)
            }
        }
        Node::Block { body, .. } => render_nodes(body, context, renderer),
        Node::Comment | Node::Load(_) => Ok(String::new()),
        Node::Custom(custom) => custom.render(context, renderer),
    }
}

fn render_for(
    loop_vars: &[String],
    iterable: &FilterExpression,
    body: &[Node],
    empty_body: &[Node],
    context: &mut Context,
    renderer: &dyn TemplateRenderer,
) -> FormeResult<String> {
    let items = iterable.resolve(context)?.iter_items();
    if items.is_empty() {
        return render_nodes(empty_body, context, renderer);
    }

    let total = items.len();
    let parent_loop = context.get("forloop");
    let mut output = String::new();

    for (idx, item) in items.into_iter().enumerate() {
        let mut scope = context.push_scope();

        if let [single] = loop_vars {
            scope.set(single.clone(), item);
        } else {
            let parts = item.iter_items();
            for (j, var) in loop_vars.iter().enumerate() {
                scope.set(var.clone(), parts.get(j).cloned().unwrap_or(ContextValue::None));
            }
        }

        let mut forloop = HashMap::new();
        forloop.insert("counter".to_string(), ContextValue::from(idx + 1));
        forloop.insert("counter0".to_string(), ContextValue::from(idx));
        forloop.insert("revcounter".to_string(), ContextValue::from(total - idx));
        forloop.insert("first".to_string(), ContextValue::Bool(idx == 0));
        forloop.insert("last".to_string(), ContextValue::Bool(idx + 1 == total));
        if let Some(parent) = &parent_loop {
            forloop.insert("parentloop".to_string(), parent.clone());
        }
        scope.set("forloop", ContextValue::Dict(forloop));

        output.push_str(&render_nodes(body, &mut scope, renderer)?);
    }

    Ok(output)
}
