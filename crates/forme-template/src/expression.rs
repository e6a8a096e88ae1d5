//! Template expressions and filter chains.
//!
//! An [`Expression`] is a variable path or a literal; a variable tag
//! (`{{ field.errors|join:", " }}`) is an expression followed by zero or
//! more [`FilterCall`]s.

use forme_core::error::FormeError;

use crate::context::{Context, ContextValue};
use crate::filters;

/// A parsed filter call with a name and optional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCall {
    /// The filter name (e.g., `lower`, `default`).
    pub name: String,
    /// Arguments to the filter (e.g., the `", "` in `join:", "`).
    pub args: Vec<Expression>,
}

/// A parsed expression: a variable name or a literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A variable reference, possibly dot-separated (e.g., `form.email`).
    Variable(String),
    /// A string literal (e.g., `"hello"` or `'hello'`).
    StringLiteral(String),
    /// A numeric literal.
    NumericLiteral(f64),
}

impl Expression {
    /// Resolves this expression against a context, returning a `ContextValue`.
    ///
    /// Unbound variables resolve to [`ContextValue::None`].
    pub fn resolve(&self, context: &Context) -> ContextValue {
        match self {
            Self::Variable(name) => context.get(name).unwrap_or(ContextValue::None),
            Self::StringLiteral(s) => ContextValue::String(s.clone()),
            Self::NumericLiteral(n) => {
                if n.fract() == 0.0 {
                    #[allow(clippy::cast_possible_truncation)]
                    ContextValue::Integer(*n as i64)
                } else {
                    ContextValue::Float(*n)
                }
            }
        }
    }

    /// Returns the source text of the expression, without quotes.
    pub fn text(&self) -> String {
        match self {
            Self::Variable(s) | Self::StringLiteral(s) => s.clone(),
            Self::NumericLiteral(n) => n.to_string(),
        }
    }
}

/// A variable expression with its filter chain, as found in `{{ }}`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression {
    /// The base expression.
    pub expression: Expression,
    /// Filter calls to apply in order.
    pub filters: Vec<FilterCall>,
}

impl FilterExpression {
    /// Parses `expr|filter:arg|filter`.
    ///
    /// # Errors
    ///
    /// Returns a `TemplateSyntaxError` for an empty expression or a filter
    /// that is not registered.
    pub fn parse(source: &str) -> Result<Self, FormeError> {
        let (expression, filters) = parse_variable_expression(source)?;
        let registry = filters::default_registry();
        if let Some(unknown) = filters.iter().find(|f| !registry.contains(&f.name)) {
            return Err(FormeError::TemplateSyntaxError(format!(
                "Unknown filter: '{}'",
                unknown.name
            )));
        }
        Ok(Self {
            expression,
            filters,
        })
    }

    /// Resolves the expression and applies every filter.
    ///
    /// # Errors
    ///
    /// Propagates filter failures.
    pub fn resolve(&self, context: &Context) -> Result<ContextValue, FormeError> {
        let registry = filters::default_registry();
        let mut value = self.expression.resolve(context);
        for filter in &self.filters {
            let args: Vec<ContextValue> = filter.args.iter().map(|a| a.resolve(context)).collect();
            value = registry.apply(&filter.name, &value, &args)?;
        }
        Ok(value)
    }
}

/// Parses a variable expression string (the content inside `{{ }}`).
///
/// Supports filter chaining: `name|lower|default:"x"`.
///
/// # Errors
///
/// Returns a `TemplateSyntaxError` if the expression is empty.
pub fn parse_variable_expression(
    expr: &str,
) -> Result<(Expression, Vec<FilterCall>), FormeError> {
    let parts = split_on_pipes(expr);
    let (first, rest) = parts.split_first().ok_or_else(|| {
        FormeError::TemplateSyntaxError("Empty variable expression".to_string())
    })?;

    let base_expr = parse_expression(first.trim())?;
    let filters = rest
        .iter()
        .map(|part| parse_filter_call(part.trim()))
        .collect::<Result<Vec<_>, _>>()?;

    Ok((base_expr, filters))
}

/// Splits on `|` but not inside strings.
fn split_on_pipes(s: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut start = 0;
    let mut in_single = false;
    let mut in_double = false;

    for (i, ch) in s.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '|' if !in_single && !in_double => {
                result.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    result.push(&s[start..]);
    result
}

/// Parses a single expression (variable reference or literal).
///
/// # Errors
///
/// Returns a `TemplateSyntaxError` for an empty expression.
pub fn parse_expression(s: &str) -> Result<Expression, FormeError> {
    let s = s.trim();

    if s.is_empty() {
        return Err(FormeError::TemplateSyntaxError(
            "Empty expression".to_string(),
        ));
    }

    if is_quoted(s) {
        return Ok(Expression::StringLiteral(s[1..s.len() - 1].to_string()));
    }

    if let Ok(n) = s.parse::<f64>() {
        return Ok(Expression::NumericLiteral(n));
    }

    Ok(Expression::Variable(s.to_string()))
}

/// Returns `true` if `s` is wrapped in matching single or double quotes.
pub fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
}

/// Strips surrounding quotes from a string.
pub fn strip_quotes(s: &str) -> String {
    let s = s.trim();
    if is_quoted(s) {
        s[1..s.len() - 1].to_string()
    } else {
        s.to_string()
    }
}

/// Parses a filter call like `lower` or `default:"N/A"`.
fn parse_filter_call(s: &str) -> Result<FilterCall, FormeError> {
    if let Some(colon_pos) = find_filter_colon(s) {
        let name = s[..colon_pos].trim().to_string();
        let arg = parse_expression(s[colon_pos + 1..].trim())?;
        Ok(FilterCall {
            name,
            args: vec![arg],
        })
    } else {
        Ok(FilterCall {
            name: s.to_string(),
            args: Vec::new(),
        })
    }
}

/// Finds the first colon that is not inside quotes.
fn find_filter_colon(s: &str) -> Option<usize> {
    let mut in_single = false;
    let mut in_double = false;
    for (i, ch) in s.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ':' if !in_single && !in_double => return Some(i),
            _ => {}
        }
    }
    None
}
