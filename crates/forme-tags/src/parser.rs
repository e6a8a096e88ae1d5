//! Compiling forme tag occurrences.
//!
//! The tag syntax is `{% <kind> [target ...] [using|replace] %}`. A tag
//! with an action is paired and runs to `{% end<kind> %}`. Quoted targets
//! are literal names and may list several names separated by whitespace;
//! unquoted targets are expressions resolved at render time.

use std::sync::Arc;

use forme_core::error::{FormeError, FormeResult};
use forme_core::settings::FormeSettings;
use forme_template::expression::{is_quoted, parse_expression, strip_quotes};
use forme_template::lexer::Token;
use forme_template::parser::{Node, Parser};

use crate::grammar::TagKind;
use crate::nodes::{Action, FormeNode, FormeTag};
use crate::styles::Key;

/// The parsed head of a forme tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInvocation {
    /// The tag kind.
    pub kind: TagKind,
    /// The targets, in source order.
    pub targets: Vec<Key>,
    /// The trailing action.
    pub action: Action,
}

/// Parses the split contents of a tag, name first.
///
/// # Errors
///
/// Returns `UnknownTagKind` for a name outside the grammar and
/// `TemplateSyntaxError` for malformed targets.
pub fn parse_invocation(bits: &[String]) -> FormeResult<TagInvocation> {
    let (name, mut args) = bits
        .split_first()
        .ok_or_else(|| FormeError::TemplateSyntaxError("Empty forme tag".to_string()))?;
    let kind = TagKind::from_name(name)?;

    let mut action = Action::Default;
    if let Some((last, rest)) = args.split_last() {
        if let Some(parsed) = Action::from_token(last) {
            action = parsed;
            args = rest;
        }
    }

    if kind == TagKind::HiddenFields && !args.is_empty() {
        return Err(FormeError::TemplateSyntaxError(format!(
            "'{}' takes no targets",
            kind.name()
        )));
    }

    let mut targets = Vec::new();
    for arg in args {
        if is_quoted(arg) {
            targets.extend(strip_quotes(arg).split_whitespace().map(Key::literal));
        } else {
            targets.push(Key::deferred(parse_expression(arg)?));
        }
    }

    Ok(TagInvocation {
        kind,
        targets,
        action,
    })
}

/// Compiles one forme tag occurrence, consuming its body from `parser`
/// when the tag is paired.
///
/// # Errors
///
/// Returns syntax errors from the tag head or body, and the errors of
/// [`FormeNode::build`].
pub fn compile_tag(parser: &mut Parser<'_>, token: &Token, settings: &Arc<FormeSettings>) -> FormeResult<Node> {
    let invocation = parse_invocation(&token.split_contents())?;
    let body = if invocation.action.is_paired() {
        parser.parse_body(&invocation.kind.end_tag())?
    } else {
        Vec::new()
    };

    tracing::trace!(
        tag = %invocation.kind,
        action = invocation.action.keyword(),
        targets = invocation.targets.len(),
        line = token.line,
        "Compiling forme tag"
    );
    let node = FormeNode::build(
        invocation.kind,
        invocation.targets,
        invocation.action,
        body,
        Arc::clone(settings),
    )?;
    Ok(Node::Custom(Box::new(FormeTag::new(node))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(source: &str) -> Vec<String> {
        source.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn test_parse_plain_tag() {
        let inv = parse_invocation(&bits("field")).unwrap();
        assert_eq!(inv.kind, TagKind::Field);
        assert!(inv.targets.is_empty());
        assert_eq!(inv.action, Action::Default);
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(parse_invocation(&bits("row using")).unwrap().action, Action::Using);
        assert_eq!(parse_invocation(&bits("forme replace")).unwrap().action, Action::Replace);
    }

    #[test]
    fn test_action_only_counts_last() {
        let inv = parse_invocation(&bits("field using email")).unwrap();
        assert_eq!(inv.action, Action::Default);
        assert_eq!(inv.targets.len(), 2);
    }

    #[test]
    fn test_quoted_target_splits_names() {
        let inv = parse_invocation(&["row".to_string(), "\"first_name last_name\"".to_string()]).unwrap();
        assert_eq!(
            inv.targets,
            vec![Key::literal("first_name"), Key::literal("last_name")]
        );
        assert!(matches!(inv.targets[0], Key::Literal(_)));
    }

    #[test]
    fn test_unquoted_target_is_deferred() {
        let inv = parse_invocation(&bits("forme form using")).unwrap();
        assert_eq!(inv.targets.len(), 1);
        assert!(matches!(&inv.targets[0], Key::Deferred { text, .. } if text == "form"));
    }

    #[test]
    fn test_unknown_tag() {
        assert!(matches!(
            parse_invocation(&bits("fielderrors")),
            Err(FormeError::UnknownTagKind(_))
        ));
    }

    #[test]
    fn test_hiddenfields_takes_no_targets() {
        assert!(parse_invocation(&bits("hiddenfields using")).is_ok());
        let err = parse_invocation(&bits("hiddenfields form")).unwrap_err();
        assert!(err.is_syntax_error());
    }

    #[test]
    fn test_empty_tag() {
        assert!(parse_invocation(&[]).is_err());
    }
}
