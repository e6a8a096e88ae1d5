//! Style templates.
//!
//! A style is an ordinary template holding exactly one `{% forme %}` tag,
//! usually `{% forme using %}`, whose `using` children define the default
//! template of every tag kind.

use std::sync::Arc;

use forme_core::error::{FormeError, FormeResult};
use forme_template::engine::TemplateRenderer;
use forme_template::parser::Template;

use crate::grammar::TagKind;
use crate::nodes::{direct_children, FormeNode};

/// Returns the root forme node of a compiled style template.
///
/// # Errors
///
/// Returns `InvalidStyle` unless the template has exactly one top-level
/// `{% forme %}` tag.
pub fn load_style(template: &Template) -> FormeResult<Arc<FormeNode>> {
    let mut roots: Vec<Arc<FormeNode>> = direct_children(&template.nodes)
        .into_iter()
        .filter(|node| node.kind() == TagKind::Forme)
        .collect();

    match roots.len() {
        1 => Ok(roots.remove(0)),
        0 => Err(FormeError::InvalidStyle(format!(
            "Style template '{}' has no {{% forme %}} tag",
            template.name
        ))),
        n => Err(FormeError::InvalidStyle(format!(
            "Style template '{}' has {n} {{% forme %}} tags, expected exactly one",
            template.name
        ))),
    }
}

/// Loads a style template through `renderer` and returns its root node.
///
/// # Errors
///
/// Returns loading and compile errors, or `InvalidStyle`.
pub fn load_style_template(renderer: &dyn TemplateRenderer, name: &str) -> FormeResult<Arc<FormeNode>> {
    let template = renderer.get_template(name)?;
    load_style(&template)
}

#[cfg(test)]
mod tests {
    use super::*;
    use forme_core::settings::FormeSettings;
    use forme_template::Engine;

    fn engine() -> Engine {
        let mut engine = Engine::new();
        crate::install(&mut engine, FormeSettings::default());
        engine
    }

    #[test]
    fn test_bare_style_defines_every_tag() {
        let engine = engine();
        let style = load_style_template(&engine, forme_core::settings::BARE_STYLE_TEMPLATE).unwrap();
        assert_eq!(style.kind(), TagKind::Forme);
        for kind in TagKind::ALL {
            assert!(style.store().find_default(kind).is_some(), "bare style lacks {kind}");
        }
    }

    #[test]
    fn test_style_without_forme_tag() {
        let engine = engine();
        engine.add_string_template("empty.html", "{% if x %}nothing{% endif %}");
        let err = load_style_template(&engine, "empty.html").unwrap_err();
        assert!(matches!(err, FormeError::InvalidStyle(ref msg) if msg.contains("empty.html")));
    }

    #[test]
    fn test_style_with_two_forme_tags() {
        let engine = engine();
        engine.add_string_template(
            "double.html",
            "{% forme using %}a{% endforme %}{% forme using %}b{% endforme %}",
        );
        let err = load_style_template(&engine, "double.html").unwrap_err();
        assert!(matches!(err, FormeError::InvalidStyle(ref msg) if msg.contains("2")));
    }

    #[test]
    fn test_style_forme_found_through_builtin_tags() {
        let engine = engine();
        engine.add_string_template(
            "wrapped.html",
            "{% with x=1 %}{% forme using %}a{% endforme %}{% endwith %}",
        );
        assert!(load_style_template(&engine, "wrapped.html").is_ok());
    }

    #[test]
    fn test_missing_style_template() {
        let err = load_style_template(&engine(), "nope.html").unwrap_err();
        assert!(matches!(err, FormeError::TemplateDoesNotExist(_)));
    }
}
