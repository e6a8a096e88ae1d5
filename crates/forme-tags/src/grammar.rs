//! The tag grammar.
//!
//! Eight tag kinds make up a form layout. Each kind declares which kinds may
//! be nested directly inside it; the full set of allowed children is that
//! direct set plus, transitively, everything its children allow. The table
//! is built once per process and never changes.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use forme_core::error::{FormeError, FormeResult};
use once_cell::sync::Lazy;

/// The kinds of forme tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TagKind {
    /// `{% forme %}`, the root of a layout. Selects the form(s) and style.
    Forme,
    /// `{% fieldset %}`, a group of fields.
    Fieldset,
    /// `{% row %}`, one or more fields rendered together.
    Row,
    /// `{% field %}`, the widget of the current field.
    Field,
    /// `{% label %}`, the label of the current field.
    Label,
    /// `{% errors %}`, the errors of the current field.
    Errors,
    /// `{% nonfielderrors %}`, form-level errors.
    NonFieldErrors,
    /// `{% hiddenfields %}`, the form's hidden inputs.
    HiddenFields,
}

impl TagKind {
    /// Every tag kind, root first.
    pub const ALL: [Self; 8] = [
        Self::Forme,
        Self::Fieldset,
        Self::Row,
        Self::Field,
        Self::Label,
        Self::Errors,
        Self::NonFieldErrors,
        Self::HiddenFields,
    ];

    /// The tag name used in templates.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Forme => "forme",
            Self::Fieldset => "fieldset",
            Self::Row => "row",
            Self::Field => "field",
            Self::Label => "label",
            Self::Errors => "errors",
            Self::NonFieldErrors => "nonfielderrors",
            Self::HiddenFields => "hiddenfields",
        }
    }

    /// Looks a kind up by tag name.
    ///
    /// # Errors
    ///
    /// Returns `UnknownTagKind` for names outside the grammar.
    pub fn from_name(name: &str) -> FormeResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| FormeError::UnknownTagKind(name.to_string()))
    }

    /// The closing tag of a paired occurrence, e.g. `endfield`.
    pub fn end_tag(self) -> String {
        format!("end{}", self.name())
    }

    /// Returns `true` for the root kind.
    pub const fn is_root(self) -> bool {
        matches!(self, Self::Forme)
    }

    /// The kinds that may appear directly inside this one.
    const fn direct_children(self) -> &'static [Self] {
        match self {
            Self::Forme => &[Self::HiddenFields, Self::NonFieldErrors, Self::Fieldset],
            Self::Fieldset => &[Self::Row],
            Self::Row => &[Self::Field, Self::Label, Self::Errors],
            Self::Label => &[Self::Field, Self::Errors],
            Self::Field | Self::Errors | Self::NonFieldErrors | Self::HiddenFields => &[],
        }
    }
}

impl fmt::Display for TagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TagKind {
    type Err = FormeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// The table of allowed children per tag kind.
#[derive(Debug)]
pub struct Grammar {
    allowed: HashMap<TagKind, BTreeSet<TagKind>>,
}

static GRAMMAR: Lazy<Grammar> = Lazy::new(Grammar::build);

/// Returns the process-wide grammar.
pub fn grammar() -> &'static Grammar {
    &GRAMMAR
}

impl Grammar {
    fn build() -> Self {
        fn closure(kind: TagKind, allowed: &mut HashMap<TagKind, BTreeSet<TagKind>>) -> BTreeSet<TagKind> {
            if let Some(done) = allowed.get(&kind) {
                return done.clone();
            }
            let mut set = BTreeSet::new();
            for &child in kind.direct_children() {
                set.insert(child);
                set.extend(closure(child, allowed));
            }
            allowed.insert(kind, set.clone());
            set
        }

        let mut allowed = HashMap::new();
        for kind in TagKind::ALL {
            closure(kind, &mut allowed);
        }
        Self { allowed }
    }

    /// The kinds allowed directly inside `kind`.
    pub fn allowed_children(&self, kind: TagKind) -> impl Iterator<Item = TagKind> + '_ {
        self.allowed.get(&kind).into_iter().flatten().copied()
    }

    /// Returns `true` if `child` may be nested directly inside `parent`.
    pub fn allows(&self, parent: TagKind, child: TagKind) -> bool {
        self.allowed
            .get(&parent)
            .is_some_and(|set| set.contains(&child))
    }

    /// Checks the direct children of a `parent` occurrence.
    ///
    /// # Errors
    ///
    /// Returns `InvalidNesting` naming every offending child, in order.
    pub fn validate(&self, parent: TagKind, children: &[TagKind]) -> FormeResult<()> {
        let invalid: Vec<String> = children
            .iter()
            .filter(|child| !self.allows(parent, **child))
            .map(|child| child.name().to_string())
            .collect();

        if invalid.is_empty() {
            Ok(())
        } else {
            Err(FormeError::InvalidNesting {
                tag: parent.name().to_string(),
                children: invalid,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use TagKind::{Errors, Field, Fieldset, Forme, HiddenFields, Label, NonFieldErrors, Row};

    fn expected_children(parent: TagKind) -> &'static [TagKind] {
        match parent {
            Field | Errors | NonFieldErrors | HiddenFields => &[],
            Label => &[Field, Errors],
            Row => &[Field, Label, Errors],
            Fieldset => &[Row, Field, Label, Errors],
            Forme => &[HiddenFields, NonFieldErrors, Fieldset, Row, Field, Label, Errors],
        }
    }

    #[test]
    fn test_grammar_matrix() {
        let g = grammar();
        for parent in TagKind::ALL {
            for child in TagKind::ALL {
                let expected = expected_children(parent).contains(&child);
                assert_eq!(
                    g.allows(parent, child),
                    expected,
                    "{child} inside {parent}"
                );
                assert_eq!(g.validate(parent, &[child]).is_ok(), expected);
            }
        }
    }

    #[test]
    fn test_no_kind_contains_itself_or_the_root() {
        let g = grammar();
        for kind in TagKind::ALL {
            assert!(!g.allows(kind, kind));
            assert!(!g.allows(kind, Forme));
        }
    }

    #[test]
    fn test_validate_names_offending_children() {
        let err = grammar()
            .validate(Row, &[Field, Fieldset, Label, HiddenFields])
            .unwrap_err();
        match err {
            FormeError::InvalidNesting { tag, children } => {
                assert_eq!(tag, "row");
                assert_eq!(children, vec!["fieldset", "hiddenfields"]);
            }
            other => panic!("expected InvalidNesting, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_empty_children() {
        for kind in TagKind::ALL {
            assert!(grammar().validate(kind, &[]).is_ok());
        }
    }

    #[test]
    fn test_allowed_children_sorted() {
        let children: Vec<TagKind> = grammar().allowed_children(Label).collect();
        assert_eq!(children, vec![Field, Errors]);
    }

    #[test]
    fn test_from_name() {
        for kind in TagKind::ALL {
            assert_eq!(TagKind::from_name(kind.name()).unwrap(), kind);
            assert_eq!(kind.name().parse::<TagKind>().unwrap(), kind);
        }
        assert!(matches!(
            TagKind::from_name("fielderrors"),
            Err(FormeError::UnknownTagKind(name)) if name == "fielderrors"
        ));
    }

    #[test]
    fn test_end_tag() {
        assert_eq!(Field.end_tag(), "endfield");
        assert_eq!(NonFieldErrors.end_tag(), "endnonfielderrors");
    }
}
