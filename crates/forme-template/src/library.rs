//! Custom tag libraries.
//!
//! A [`Library`] is a named collection of tag compilers. When the parser
//! meets a block tag it does not know, it asks the registered libraries for
//! a compiler with that name. The compiler receives the [`Parser`] (so a
//! paired tag can parse its own body up to its end tag) and the opening
//! [`Token`], and returns the [`Node`] to splice into the tree.
//!
//! ## Examples
//!
//! ```
//! use forme_template::context::Context;
//! use forme_template::engine::Engine;
//! use forme_template::library::Library;
//! use forme_template::parser::Node;
//!
//! let mut lib = Library::new("demo");
//! lib.register_tag("hello", |_parser, _token| Ok(Node::Text("Hello!".into())));
//!
//! let mut engine = Engine::new();
//! engine.register_library(lib);
//! engine.add_string_template("t.html", "{% hello %}");
//! let out = engine.render_to_string("t.html", &mut Context::new()).unwrap();
//! assert_eq!(out, "Hello!");
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use forme_core::error::FormeResult;

use crate::lexer::Token;
use crate::parser::{Node, Parser};

/// Compiles one occurrence of a custom tag into a node.
pub type TagCompiler = Arc<dyn Fn(&mut Parser<'_>, &Token) -> FormeResult<Node> + Send + Sync>;

/// A named collection of custom tags.
#[derive(Clone)]
pub struct Library {
    name: String,
    tags: HashMap<String, TagCompiler>,
}

impl Library {
    /// Creates a new empty library with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: HashMap::new(),
        }
    }

    /// Returns the library name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a tag compiler under `name`, replacing any previous one.
    pub fn register_tag<F>(&mut self, name: impl Into<String>, compiler: F)
    where
        F: Fn(&mut Parser<'_>, &Token) -> FormeResult<Node> + Send + Sync + 'static,
    {
        self.tags.insert(name.into(), Arc::new(compiler));
    }

    /// Registers an already shared compiler under `name`.
    pub fn register_compiler(&mut self, name: impl Into<String>, compiler: TagCompiler) {
        self.tags.insert(name.into(), compiler);
    }

    /// Returns the compiler for a tag name.
    pub fn get_tag(&self, name: &str) -> Option<&TagCompiler> {
        self.tags.get(name)
    }

    /// Returns `true` if the library defines the given tag.
    pub fn has_tag(&self, name: &str) -> bool {
        self.tags.contains_key(name)
    }

    /// Returns all tag names, sorted.
    pub fn tag_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("tags", &self.tag_names())
            .finish()
    }
}

/// Finds the compiler for `name`, later libraries shadowing earlier ones.
pub fn find_tag<'a>(libraries: &'a [Library], name: &str) -> Option<&'a TagCompiler> {
    libraries.iter().rev().find_map(|lib| lib.get_tag(name))
}
