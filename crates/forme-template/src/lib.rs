//! # forme-template
//!
//! A small Django-style template engine that hosts the forme tag library.
//! It provides what the tags need from their host: parsing a tag body into
//! a sub-template, deferred variable resolution, a context with scoped
//! bindings, and a way to look up other templates.
//!
//! ## Modules
//!
//! - [`lexer`] - Tokenizer for `{{ }}`, `{% %}` and `{# #}` syntax
//! - [`expression`] - Variable expressions and filter chains
//! - [`filters`] - Built-in filters
//! - [`context`] - [`Context`], [`ContextValue`] and host objects
//! - [`parser`] - The node tree, built-in tags and the parser handed to tag compilers
//! - [`library`] - Custom tag libraries
//! - [`loaders`] - Filesystem and in-memory template loaders
//! - [`engine`] - The [`Engine`] with its parsed-template cache

pub mod context;
pub mod engine;
pub mod expression;
pub mod filters;
pub mod lexer;
pub mod library;
pub mod loaders;
pub mod parser;

pub use context::{Context, ContextGuard, ContextValue, TemplateObject};
pub use engine::{Engine, TemplateRenderer};
pub use library::Library;
pub use parser::{CustomNode, Node, Parser, Template};
