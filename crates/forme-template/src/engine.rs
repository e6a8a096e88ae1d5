//! Template engine: loading, parsing, caching and rendering templates.
//!
//! The [`Engine`] is the central entry point. It owns the template loaders
//! and tag libraries, parses each template once, and hands out the parsed
//! tree as a shared [`Arc<Template>`] for every later render.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};

use forme_core::error::{FormeError, FormeResult};
use forme_core::settings::FormeSettings;

use crate::context::Context;
use crate::lexer;
use crate::library::Library;
use crate::loaders::{FileSystemLoader, StringLoader, TemplateLoader};
use crate::parser::{self, Template};

/// Loads and renders templates by name. Passed to nodes while rendering so
/// they can pull in other templates.
pub trait TemplateRenderer: Send + Sync {
    /// Returns the parsed template with the given name.
    ///
    /// # Errors
    ///
    /// Returns `TemplateDoesNotExist` if no loader has it, or the compile
    /// error if it does not parse.
    fn get_template(&self, name: &str) -> FormeResult<Arc<Template>>;

    /// Renders a named template with the given context.
    ///
    /// # Errors
    ///
    /// Returns loading, compile and render errors.
    fn render_template(&self, name: &str, context: &mut Context) -> FormeResult<String> {
        let template = self.get_template(name)?;
        template.render(context, self.as_renderer())
    }

    /// Upcasts to a trait object.
    fn as_renderer(&self) -> &dyn TemplateRenderer;
}

/// The template engine. Manages loaders, libraries, caches, and rendering.
///
/// # Examples
///
/// ```
/// use forme_template::engine::Engine;
/// use forme_template::context::{Context, ContextValue};
///
/// let mut engine = Engine::new();
/// engine.add_string_template("hello.html", "Hello {{ name }}!");
///
/// let mut ctx = Context::new();
/// ctx.set("name", ContextValue::from("World"));
///
/// let result = engine.render_to_string("hello.html", &mut ctx).unwrap();
/// assert_eq!(result, "Hello World!");
/// ```
pub struct Engine {
    loaders: Vec<Box<dyn TemplateLoader>>,
    string_loader: StringLoader,
    libraries: Vec<Library>,
    auto_escape: bool,
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

impl Engine {
    /// Creates a new engine with default settings.
    pub fn new() -> Self {
        Self {
            loaders: Vec::new(),
            string_loader: StringLoader::new(),
            libraries: Vec::new(),
            auto_escape: true,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an engine from the given settings.
    pub fn from_settings(settings: &FormeSettings) -> Self {
        let mut engine = Self::new();
        if !settings.template_dirs.is_empty() {
            engine.set_dirs(settings.template_dirs.clone());
        }
        engine.auto_escape = settings.auto_escape;
        engine
    }

    /// Adds a filesystem loader searching `dirs`, ahead of any other loader.
    pub fn set_dirs(&mut self, dirs: Vec<PathBuf>) {
        self.loaders.insert(0, Box::new(FileSystemLoader::new(dirs)));
        self.clear_cache();
    }

    /// Adds a template loader.
    pub fn add_loader(&mut self, loader: Box<dyn TemplateLoader>) {
        self.loaders.push(loader);
        self.clear_cache();
    }

    /// Registers a tag library. Later libraries shadow earlier ones.
    pub fn register_library(&mut self, library: Library) {
        tracing::debug!(
            library = library.name(),
            tags = ?library.tag_names(),
            "Registering tag library"
        );
        self.libraries.push(library);
        self.clear_cache();
    }

    /// Returns the registered tag libraries.
    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    /// Sets whether auto-escaping is enabled.
    pub fn set_auto_escape(&mut self, enabled: bool) {
        self.auto_escape = enabled;
    }

    /// Adds an in-memory template, replacing any cached parse of that name.
    pub fn add_string_template(&self, name: &str, source: &str) {
        self.string_loader.add(name, source);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Drops every cached template.
    pub fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Loads the source of a template by name.
    fn load_source(&self, name: &str) -> FormeResult<String> {
        if let Ok(source) = self.string_loader.load(name) {
            return Ok(source);
        }

        for loader in &self.loaders {
            if let Ok(source) = loader.load(name) {
                return Ok(source);
            }
        }

        Err(FormeError::TemplateDoesNotExist(format!(
            "Template '{name}' could not be found"
        )))
    }

    /// Compiles template source without caching it.
    ///
    /// # Errors
    ///
    /// Returns the compile error, if any.
    pub fn from_string(&self, source: &str) -> FormeResult<Template> {
        self.compile("<string>", source)
    }

    fn compile(&self, name: &str, source: &str) -> FormeResult<Template> {
        let tokens = lexer::tokenize(source)?;
        parser::parse(name, &tokens, &self.libraries)
    }

    /// Renders a named template with the given context.
    ///
    /// # Errors
    ///
    /// Returns loading, compile and render errors.
    pub fn render_to_string(&self, name: &str, context: &mut Context) -> FormeResult<String> {
        context.set_auto_escape(self.auto_escape);
        let template = self.get_template(name)?;
        template.render(context, self)
    }

    /// Compiles and renders template source in one step.
    ///
    /// # Errors
    ///
    /// Returns compile and render errors.
    pub fn render_string(&self, source: &str, context: &mut Context) -> FormeResult<String> {
        context.set_auto_escape(self.auto_escape);
        let template = self.from_string(source)?;
        template.render(context, self)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for Engine {
    fn get_template(&self, name: &str) -> FormeResult<Arc<Template>> {
        if let Some(template) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Ok(Arc::clone(template));
        }

        let source = self.load_source(name)?;
        let template = Arc::new(self.compile(name, &source)?);
        tracing::debug!(template = name, "Compiled template");
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_string(), Arc::clone(&template));
        Ok(template)
    }

    fn as_renderer(&self) -> &dyn TemplateRenderer {
        self
    }
}
