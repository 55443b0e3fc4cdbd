// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Chunk template engine.
//!
//! This module provides the [`Engine`] type that ties the pieces together:
//! configuration, the parsed-template cache, and the render collaborators.
//!
//! # Quick Start
//!
//! ```rust
//! use chunk::{Engine, EngineConfig, MapBindings, MemoryIncludes};
//! use serde_json::json;
//!
//! let includes = MemoryIncludes::new();
//! includes.add_template("greeting", "Hello {~name:World}!");
//!
//! let engine = Engine::new(includes, EngineConfig::default());
//! let bindings = MapBindings::from_value(json!({ "name": "Chunk" }));
//! assert_eq!(engine.render_named("greeting", &bindings).unwrap(), "Hello Chunk!");
//! assert_eq!(engine.render_str("{+greeting}", &MapBindings::default()).unwrap(), "Hello World!");
//! ```
//!
//! # Caching
//!
//! With `cache.enabled` (the default) [`Engine::parse`] and
//! [`Engine::render_str`] keep parsed templates in a [`TemplateCache`].
//!
//! # Thread Safety
//!
//! Parsed templates are immutable and shared through `Arc`. The cache is
//! guarded by a mutex, so an engine can be shared between threads.

use crate::ast::Template;
use crate::cache::TemplateCache;
use crate::config::EngineConfig;
use crate::error::{ChunkError, Result};
use crate::render::{
    Bindings, Filters, IdentityFilters, Includes, NoIncludes, PositionalTranslator, RenderContext,
    Translator,
};
use crate::template::parse_strict;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Main Chunk template engine.
///
/// The engine is generic over the [`Includes`] collaborator `I`, which
/// provides named templates for includes, macros and
/// [`Engine::render_named`].
///
/// # Examples
///
/// ```rust
/// use chunk::{Engine, EngineConfig, MapBindings, NoIncludes};
///
/// let engine = Engine::new(NoIncludes, EngineConfig::default());
/// let out = engine.render_str("{^if (~a)}\nyes\n{/if}\n", &MapBindings::default()).unwrap();
/// assert_eq!(out, "");
/// ```
pub struct Engine<I: Includes = NoIncludes> {
    includes: I,
    config: EngineConfig,
    cache: Option<TemplateCache>,
    filters: Arc<dyn Filters>,
    translator: Arc<dyn Translator>,
}

impl<I: Includes + fmt::Debug> fmt::Debug for Engine<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("includes", &self.includes)
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl<I: Includes> Engine<I> {
    /// Creates an engine with default filters and translator.
    pub fn new(includes: I, config: EngineConfig) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| TemplateCache::new(&config.cache));
        Self {
            includes,
            config,
            cache,
            filters: Arc::new(IdentityFilters),
            translator: Arc::new(PositionalTranslator),
        }
    }

    /// Creates an engine configured from a TOML file.
    pub fn from_config_file<P: AsRef<Path>>(includes: I, path: P) -> Result<Self> {
        Ok(Self::new(includes, EngineConfig::from_file(path)?))
    }

    /// Uses `filters` for filter chains.
    pub fn with_filters<F: Filters + 'static>(mut self, filters: F) -> Self {
        self.filters = Arc::new(filters);
        self
    }

    /// Uses `translator` for tokens and localization blocks.
    pub fn with_translator<T: Translator + 'static>(mut self, translator: T) -> Self {
        self.translator = Arc::new(translator);
        self
    }

    /// Returns a reference to the includes collaborator.
    pub fn includes(&self) -> &I {
        &self.includes
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns the template cache, if caching is enabled.
    pub fn cache(&self) -> Option<&TemplateCache> {
        self.cache.as_ref()
    }

    /// Parses a template, going through the cache when enabled.
    pub fn parse(&self, source: &str) -> Result<Arc<Template>> {
        match &self.cache {
            Some(cache) => cache.get_or_parse(source, &self.config.parser),
            None => Ok(Arc::new(Template::parse_with(source, &self.config.parser))),
        }
    }

    /// Parses a template and fails on the first unmatched or too deeply
    /// nested block. Bypasses the cache.
    pub fn parse_strict(&self, source: &str) -> Result<Template> {
        parse_strict(source, &self.config.parser)
    }

    /// Renders a parsed template.
    pub fn render(&self, template: &Template, bindings: &dyn Bindings) -> String {
        let context = RenderContext::new(bindings)
            .with_filters(self.filters.as_ref())
            .with_translator(self.translator.as_ref())
            .with_includes(&self.includes)
            .with_options(&self.config.render);
        template.render(&context)
    }

    /// Parses (or fetches from the cache) and renders a source string.
    pub fn render_str(&self, source: &str, bindings: &dyn Bindings) -> Result<String> {
        let template = self.parse(source)?;
        Ok(self.render(&template, bindings))
    }

    /// Renders a template provided by the includes collaborator.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkError::IncludeNotFound`] when `name` is unknown.
    pub fn render_named(&self, name: &str, bindings: &dyn Bindings) -> Result<String> {
        let template = self
            .includes
            .load(name)
            .ok_or_else(|| ChunkError::IncludeNotFound(name.to_string()))?;
        tracing::debug!("rendering named template {}", name);
        Ok(self.render(&template, bindings))
    }
}
