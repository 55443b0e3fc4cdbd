// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

// Warn on missing documentation for public items
#![warn(missing_docs)]

//! # Chunk
//!
//! Parser and reference renderer for Chunk-style text templates.
//!
//! A template is parsed once into an immutable tree of literal text, tags,
//! localization tokens and nested blocks, and can then be rendered any
//! number of times against different bindings.
//!
//! ## Features
//!
//! - Single-pass scanner with regex-aware and escape-aware tag bodies
//! - Shorthand tags (`{+ref}`, `{*macro*}`, `{/if}`) canonicalized to one form
//! - Literal-escape spans (`{^literal}...{^}`) that bypass tag recognition
//! - Block grouping with inline error markers for unmatched openers
//! - Smart trim so block control lines leave no blank lines behind
//! - Byte-exact source reconstruction and fragment consolidation
//! - Parsed-template LRU cache with idle-time eviction
//!
//! ## Quick Start
//!
//! ```rust
//! use chunk::{MapBindings, Template};
//! use serde_json::json;
//!
//! let template = Template::parse("{^loop in ~items as item}\n- {~item}\n{/loop}\n");
//! let bindings = MapBindings::from_value(json!({ "items": ["a", "b"] }));
//! assert_eq!(template.render_with(&bindings), "- a\n- b\n");
//! ```

/// Node types for parsed templates.
pub mod ast;
/// Parsed-template caching.
pub mod cache;
/// Engine configuration.
pub mod config;
/// Main template engine.
pub mod engine;
/// Error types and reporting.
pub mod error;
/// In-memory named templates.
pub mod includes;
/// Reference renderer and its collaborator traits.
pub mod render;
/// Variable tag sub-grammar.
pub mod tag_expr;
/// Template assembly, round-trip and consolidation.
pub mod template;

mod extract;
mod grouper;
mod literal;
mod scanner;
mod trim;

pub use ast::*;
pub use cache::{cache_key, TemplateCache};
pub use config::{CacheConfig, EngineConfig, ParseOptions, RenderOptions};
pub use engine::Engine;
pub use error::*;
pub use includes::MemoryIncludes;
pub use render::{
    display_value, is_truthy, render, Bindings, Filters, IdentityFilters, Includes, MapBindings,
    NoIncludes, PositionalTranslator, RenderContext, Translator,
};
pub use tag_expr::{DefaultValue, Filter, TagExpr};
pub use template::{
    consolidate, consolidate_with, parse_strict, parse_template, parse_template_with,
    to_source_string,
};
