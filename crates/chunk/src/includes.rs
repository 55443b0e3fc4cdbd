// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! In-memory named templates for includes and macros.
//!
//! References are looked up as written, then with a leading `/` or `#`
//! removed, so `{+#footer}`, `{+/footer}` and `{+footer}` all find a
//! template registered as `footer`.

use crate::ast::Template;
use crate::config::ParseOptions;
use crate::render::Includes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Memory-based include store. Clones share the same templates.
#[derive(Debug, Clone, Default)]
pub struct MemoryIncludes {
    templates: Arc<Mutex<HashMap<String, Arc<Template>>>>,
    options: ParseOptions,
}

impl MemoryIncludes {
    /// Create a new, empty store that parses with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that parses added sources with `options`.
    pub fn with_options(options: ParseOptions) -> Self {
        Self {
            templates: Arc::default(),
            options,
        }
    }

    fn with_templates_mut<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut HashMap<String, Arc<Template>>) -> R,
    {
        let mut guard = match self.templates.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Parse `source` and register it under `name`.
    pub fn add_template(&self, name: &str, source: &str) {
        let template = Arc::new(Template::parse_with(source, &self.options));
        self.insert(name, template);
    }

    /// Register an already parsed template under `name`.
    pub fn insert(&self, name: &str, template: Arc<Template>) {
        let name = normalize(name).to_string();
        self.with_templates_mut(|templates| {
            templates.insert(name, template);
        });
    }

    /// Remove a template
    pub fn remove_template(&self, name: &str) {
        self.with_templates_mut(|templates| {
            templates.remove(normalize(name));
        });
    }

    /// Clear all templates
    pub fn clear(&self) {
        self.with_templates_mut(HashMap::clear);
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names = self.with_templates_mut(|templates| templates.keys().cloned().collect::<Vec<_>>());
        names.sort();
        names
    }
}

fn normalize(name: &str) -> &str {
    let name = name.trim();
    name.strip_prefix(['/', '#']).unwrap_or(name)
}

impl Includes for MemoryIncludes {
    fn load(&self, reference: &str) -> Option<Arc<Template>> {
        let reference = reference.trim();
        self.with_templates_mut(|templates| {
            templates
                .get(reference)
                .or_else(|| templates.get(normalize(reference)))
                .cloned()
        })
    }
}
