// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Reference tree-walking renderer.
//!
//! The renderer walks a parsed [`Template`] and asks collaborators for
//! everything it does not know itself:
//!
//! - [`Bindings`]: values for tag names
//! - [`Filters`]: filter chain steps (`{~name|upper}`)
//! - [`Translator`]: localization tokens and `{^loc}` blocks
//! - [`Includes`]: templates referenced by `{+ref}` and macros
//!
//! Defaults are provided for all but bindings: filters pass values through,
//! translation substitutes positional arguments, includes find nothing.
//!
//! # Example
//!
//! ```rust
//! use chunk::{MapBindings, Template};
//! use serde_json::json;
//!
//! let template = Template::parse("Hello {~name:World}!");
//! assert_eq!(template.render_with(&MapBindings::default()), "Hello World!");
//!
//! let bindings = MapBindings::from_value(json!({ "name": "Chunk" }));
//! assert_eq!(template.render_with(&bindings), "Hello Chunk!");
//! ```
//!
//! # Blocks
//!
//! - `{^if (cond)}...{^elseIf (cond)}...{^else}...{/if}` where `cond` is
//!   `~x`, `!~x`, `~x == lit`, `~x != lit`, `~x =~ /re/` or `~x !~ /re/`
//! - `{^loop in ~list as item}...{^divider}...{^onEmpty}...{/loop}`
//! - `{*ref*}{~name=}value{=}{*}`: definitions become bindings for `ref`
//! - `{^loc}...{/loc}`: the rendered body goes through the translator

use crate::ast::{Block, BlockKind, Tag, Template, TemplateNode, Token};
use crate::config::RenderOptions;
use crate::tag_expr::{DefaultValue, TagExpr};
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::sync::Arc;

lazy_static! {
    static ref LOOP_ARGS: Regex =
        Regex::new(r"^in\s+[~$]?([^\s]+)(?:\s+as\s+([A-Za-z_][\w]*))?").unwrap();
    static ref POSITIONAL: Regex = Regex::new(r"\{(\d+)\}").unwrap();
    static ref DEFINITION: Regex = Regex::new(r"^[~$]?([A-Za-z_][\w.\-]*)\s*=$").unwrap();
}

/// Source of values for tag names.
pub trait Bindings {
    /// Resolves a (possibly dotted) tag name.
    fn resolve_tag(&self, name: &str) -> Option<Value>;
}

/// Filter chain collaborator.
pub trait Filters: Send + Sync {
    /// Applies one named filter to `input`.
    fn apply_filter(&self, name: &str, args: &[String], input: Value) -> Value;
}

/// Localization collaborator.
pub trait Translator: Send + Sync {
    /// Translates `key`, substituting `args` when given.
    fn translate(&self, key: &str, args: Option<&[String]>) -> String;
}

/// Loads templates referenced by includes and macros.
pub trait Includes: Send + Sync {
    /// Returns the parsed template for `reference`, if it exists.
    fn load(&self, reference: &str) -> Option<Arc<Template>>;
}

/// Bindings backed by a JSON object. Dotted names walk nested objects and
/// array indexes (`user.roles.0`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapBindings {
    values: Map<String, Value>,
}

impl MapBindings {
    /// Creates bindings from a JSON object map.
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    /// Creates bindings from a JSON value; non-objects yield empty bindings.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// Binds `name` to `value`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(name.into(), value.into());
    }
}

impl From<Map<String, Value>> for MapBindings {
    fn from(values: Map<String, Value>) -> Self {
        Self::new(values)
    }
}

impl Bindings for MapBindings {
    fn resolve_tag(&self, name: &str) -> Option<Value> {
        let (head, rest) = split_path(name);
        walk_path(self.values.get(head)?, rest).cloned()
    }
}

/// Filters that return their input unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityFilters;

impl Filters for IdentityFilters {
    fn apply_filter(&self, name: &str, _args: &[String], input: Value) -> Value {
        tracing::trace!("identity filter for {}", name);
        input
    }
}

/// Translator that keeps the key and fills in `{0}`, `{1}`, ... and then
/// `%s` placeholders from the arguments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalTranslator;

impl Translator for PositionalTranslator {
    fn translate(&self, key: &str, args: Option<&[String]>) -> String {
        let Some(args) = args else {
            return key.to_string();
        };
        let positional = POSITIONAL.replace_all(key, |caps: &regex::Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|i| args.get(i))
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        });

        let mut out = String::with_capacity(positional.len());
        let mut remaining = args.iter();
        let mut pieces = positional.split("%s");
        if let Some(first) = pieces.next() {
            out.push_str(first);
        }
        for piece in pieces {
            match remaining.next() {
                Some(arg) => out.push_str(arg),
                None => out.push_str("%s"),
            }
            out.push_str(piece);
        }
        out
    }
}

/// Includes collaborator that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIncludes;

impl Includes for NoIncludes {
    fn load(&self, _reference: &str) -> Option<Arc<Template>> {
        None
    }
}

static IDENTITY_FILTERS: IdentityFilters = IdentityFilters;
static POSITIONAL_TRANSLATOR: PositionalTranslator = PositionalTranslator;
static NO_INCLUDES: NoIncludes = NoIncludes;

/// Collaborators and options for one render call.
#[derive(Clone, Copy)]
pub struct RenderContext<'a> {
    bindings: &'a dyn Bindings,
    filters: &'a dyn Filters,
    translator: &'a dyn Translator,
    includes: &'a dyn Includes,
    max_include_depth: usize,
}

impl<'a> RenderContext<'a> {
    /// Creates a context with default collaborators.
    pub fn new(bindings: &'a dyn Bindings) -> Self {
        Self {
            bindings,
            filters: &IDENTITY_FILTERS,
            translator: &POSITIONAL_TRANSLATOR,
            includes: &NO_INCLUDES,
            max_include_depth: RenderOptions::default().max_include_depth,
        }
    }

    /// Uses `filters` for filter chains.
    pub fn with_filters(mut self, filters: &'a dyn Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Uses `translator` for tokens and localization blocks.
    pub fn with_translator(mut self, translator: &'a dyn Translator) -> Self {
        self.translator = translator;
        self
    }

    /// Uses `includes` to load referenced templates.
    pub fn with_includes(mut self, includes: &'a dyn Includes) -> Self {
        self.includes = includes;
        self
    }

    /// Applies renderer options.
    pub fn with_options(mut self, options: &RenderOptions) -> Self {
        self.max_include_depth = options.max_include_depth;
        self
    }
}

impl Template {
    /// Renders the template.
    pub fn render(&self, context: &RenderContext<'_>) -> String {
        render(self, context)
    }

    /// Renders the template with default collaborators.
    pub fn render_with(&self, bindings: &dyn Bindings) -> String {
        render(self, &RenderContext::new(bindings))
    }
}

/// Renders a template.
pub fn render(template: &Template, context: &RenderContext<'_>) -> String {
    let mut renderer = Renderer {
        context,
        scopes: Vec::new(),
        include_depth: 0,
    };
    let mut out = String::new();
    renderer.render_template(template, &mut out);
    out
}

/// Text form of a value: strings as is, null as nothing, others as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Truthiness used by conditions.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

fn split_path(name: &str) -> (&str, &str) {
    match name.split_once('.') {
        Some((head, rest)) => (head, rest),
        None => (name, ""),
    }
}

fn walk_path<'v>(mut value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return Some(value);
    }
    for segment in path.split('.') {
        value = match value {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(value)
}

/// One section of a block body, split at branch tags.
struct Section<'t> {
    tag: Option<&'t Tag>,
    nodes: &'t [TemplateNode],
}

fn sections<'t>(block: &'t Block) -> Vec<Section<'t>> {
    let keywords = block.kind.branch_keywords();
    let mut out = Vec::new();
    let mut tag = None;
    let mut start = 0;
    for (i, node) in block.body.iter().enumerate() {
        let branch = node
            .as_tag()
            .filter(|t| t.command().map_or(false, |c| keywords.contains(&c)));
        if let Some(branch) = branch {
            out.push(Section {
                tag,
                nodes: &block.body[start..i],
            });
            tag = Some(branch);
            start = i + 1;
        }
    }
    out.push(Section {
        tag,
        nodes: &block.body[start..],
    });
    out
}

struct Renderer<'r, 'a> {
    context: &'r RenderContext<'a>,
    scopes: Vec<Map<String, Value>>,
    include_depth: usize,
}

impl Renderer<'_, '_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        let (head, rest) = split_path(name);
        for scope in self.scopes.iter().rev() {
            if let Some(value) = scope.get(head) {
                return walk_path(value, rest).cloned();
            }
        }
        self.context.bindings.resolve_tag(name)
    }

    /// Resolves a variable expression, applying filters and defaults.
    fn resolve(&self, expr: &TagExpr) -> Option<Value> {
        let value = self.lookup(&expr.name).filter(|v| !v.is_null());
        let filtered = |input: Value| {
            expr.filters.iter().fold(input, |value, filter| {
                self.context
                    .filters
                    .apply_filter(&filter.name, &filter.args, value)
            })
        };
        match (value, &expr.default) {
            (Some(value), _) => Some(filtered(value)),
            (None, Some(DefaultValue::Filtered(text))) => Some(filtered(Value::String(text.clone()))),
            (None, Some(DefaultValue::Raw(text))) => Some(Value::String(text.clone())),
            (None, None) => None,
        }
    }

    /// Resolves `~name`/`$name` references, or returns other operands as text.
    fn operand(&self, operand: &str) -> String {
        let operand = operand.trim();
        match operand.strip_prefix(['~', '$']) {
            Some(name) => self
                .resolve(&TagExpr::parse(name))
                .map(|v| display_value(&v))
                .unwrap_or_default(),
            None => unquote(operand).to_string(),
        }
    }

    fn render_template(&mut self, template: &Template, out: &mut String) {
        match template {
            Template::Simple(text) => out.push_str(text),
            Template::Parts { nodes, .. } => self.render_nodes(nodes, out),
        }
    }

    fn render_nodes(&mut self, nodes: &[TemplateNode], out: &mut String) {
        for node in nodes {
            match node {
                TemplateNode::Literal { text, .. } => out.push_str(text),
                TemplateNode::Comment { .. } | TemplateNode::Elided { .. } => {}
                TemplateNode::Tag(tag) => self.render_tag(tag, out),
                TemplateNode::Token(token) => self.render_token(token, out),
                TemplateNode::Block(block) => self.render_block(block, out),
                TemplateNode::Error { message, .. } => out.push_str(message),
            }
        }
    }

    fn render_tag(&mut self, tag: &Tag, out: &mut String) {
        if tag.body.starts_with("./") || tag.body == "=" || DEFINITION.is_match(&tag.body) {
            return;
        }
        match tag.command() {
            Some("include") => self.include(tag.arguments(), out),
            Some("includeIf") => {
                if let Some((condition, reference)) = split_include_if(tag.arguments()) {
                    if self.condition(condition) {
                        self.include(reference, out);
                    }
                }
            }
            Some("else" | "elseIf" | "onEmpty" | "divider") => {}
            Some(keyword) if BlockKind::from_keyword(keyword).is_some() => {}
            Some(_) => out.push_str(&tag.raw_text),
            None => match self.resolve(&TagExpr::parse(&tag.body)) {
                Some(value) => out.push_str(&display_value(&value)),
                None => out.push_str(&tag.raw_text),
            },
        }
    }

    fn render_token(&mut self, token: &Token, out: &mut String) {
        let args: Option<Vec<String>> = token.args.as_ref().map(|args| {
            args.iter()
                .map(|arg| {
                    if arg.starts_with(['~', '$']) {
                        self.operand(arg)
                    } else {
                        arg.clone()
                    }
                })
                .collect()
        });
        out.push_str(
            &self
                .context
                .translator
                .translate(&token.token_key, args.as_deref()),
        );
    }

    fn render_block(&mut self, block: &Block, out: &mut String) {
        match block.kind {
            BlockKind::Conditional => self.render_conditional(block, out),
            BlockKind::Loop => self.render_loop(block, out),
            BlockKind::Macro => self.render_macro(block, out),
            BlockKind::Localization => {
                let mut body = String::new();
                self.render_nodes(&block.body, &mut body);
                out.push_str(&self.context.translator.translate(&body, None));
            }
        }
    }

    fn render_conditional(&mut self, block: &Block, out: &mut String) {
        for section in sections(block) {
            let taken = match section.tag {
                None => self.condition(block.open.arguments()),
                Some(tag) if tag.command() == Some("elseIf") => self.condition(tag.arguments()),
                Some(_) => true,
            };
            if taken {
                self.render_nodes(section.nodes, out);
                return;
            }
        }
    }

    /// Evaluates a condition such as `(~a == 'x')`.
    fn condition(&self, text: &str) -> bool {
        let text = strip_parens(text.trim()).trim();

        if let Some((lhs, op, rhs)) = split_comparison(text) {
            let left = self.operand_or_name(lhs);
            return match op {
                "==" => left == self.operand(rhs),
                "!=" => left != self.operand(rhs),
                "=~" => self.regex_match(&left, rhs),
                _ => !self.regex_match(&left, rhs),
            };
        }

        match text.strip_prefix('!') {
            Some(rest) => !self.truthy(rest),
            None => self.truthy(text),
        }
    }

    fn truthy(&self, operand: &str) -> bool {
        let operand = operand.trim();
        let name = operand.strip_prefix(['~', '$']).unwrap_or(operand);
        if name.is_empty() {
            return false;
        }
        self.resolve(&TagExpr::parse(name))
            .map_or(false, |value| is_truthy(&value))
    }

    /// Left-hand operands may name a variable without the `~` prefix.
    fn operand_or_name(&self, operand: &str) -> String {
        let operand = operand.trim();
        if operand.starts_with(['~', '$', '\'', '"']) {
            self.operand(operand)
        } else {
            self.operand(&format!("~{}", operand))
        }
    }

    fn regex_match(&self, text: &str, pattern: &str) -> bool {
        let pattern = pattern.trim();
        let Some(body) = pattern.strip_prefix('/') else {
            return text == self.operand(pattern);
        };
        let (source, flags) = match body.rfind('/') {
            Some(end) => (&body[..end], &body[end + 1..]),
            None => (body, ""),
        };
        match RegexBuilder::new(&source.replace("\\/", "/"))
            .case_insensitive(flags.contains('i'))
            .multi_line(flags.contains('m'))
            .build()
        {
            Ok(regex) => regex.is_match(text),
            Err(e) => {
                tracing::debug!("invalid condition pattern {:?}: {}", source, e);
                false
            }
        }
    }

    fn render_loop(&mut self, block: &Block, out: &mut String) {
        let args = block.open.arguments();
        let Some(caps) = LOOP_ARGS.captures(args) else {
            tracing::debug!("malformed loop arguments {:?}", args);
            return;
        };
        let alias = caps.get(2).map_or("item", |m| m.as_str()).to_string();
        let items = match self.resolve(&TagExpr::parse(&caps[1])) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(Value::Object(map)) => map
                .into_iter()
                .map(|(key, value)| {
                    let mut entry = Map::new();
                    entry.insert("key".to_string(), Value::String(key));
                    entry.insert("value".to_string(), value);
                    Value::Object(entry)
                })
                .collect(),
            Some(other) => vec![other],
        };

        let mut main: &[TemplateNode] = &[];
        let mut divider: &[TemplateNode] = &[];
        let mut on_empty: &[TemplateNode] = &[];
        for section in sections(block) {
            match section.tag.and_then(Tag::command) {
                Some("divider") => divider = section.nodes,
                Some("onEmpty") => on_empty = section.nodes,
                _ => main = section.nodes,
            }
        }

        if items.is_empty() {
            self.render_nodes(on_empty, out);
            return;
        }

        let count = items.len();
        for (index, item) in items.into_iter().enumerate() {
            if index > 0 {
                self.render_nodes(divider, out);
            }
            let mut counters = Map::new();
            counters.insert("index".to_string(), Value::from(index));
            counters.insert("counter".to_string(), Value::from(index + 1));
            counters.insert("first".to_string(), Value::Bool(index == 0));
            counters.insert("last".to_string(), Value::Bool(index + 1 == count));

            let mut scope = Map::new();
            scope.insert(alias.clone(), item);
            scope.insert("loop".to_string(), Value::Object(counters));
            self.scopes.push(scope);
            self.render_nodes(main, out);
            self.scopes.pop();
        }
    }

    fn render_macro(&mut self, block: &Block, out: &mut String) {
        let mut definitions = Map::new();
        let mut inline = Vec::new();
        let mut nodes = block.body.iter();
        while let Some(node) = nodes.next() {
            let name = node
                .as_tag()
                .and_then(|tag| DEFINITION.captures(&tag.body))
                .map(|caps| caps[1].to_string());
            let Some(name) = name else {
                inline.push(node.clone());
                continue;
            };
            let value: Vec<TemplateNode> = nodes
                .by_ref()
                .take_while(|n| n.as_tag().map_or(true, |tag| tag.body != "="))
                .cloned()
                .collect();
            let mut text = String::new();
            self.render_nodes(&value, &mut text);
            definitions.insert(name, Value::String(text));
        }

        let reference = block.open.arguments();
        self.scopes.push(definitions);
        if reference.is_empty() {
            self.render_nodes(&inline, out);
        } else {
            self.include(reference, out);
        }
        self.scopes.pop();
    }

    fn include(&mut self, reference: &str, out: &mut String) {
        let reference = reference.trim();
        if self.include_depth >= self.context.max_include_depth {
            tracing::debug!("include {} exceeds depth {}", reference, self.context.max_include_depth);
            out.push_str(&format!(
                "[ERROR in template! include {} nested deeper than {} levels! ]",
                reference, self.context.max_include_depth
            ));
            return;
        }
        let Some(template) = self.context.includes.load(reference) else {
            tracing::debug!("include {} not found", reference);
            return;
        };
        self.include_depth += 1;
        self.render_template(&template, out);
        self.include_depth -= 1;
    }
}

/// Splits `(cond).ref` into condition and reference.
fn split_include_if(arguments: &str) -> Option<(&str, &str)> {
    let mut depth = 0usize;
    for (i, c) in arguments.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    let reference = arguments[i + 1..].trim_start_matches('.');
                    return Some((&arguments[1..i], reference));
                }
            }
            _ => {}
        }
    }
    None
}

/// Removes one pair of parentheses wrapping the whole text.
fn strip_parens(text: &str) -> &str {
    if !(text.starts_with('(') && text.ends_with(')')) {
        return text;
    }
    match split_include_if(text) {
        Some((inner, rest)) if rest.is_empty() => inner,
        _ => text,
    }
}

/// Finds a top-level comparison operator outside quotes.
fn split_comparison(text: &str) -> Option<(&str, &'static str, &str)> {
    let bytes = text.as_bytes();
    let mut quote = None;
    let mut i = 1;
    while i + 1 < bytes.len() {
        let byte = bytes[i];
        match quote {
            Some(q) if byte == q => quote = None,
            Some(_) => {}
            None if byte == b'\'' || byte == b'"' => quote = Some(byte),
            None => {
                for op in ["==", "!=", "=~", "!~"] {
                    if &bytes[i..i + 2] == op.as_bytes() {
                        return Some((&text[..i], op, &text[i + 2..]));
                    }
                }
            }
        }
        i += 1;
    }
    None
}

fn unquote(text: &str) -> &str {
    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return &text[1..text.len() - 1];
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn bindings(value: Value) -> MapBindings {
        MapBindings::from_value(value)
    }

    fn render_json(source: &str, value: Value) -> String {
        Template::parse(source).render_with(&bindings(value))
    }

    struct UpperFilters;

    impl Filters for UpperFilters {
        fn apply_filter(&self, name: &str, args: &[String], input: Value) -> Value {
            let text = display_value(&input);
            match name {
                "upper" => Value::String(text.to_uppercase()),
                "s" => match Regex::new(&args[0]) {
                    Ok(re) => Value::String(re.replace_all(&text, args[1].as_str()).into_owned()),
                    Err(_) => input,
                },
                _ => input,
            }
        }
    }

    struct StaticIncludes(HashMap<&'static str, Arc<Template>>);

    impl Includes for StaticIncludes {
        fn load(&self, reference: &str) -> Option<Arc<Template>> {
            self.0.get(reference).cloned()
        }
    }

    #[test]
    fn test_default_value_fallback() {
        assert_eq!(render_json("Hello {~name:World}!", json!({})), "Hello World!");
        assert_eq!(render_json("Hello {~name:World}!", json!({"name": "Bob"})), "Hello Bob!");
    }

    #[test]
    fn test_unresolved_tag_keeps_raw_text() {
        assert_eq!(render_json("a {~missing} b", json!({})), "a {~missing} b");
        assert_eq!(render_json("{$user.name}", json!({"user": {"name": "Ann"}})), "Ann");
    }

    #[test]
    fn test_value_display() {
        let out = render_json("{~n} {~f} {~b} {~list}", json!({"n": 3, "f": 1.5, "b": true, "list": [1, 2]}));
        assert_eq!(out, "3 1.5 true [1,2]");
    }

    #[test]
    fn test_literal_escape_renders_verbatim() {
        assert_eq!(render_json("A{^literal}{~x}{^}B", json!({"x": "no"})), "A{~x}B");
    }

    #[test]
    fn test_filter_and_default_order() {
        let template = |s: &str| Template::parse(s);
        let empty = MapBindings::default();
        let context = RenderContext::new(&empty).with_filters(&UpperFilters);
        assert_eq!(template("{~x:abc|upper}").render(&context), "ABC");
        assert_eq!(template("{~x|upper:abc}").render(&context), "abc");

        let bound = bindings(json!({"x": "val"}));
        let context = RenderContext::new(&bound).with_filters(&UpperFilters);
        assert_eq!(template("{~x|upper:abc}").render(&context), "VAL");
        assert_eq!(template("{~x|s/a/A/}").render(&context), "vAl");
    }

    #[test]
    fn test_conditionals() {
        let source = "{^if (~a)}A{^elseIf (~b == 'two')}B{^else}C{/if}";
        assert_eq!(render_json(source, json!({"a": true})), "A");
        assert_eq!(render_json(source, json!({"b": "two"})), "B");
        assert_eq!(render_json(source, json!({"b": "three"})), "C");
        assert_eq!(render_json("{^if (!~a)}none{/if}", json!({})), "none");
        assert_eq!(render_json("{^if (a)}bare{/if}", json!({"a": 1})), "bare");
        assert_eq!(render_json("{^if (~x != ~y)}diff{/if}", json!({"x": 1, "y": 2})), "diff");
    }

    #[test]
    fn test_regex_conditions() {
        let source = "{^if (~name =~ /^ch/i)}match{^else}no{/if}";
        assert_eq!(render_json(source, json!({"name": "Chunk"})), "match");
        assert_eq!(render_json(source, json!({"name": "other"})), "no");
        assert_eq!(render_json("{^if (~n !~ /\\d/)}text{/if}", json!({"n": "abc"})), "text");
    }

    #[test]
    fn test_loop_with_divider_and_on_empty() {
        let source = "{^loop in ~items as it}{~it.name}{^divider}, {^onEmpty}nothing{/loop}";
        let out = render_json(source, json!({"items": [{"name": "a"}, {"name": "b"}]}));
        assert_eq!(out, "a, b");
        assert_eq!(render_json(source, json!({"items": []})), "nothing");
        assert_eq!(render_json(source, json!({})), "nothing");
    }

    #[test]
    fn test_loop_scope_shadows_and_counters() {
        let source = "{~x}{^loop in ~xs as x}[{~loop.counter}:{~x}]{/loop}{~x}";
        assert_eq!(render_json(source, json!({"x": "o", "xs": ["a", "b"]})), "o[1:a][2:b]o");
    }

    #[test]
    fn test_smart_trimmed_loop_output() {
        let source = "<ul>\n{^loop in ~xs as x}\n  <li>{~x}</li>\n{/loop}\n</ul>\n";
        let out = render_json(source, json!({"xs": ["a", "b"]}));
        assert_eq!(out, "<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>\n");
    }

    #[test]
    fn test_tokens_and_localization_blocks() {
        let out = render_json("_[Save] {_[Hello {0}, {1}],~user,friend}", json!({"user": "Ann"}));
        assert_eq!(out, "Save Hello Ann, friend");
        assert_eq!(render_json("{^loc}Hi {~n}{/loc}", json!({"n": 2})), "Hi 2");
    }

    #[test]
    fn test_positional_translator_fallbacks() {
        let t = PositionalTranslator;
        let two = vec!["a".to_string(), "b".to_string()];
        let one = vec!["x".to_string()];
        assert_eq!(t.translate("{0} and %s", Some(two.as_slice())), "a and a");
        assert_eq!(t.translate("%s %s", Some(one.as_slice())), "x %s");
        assert_eq!(t.translate("{3}", Some(&one[..0])), "{3}");
        assert_eq!(t.translate("plain", None), "plain");
    }

    #[test]
    fn test_includes_and_macros() {
        let mut map = HashMap::new();
        map.insert("#card", Arc::new(Template::parse("<h1>{~title}</h1>{~body:-}")));
        map.insert("#footer", Arc::new(Template::parse("bye")));
        let includes = StaticIncludes(map);
        let empty = bindings(json!({"show": true}));
        let context = RenderContext::new(&empty).with_includes(&includes);

        let out = Template::parse("{*#card*}{~title=}Hi{=}{*}").render(&context);
        assert_eq!(out, "<h1>Hi</h1>-");
        let out = Template::parse("{+#footer}|{+(~show)#footer}|{+(~hide)#footer}").render(&context);
        assert_eq!(out, "bye|bye|");
        assert_eq!(Template::parse("{+#nope}").render(&context), "");
    }

    #[test]
    fn test_inline_macro_body() {
        let out = render_json("{^exec}{~who=}you{=}hi {~who}{/exec}", json!({}));
        assert_eq!(out, "hi you");
    }

    #[test]
    fn test_include_depth_limit() {
        let mut map = HashMap::new();
        map.insert("self", Arc::new(Template::parse("x{+self}")));
        let includes = StaticIncludes(map);
        let empty = MapBindings::default();
        let options = RenderOptions { max_include_depth: 3 };
        let context = RenderContext::new(&empty)
            .with_includes(&includes)
            .with_options(&options);
        let out = Template::parse("{+self}").render(&context);
        assert!(out.starts_with("xxx[ERROR in template! include self nested deeper than 3 levels! ]"));
    }

    #[test]
    fn test_error_nodes_render_message() {
        let out = render_json("{^if (x)}body", json!({}));
        assert_eq!(out, "[ERROR in template! if block with no matching end marker! ]body");
    }

    #[test]
    fn test_map_bindings_paths() {
        let b = bindings(json!({"a": {"b": [10, {"c": "deep"}]}}));
        assert_eq!(b.resolve_tag("a.b.0"), Some(json!(10)));
        assert_eq!(b.resolve_tag("a.b.1.c"), Some(json!("deep")));
        assert_eq!(b.resolve_tag("a.x"), None);
        assert_eq!(MapBindings::from_value(json!([1])), MapBindings::default());
    }
}
