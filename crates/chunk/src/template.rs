// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Template assembly and source reconstruction.
//!
//! [`Template::parse`] runs the full pipeline: scan and extract tags, group
//! blocks, smart trim. A template whose source holds no dynamic content at
//! all takes the [`Template::Simple`] fast path.
//!
//! # Round-trip
//!
//! [`Template::to_source_string`] gives back the exact parsed source:
//!
//! ```rust
//! use chunk::Template;
//!
//! let source = "{!-- header --}\n{^if (~a)}\n  {~a|upper}\n{/if}\n";
//! assert_eq!(Template::parse(source).to_source_string(), source);
//! ```
//!
//! # Consolidation
//!
//! Fragments appended separately can be merged with [`consolidate`]. The
//! fragments are flattened back to their ungrouped node sequences, joined,
//! and grouped once more, so a block may open in one fragment and close in
//! another.

use crate::ast::{BlockFault, Template, TemplateNode};
use crate::config::ParseOptions;
use crate::error::{line_column, ChunkError, Result, SourceContext};
use crate::grouper::group;
use crate::scanner::scan;

const ORIGIN_OPEN: &str = "{!-- @origin ";
const ORIGIN_CLOSE: &str = " --}";

impl Template {
    /// Parses a template with default options.
    pub fn parse(source: &str) -> Template {
        Self::parse_with(source, &ParseOptions::default())
    }

    /// Parses a template.
    ///
    /// Never fails: malformed tags degrade to text and unmatched blocks
    /// become inline [`TemplateNode::Error`] markers.
    pub fn parse_with(source: &str, options: &ParseOptions) -> Template {
        let (origin, body) = split_origin(source);
        let nodes = group(scan(body), options);
        let template = assemble(nodes, origin.map(str::to_string));
        match &template {
            Template::Simple(_) => {
                tracing::debug!("parsed {} bytes as simple template", source.len());
            }
            Template::Parts { nodes, .. } => {
                tracing::debug!("parsed {} bytes into {} top-level nodes", source.len(), nodes.len());
            }
        }
        template
    }

    /// Returns this template tagged with a provenance string.
    pub fn with_origin(self, origin: impl Into<String>) -> Template {
        let nodes = match self {
            Template::Simple(text) if text.is_empty() => Vec::new(),
            Template::Simple(text) => vec![TemplateNode::literal(text)],
            Template::Parts { nodes, .. } => nodes,
        };
        Template::Parts {
            nodes,
            origin: Some(origin.into()),
        }
    }

    /// Provenance string, if one was recorded.
    pub fn origin(&self) -> Option<&str> {
        match self {
            Template::Simple(_) => None,
            Template::Parts { origin, .. } => origin.as_deref(),
        }
    }

    /// Whether the template took the no-dynamic-content fast path.
    pub fn is_simple(&self) -> bool {
        matches!(self, Template::Simple(_))
    }

    /// Top-level nodes; `None` for the simple fast path.
    pub fn nodes(&self) -> Option<&[TemplateNode]> {
        match self {
            Template::Simple(_) => None,
            Template::Parts { nodes, .. } => Some(nodes),
        }
    }

    /// All error markers in the tree, in source order.
    pub fn errors(&self) -> Vec<&TemplateNode> {
        let mut found = Vec::new();
        if let Some(nodes) = self.nodes() {
            collect_errors(nodes, &mut found);
        }
        found
    }

    /// Reconstructs the exact source text, origin marker included.
    pub fn to_source_string(&self) -> String {
        match self {
            Template::Simple(text) => text.clone(),
            Template::Parts { nodes, origin } => {
                let mut out = String::new();
                if let Some(origin) = origin {
                    out.push_str(&origin_marker(origin));
                }
                for node in nodes {
                    node.write_source(&mut out);
                }
                out
            }
        }
    }
}

/// Parses a template with default options.
pub fn parse_template(source: &str) -> Template {
    Template::parse(source)
}

/// Parses a template with the given options.
pub fn parse_template_with(source: &str, options: &ParseOptions) -> Template {
    Template::parse_with(source, options)
}

/// Parses a template and reports the first structural problem as an error.
///
/// The lenient parse is run as usual; the first [`TemplateNode::Error`]
/// marker is turned into a [`ChunkError`] with line and column.
///
/// # Errors
///
/// Returns [`ChunkError::UnmatchedBlock`] or [`ChunkError::NestingTooDeep`].
pub fn parse_strict(source: &str, options: &ParseOptions) -> Result<Template> {
    let template = Template::parse_with(source, options);
    let base = source.len() - split_origin(source).1.len();

    let first = template.errors().into_iter().find_map(|node| match node {
        TemplateNode::Error {
            fault,
            keyword,
            offset,
            ..
        } => Some((*fault, keyword.clone(), base + offset)),
        _ => None,
    });
    let Some((fault, keyword, offset)) = first else {
        return Ok(template);
    };

    let (line, column) = line_column(source, offset);
    Err(match fault {
        BlockFault::Unmatched => ChunkError::UnmatchedBlock {
            keyword,
            line,
            column,
            source_context: SourceContext::at_offset(source, offset),
        },
        BlockFault::TooDeep => ChunkError::NestingTooDeep {
            keyword,
            line,
            column,
            limit: options.max_depth,
        },
    })
}

/// Reconstructs the exact source text of a template.
pub fn to_source_string(template: &Template) -> String {
    template.to_source_string()
}

/// Merges appended fragments into one template, with default options.
pub fn consolidate(fragments: Vec<Template>) -> Template {
    consolidate_with(fragments, &ParseOptions::default())
}

/// Merges appended fragments into one template and regroups its blocks.
///
/// The first fragment's origin is kept; origins of later fragments stay in
/// the source as plain comments.
pub fn consolidate_with(fragments: Vec<Template>, options: &ParseOptions) -> Template {
    let count = fragments.len();
    let mut origin = None;
    let mut flat = Vec::new();

    for (i, fragment) in fragments.into_iter().enumerate() {
        match fragment {
            Template::Simple(text) => push_flat(&mut flat, TemplateNode::literal(text)),
            Template::Parts {
                nodes,
                origin: fragment_origin,
            } => {
                if let Some(fragment_origin) = fragment_origin {
                    if i == 0 {
                        origin = Some(fragment_origin);
                    } else {
                        push_flat(
                            &mut flat,
                            TemplateNode::Comment {
                                raw_text: origin_marker(&fragment_origin),
                            },
                        );
                    }
                }
                flatten_into(nodes, &mut flat);
            }
        }
    }

    let nodes = group(flat, options);
    tracing::debug!("consolidated {} fragments into {} top-level nodes", count, nodes.len());
    assemble(nodes, origin)
}

fn assemble(mut nodes: Vec<TemplateNode>, origin: Option<String>) -> Template {
    if origin.is_none() {
        if nodes.is_empty() {
            return Template::Simple(String::new());
        }
        if nodes.len() == 1 && nodes[0].plain_text().is_some() {
            if let Some(TemplateNode::Literal { text, .. }) = nodes.pop() {
                return Template::Simple(text);
            }
        }
    }
    Template::Parts { nodes, origin }
}

fn origin_marker(origin: &str) -> String {
    format!("{}{}{}", ORIGIN_OPEN, origin, ORIGIN_CLOSE)
}

/// Splits a leading origin marker off `source`.
fn split_origin(source: &str) -> (Option<&str>, &str) {
    let Some(rest) = source.strip_prefix(ORIGIN_OPEN) else {
        return (None, source);
    };
    match rest.find(ORIGIN_CLOSE) {
        Some(end) if end > 0 && !rest[..end].contains("--}") => {
            (Some(&rest[..end]), &rest[end + ORIGIN_CLOSE.len()..])
        }
        _ => (None, source),
    }
}

/// Undoes grouping and smart trim: blocks unwrap, elided whitespace turns
/// back into text, error markers are dropped.
fn flatten_into(nodes: Vec<TemplateNode>, flat: &mut Vec<TemplateNode>) {
    for node in nodes {
        match node {
            TemplateNode::Block(block) => {
                flat.push(TemplateNode::Tag(block.open));
                flatten_into(block.body, flat);
                flat.push(TemplateNode::Tag(block.close));
            }
            TemplateNode::Elided { text } => push_flat(flat, TemplateNode::literal(text)),
            TemplateNode::Error { .. } => {}
            other => push_flat(flat, other),
        }
    }
}

/// Appends a node, merging adjacent plain literals.
fn push_flat(flat: &mut Vec<TemplateNode>, node: TemplateNode) {
    if let TemplateNode::Literal { text, escape: None } = &node {
        if text.is_empty() {
            return;
        }
        if let Some(TemplateNode::Literal {
            text: last,
            escape: None,
        }) = flat.last_mut()
        {
            last.push_str(text);
            return;
        }
    }
    flat.push(node);
}

fn collect_errors<'t>(nodes: &'t [TemplateNode], found: &mut Vec<&'t TemplateNode>) {
    for node in nodes {
        match node {
            TemplateNode::Error { .. } => found.push(node),
            TemplateNode::Block(block) => collect_errors(&block.body, found),
            _ => {}
        }
    }
}
