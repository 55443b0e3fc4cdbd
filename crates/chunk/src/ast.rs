// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Node types for parsed Chunk templates.
//!
//! This module defines the data structures produced by the scanner and the
//! block grouper and consumed by the renderer and the source serializer.
//!
//! # Structure
//!
//! A parsed [`Template`] is either the [`Template::Simple`] fast path (no
//! dynamic content at all) or a list of [`TemplateNode`]s:
//! - literal text and literal-escape spans (`{^literal}...{^}`)
//! - comments (`{!-- ... --}`) kept only for source reconstruction
//! - tags carrying a canonical instruction body (`{~name}`, `{^include x}`)
//! - localization tokens (`_[text]`, `{_[text],arg}`)
//! - grouped blocks (`{^if}...{/if}`, `{^loop}...{/loop}`, macros, `{^loc}`)
//! - whitespace elided by smart trim
//! - inline error markers for blocks that never close
//!
//! Every node remembers the exact source bytes it came from, so
//! concatenating [`TemplateNode::write_source`] over a node list reproduces
//! the original template text.

use serde::{Deserialize, Serialize};

/// The family a block tag belongs to.
///
/// The family decides which handler the renderer invokes and whether smart
/// trim applies around the block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockKind {
    /// `{^if (cond)}...{/if}`, with optional `{^elseIf}` / `{^else}` branches.
    Conditional,
    /// `{^loop in ~list as item}...{/loop}`.
    Loop,
    /// `{*template*}...{*}` or the long form `{^exec template}...{/exec}`.
    Macro,
    /// `{^loc}...{/loc}`: the rendered body is translated as a whole.
    Localization,
}

impl BlockKind {
    /// Every block family, in lookup order.
    pub const ALL: [BlockKind; 4] = [
        BlockKind::Conditional,
        BlockKind::Loop,
        BlockKind::Macro,
        BlockKind::Localization,
    ];

    /// The command keyword that opens (and, prefixed with `/`, closes) the block.
    pub fn keyword(self) -> &'static str {
        match self {
            BlockKind::Conditional => "if",
            BlockKind::Loop => "loop",
            BlockKind::Macro => "exec",
            BlockKind::Localization => "loc",
        }
    }

    /// Looks up a block family by its command keyword.
    pub fn from_keyword(keyword: &str) -> Option<BlockKind> {
        BlockKind::ALL.into_iter().find(|kind| kind.keyword() == keyword)
    }

    /// Whether blocks of this family take part in smart trim.
    pub fn smart_trims(self) -> bool {
        matches!(self, BlockKind::Conditional | BlockKind::Loop)
    }

    /// Command keywords that split this block's body into sections.
    pub fn branch_keywords(self) -> &'static [&'static str] {
        match self {
            BlockKind::Conditional => &["elseIf", "else"],
            BlockKind::Loop => &["onEmpty", "divider"],
            BlockKind::Macro | BlockKind::Localization => &[],
        }
    }
}

/// A dynamic `{...}` directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// The exact source span, delimiters included.
    pub raw_text: String,
    /// Canonical instruction string: `.if (x)`, `./loop`, `name|upper`, ...
    pub body: String,
}

impl Tag {
    /// Creates a tag from its source span and canonical body.
    pub fn new(raw_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            raw_text: raw_text.into(),
            body: body.into(),
        }
    }

    /// Returns the command keyword for `.keyword ...` bodies.
    ///
    /// Closers (`./keyword`) and variable references yield `None`.
    pub fn command(&self) -> Option<&str> {
        let rest = self.body.strip_prefix('.')?;
        let len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        if len == 0 {
            None
        } else {
            Some(&rest[..len])
        }
    }

    /// Returns the keyword closed by a `./keyword` body.
    pub fn closer(&self) -> Option<&str> {
        let rest = self.body.strip_prefix("./")?;
        let len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        Some(&rest[..len])
    }

    /// Whether this tag opens a block, and of which family.
    pub fn opens_block(&self) -> Option<BlockKind> {
        self.command().and_then(BlockKind::from_keyword)
    }

    /// Whether this tag closes a block, and of which family.
    pub fn closes_block(&self) -> Option<BlockKind> {
        self.closer().and_then(BlockKind::from_keyword)
    }

    /// Text following the command keyword, with surrounding whitespace removed.
    pub fn arguments(&self) -> &str {
        match self.command() {
            Some(keyword) => self.body[1 + keyword.len()..].trim(),
            None => "",
        }
    }
}

/// A localization placeholder: `_[text]` or `{_[text],arg1,arg2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The exact source span.
    pub raw_text: String,
    /// The translation key (the text between `_[` and `]`).
    pub token_key: String,
    /// Positional arguments; entries starting with `~` or `$` are tag references.
    pub args: Option<Vec<String>>,
}

/// Opening and closing markers of a literal-escape span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscapeMarkers {
    /// The opener as written (`{^literal}`, `{.literal}`, `{^^}`, ...).
    pub open: String,
    /// The closer as written; empty when the span ran to the end of input.
    pub close: String,
}

/// A grouped block: opener, nested body, closer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// The block-opening tag.
    pub open: Tag,
    /// Fully grouped body nodes.
    pub body: Vec<TemplateNode>,
    /// The matching closer.
    pub close: Tag,
    /// Which handler renders this block.
    pub kind: BlockKind,
}

/// Why an [`TemplateNode::Error`] marker was inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockFault {
    /// The opener has no matching closer.
    Unmatched,
    /// The opener sits deeper than the configured nesting limit.
    TooDeep,
}

/// A node of a parsed template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemplateNode {
    /// Pass-through text.
    ///
    /// When `escape` is set the text came from a literal-escape span and the
    /// markers are kept only for source reconstruction.
    Literal {
        /// The text to emit.
        text: String,
        /// Markers around a literal-escape span.
        escape: Option<EscapeMarkers>,
    },
    /// `{!-- ... --}`; never rendered.
    Comment {
        /// The comment including its delimiters.
        raw_text: String,
    },
    /// Whitespace removed by smart trim; never rendered.
    ///
    /// Stands in for folding the trimmed whitespace into the neighbouring
    /// tag's raw text: the bytes stay in the tree for round-trip, and
    /// consolidation turns them back into literal text before regrouping.
    Elided {
        /// The removed whitespace.
        text: String,
    },
    /// A tag node.
    Tag(Tag),
    /// A localization token.
    Token(Token),
    /// A grouped block.
    Block(Block),
    /// Inline marker for a block that could not be grouped.
    Error {
        /// Why the block could not be grouped.
        fault: BlockFault,
        /// Keyword of the failing opener.
        keyword: String,
        /// Byte offset of the failing opener in the parsed source.
        offset: usize,
        /// Text emitted in place of the block.
        message: String,
    },
}

impl TemplateNode {
    /// Creates a plain literal node.
    pub fn literal(text: impl Into<String>) -> Self {
        TemplateNode::Literal {
            text: text.into(),
            escape: None,
        }
    }

    /// Creates an elided-whitespace node.
    pub fn elided(text: impl Into<String>) -> Self {
        TemplateNode::Elided { text: text.into() }
    }

    /// Creates an error marker for an opener that could not be grouped.
    pub fn block_error(fault: BlockFault, keyword: &str, offset: usize, limit: usize) -> Self {
        let message = match fault {
            BlockFault::Unmatched => format!(
                "[ERROR in template! {} block with no matching end marker! ]",
                keyword
            ),
            BlockFault::TooDeep => format!(
                "[ERROR in template! {} block nested deeper than {} levels! ]",
                keyword, limit
            ),
        };
        TemplateNode::Error {
            fault,
            keyword: keyword.to_string(),
            offset,
            message,
        }
    }

    /// Returns the text of a plain (non-escaped) literal.
    pub fn plain_text(&self) -> Option<&str> {
        match self {
            TemplateNode::Literal { text, escape: None } => Some(text),
            _ => None,
        }
    }

    /// Returns the tag of a tag node.
    pub fn as_tag(&self) -> Option<&Tag> {
        match self {
            TemplateNode::Tag(tag) => Some(tag),
            _ => None,
        }
    }

    /// Whether this node can produce output when rendered.
    pub fn is_renderable(&self) -> bool {
        !matches!(
            self,
            TemplateNode::Comment { .. } | TemplateNode::Elided { .. }
        )
    }

    /// Appends the source text this node was parsed from.
    ///
    /// Error markers are synthetic and contribute nothing.
    pub fn write_source(&self, out: &mut String) {
        match self {
            TemplateNode::Literal { text, escape } => match escape {
                Some(markers) => {
                    out.push_str(&markers.open);
                    out.push_str(text);
                    out.push_str(&markers.close);
                }
                None => out.push_str(text),
            },
            TemplateNode::Comment { raw_text } => out.push_str(raw_text),
            TemplateNode::Elided { text } => out.push_str(text),
            TemplateNode::Tag(tag) => out.push_str(&tag.raw_text),
            TemplateNode::Token(token) => out.push_str(&token.raw_text),
            TemplateNode::Block(block) => {
                out.push_str(&block.open.raw_text);
                for node in &block.body {
                    node.write_source(out);
                }
                out.push_str(&block.close.raw_text);
            }
            TemplateNode::Error { .. } => {}
        }
    }

    /// Length in bytes of the source text this node was parsed from.
    pub fn source_len(&self) -> usize {
        match self {
            TemplateNode::Literal { text, escape } => {
                text.len()
                    + escape
                        .as_ref()
                        .map_or(0, |markers| markers.open.len() + markers.close.len())
            }
            TemplateNode::Comment { raw_text } => raw_text.len(),
            TemplateNode::Elided { text } => text.len(),
            TemplateNode::Tag(tag) => tag.raw_text.len(),
            TemplateNode::Token(token) => token.raw_text.len(),
            TemplateNode::Block(block) => {
                block.open.raw_text.len()
                    + block.body.iter().map(TemplateNode::source_len).sum::<usize>()
                    + block.close.raw_text.len()
            }
            TemplateNode::Error { .. } => 0,
        }
    }
}

/// A parsed, immutable template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Template {
    /// Fast path: the source held no dynamic content and renders as itself.
    Simple(String),
    /// Parsed node list with an optional provenance tag.
    Parts {
        /// Grouped nodes.
        nodes: Vec<TemplateNode>,
        /// Provenance, serialized as a leading `{!-- @origin ... --}` comment.
        origin: Option<String>,
    },
}
