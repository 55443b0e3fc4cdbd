// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Error types for the Chunk template engine.
//!
//! Parsing never fails: structural problems become inline markers in the
//! parsed tree. [`ChunkError`] covers the edges that can fail:
//!
//! - **Strict parsing**: [`crate::parse_strict`] turns the first inline
//!   marker into a positioned error
//! - **Configuration**: unreadable or invalid TOML
//! - **Cache**: a poisoned cache lock
//! - **Includes**: a named entry template that cannot be found
//!
//! # Source Context
//!
//! Positioned errors carry a [`SourceContext`] that renders the lines around
//! the problem with a caret under the offending column.

use std::fmt;
use thiserror::Error;

/// A snippet of template source around an error location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceContext {
    /// `(line number, text)` pairs of the snippet, 1-indexed.
    pub lines: Vec<(usize, String)>,
    /// Line of the error (1-indexed).
    pub line: usize,
    /// Column of the error in characters (1-indexed).
    pub column: usize,
}

impl SourceContext {
    /// Number of lines shown on each side of the error line.
    const RADIUS: usize = 2;

    /// Builds the snippet for a byte offset into `source`.
    pub fn at_offset(source: &str, offset: usize) -> Self {
        let (line, column) = line_column(source, offset);
        let first = line.saturating_sub(Self::RADIUS).max(1);
        let lines = source
            .split('\n')
            .enumerate()
            .map(|(i, text)| (i + 1, text.trim_end_matches('\r').to_string()))
            .skip(first - 1)
            .take(line + Self::RADIUS + 1 - first)
            .collect();
        Self { lines, line, column }
    }
}

impl fmt::Display for SourceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (number, text) in &self.lines {
            writeln!(f, "{:4} | {}", number, text)?;
            if *number == self.line {
                writeln!(f, "     | {}^", " ".repeat(self.column.saturating_sub(1)))?;
            }
        }
        Ok(())
    }
}

/// Converts a byte offset into a 1-indexed (line, column) pair.
///
/// Offsets past the end or inside a multi-byte character are clamped to the
/// nearest preceding character boundary.
pub fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let mut offset = offset.min(source.len());
    while !source.is_char_boundary(offset) {
        offset -= 1;
    }
    let before = &source[..offset];
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map_or(0, |at| at + 1);
    let column = before[line_start..].chars().count() + 1;
    (line, column)
}

/// The main error type for Chunk operations.
#[derive(Error, Debug)]
pub enum ChunkError {
    /// A block opener has no matching closer (strict parsing only).
    #[error("{keyword} block with no matching end marker at line {line}, column {column}\n{source_context}")]
    UnmatchedBlock {
        /// Keyword of the opener (`if`, `loop`, `exec`, `loc`).
        keyword: String,
        /// Line of the opener.
        line: usize,
        /// Column of the opener.
        column: usize,
        /// Source snippet around the opener.
        source_context: SourceContext,
    },

    /// A block opener sits deeper than the configured nesting limit
    /// (strict parsing only).
    #[error("{keyword} block nested deeper than {limit} levels at line {line}, column {column}")]
    NestingTooDeep {
        /// Keyword of the opener.
        keyword: String,
        /// Line of the opener.
        line: usize,
        /// Column of the opener.
        column: usize,
        /// The configured limit.
        limit: usize,
    },

    /// Configuration could not be parsed.
    #[error("Config error: {0}")]
    ConfigError(String),

    /// File I/O error.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// Cache operation failed.
    #[error("Cache error: {0}")]
    CacheError(String),

    /// A named template could not be found by the include collaborator.
    #[error("Template not found: {0}")]
    IncludeNotFound(String),
}

/// Convenience type alias for Results with [`ChunkError`].
pub type Result<T> = std::result::Result<T, ChunkError>;
