// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Variable tag bodies: name, filter chain and default value.
//!
//! # Grammar
//!
//! ```text
//! name                      value or nothing
//! name:default              default replaces a missing value
//! name:default|f1|f2        default is substituted first, then filtered
//! name|f1|f2:default        default is emitted as is when the value is missing
//! ```
//!
//! A filter is `name`, `name(arg, arg)`, `s/find/replace/flags` or
//! `m/pattern/flags`. The separators `|` and `:` do not count inside
//! parentheses, inside a regex literal, or after an odd number of
//! backslashes.

use crate::scanner::regex_delimiters;
use serde::{Deserialize, Serialize};

/// One step of a filter chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Filter name; `s` and `m` for the regex forms.
    pub name: String,
    /// Arguments; `[find, replace, flags]` for `s`, `[pattern, flags]` for `m`.
    pub args: Vec<String>,
}

/// Where a default value sits relative to the filter chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefaultValue {
    /// `name:default|filters`: the default runs through the filters.
    Filtered(String),
    /// `name|filters:default`: the default bypasses the filters.
    Raw(String),
}

/// A parsed variable tag body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagExpr {
    /// The variable name, possibly dotted (`user.name`).
    pub name: String,
    /// Filters in application order.
    pub filters: Vec<Filter>,
    /// Fallback for a missing value.
    pub default: Option<DefaultValue>,
}

impl TagExpr {
    /// Parses a canonical variable tag body such as `name:World|upper`.
    pub fn parse(body: &str) -> TagExpr {
        let mut segments = split_top_level(body, b'|');
        let head = segments.remove(0);

        let (name, mut default) = match split_once_top_level(head, b':') {
            Some((name, default)) => (name, Some(DefaultValue::Filtered(unescape(default)))),
            None => (head, None),
        };

        if default.is_none() {
            if let Some(last) = segments.last_mut() {
                let segment: &str = *last;
                if let Some((filter, raw)) = split_once_top_level(segment, b':') {
                    default = Some(DefaultValue::Raw(unescape(raw)));
                    *last = filter;
                }
            }
        }

        TagExpr {
            name: name.trim().to_string(),
            filters: segments.into_iter().filter_map(Filter::parse).collect(),
            default,
        }
    }
}

impl Filter {
    /// Parses one filter segment; blank segments yield `None`.
    pub fn parse(segment: &str) -> Option<Filter> {
        let segment = segment.trim();
        if segment.is_empty() {
            return None;
        }

        if let Some(rest) = segment.strip_prefix("s/") {
            let mut parts = split_unescaped_slashes(rest);
            parts.resize(3, String::new());
            return Some(Filter {
                name: "s".to_string(),
                args: parts,
            });
        }
        if let Some(rest) = segment.strip_prefix("m/") {
            let mut parts = split_unescaped_slashes(rest);
            parts.resize(2, String::new());
            return Some(Filter {
                name: "m".to_string(),
                args: parts,
            });
        }

        match segment.find('(') {
            Some(open) if segment.ends_with(')') => {
                let inner = &segment[open + 1..segment.len() - 1];
                let args = if inner.trim().is_empty() {
                    Vec::new()
                } else {
                    split_top_level(inner, b',')
                        .into_iter()
                        .map(|arg| unquote(arg.trim()).to_string())
                        .collect()
                };
                Some(Filter {
                    name: segment[..open].trim().to_string(),
                    args,
                })
            }
            _ => Some(Filter {
                name: segment.to_string(),
                args: Vec::new(),
            }),
        }
    }
}

/// Splits `text` at every top-level `sep`.
///
/// Separators inside parentheses, inside regex literals, or escaped by an
/// odd number of backslashes are skipped.
pub(crate) fn split_top_level(text: &str, sep: u8) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut regex_pending = 0u8;
    let mut backslashes = 0usize;

    for (i, &byte) in bytes.iter().enumerate() {
        let escaped = backslashes % 2 == 1;
        backslashes = if byte == b'\\' { backslashes + 1 } else { 0 };
        if escaped {
            continue;
        }

        if regex_pending > 0 {
            if byte == b'/' {
                regex_pending -= 1;
            }
            continue;
        }

        match byte {
            b'/' => regex_pending = regex_delimiters(&bytes[..i]),
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if byte == sep && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

fn split_once_top_level(text: &str, sep: u8) -> Option<(&str, &str)> {
    let parts = split_top_level(text, sep);
    if parts.len() < 2 {
        return None;
    }
    let at = parts[0].len();
    Some((&text[..at], &text[at + 1..]))
}

fn split_unescaped_slashes(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('/') => current.push('/'),
                Some(other) => {
                    current.push('\\');
                    current.push(other);
                }
                None => current.push('\\'),
            },
            '/' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn unescape(text: &str) -> String {
    text.replace("\\|", "|").replace("\\:", ":")
}

fn unquote(arg: &str) -> &str {
    for quote in ['"', '\''] {
        if arg.len() >= 2 && arg.starts_with(quote) && arg.ends_with(quote) {
            return &arg[1..arg.len() - 1];
        }
    }
    arg
}
