// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Tag extraction: raw tag interior to canonical node.
//!
//! The scanner hands over the magic character and the text between the tag
//! delimiters. This module expands every shorthand into the single canonical
//! body the renderer understands:
//!
//! | source              | canonical body            |
//! |---------------------|---------------------------|
//! | `{~name}`           | `name`                    |
//! | `{~.endif}`         | `./if`                    |
//! | `{^if (~a)}`        | `.if (~a)`                |
//! | `{^endloop}`        | `./loop`                  |
//! | `{/loop}`           | `./loop`                  |
//! | `{*#tpl*}` / `{*}`  | `.exec #tpl` / `./exec`   |
//! | `{=}`               | `=`                       |
//! | `{+#tpl}`           | `.include #tpl`           |
//! | `{+(~c)#tpl}`       | `.includeIf(~c).#tpl`     |
//!
//! Anything that fits none of these shapes is reported as
//! [`Extracted::NotATag`] and stays in the output as literal text.

use crate::ast::{Tag, TemplateNode, Token};

/// The character following `{` that selects a tag family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Magic {
    Tilde,
    Dollar,
    Caret,
    Dot,
    Slash,
    Star,
    Equals,
    Plus,
}

impl Magic {
    pub(crate) fn from_byte(byte: u8) -> Option<Magic> {
        match byte {
            b'~' => Some(Magic::Tilde),
            b'$' => Some(Magic::Dollar),
            b'^' => Some(Magic::Caret),
            b'.' => Some(Magic::Dot),
            b'/' => Some(Magic::Slash),
            b'*' => Some(Magic::Star),
            b'=' => Some(Magic::Equals),
            b'+' => Some(Magic::Plus),
            _ => None,
        }
    }
}

/// Outcome of extracting one recognized tag span.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Extracted {
    /// A finished node.
    Node(TemplateNode),
    /// The span opens a literal-escape section.
    LiteralStart,
    /// The span fits no known shape; keep it as literal text.
    NotATag,
}

fn tag(raw: &str, body: String) -> Extracted {
    Extracted::Node(TemplateNode::Tag(Tag::new(raw, body)))
}

/// Canonicalizes a brace tag.
///
/// `raw` is the whole span including delimiters; `interior` is the text
/// between the magic character and the closing delimiter.
pub(crate) fn extract(magic: Magic, raw: &str, interior: &str) -> Extracted {
    match magic {
        Magic::Tilde | Magic::Dollar => {
            if interior.is_empty() {
                Extracted::NotATag
            } else if let Some(rest) = interior.strip_prefix(".end") {
                tag(raw, format!("./{}", rest))
            } else {
                tag(raw, interior.to_string())
            }
        }
        Magic::Caret | Magic::Dot => {
            if interior == "literal" || interior == "^" {
                Extracted::LiteralStart
            } else if let Some(rest) = interior.strip_prefix("end") {
                tag(raw, format!("./{}", rest))
            } else {
                tag(raw, format!(".{}", interior))
            }
        }
        Magic::Slash => tag(raw, format!("./{}", interior)),
        Magic::Star => extract_macro(raw, interior),
        Magic::Equals => {
            if interior.trim().is_empty() {
                tag(raw, "=".to_string())
            } else {
                Extracted::NotATag
            }
        }
        Magic::Plus => extract_include(raw, interior),
    }
}

fn extract_macro(raw: &str, interior: &str) -> Extracted {
    let trimmed = interior.trim();
    if trimmed.is_empty() {
        return tag(raw, "./exec".to_string());
    }
    let name = trimmed.strip_suffix('*').unwrap_or(trimmed).trim();
    if name.is_empty() {
        Extracted::NotATag
    } else {
        tag(raw, format!(".exec {}", name))
    }
}

fn extract_include(raw: &str, interior: &str) -> Extracted {
    let trimmed = interior.trim();
    if trimmed.is_empty() {
        return Extracted::NotATag;
    }
    if !trimmed.starts_with('(') {
        return tag(raw, format!(".include {}", trimmed));
    }

    let mut depth = 0usize;
    for (i, c) in trimmed.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    let condition = &trimmed[1..i];
                    let reference = trimmed[i + 1..].trim();
                    if reference.is_empty() {
                        return Extracted::NotATag;
                    }
                    return tag(raw, format!(".includeIf({}).{}", condition, reference));
                }
            }
            _ => {}
        }
    }
    Extracted::NotATag
}

/// Builds a localization token node.
///
/// `key` is the text between `_[` and `]`. `args` is whatever followed the
/// `]` inside a braced token (`,a,b` in `{_[key],a,b}`), or `None` for a bare
/// `_[key]`.
pub(crate) fn extract_token(raw: &str, key: &str, args: Option<&str>) -> Extracted {
    let args = match args.map(str::trim) {
        None | Some("") => None,
        Some(list) => match list.strip_prefix(',') {
            Some(list) => Some(split_unescaped(list, ',')),
            None => return Extracted::NotATag,
        },
    };
    Extracted::Node(TemplateNode::Token(Token {
        raw_text: raw.to_string(),
        token_key: unescape(key, ']'),
        args,
    }))
}

fn split_unescaped(list: &str, separator: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut backslashes = 0usize;
    for c in list.chars() {
        if c == separator && backslashes % 2 == 0 {
            parts.push(current.trim().to_string());
            current.clear();
        } else if c == separator {
            current.pop();
            current.push(c);
        } else {
            current.push(c);
        }
        backslashes = if c == '\\' { backslashes + 1 } else { 0 };
    }
    parts.push(current.trim().to_string());
    parts
}

fn unescape(text: &str, escaped: char) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&escaped) {
            continue;
        }
        out.push(c);
    }
    out
}
