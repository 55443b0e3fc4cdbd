// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Single-pass delimiter scanner.
//!
//! Slices a template source into a flat sequence of literal, comment, tag
//! and token nodes. Block grouping happens afterwards in
//! [`crate::grouper`].
//!
//! # State Transitions
//!
//! ```text
//! Normal ──{~ {$ {^ {. {/ {* {= {+ {%──> InTag ──}──> [extract] ──> Normal
//!   │                                      │                 └──> InLiteral ──end marker──> Normal
//!   ├──{!--──> InComment ──--}──> Normal   │
//!   └──_[ / {_[──> InToken ──]──> Normal   └─ `/` after s, m, `~`, `=~ `, `(` or `,`
//!                                             makes `}` and `/` inert until the
//!                                             regex delimiters are consumed
//! ```
//!
//! Unterminated tags and tokens fall back to literal text; unterminated
//! comments and literal-escape sections run to the end of input. A `{%` tag
//! hit by a bare `}` is text up to that brace. The scanner never fails.
//!
//! Openers past the last `}` (or, for tokens, the last `]`) in the source
//! can never close and are treated as text right away, so a long run of
//! unterminated openers is scanned once.

use crate::ast::{EscapeMarkers, TemplateNode};
use crate::extract::{extract, extract_token, Extracted, Magic};
use crate::literal::find_literal_end;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Plain text.
    Normal,
    /// Between a tag opener and its closing `}` (or `%}` when `spaced`).
    InTag {
        start: usize,
        body_start: usize,
        magic: Magic,
        spaced: bool,
        /// Regex delimiters still expected before `}` counts again.
        regex_pending: u8,
        backslashes: usize,
    },
    /// After `_[`, looking for the unescaped `]`.
    InToken {
        start: usize,
        key_start: usize,
        braced: bool,
    },
    /// After `{!--`, looking for `--}`.
    InComment { start: usize },
    /// After a literal-escape opener ending at `open_end`.
    InLiteral { start: usize, open_end: usize },
}

/// Forward-only scanner over a template source.
pub(crate) struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// Start of literal text not yet emitted.
    text_start: usize,
    state: ScanState,
    nodes: Vec<TemplateNode>,
    /// Offset of the last `}` in the source.
    last_brace: Option<usize>,
    /// Offset of the last `]` in the source.
    last_bracket: Option<usize>,
}

fn is_word(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Number of regex delimiters that follow a `/` found at the end of `before`.
///
/// `s/find/repl/` expects two more, `m/re/` and a bare `/re/` one more. The
/// character right before the slash decides which form it is; any other
/// slash is an ordinary character.
pub(crate) fn regex_delimiters(before: &[u8]) -> u8 {
    let Some((&prev, head)) = before.split_last() else {
        return 0;
    };
    let standalone = head.last().map_or(true, |&b| !is_word(b));
    match prev {
        b's' if standalone => 2,
        b'm' if standalone => 1,
        b'~' | b'(' | b',' => 1,
        b' ' if head.ends_with(b"=~") || head.ends_with(b"!~") => 1,
        _ => 0,
    }
}

impl<'a> Scanner<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            pos: 0,
            text_start: 0,
            state: ScanState::Normal,
            nodes: Vec::new(),
            last_brace: source.bytes().rposition(|b| b == b'}'),
            last_bracket: source.bytes().rposition(|b| b == b']'),
        }
    }

    /// Whether a `}` still follows offset `i`.
    fn brace_after(&self, i: usize) -> bool {
        self.last_brace.map_or(false, |at| at > i)
    }

    /// Whether a `]` still follows offset `i`.
    fn bracket_after(&self, i: usize) -> bool {
        self.last_bracket.map_or(false, |at| at > i)
    }

    /// Runs the scanner to the end of input and returns the flat node list.
    pub(crate) fn scan(mut self) -> Vec<TemplateNode> {
        loop {
            if self.pos >= self.bytes.len() && !self.finish_pending() {
                break;
            }
            match self.state {
                ScanState::Normal => self.scan_normal(),
                ScanState::InTag {
                    start,
                    body_start,
                    magic,
                    spaced,
                    regex_pending,
                    backslashes,
                } => self.scan_tag_byte(start, body_start, magic, spaced, regex_pending, backslashes),
                ScanState::InToken {
                    start,
                    key_start,
                    braced,
                } => self.scan_token(start, key_start, braced),
                ScanState::InComment { start } => self.scan_comment(start),
                ScanState::InLiteral { start, open_end } => self.scan_literal(start, open_end),
            }
        }
        self.flush_text(self.bytes.len());
        self.nodes
    }

    /// Resolves the state left over at end of input.
    ///
    /// Returns true when scanning must resume (an unterminated tag or token
    /// was demoted to text and the bytes after its opener need a rescan).
    fn finish_pending(&mut self) -> bool {
        match self.state {
            ScanState::Normal => false,
            ScanState::InTag { start, .. } | ScanState::InToken { start, .. } => {
                tracing::trace!("unterminated tag at byte {}, keeping it as text", start);
                self.state = ScanState::Normal;
                self.pos = start + 1;
                true
            }
            ScanState::InComment { .. } | ScanState::InLiteral { .. } => true,
        }
    }

    fn flush_text(&mut self, end: usize) {
        if end > self.text_start {
            self.nodes
                .push(TemplateNode::literal(&self.source[self.text_start..end]));
        }
        self.text_start = end;
    }

    fn emit(&mut self, start: usize, end: usize, node: TemplateNode) {
        self.flush_text(start);
        self.nodes.push(node);
        self.text_start = end;
    }

    fn scan_normal(&mut self) {
        let mut i = self.pos;
        while i < self.bytes.len() {
            let opened = match self.bytes[i] {
                b'{' => self.classify_open(i),
                b'_' if self.bytes.get(i + 1) == Some(&b'[')
                    && (i == 0 || !is_word(self.bytes[i - 1]))
                    && self.bracket_after(i + 1) =>
                {
                    Some((
                        ScanState::InToken {
                            start: i,
                            key_start: i + 2,
                            braced: false,
                        },
                        i + 2,
                    ))
                }
                _ => None,
            };
            if let Some((state, resume)) = opened {
                self.state = state;
                self.pos = resume;
                return;
            }
            i += 1;
        }
        self.pos = i;
    }

    /// Decides whether the `{` at `i` opens something, and what.
    fn classify_open(&self, i: usize) -> Option<(ScanState, usize)> {
        let next = *self.bytes.get(i + 1)?;
        let after = self.bytes.get(i + 2).copied();
        let tag = |magic, body_start, spaced| {
            if !self.brace_after(i) {
                return None;
            }
            Some((
                ScanState::InTag {
                    start: i,
                    body_start,
                    magic,
                    spaced,
                    regex_pending: 0,
                    backslashes: 0,
                },
                body_start,
            ))
        };
        match next {
            // `{$` next to `.`, `(`, space or `$` belongs to embedded script code.
            b'$' if matches!(after, Some(b'.' | b'(' | b' ' | b'$')) => None,
            b'!' if self.bytes[i + 2..].starts_with(b"--") => {
                Some((ScanState::InComment { start: i }, i + 4))
            }
            b'_' if after == Some(b'[') && self.bracket_after(i + 2) && self.brace_after(i + 2) => Some((
                ScanState::InToken {
                    start: i,
                    key_start: i + 3,
                    braced: true,
                },
                i + 3,
            )),
            b'%' => {
                let mut j = i + 2;
                while j < self.bytes.len() && self.bytes[j].is_ascii_whitespace() {
                    j += 1;
                }
                let first = *self.bytes.get(j)?;
                if first == b'%' && self.bytes.get(j + 1) == Some(&b'}') {
                    return None;
                }
                match Magic::from_byte(first) {
                    Some(magic) => tag(magic, j + 1, true),
                    None => tag(Magic::Caret, j, true),
                }
            }
            _ => Magic::from_byte(next).and_then(|magic| tag(magic, i + 2, false)),
        }
    }

    fn scan_tag_byte(
        &mut self,
        start: usize,
        body_start: usize,
        magic: Magic,
        spaced: bool,
        mut regex_pending: u8,
        backslashes: usize,
    ) {
        let byte = self.bytes[self.pos];
        let escaped = backslashes % 2 == 1;

        if regex_pending > 0 {
            if byte == b'/' && !escaped {
                regex_pending -= 1;
            }
        } else if byte == b'}' && !escaped {
            if !spaced {
                self.close_tag(start, body_start, self.pos, magic, false);
                return;
            }
            if self.pos > body_start && self.bytes[self.pos - 1] == b'%' {
                self.close_tag(start, body_start, self.pos - 1, magic, true);
                return;
            }
            tracing::trace!("spaced tag at byte {} closed without %, keeping it as text", start);
            self.state = ScanState::Normal;
            self.pos += 1;
            return;
        } else if byte == b'/' && !escaped {
            regex_pending = regex_delimiters(&self.bytes[body_start..self.pos]);
        }

        self.state = ScanState::InTag {
            start,
            body_start,
            magic,
            spaced,
            regex_pending,
            backslashes: if byte == b'\\' { backslashes + 1 } else { 0 },
        };
        self.pos += 1;
    }

    /// Handles a tag whose closing `}` sits at `self.pos`.
    fn close_tag(&mut self, start: usize, body_start: usize, body_end: usize, magic: Magic, spaced: bool) {
        let end = self.pos + 1;
        let raw = &self.source[start..end];
        let mut interior = &self.source[body_start..body_end];
        if spaced {
            interior = interior.trim_end();
        }

        match extract(magic, raw, interior) {
            Extracted::Node(node) => {
                self.emit(start, end, node);
                self.state = ScanState::Normal;
            }
            Extracted::LiteralStart => {
                self.state = ScanState::InLiteral {
                    start,
                    open_end: end,
                };
            }
            Extracted::NotATag => {
                tracing::trace!("unrecognized tag {:?} kept as text", raw);
                self.state = ScanState::Normal;
            }
        }
        self.pos = end;
    }

    fn scan_token(&mut self, start: usize, key_start: usize, braced: bool) {
        let Some(key_end) = find_unescaped(self.bytes, key_start, b']') else {
            self.pos = self.bytes.len();
            return;
        };
        let key = &self.source[key_start..key_end];

        let (end, args) = if braced {
            match find_unescaped(self.bytes, key_end + 1, b'}') {
                Some(close) => (close + 1, Some(&self.source[key_end + 1..close])),
                None => {
                    self.pos = self.bytes.len();
                    return;
                }
            }
        } else {
            (key_end + 1, None)
        };

        match extract_token(&self.source[start..end], key, args) {
            Extracted::Node(node) => {
                self.emit(start, end, node);
                self.pos = end;
            }
            _ => {
                self.pos = start + 1;
            }
        }
        self.state = ScanState::Normal;
    }

    fn scan_comment(&mut self, start: usize) {
        // The opener's own `--` may pair with the closing `}`.
        let body_start = (start + 2).min(self.bytes.len());
        let end = match self.source[body_start..].find("--}") {
            Some(at) => body_start + at + 3,
            None => self.bytes.len(),
        };
        let raw_text = self.source[start..end].to_string();
        self.emit(start, end, TemplateNode::Comment { raw_text });
        self.pos = end;
        self.state = ScanState::Normal;
    }

    fn scan_literal(&mut self, start: usize, open_end: usize) {
        let rest = &self.source[open_end..];
        let (text_end, close) = match find_literal_end(rest) {
            Some((at, marker)) => (open_end + at, marker),
            None => (self.bytes.len(), ""),
        };
        let end = text_end + close.len();
        let node = TemplateNode::Literal {
            text: self.source[open_end..text_end].to_string(),
            escape: Some(EscapeMarkers {
                open: self.source[start..open_end].to_string(),
                close: close.to_string(),
            }),
        };
        self.emit(start, end, node);
        self.pos = end;
        self.state = ScanState::Normal;
    }
}

/// Finds the first `target` at or after `from` not preceded by an odd run of
/// backslashes.
fn find_unescaped(bytes: &[u8], from: usize, target: u8) -> Option<usize> {
    let mut backslashes = 0usize;
    for (i, &byte) in bytes.iter().enumerate().skip(from) {
        if byte == target && backslashes % 2 == 0 {
            return Some(i);
        }
        backslashes = if byte == b'\\' { backslashes + 1 } else { 0 };
    }
    None
}

/// Scans `source` into flat nodes.
pub(crate) fn scan(source: &str) -> Vec<TemplateNode> {
    Scanner::new(source).scan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Tag;

    fn tag_bodies(source: &str) -> Vec<String> {
        scan(source)
            .into_iter()
            .filter_map(|node| match node {
                TemplateNode::Tag(Tag { body, .. }) => Some(body),
                _ => None,
            })
            .collect()
    }

    fn rebuilt(source: &str) -> String {
        let mut out = String::new();
        for node in scan(source) {
            node.write_source(&mut out);
        }
        out
    }

    #[test]
    fn test_plain_text_is_one_literal() {
        assert_eq!(scan("Hello World"), vec![TemplateNode::literal("Hello World")]);
        assert!(scan("").is_empty());
    }

    #[test]
    fn test_variable_between_text() {
        let nodes = scan("Hello {~name}!");
        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], TemplateNode::literal("Hello "));
        assert_eq!(nodes[1], TemplateNode::Tag(Tag::new("{~name}", "name")));
        assert_eq!(nodes[2], TemplateNode::literal("!"));
    }

    #[test]
    fn test_default_suffix_preserved() {
        assert_eq!(tag_bodies("Hello {~name:World}!"), vec!["name:World"]);
    }

    #[test]
    fn test_dollar_script_lookalikes_are_text() {
        for source in ["{$.ajax()}", "{$(el)}", "{$ x}", "{$$}"] {
            assert_eq!(scan(source), vec![TemplateNode::literal(source)], "{}", source);
        }
        assert_eq!(tag_bodies("{$name}"), vec!["name"]);
    }

    #[test]
    fn test_regex_substitution_with_brace_and_escaped_slash() {
        assert_eq!(
            tag_bodies("{~path|s/a\\/b/c/}"),
            vec!["path|s/a\\/b/c/"]
        );
        assert_eq!(tag_bodies("{~x|s/}/]/g}tail"), vec!["x|s/}/]/g"]);
        assert_eq!(
            tag_bodies("{^if (~x =~ /a}b/)}"),
            vec![".if (~x =~ /a}b/)"]
        );
        assert_eq!(tag_bodies("{~x|m/{.}/}"), vec!["x|m/{.}/"]);
    }

    #[test]
    fn test_ordinary_slashes_do_not_start_regex() {
        assert_eq!(tag_bodies("{+dirs/file}"), vec![".include dirs/file"]);
        assert_eq!(tag_bodies("{~./if}"), vec!["./if"]);
        assert_eq!(tag_bodies("{^/if}"), vec!["./if"]);
    }

    #[test]
    fn test_escaped_close_brace() {
        assert_eq!(tag_bodies("{~x|qs(a\\}b)}"), vec!["x|qs(a\\}b)"]);
        assert_eq!(tag_bodies("{~x|qs(a\\\\)}"), vec!["x|qs(a\\\\)"]);
    }

    #[test]
    fn test_comments_are_nodes() {
        let nodes = scan("a{!-- note } --}b");
        assert_eq!(
            nodes,
            vec![
                TemplateNode::literal("a"),
                TemplateNode::Comment {
                    raw_text: "{!-- note } --}".to_string()
                },
                TemplateNode::literal("b"),
            ]
        );
        assert_eq!(scan("{!--}")[0], TemplateNode::Comment { raw_text: "{!--}".to_string() });
    }

    #[test]
    fn test_unterminated_comment_runs_to_end() {
        let nodes = scan("x{!-- never closed {~a}");
        assert_eq!(nodes.len(), 2);
        assert_eq!(
            nodes[1],
            TemplateNode::Comment {
                raw_text: "{!-- never closed {~a}".to_string()
            }
        );
    }

    #[test]
    fn test_shortest_comment_closes_on_its_own_dashes() {
        let nodes = scan("{!--}visible {~a}");
        assert_eq!(
            nodes,
            vec![
                TemplateNode::Comment {
                    raw_text: "{!--}".to_string()
                },
                TemplateNode::literal("visible "),
                TemplateNode::Tag(Tag::new("{~a}", "a")),
            ]
        );
        assert_eq!(tag_bodies("{!---}{~b}"), vec!["b"]);
    }

    #[test]
    fn test_bang_without_dashes_is_text() {
        assert_eq!(scan("{!x}"), vec![TemplateNode::literal("{!x}")]);
    }

    #[test]
    fn test_literal_escape_bypasses_tags() {
        let nodes = scan("A{^literal}{~x}{^}B");
        assert_eq!(nodes.len(), 3);
        assert_eq!(
            nodes[1],
            TemplateNode::Literal {
                text: "{~x}".to_string(),
                escape: Some(EscapeMarkers {
                    open: "{^literal}".to_string(),
                    close: "{^}".to_string(),
                }),
            }
        );
    }

    #[test]
    fn test_literal_escape_ignores_regex_and_backslashes() {
        let nodes = scan("{.literal}s/\\}/{/literal}done");
        match &nodes[0] {
            TemplateNode::Literal { text, escape: Some(markers) } => {
                assert_eq!(text, "s/\\}/");
                assert_eq!(markers.close, "{/literal}");
            }
            other => panic!("Expected escaped literal, got {:?}", other),
        }
        assert_eq!(nodes[1], TemplateNode::literal("done"));
    }

    #[test]
    fn test_deprecated_literal_opener_and_unterminated_literal() {
        let nodes = scan("{^^}{~a}");
        assert_eq!(nodes.len(), 1);
        match &nodes[0] {
            TemplateNode::Literal { text, escape: Some(markers) } => {
                assert_eq!(text, "{~a}");
                assert_eq!(markers.open, "{^^}");
                assert_eq!(markers.close, "");
            }
            other => panic!("Expected escaped literal, got {:?}", other),
        }
    }

    #[test]
    fn test_tokens() {
        let nodes = scan("say _[hello] and {_[bye %s],~name}");
        let tokens: Vec<_> = nodes
            .iter()
            .filter_map(|node| match node {
                TemplateNode::Token(token) => Some(token.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].token_key, "hello");
        assert_eq!(tokens[0].raw_text, "_[hello]");
        assert_eq!(tokens[1].token_key, "bye %s");
        assert_eq!(tokens[1].args, Some(vec!["~name".to_string()]));
    }

    #[test]
    fn test_token_inside_identifier_is_text() {
        assert_eq!(scan("arr_[0]"), vec![TemplateNode::literal("arr_[0]")]);
    }

    #[test]
    fn test_spaced_form() {
        assert_eq!(tag_bodies("{% if (~a) %}"), vec![".if (~a)"]);
        assert_eq!(tag_bodies("{% endif %}"), vec!["./if"]);
        assert_eq!(tag_bodies("{%  $name  %}"), vec!["name"]);
        assert_eq!(tag_bodies("{%/loop%}"), vec!["./loop"]);
    }

    #[test]
    fn test_spaced_form_fallbacks() {
        for source in ["{% %}", "{%%}", "{% if (x) }", "{%   "] {
            assert_eq!(rebuilt(source), source);
            assert!(tag_bodies(source).is_empty(), "{}", source);
        }
    }

    #[test]
    fn test_spaced_form_bare_brace_is_text() {
        let nodes = scan("{% if (x) } {~a} {%/if%}");
        assert_eq!(
            nodes,
            vec![
                TemplateNode::literal("{% if (x) } "),
                TemplateNode::Tag(Tag::new("{~a}", "a")),
                TemplateNode::literal(" "),
                TemplateNode::Tag(Tag::new("{%/if%}", "./if")),
            ]
        );
    }

    #[test]
    fn test_spaced_literal_opener() {
        let nodes = scan("{% literal %}{~a}{^}");
        assert!(matches!(
            &nodes[0],
            TemplateNode::Literal { escape: Some(_), .. }
        ));
    }

    #[test]
    fn test_unterminated_tag_is_text_and_scanning_resumes() {
        let nodes = scan("{~a {~b}");
        assert_eq!(
            nodes,
            vec![TemplateNode::Tag(Tag::new("{~a {~b}", "a {~b"))]
        );
        let nodes = scan("x {~open and then {^done");
        assert_eq!(nodes, vec![TemplateNode::literal("x {~open and then {^done")]);
    }

    #[test]
    fn test_openers_without_closers_are_text() {
        for source in ["{~{^{$a", "_[x _[y", "{_[a {_[b"] {
            assert_eq!(scan(source), vec![TemplateNode::literal(source)], "{}", source);
        }
        assert_eq!(tag_bodies("{~a {~b} {~c"), vec!["a {~b"]);
    }

    #[test]
    fn test_long_run_of_unterminated_openers_is_linear() {
        for unit in ["{~", "{_[", "_[", "{% x "] {
            let source = unit.repeat(40_000);
            let started = std::time::Instant::now();
            let nodes = scan(&source);
            assert!(
                started.elapsed() < std::time::Duration::from_secs(2),
                "{:?} took {:?}",
                unit,
                started.elapsed()
            );
            assert_eq!(nodes, vec![TemplateNode::literal(source.as_str())]);
        }
    }

    #[test]
    fn test_space_slash_is_not_a_regex() {
        assert_eq!(
            tag_bodies("{^loop in ~xs as x divider=\" / \"}"),
            vec![".loop in ~xs as x divider=\" / \""]
        );
        assert_eq!(tag_bodies("{^if (~a !~ /}/)}"), vec![".if (~a !~ /}/)"]);
    }

    #[test]
    fn test_unterminated_regex_keeps_text() {
        let source = "{~x|s/a/b} then {~y}";
        assert_eq!(rebuilt(source), source);
    }

    #[test]
    fn test_round_trip_of_mixed_source() {
        let source = "a{~b}c{^if (~d)}\n{!-- c --}{_[t],~e}{^literal}{~x}{~.}_[z]{* #m *}{~p=}1{=}{*}{+(~q)#r}{/if}";
        assert_eq!(rebuilt(source), source);
    }

    #[test]
    fn test_regex_delimiter_classification() {
        assert_eq!(regex_delimiters(b"x|s"), 2);
        assert_eq!(regex_delimiters(b"x|m"), 1);
        assert_eq!(regex_delimiters(b"(~x =~ "), 1);
        assert_eq!(regex_delimiters(b"(~x !~ "), 1);
        assert_eq!(regex_delimiters(b"a divider=\" "), 0);
        assert_eq!(regex_delimiters(b"dirs"), 0);
        assert_eq!(regex_delimiters(b"."), 0);
        assert_eq!(regex_delimiters(b""), 0);
    }
}
