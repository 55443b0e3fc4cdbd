// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Smart trim: keep block control tags from leaving blank lines behind.
//!
//! ```text
//! before            rendered (a true)
//! ---------------   -----------------
//! {^if (~a)}
//!   BODY              BODY
//! {/if}
//! next              next
//! ```
//!
//! Trimmed whitespace is never thrown away. It is moved into
//! [`TemplateNode::Elided`] nodes, which render as nothing but still count
//! for source reconstruction and are turned back into text when templates
//! are consolidated.
//!
//! The trim runs once per block, right after the grouper builds it:
//!
//! 1. **Before block start**: the body must begin with optional blanks and a
//!    line break, and the opener must sit at the start of its line (comments
//!    are skipped; the start of the template counts as a line start). The
//!    indentation before the opener and the body's first line break are
//!    elided. If this fails nothing else happens for the block.
//! 2. **Branch lines**: `{^else}`, `{^elseIf}`, `{^onEmpty}`, `{^divider}`
//!    alone on a line inside the body lose that line.
//! 3. **After block end**: when the closer sits at the start of its line and
//!    the text after it begins with optional blanks and a line break, the
//!    closer's indentation and that line break are elided. The end of the
//!    template does not count as a line break here.

use crate::ast::{Block, Tag, TemplateNode};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::VecDeque;

lazy_static! {
    static ref LEADING_BREAK: Regex = Regex::new(r"^[ \t]*\r?\n").unwrap();
    static ref TRAILING_INDENT: Regex = Regex::new(r"\n([ \t]*)$").unwrap();
    static ref TRIM_OFF: Regex = Regex::new(r#"\btrim\s*=\s*["']false["']"#).unwrap();
}

/// Whitespace to elide so that a tag sits alone on its line.
#[derive(Debug, Default, PartialEq, Eq)]
struct LineStart {
    /// Literal whose trailing indentation (`len` bytes) must go.
    indent: Option<(usize, usize)>,
    /// Blank literals (spaces and tabs only) between that line break and the tag.
    blanks: Vec<usize>,
}

/// Whether the opener switches smart trim off with `trim="false"`.
pub(crate) fn disabled_by(open: &Tag) -> bool {
    TRIM_OFF.is_match(&open.body)
}

/// Applies smart trim to a freshly grouped block.
///
/// `preceding` holds the already grouped siblings before the block and
/// `following` the not yet grouped siblings after it. `at_template_start`
/// says whether `preceding` starts at the very beginning of the template.
pub(crate) fn smart_trim(
    block: &mut Block,
    preceding: &mut Vec<TemplateNode>,
    following: &mut VecDeque<TemplateNode>,
    at_template_start: bool,
) {
    if !trim_before_block_start(block, preceding, at_template_start) {
        tracing::trace!("no smart trim for {:?}: opener shares its line", block.open.raw_text);
        return;
    }
    trim_branch_lines(block);
    if !trim_after_block_end(block, following) {
        tracing::trace!("closer {:?} shares its line", block.close.raw_text);
    }
}

fn trim_before_block_start(
    block: &mut Block,
    preceding: &mut Vec<TemplateNode>,
    at_template_start: bool,
) -> bool {
    let Some(first) = block
        .body
        .iter()
        .position(|node| !matches!(node, TemplateNode::Comment { .. }))
    else {
        return false;
    };
    let Some(break_len) = leading_break_len(&block.body[first]) else {
        return false;
    };
    let Some(line_start) = find_line_start(preceding, at_template_start) else {
        return false;
    };

    elide_line_start(preceding, line_start);
    split_front(&mut block.body, first, break_len);
    true
}

fn trim_branch_lines(block: &mut Block) {
    let keywords = block.kind.branch_keywords();
    if keywords.is_empty() {
        return;
    }

    let mut i = 0;
    while i < block.body.len() {
        let is_branch = block.body[i]
            .as_tag()
            .and_then(Tag::command)
            .map_or(false, |keyword| keywords.contains(&keyword));
        if is_branch {
            let break_len = block.body.get(i + 1).and_then(leading_break_len);
            if let Some(break_len) = break_len {
                if let Some(line_start) = find_line_start(&block.body[..i], false) {
                    split_front(&mut block.body, i + 1, break_len);
                    i += elide_line_start(&mut block.body, line_start);
                }
            }
        }
        i += 1;
    }
}

fn trim_after_block_end(block: &mut Block, following: &mut VecDeque<TemplateNode>) -> bool {
    let Some(break_len) = following.front().and_then(leading_break_len) else {
        return false;
    };
    let Some(line_start) = find_line_start(&block.body, false) else {
        return false;
    };

    elide_line_start(&mut block.body, line_start);
    if let Some(TemplateNode::Literal { mut text, .. }) = following.pop_front() {
        let rest = text.split_off(break_len);
        if !rest.is_empty() {
            following.push_front(TemplateNode::literal(rest));
        }
        following.push_front(TemplateNode::elided(text));
    }
    true
}

/// Length of the `[ \t]*\r?\n` prefix of a plain literal.
fn leading_break_len(node: &TemplateNode) -> Option<usize> {
    node.plain_text()
        .and_then(|text| LEADING_BREAK.find(text))
        .map(|m| m.end())
}

/// Walks backward from the end of `nodes` to decide whether the position
/// right after them is the start of a line.
fn find_line_start(nodes: &[TemplateNode], at_template_start: bool) -> Option<LineStart> {
    let mut blanks = Vec::new();
    for (idx, node) in nodes.iter().enumerate().rev() {
        match node {
            TemplateNode::Comment { .. } => continue,
            TemplateNode::Elided { text } => {
                if text.ends_with('\n') {
                    return Some(LineStart { indent: None, blanks });
                }
            }
            TemplateNode::Literal { text, escape: None } => {
                if let Some(caps) = TRAILING_INDENT.captures(text) {
                    let len = caps[1].len();
                    let indent = (len > 0).then_some((idx, len));
                    return Some(LineStart { indent, blanks });
                }
                if text.bytes().all(|b| b == b' ' || b == b'\t') {
                    blanks.push(idx);
                    continue;
                }
                return None;
            }
            _ => return None,
        }
    }
    at_template_start.then_some(LineStart { indent: None, blanks })
}

/// Elides the whitespace described by `line_start`.
///
/// Returns the number of nodes inserted into `nodes`.
fn elide_line_start(nodes: &mut Vec<TemplateNode>, line_start: LineStart) -> usize {
    for idx in line_start.blanks {
        if let TemplateNode::Literal { text, .. } = &mut nodes[idx] {
            let text = std::mem::take(text);
            nodes[idx] = TemplateNode::elided(text);
        }
    }
    match line_start.indent {
        Some((idx, len)) => split_back(nodes, idx, len),
        None => 0,
    }
}

/// Moves the first `len` bytes of the literal at `idx` into an elided node.
fn split_front(nodes: &mut Vec<TemplateNode>, idx: usize, len: usize) {
    if let TemplateNode::Literal { text, escape: None } = &mut nodes[idx] {
        let rest = text.split_off(len);
        let head = std::mem::replace(text, rest);
        let rest_empty = text.is_empty();
        if rest_empty {
            nodes[idx] = TemplateNode::elided(head);
        } else {
            nodes.insert(idx, TemplateNode::elided(head));
        }
    }
}

/// Moves the last `len` bytes of the literal at `idx` into an elided node.
///
/// Returns the number of nodes inserted.
fn split_back(nodes: &mut Vec<TemplateNode>, idx: usize, len: usize) -> usize {
    if let TemplateNode::Literal { text, escape: None } = &mut nodes[idx] {
        let at = text.len() - len;
        let tail = text.split_off(at);
        nodes.insert(idx + 1, TemplateNode::elided(tail));
        1
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BlockKind;

    fn block(open: &str, body: Vec<TemplateNode>) -> Block {
        let body_text = open.trim_start_matches('{').trim_start_matches('^');
        Block {
            open: Tag::new(open, format!(".{}", body_text.trim_end_matches('}'))),
            body,
            close: Tag::new("{/if}", "./if"),
            kind: BlockKind::Conditional,
        }
    }

    fn rendered(nodes: &[TemplateNode]) -> String {
        nodes
            .iter()
            .filter_map(|node| node.plain_text())
            .collect()
    }

    #[test]
    fn test_trim_at_template_start() {
        let mut b = block("{^if (~a)}", vec![TemplateNode::literal("\nBODY\n")]);
        let mut before = Vec::new();
        let mut after: VecDeque<_> = vec![TemplateNode::literal("\nnext")].into();
        smart_trim(&mut b, &mut before, &mut after, true);

        assert_eq!(
            b.body,
            vec![TemplateNode::elided("\n"), TemplateNode::literal("BODY\n")]
        );
        assert_eq!(after[0], TemplateNode::elided("\n"));
        assert_eq!(after[1], TemplateNode::literal("next"));
    }

    #[test]
    fn test_indentation_before_opener_is_elided() {
        let mut b = block("{^if (~a)}", vec![TemplateNode::literal("\n  x\n  ")]);
        let mut before = vec![TemplateNode::literal("start\n  ")];
        let mut after: VecDeque<_> = vec![TemplateNode::literal("\n")].into();
        smart_trim(&mut b, &mut before, &mut after, true);

        assert_eq!(
            before,
            vec![TemplateNode::literal("start\n"), TemplateNode::elided("  ")]
        );
        assert_eq!(rendered(&b.body), "  x\n");
        assert_eq!(after, VecDeque::from(vec![TemplateNode::elided("\n")]));
    }

    #[test]
    fn test_opener_sharing_its_line_skips_both_trims() {
        let mut b = block("{^if (~a)}", vec![TemplateNode::literal("\nx\n")]);
        let mut before = vec![TemplateNode::literal("text ")];
        let mut after: VecDeque<_> = vec![TemplateNode::literal("\n")].into();
        smart_trim(&mut b, &mut before, &mut after, true);

        assert_eq!(before, vec![TemplateNode::literal("text ")]);
        assert_eq!(b.body, vec![TemplateNode::literal("\nx\n")]);
        assert_eq!(after, VecDeque::from(vec![TemplateNode::literal("\n")]));
    }

    #[test]
    fn test_inline_body_is_not_trimmed() {
        let mut b = block("{^if (~a)}", vec![TemplateNode::literal("x")]);
        let mut before = Vec::new();
        let mut after: VecDeque<_> = vec![TemplateNode::literal("\n")].into();
        smart_trim(&mut b, &mut before, &mut after, true);
        assert_eq!(b.body, vec![TemplateNode::literal("x")]);
        assert_eq!(after, VecDeque::from(vec![TemplateNode::literal("\n")]));
    }

    #[test]
    fn test_comments_and_blanks_are_skipped_backward() {
        let mut b = block("{^if (~a)}", vec![TemplateNode::literal("\nx\n")]);
        let mut before = vec![
            TemplateNode::literal("a\n"),
            TemplateNode::Comment {
                raw_text: "{!-- c --}".to_string(),
            },
            TemplateNode::literal("  "),
        ];
        let mut after = VecDeque::new();
        smart_trim(&mut b, &mut before, &mut after, false);
        assert_eq!(before[2], TemplateNode::elided("  "));
        assert_eq!(before[0], TemplateNode::literal("a\n"));
    }

    #[test]
    fn test_nested_body_start_is_not_a_line_start() {
        let mut b = block("{^if (~a)}", vec![TemplateNode::literal("\nx\n")]);
        let mut before = Vec::new();
        let mut after = VecDeque::new();
        smart_trim(&mut b, &mut before, &mut after, false);
        assert_eq!(b.body, vec![TemplateNode::literal("\nx\n")]);
    }

    #[test]
    fn test_end_of_template_is_not_a_line_break() {
        let mut b = block("{^if (~a)}", vec![TemplateNode::literal("\nx\n  ")]);
        let mut before = Vec::new();
        let mut after = VecDeque::new();
        smart_trim(&mut b, &mut before, &mut after, true);
        assert_eq!(rendered(&b.body), "x\n  ");
    }

    #[test]
    fn test_closer_sharing_its_line_keeps_following_break() {
        let mut b = block("{^if (~a)}", vec![TemplateNode::literal("\nx")]);
        let mut before = Vec::new();
        let mut after: VecDeque<_> = vec![TemplateNode::literal("\nnext")].into();
        smart_trim(&mut b, &mut before, &mut after, true);
        assert_eq!(after, VecDeque::from(vec![TemplateNode::literal("\nnext")]));
    }

    #[test]
    fn test_else_line_is_trimmed() {
        let mut b = block(
            "{^if (~a)}",
            vec![
                TemplateNode::literal("\nyes\n"),
                TemplateNode::Tag(Tag::new("{^else}", ".else")),
                TemplateNode::literal("\nno\n"),
            ],
        );
        let mut before = Vec::new();
        let mut after: VecDeque<_> = vec![TemplateNode::literal("\n")].into();
        smart_trim(&mut b, &mut before, &mut after, true);
        assert_eq!(
            b.body,
            vec![
                TemplateNode::elided("\n"),
                TemplateNode::literal("yes\n"),
                TemplateNode::Tag(Tag::new("{^else}", ".else")),
                TemplateNode::elided("\n"),
                TemplateNode::literal("no\n"),
            ]
        );
    }

    #[test]
    fn test_trim_off_option() {
        assert!(disabled_by(&Tag::new("", ".loop in ~x as y trim=\"false\"")));
        assert!(disabled_by(&Tag::new("", ".if (~a) trim='false'")));
        assert!(!disabled_by(&Tag::new("", ".loop in ~x as y")));
    }
}
