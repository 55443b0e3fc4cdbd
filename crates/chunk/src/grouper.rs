// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Block grouping over a flat node sequence.
//!
//! Openers (`.if`, `.loop`, `.exec`, `.loc`) are matched with the nearest
//! closer of the same family, counting nested openers of that family on the
//! way. The matched span is grouped recursively and wrapped into one
//! [`Block`]; smart trim runs on the new block before it is placed.
//!
//! An opener without a closer stays where it is and gets an
//! [`TemplateNode::Error`] marker right after it; grouping then carries on
//! with the next node. Openers deeper than [`ParseOptions::max_depth`] are
//! handled the same way, so hostile nesting cannot exhaust the stack.

use crate::ast::{Block, BlockFault, BlockKind, Tag, TemplateNode};
use crate::config::ParseOptions;
use crate::trim;
use std::collections::VecDeque;

/// Groups blocks in a flat node sequence.
pub(crate) fn group(nodes: Vec<TemplateNode>, options: &ParseOptions) -> Vec<TemplateNode> {
    Grouper { options }.group_level(nodes, 0, 0)
}

struct Grouper<'o> {
    options: &'o ParseOptions,
}

impl Grouper<'_> {
    /// Groups one nesting level. `offset` is the source offset of `nodes[0]`.
    fn group_level(&self, nodes: Vec<TemplateNode>, depth: usize, mut offset: usize) -> Vec<TemplateNode> {
        let mut pending: VecDeque<TemplateNode> = nodes.into();
        let mut out = Vec::with_capacity(pending.len());

        while let Some(node) = pending.pop_front() {
            let kind = node.as_tag().and_then(Tag::opens_block);
            let (open, kind) = match (node, kind) {
                (TemplateNode::Tag(open), Some(kind)) => (open, kind),
                (node, _) => {
                    offset += node.source_len();
                    out.push(node);
                    continue;
                }
            };

            let open_offset = offset;
            offset += open.raw_text.len();

            if depth >= self.options.max_depth {
                tracing::debug!(
                    "{} block at byte {} exceeds nesting limit {}",
                    kind.keyword(),
                    open_offset,
                    self.options.max_depth
                );
                out.push(TemplateNode::Tag(open));
                out.push(TemplateNode::block_error(
                    BlockFault::TooDeep,
                    kind.keyword(),
                    open_offset,
                    self.options.max_depth,
                ));
                continue;
            }

            let Some(at) = find_closer(&pending, kind) else {
                tracing::debug!(
                    "{} block at byte {} has no matching end marker",
                    kind.keyword(),
                    open_offset
                );
                out.push(TemplateNode::Tag(open));
                out.push(TemplateNode::block_error(
                    BlockFault::Unmatched,
                    kind.keyword(),
                    open_offset,
                    self.options.max_depth,
                ));
                continue;
            };

            let mut span: Vec<TemplateNode> = pending.drain(..=at).collect();
            let Some(TemplateNode::Tag(close)) = span.pop() else {
                continue;
            };
            let body_len: usize = span.iter().map(TemplateNode::source_len).sum();
            let body = self.group_level(span, depth + 1, offset);
            offset += body_len + close.raw_text.len();

            let mut block = Block {
                open,
                body,
                close,
                kind,
            };
            if self.options.smart_trim && kind.smart_trims() && !trim::disabled_by(&block.open) {
                trim::smart_trim(&mut block, &mut out, &mut pending, depth == 0);
            }
            out.push(TemplateNode::Block(block));
        }

        out
    }
}

/// Index in `pending` of the closer matching an opener of `kind`.
fn find_closer(pending: &VecDeque<TemplateNode>, kind: BlockKind) -> Option<usize> {
    let mut nested = 0usize;
    for (i, node) in pending.iter().enumerate() {
        let Some(tag) = node.as_tag() else {
            continue;
        };
        if tag.opens_block() == Some(kind) {
            nested += 1;
        } else if tag.closes_block() == Some(kind) {
            if nested == 0 {
                return Some(i);
            }
            nested -= 1;
        }
    }
    None
}
