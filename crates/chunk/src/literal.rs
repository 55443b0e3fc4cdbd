// Copyright 2019-2026 Maravilla Labs, operated by SOLUTAS GmbH, Switzerland
// SPDX-License-Identifier: Apache-2.0
// SPDX-License-Identifier: MIT

//! Literal-escape sub-scanner.
//!
//! Once `{^literal}` (or `{.literal}`, or the older `{^^}`) has been seen,
//! nothing is interpreted until one of the closing markers shows up. Tags,
//! comments, regex delimiters and backslashes are all inert in between.

/// Accepted closing markers. The earliest occurrence in the remaining text wins.
pub(crate) const LITERAL_END_MARKERS: [&str; 4] = ["{^}", "{~.}", "{/literal}", "{^/literal}"];

/// Finds the end of a literal-escape section.
///
/// Returns the byte offset of the closing marker within `text` and the
/// marker itself, or `None` when the section runs to the end of input.
pub(crate) fn find_literal_end(text: &str) -> Option<(usize, &'static str)> {
    LITERAL_END_MARKERS
        .iter()
        .filter_map(|marker| text.find(marker).map(|at| (at, *marker)))
        .min_by_key(|(at, _)| *at)
}
