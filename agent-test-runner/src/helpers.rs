// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! General support code for agent-test-runner.

use std::cmp::Ordering;

/// Utilities for pluralizing various words based on count.
pub(crate) mod plural {
    /// Returns "test case" if `count` is 1, otherwise "test cases".
    pub(crate) fn test_cases_str(count: usize) -> &'static str {
        if count == 1 { "test case" } else { "test cases" }
    }

    /// Returns "definition" if `count` is 1, otherwise "definitions".
    pub(crate) fn definitions_str(count: usize) -> &'static str {
        if count == 1 {
            "definition"
        } else {
            "definitions"
        }
    }

    /// Returns "error" if `count` is 1, otherwise "errors".
    pub(crate) fn errors_str(count: usize) -> &'static str {
        if count == 1 { "error" } else { "errors" }
    }
}

/// Compares two display names the way an editor's locale-aware sort would.
///
/// Names are ordered case-insensitively first. Names that only differ by case put lowercase
/// letters first, so "alpha" < "Alpha" < "beta".
pub(crate) fn locale_cmp(a: &str, b: &str) -> Ordering {
    let folded_a = a.chars().flat_map(char::to_lowercase);
    let folded_b = b.chars().flat_map(char::to_lowercase);
    folded_a.cmp(folded_b).then_with(|| b.cmp(a))
}

/// Maps byte offsets to zero-based line numbers, for offsets that only move forward.
///
/// Each call scans only the bytes since the previous offset.
#[derive(Debug)]
pub(crate) struct LineCounter<'a> {
    contents: &'a str,
    offset: usize,
    line: usize,
}

impl<'a> LineCounter<'a> {
    pub(crate) fn new(contents: &'a str) -> Self {
        Self {
            contents,
            offset: 0,
            line: 0,
        }
    }

    /// Returns the line that `pos` falls on. An offset behind the previous one returns the
    /// previous line.
    pub(crate) fn line_at(&mut self, pos: usize) -> usize {
        let pos = pos.min(self.contents.len());
        if pos > self.offset {
            self.line += self.contents.as_bytes()[self.offset..pos]
                .iter()
                .filter(|&&b| b == b'\n')
                .count();
            self.offset = pos;
        }
        self.line
    }
}
