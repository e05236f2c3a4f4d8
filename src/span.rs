//! Source positions attached to tokens, AST nodes, and diagnostics.

use std::fmt;

/// A region of source text.
///
/// `start`/`end` are byte offsets into the whole source; `line` and
/// `column` are 1-based and point at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// Span covering both `self` and `other`, positioned at `self`.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            line: self.line,
            column: self.column,
        }
    }

    /// Width in bytes, never less than one so a marker is always visible.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start).max(1)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
