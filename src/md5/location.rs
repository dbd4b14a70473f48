//! Position tracking for syntax errors
//!
//! The parser runs over a `char` stream, so every span it reports is a range of
//! **char offsets** into the source, not byte offsets. [`SourceLocation`] pre-computes
//! the char offset at which each line starts and converts offsets to zero-based
//! line/column pairs with a binary search:
//!
//! ```text
//! Source: "MD5Version 10\ncommandline"
//!          0123456789012 3
//!                        ↓
//! line_starts = [0, 14]
//! offset_to_position(16) → Position { line: 1, column: 2 }
//! ```

use serde::Serialize;
use std::fmt;
use std::ops::Range;

/// A zero-based line and column (in chars) within a source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line + 1, self.column + 1)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// Represents a location in source text (start and end positions)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub start: Position,
    pub end: Position,
}

impl Location {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Converts char offsets into line/column positions
pub struct SourceLocation {
    /// Char offsets where each line starts
    line_starts: Vec<usize>,
}

impl SourceLocation {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];

        for (offset, ch) in source.chars().enumerate() {
            if ch == '\n' {
                line_starts.push(offset + 1);
            }
        }

        Self { line_starts }
    }

    /// Convert a char offset to a line/column position
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let line = self
            .line_starts
            .binary_search(&offset)
            .unwrap_or_else(|i| i - 1);

        Position::new(line, offset - self.line_starts[line])
    }

    pub fn range_to_location(&self, range: &Range<usize>) -> Location {
        Location::new(
            self.offset_to_position(range.start),
            self.offset_to_position(range.end),
        )
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
