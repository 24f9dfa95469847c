//! Byte spans over query text
//!
//! Every AST node and every error carries a [`Span`] measured in UTF-8 bytes. When a query is
//! parsed as a region of a larger document the spans are rebased at parse time, so a span
//! always indexes the full document text, never the region alone.
//!
//! Containment is half-open: a span `[start, end)` contains `start` but not `end`. Tooling that
//! wants "the token just typed" asks again at `offset - 1`.

use std::fmt;
use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end, "span start {start} after end {end}");
        Self { start, end }
    }

    /// Zero-width span at `offset`.
    pub fn empty(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Half-open containment check.
    pub fn contains(&self, offset: usize) -> bool {
        self.start <= offset && offset < self.end
    }

    /// Inclusive containment, used where the end of a node is a valid cursor position.
    pub fn touches(&self, offset: usize) -> bool {
        self.start <= offset && offset <= self.end
    }

    /// Smallest span covering both `self` and `other`.
    pub fn to(self, other: Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn shift(self, base: usize) -> Span {
        Span::new(self.start + base, self.end + base)
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

impl From<Range<usize>> for Span {
    fn from(range: Range<usize>) -> Self {
        Span::new(range.start, range.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_half_open() {
        let span = Span::new(2, 5);
        assert!(!span.contains(1));
        assert!(span.contains(2));
        assert!(span.contains(4));
        assert!(!span.contains(5));
        assert!(span.touches(5));
    }

    #[test]
    fn empty_span_contains_nothing() {
        let span = Span::empty(3);
        assert!(span.is_empty());
        assert!(!span.contains(3));
        assert!(span.touches(3));
    }

    #[test]
    fn join_and_shift() {
        let joined = Span::new(4, 6).to(Span::new(1, 3));
        assert_eq!(joined, Span::new(1, 6));
        assert_eq!(joined.shift(10), Span::new(11, 16));
        assert_eq!(format!("{}", joined), "1..6");
    }
}
