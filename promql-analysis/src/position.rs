//! Conversion between protocol positions and byte offsets
//!
//! The protocol addresses text by line and UTF-16 code unit; the parser works in UTF-8 byte
//! offsets. A [`PositionMapper`] is built once per text snapshot and converts in both
//! directions. Lines are split on `\n` only, so a `\r` before it counts as line content.

use crate::error::{Location, PositionError};
use lsp_types::{Position, Range};
use promql_parser::Span;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PositionMapper {
    text: Arc<str>,
    /// Byte offsets where each line starts
    line_starts: Vec<usize>,
}

impl PositionMapper {
    pub fn new(text: Arc<str>) -> Self {
        let mut line_starts = vec![0];
        for (offset, byte) in text.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(offset + 1);
            }
        }
        Self { text, line_starts }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Line content without its terminating `\n`.
    fn line(&self, line: usize) -> Option<(usize, &str)> {
        let start = *self.line_starts.get(line)?;
        let end = self
            .line_starts
            .get(line + 1)
            .map_or(self.text.len(), |next| next - 1);
        Some((start, &self.text[start..end]))
    }

    pub fn to_offset(&self, position: Position) -> Result<usize, PositionError> {
        let out_of_range = || PositionError::OutOfRange(Location::Position(position));
        let (start, line) = self.line(position.line as usize).ok_or_else(out_of_range)?;

        let target = position.character as usize;
        let mut units = 0usize;
        for (index, ch) in line.char_indices() {
            if units == target {
                return Ok(start + index);
            }
            units += ch.len_utf16();
            if units > target {
                // Points between the halves of a surrogate pair.
                return Err(out_of_range());
            }
        }
        if units == target {
            Ok(start + line.len())
        } else {
            Err(out_of_range())
        }
    }

    pub fn to_position(&self, offset: usize) -> Result<Position, PositionError> {
        if offset > self.text.len() || !self.text.is_char_boundary(offset) {
            return Err(PositionError::OutOfRange(Location::Offset(offset)));
        }
        let line = self.line_starts.partition_point(|&start| start <= offset) - 1;
        let start = self.line_starts[line];
        let character = self.text[start..offset].encode_utf16().count();
        Ok(Position::new(line as u32, character as u32))
    }

    pub fn span_to_range(&self, span: Span) -> Result<Range, PositionError> {
        Ok(Range::new(
            self.to_position(span.start)?,
            self.to_position(span.end)?,
        ))
    }

    pub fn range_to_span(&self, range: Range) -> Result<Span, PositionError> {
        let start = self.to_offset(range.start)?;
        let end = self.to_offset(range.end)?;
        if end < start {
            return Err(PositionError::OutOfRange(Location::Position(range.end)));
        }
        Ok(Span::new(start, end))
    }

    /// Like [`PositionMapper::span_to_range`], but clamps the span into the text and widens it
    /// to character boundaries instead of failing.
    pub fn lossy_range(&self, span: Span) -> Range {
        let len = self.text.len();
        let mut start = span.start.min(len);
        let mut end = span.end.clamp(start, len);
        while !self.text.is_char_boundary(start) {
            start -= 1;
        }
        while !self.text.is_char_boundary(end) {
            end += 1;
        }
        match self.span_to_range(Span::new(start, end)) {
            Ok(range) => range,
            Err(_) => Range::new(self.end_position(), self.end_position()),
        }
    }

    /// Position just past the last character.
    pub fn end_position(&self) -> Position {
        let line = self.line_starts.len() - 1;
        let start = self.line_starts[line];
        let character = self.text[start..].encode_utf16().count();
        Position::new(line as u32, character as u32)
    }
}
