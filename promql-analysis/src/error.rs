use lsp_types::Position;
use std::fmt;
use thiserror::Error;

pub use promql_parser::Cancelled;

/// A protocol position or byte offset that does not exist in the current text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("{0} is out of range")]
    OutOfRange(Location),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Position(Position),
    Offset(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Position(position) => {
                write!(f, "position {}:{}", position.line, position.character)
            }
            Location::Offset(offset) => write!(f, "offset {}", offset),
        }
    }
}
