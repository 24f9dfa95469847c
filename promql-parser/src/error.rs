//! Errors produced while lexing, parsing and checking a query

use crate::span::Span;
use std::fmt;
use thiserror::Error;

/// How bad a reported issue is.
///
/// Syntax and type errors are [`Severity::Error`]. Constructs the parser accepts but that are
/// likely mistakes (a negative `offset`, a label listed twice in `by (...)`) are
/// [`Severity::Warning`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at {span}")]
pub struct ParseError {
    pub span: Span,
    pub message: String,
    pub severity: Severity,
}

impl ParseError {
    pub fn error(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Parsing was abandoned because the caller asked for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("parsing was cancelled")]
pub struct Cancelled;
