//! PromQL parsing
//!
//! An error tolerant lexer, parser and checker for the Prometheus query language. The parser
//! always produces a tree, even for incomplete input, so editor tooling can offer completion and
//! hover while the user is typing.
//!
//! ```text
//! source ─► lexer (logos) ─► parser (Pratt) ─► checker ─► ParseOutput { expr, errors }
//! ```
//!
//! Queries embedded in a larger document are parsed with [`parse_at`], which rebases every span
//! onto the document and polls a cancellation callback while it works.

pub mod ast;
pub mod check;
pub mod duration;
pub mod error;
pub mod functions;
pub mod lexer;
pub mod node;
mod parser;
pub mod span;
pub mod token;

pub use ast::{Expr, ValueType};
pub use error::{Cancelled, ParseError, Severity};
pub use node::{path_at, Node, NodeKind};
pub use span::Span;

/// A parsed query: the tree plus every syntax and semantic issue found, in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOutput {
    pub expr: Expr,
    pub errors: Vec<ParseError>,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        self.errors.iter().any(ParseError::is_error)
    }
}

pub fn parse(source: &str) -> ParseOutput {
    match parse_at(source, 0, &|| false) {
        Ok(output) => output,
        Err(Cancelled) => ParseOutput {
            expr: Expr::Invalid(Span::empty(0)),
            errors: Vec::new(),
        },
    }
}

/// Parse `source`, which starts at byte `base` of its document.
///
/// Blank input (only whitespace or comments) parses to an empty [`Expr::Invalid`] without
/// errors. `is_cancelled` is polled periodically; once it returns true, parsing stops with
/// [`Cancelled`].
pub fn parse_at(
    source: &str,
    base: usize,
    is_cancelled: &dyn Fn() -> bool,
) -> Result<ParseOutput, Cancelled> {
    let end = base + source.len();
    let lexed = lexer::tokenize_at(source, base, is_cancelled)?;
    let mut errors = lexed.errors;

    if lexed.lexemes.is_empty() {
        let start = base + (source.len() - source.trim_start().len());
        return Ok(ParseOutput {
            expr: Expr::Invalid(Span::empty(start.min(end))),
            errors,
        });
    }

    let (expr, parse_errors) = parser::Parser::new(lexed.lexemes, end, is_cancelled).parse()?;
    errors.extend(parse_errors);
    if is_cancelled() {
        return Err(Cancelled);
    }
    errors.extend(check::check(&expr));
    errors.sort_by_key(|error| (error.span.start, error.severity));

    Ok(ParseOutput { expr, errors })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_input_has_no_errors() {
        let output = parse("   # just a comment\n");
        assert!(matches!(output.expr, Expr::Invalid(_)));
        assert!(output.errors.is_empty());
    }

    #[test]
    fn parse_at_rebases_spans() {
        let output = parse_at("rate(up[5m]", 20, &|| false).expect("not cancelled");
        assert_eq!(output.expr.span(), Span::new(20, 31));
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].span, Span::new(24, 31));
    }

    #[test]
    fn cancelled_parse_returns_error() {
        let source = "up + ".repeat(100) + "up";
        assert_eq!(parse_at(&source, 0, &|| true), Err(Cancelled));
    }
}
