//! Lexer producing spanned lexemes
//!
//! Wraps the logos token stream: comments are dropped, characters logos cannot match become
//! errors, and spans are rebased onto the document the query was taken from.

use crate::error::{Cancelled, ParseError};
use crate::span::Span;
use crate::token::Token;
use logos::Logos;

/// A token together with its text and document span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lexeme<'a> {
    pub token: Token,
    pub text: &'a str,
    pub span: Span,
}

pub struct Lexed<'a> {
    pub lexemes: Vec<Lexeme<'a>>,
    pub errors: Vec<ParseError>,
}

/// How many tokens to lex between two cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 64;

pub fn tokenize(source: &str) -> Lexed<'_> {
    match tokenize_at(source, 0, &|| false) {
        Ok(lexed) => lexed,
        Err(Cancelled) => Lexed {
            lexemes: Vec::new(),
            errors: Vec::new(),
        },
    }
}

/// Lex `source`, which starts at byte `base` of the enclosing document.
pub fn tokenize_at<'a>(
    source: &'a str,
    base: usize,
    is_cancelled: &dyn Fn() -> bool,
) -> Result<Lexed<'a>, Cancelled> {
    let mut lexemes = Vec::new();
    let mut errors: Vec<ParseError> = Vec::new();
    let mut lexer = Token::lexer(source);

    let mut count = 0usize;
    while let Some(result) = lexer.next() {
        count += 1;
        if count % CANCEL_CHECK_INTERVAL == 0 && is_cancelled() {
            return Err(Cancelled);
        }

        let span = Span::from(lexer.span()).shift(base);
        match result {
            Ok(Token::Comment) => {}
            Ok(token) => lexemes.push(Lexeme {
                token,
                text: lexer.slice(),
                span,
            }),
            Err(()) => {
                // Adjacent bad characters collapse into a single error.
                match errors.last_mut() {
                    Some(last) if last.span.end == span.start => {
                        last.span = last.span.to(span);
                    }
                    _ => errors.push(ParseError::error(
                        span,
                        format!("unexpected character {:?}", lexer.slice()),
                    )),
                }
            }
        }
    }

    Ok(Lexed { lexemes, errors })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_are_rebased() {
        let lexed = tokenize_at("up == 1", 10, &|| false).expect("not cancelled");
        let spans: Vec<_> = lexed.lexemes.iter().map(|lexeme| lexeme.span).collect();
        assert_eq!(
            spans,
            vec![Span::new(10, 12), Span::new(13, 15), Span::new(16, 17)]
        );
        assert!(lexed.errors.is_empty());
    }

    #[test]
    fn comments_are_dropped() {
        let lexed = tokenize("up # trailing comment");
        assert_eq!(lexed.lexemes.len(), 1);
        assert_eq!(lexed.lexemes[0].text, "up");
    }

    #[test]
    fn unknown_characters_become_errors() {
        let lexed = tokenize("up $$ 1");
        assert_eq!(lexed.lexemes.len(), 2);
        assert_eq!(lexed.errors.len(), 1);
        assert_eq!(lexed.errors[0].span, Span::new(3, 5));
    }

    #[test]
    fn cancellation_stops_lexing() {
        let source = "a + ".repeat(200);
        let result = tokenize_at(&source, 0, &|| true);
        assert_eq!(result.err(), Some(Cancelled));
    }
}
