//! Token definitions for PromQL
//!
//! The tokens are defined using the logos derive macro. Keywords (`by`, `offset`, `sum`, ...)
//! are lexed as [`Token::Identifier`] and recognised by the parser, since PromQL allows most of
//! them as label names.

use logos::Logos;
use std::fmt;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
pub enum Token {
    #[regex(r"#[^\n]*")]
    Comment,

    #[token("(")]
    LeftParen,
    #[token(")")]
    RightParen,
    #[token("{")]
    LeftBrace,
    #[token("}")]
    RightBrace,
    #[token("[")]
    LeftBracket,
    #[token("]")]
    RightBracket,
    #[token(",")]
    Comma,
    #[token(":")]
    Colon,
    #[token("@")]
    At,

    #[token("=")]
    Assign,
    #[token("==")]
    Eql,
    #[token("!=")]
    Neq,
    #[token("=~")]
    EqlRegex,
    #[token("!~")]
    NeqRegex,
    #[token("<")]
    Lss,
    #[token("<=")]
    Lte,
    #[token(">")]
    Gtr,
    #[token(">=")]
    Gte,

    #[token("+")]
    Add,
    #[token("-")]
    Sub,
    #[token("*")]
    Mul,
    #[token("/")]
    Div,
    #[token("%")]
    Mod,
    #[token("^")]
    Pow,

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_:]*")]
    Identifier,

    #[regex(r"([0-9]+(ms|[smhdwy]))+")]
    Duration,

    #[regex(r"[0-9]+(\.[0-9]*)?([eE][+-]?[0-9]+)?")]
    #[regex(r"\.[0-9]+([eE][+-]?[0-9]+)?")]
    #[regex(r"0[xX][0-9a-fA-F]+")]
    Number,

    #[regex(r#""([^"\\]|\\.)*""#)]
    #[regex(r#"'([^'\\]|\\.)*'"#)]
    #[regex(r"`[^`]*`")]
    String,

    #[regex(r#""([^"\\\n]|\\.)*"#)]
    #[regex(r#"'([^'\\\n]|\\.)*"#)]
    #[regex(r"`[^`]*")]
    UnterminatedString,
}

impl Token {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Token::Eql | Token::Neq | Token::Lss | Token::Lte | Token::Gtr | Token::Gte
        )
    }

    /// Tokens that close a group; the parser never consumes them while recovering.
    pub fn is_closing(&self) -> bool {
        matches!(
            self,
            Token::RightParen | Token::RightBrace | Token::RightBracket
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Comment => "comment",
            Token::LeftParen => "\"(\"",
            Token::RightParen => "\")\"",
            Token::LeftBrace => "\"{\"",
            Token::RightBrace => "\"}\"",
            Token::LeftBracket => "\"[\"",
            Token::RightBracket => "\"]\"",
            Token::Comma => "\",\"",
            Token::Colon => "\":\"",
            Token::At => "\"@\"",
            Token::Assign => "\"=\"",
            Token::Eql => "\"==\"",
            Token::Neq => "\"!=\"",
            Token::EqlRegex => "\"=~\"",
            Token::NeqRegex => "\"!~\"",
            Token::Lss => "\"<\"",
            Token::Lte => "\"<=\"",
            Token::Gtr => "\">\"",
            Token::Gte => "\">=\"",
            Token::Add => "\"+\"",
            Token::Sub => "\"-\"",
            Token::Mul => "\"*\"",
            Token::Div => "\"/\"",
            Token::Mod => "\"%\"",
            Token::Pow => "\"^\"",
            Token::Identifier => "identifier",
            Token::Duration => "duration",
            Token::Number => "number",
            Token::String => "string",
            Token::UnterminatedString => "unterminated string",
        };
        f.write_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        Token::lexer(source)
            .map(|token| token.expect("valid token"))
            .collect()
    }

    #[test]
    fn selector_tokens() {
        assert_eq!(
            kinds(r#"http_requests_total{job="api"}"#),
            vec![
                Token::Identifier,
                Token::LeftBrace,
                Token::Identifier,
                Token::Assign,
                Token::String,
                Token::RightBrace,
            ]
        );
    }

    #[test]
    fn durations_win_over_numbers() {
        assert_eq!(kinds("5m"), vec![Token::Duration]);
        assert_eq!(kinds("1h30m"), vec![Token::Duration]);
        assert_eq!(kinds("100ms"), vec![Token::Duration]);
        assert_eq!(kinds("5"), vec![Token::Number]);
        assert_eq!(kinds("1.5e3"), vec![Token::Number]);
        assert_eq!(kinds("0x1f"), vec![Token::Number]);
    }

    #[test]
    fn subquery_range_and_step() {
        assert_eq!(
            kinds("[5m:1m]"),
            vec![
                Token::LeftBracket,
                Token::Duration,
                Token::Colon,
                Token::Duration,
                Token::RightBracket,
            ]
        );
    }

    #[test]
    fn recording_rule_names_keep_colons() {
        let mut lexer = Token::lexer("job:http_requests:rate5m");
        assert_eq!(lexer.next(), Some(Ok(Token::Identifier)));
        assert_eq!(lexer.slice(), "job:http_requests:rate5m");
        assert_eq!(lexer.next(), None);
    }

    #[test]
    fn operators_prefer_longest_match() {
        assert_eq!(
            kinds("== != =~ !~ <= >= < > ="),
            vec![
                Token::Eql,
                Token::Neq,
                Token::EqlRegex,
                Token::NeqRegex,
                Token::Lte,
                Token::Gte,
                Token::Lss,
                Token::Gtr,
                Token::Assign,
            ]
        );
    }

    #[test]
    fn unterminated_strings_are_distinct() {
        assert_eq!(kinds(r#""abc""#), vec![Token::String]);
        assert_eq!(kinds(r#""abc"#), vec![Token::UnterminatedString]);
        assert_eq!(kinds("`raw"), vec![Token::UnterminatedString]);
    }

    #[test]
    fn comments_run_to_end_of_line() {
        assert_eq!(
            kinds("up # the up metric\n+ 1"),
            vec![Token::Identifier, Token::Comment, Token::Add, Token::Number]
        );
    }
}
