//! Error tolerant PromQL parser
//!
//! A hand written Pratt parser over the lexeme stream. It never gives up: a construct that
//! cannot be parsed is reported, replaced by [`Expr::Invalid`] or left unclosed, and parsing
//! continues so that tooling always receives a tree.
//!
//! Recovery rules:
//! - an unclosed group (`(`, `{`, `[`) produces one error spanning from the opening token to
//!   the end of the input, and nothing else is reported for that group;
//! - at most one error is recorded per start offset;
//! - closing tokens are never skipped while recovering inside a group, so the enclosing group
//!   can still match them.

use crate::ast::*;
use crate::duration::parse_duration;
use crate::error::{Cancelled, ParseError};
use crate::lexer::Lexeme;
use crate::span::Span;
use crate::token::Token;

/// Operand precedence of unary `+` / `-`: only `^` binds tighter.
const UNARY_OPERAND_PRECEDENCE: u8 = 6;

/// How many tokens to consume between two cancellation checks.
const CANCEL_CHECK_INTERVAL: usize = 64;

pub(crate) struct Parser<'a, 'c> {
    lexemes: Vec<Lexeme<'a>>,
    pos: usize,
    end: usize,
    errors: Vec<ParseError>,
    is_cancelled: &'c dyn Fn() -> bool,
    consumed: usize,
    cancelled: bool,
}

impl<'a, 'c> Parser<'a, 'c> {
    /// `end` is the document offset just past the parsed text.
    pub(crate) fn new(
        lexemes: Vec<Lexeme<'a>>,
        end: usize,
        is_cancelled: &'c dyn Fn() -> bool,
    ) -> Self {
        Self {
            lexemes,
            pos: 0,
            end,
            errors: Vec::new(),
            is_cancelled,
            consumed: 0,
            cancelled: false,
        }
    }

    /// Parse the whole input as one expression.
    pub(crate) fn parse(mut self) -> Result<(Expr, Vec<ParseError>), Cancelled> {
        let expr = self.parse_expr(0);
        if let Some(lexeme) = self.peek() {
            let message = if lexeme.token.is_closing() {
                format!("unexpected {}", lexeme.token)
            } else {
                format!("unexpected {} after expression", lexeme.token)
            };
            self.error(lexeme.span, message);
            while self.bump().is_some() {}
        }
        if self.cancelled {
            return Err(Cancelled);
        }
        Ok((expr, self.errors))
    }

    fn peek(&self) -> Option<Lexeme<'a>> {
        if self.cancelled {
            return None;
        }
        self.lexemes.get(self.pos).copied()
    }

    fn peek_token(&self) -> Option<Token> {
        self.peek().map(|lexeme| lexeme.token)
    }

    fn peek_nth_token(&self, n: usize) -> Option<Token> {
        if self.cancelled {
            return None;
        }
        self.lexemes.get(self.pos + n).map(|lexeme| lexeme.token)
    }

    fn at(&self, token: Token) -> bool {
        self.peek_token() == Some(token)
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(
            self.peek(),
            Some(Lexeme { token: Token::Identifier, text, .. }) if text.eq_ignore_ascii_case(keyword)
        )
    }

    fn bump(&mut self) -> Option<Lexeme<'a>> {
        let lexeme = self.peek()?;
        self.pos += 1;
        self.consumed += 1;
        if self.consumed % CANCEL_CHECK_INTERVAL == 0 && (self.is_cancelled)() {
            // Once set, `peek` reports end of input and every rule unwinds.
            self.cancelled = true;
        }
        Some(lexeme)
    }

    fn eat(&mut self, token: Token) -> Option<Lexeme<'a>> {
        if self.at(token) {
            self.bump()
        } else {
            None
        }
    }

    /// Record an error unless one is already recorded at the same offset.
    fn error(&mut self, span: Span, message: impl Into<String>) {
        if self.errors.iter().any(|error| error.span.start == span.start) {
            return;
        }
        self.errors.push(ParseError::error(span, message));
    }

    fn unexpected(&mut self, context: &str) {
        match self.peek() {
            Some(lexeme) => {
                let message = format!("unexpected {} in {}", lexeme.token, context);
                self.error(lexeme.span, message);
            }
            None => self.error(
                Span::empty(self.end),
                format!("unexpected end of input in {}", context),
            ),
        }
    }

    fn unclosed(&mut self, open: Span, what: &str) {
        self.error(Span::new(open.start, self.end), format!("unclosed {}", what));
    }

    // ---- expressions ----

    fn parse_expr(&mut self, min_precedence: u8) -> Expr {
        let mut lhs = self.parse_unary();
        while let Some((op, op_span)) = self.peek_binary_op() {
            let precedence = op.precedence();
            if precedence < min_precedence {
                break;
            }
            self.bump();

            let mut return_bool = false;
            if self.at_keyword("bool") {
                let keyword = self.bump();
                return_bool = true;
                if !op.is_comparison() {
                    if let Some(keyword) = keyword {
                        self.error(
                            keyword.span,
                            "bool modifier can only be used on comparison operators",
                        );
                    }
                }
            }
            let matching = self.parse_vector_matching();

            let next_min = if op.is_right_associative() {
                precedence
            } else {
                precedence + 1
            };
            let rhs = self.parse_expr(next_min);
            let span = lhs.span().to(rhs.span()).to(op_span);
            lhs = Expr::Binary(BinaryExpr {
                op,
                op_span,
                return_bool,
                matching,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            });
        }
        lhs
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, Span)> {
        let lexeme = self.peek()?;
        let op = match lexeme.token {
            Token::Add => BinaryOp::Add,
            Token::Sub => BinaryOp::Sub,
            Token::Mul => BinaryOp::Mul,
            Token::Div => BinaryOp::Div,
            Token::Mod => BinaryOp::Mod,
            Token::Pow => BinaryOp::Pow,
            Token::Eql => BinaryOp::Eql,
            Token::Neq => BinaryOp::Neq,
            Token::Gtr => BinaryOp::Gtr,
            Token::Lss => BinaryOp::Lss,
            Token::Gte => BinaryOp::Gte,
            Token::Lte => BinaryOp::Lte,
            Token::Identifier => match lexeme.text.to_ascii_lowercase().as_str() {
                "and" => BinaryOp::And,
                "or" => BinaryOp::Or,
                "unless" => BinaryOp::Unless,
                "atan2" => BinaryOp::Atan2,
                _ => return None,
            },
            _ => return None,
        };
        Some((op, lexeme.span))
    }

    fn parse_vector_matching(&mut self) -> Option<VectorMatching> {
        let on = if self.at_keyword("on") {
            true
        } else if self.at_keyword("ignoring") {
            false
        } else {
            return None;
        };
        let keyword = self.bump()?;
        let labels = self.parse_label_list(keyword.span);

        let group = if self.at_keyword("group_left") || self.at_keyword("group_right") {
            let keyword = self.bump()?;
            let side = if keyword.text.eq_ignore_ascii_case("group_left") {
                GroupSide::Left
            } else {
                GroupSide::Right
            };
            let labels = if self.at(Token::LeftParen) {
                Some(self.parse_label_list(keyword.span))
            } else {
                None
            };
            Some(GroupModifier {
                side,
                keyword_span: keyword.span,
                labels,
            })
        } else {
            None
        };

        Some(VectorMatching {
            on,
            keyword_span: keyword.span,
            labels,
            group,
        })
    }

    fn parse_unary(&mut self) -> Expr {
        let op = match self.peek_token() {
            Some(Token::Sub) => UnaryOp::Neg,
            Some(Token::Add) => UnaryOp::Pos,
            _ => return self.parse_postfix(),
        };
        let Some(op_lexeme) = self.bump() else {
            return Expr::Invalid(Span::empty(self.end));
        };
        let operand = self.parse_expr(UNARY_OPERAND_PRECEDENCE);
        let span = op_lexeme.span.to(operand.span());
        Expr::Unary(UnaryExpr {
            op,
            expr: Box::new(operand),
            span,
        })
    }

    /// A primary expression followed by any range, subquery, `offset` and `@` suffixes.
    fn parse_postfix(&mut self) -> Expr {
        let mut expr = self.parse_primary();
        loop {
            if self.at(Token::LeftBracket) {
                expr = self.parse_range_suffix(expr);
            } else if self.at_keyword("offset") {
                self.parse_offset(&mut expr);
            } else if self.at(Token::At) {
                self.parse_at(&mut expr);
            } else {
                return expr;
            }
        }
    }

    fn parse_primary(&mut self) -> Expr {
        let Some(lexeme) = self.peek() else {
            self.error(Span::empty(self.end), "unexpected end of input");
            return Expr::Invalid(Span::empty(self.end));
        };

        match lexeme.token {
            Token::Number => {
                self.bump();
                self.number_literal(lexeme)
            }
            Token::String | Token::UnterminatedString => {
                self.bump();
                Expr::String(self.string_literal(lexeme))
            }
            Token::LeftParen => self.parse_paren(),
            Token::LeftBrace => self.parse_vector_selector(None),
            Token::Identifier => self.parse_identifier_expr(lexeme),
            Token::Duration => {
                self.bump();
                self.error(lexeme.span, "unexpected duration, expected an expression");
                Expr::Invalid(lexeme.span)
            }
            token if token.is_closing() => {
                self.error(lexeme.span, format!("unexpected {}", token));
                Expr::Invalid(Span::empty(lexeme.span.start))
            }
            token => {
                self.bump();
                self.error(
                    lexeme.span,
                    format!("unexpected {}, expected an expression", token),
                );
                Expr::Invalid(lexeme.span)
            }
        }
    }

    fn parse_identifier_expr(&mut self, lexeme: Lexeme<'a>) -> Expr {
        let lower = lexeme.text.to_ascii_lowercase();
        let next = self.peek_nth_token(1);

        if let Some(op) = AggregateOp::from_name(&lower) {
            let follows_aggregation = next == Some(Token::LeftParen)
                || self.nth_is_keyword(1, "by")
                || self.nth_is_keyword(1, "without");
            if follows_aggregation {
                return self.parse_aggregate(op, lexeme);
            }
            let message = match next {
                Some(token) => format!("unexpected {} in aggregation, expected \"(\"", token),
                None => format!("unexpected end of input in aggregation \"{}\"", lower),
            };
            self.error(lexeme.span, message);
        }

        match lower.as_str() {
            "inf" | "nan" if next != Some(Token::LeftParen) && next != Some(Token::LeftBrace) => {
                self.bump();
                let value = if lower == "inf" { f64::INFINITY } else { f64::NAN };
                return Expr::Number(NumberLiteral {
                    value,
                    span: lexeme.span,
                });
            }
            "by" | "without" | "on" | "ignoring" | "group_left" | "group_right" | "bool"
            | "offset" | "and" | "or" | "unless" | "atan2" => {
                self.bump();
                self.error(
                    lexeme.span,
                    format!("unexpected keyword \"{}\", expected an expression", lower),
                );
                return Expr::Invalid(lexeme.span);
            }
            _ => {}
        }

        if next == Some(Token::LeftParen) {
            return self.parse_call(lexeme);
        }

        self.bump();
        let name = Ident {
            name: lexeme.text.to_string(),
            span: lexeme.span,
        };
        if self.at(Token::LeftBrace) {
            self.parse_vector_selector(Some(name))
        } else {
            Expr::VectorSelector(VectorSelector {
                span: name.span,
                name: Some(name),
                matchers: None,
                modifiers: Modifiers::default(),
            })
        }
    }

    fn nth_is_keyword(&self, n: usize, keyword: &str) -> bool {
        if self.cancelled {
            return false;
        }
        matches!(
            self.lexemes.get(self.pos + n),
            Some(Lexeme { token: Token::Identifier, text, .. }) if text.eq_ignore_ascii_case(keyword)
        )
    }

    fn number_literal(&mut self, lexeme: Lexeme<'a>) -> Expr {
        let text = lexeme.text;
        let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            i64::from_str_radix(hex, 16).map(|value| value as f64).ok()
        } else {
            text.parse::<f64>().ok()
        };
        match value {
            Some(value) => Expr::Number(NumberLiteral {
                value,
                span: lexeme.span,
            }),
            None => {
                self.error(lexeme.span, format!("invalid number {:?}", text));
                Expr::Invalid(lexeme.span)
            }
        }
    }

    fn string_literal(&mut self, lexeme: Lexeme<'a>) -> StringLiteral {
        let terminated = lexeme.token == Token::String;
        if !terminated {
            self.error(lexeme.span, "unterminated quoted string");
        }
        StringLiteral {
            value: unquote(lexeme.text, terminated),
            span: lexeme.span,
            terminated,
        }
    }

    fn parse_paren(&mut self) -> Expr {
        let Some(open) = self.bump() else {
            return Expr::Invalid(Span::empty(self.end));
        };
        let inner = self.parse_expr(0);
        match self.eat(Token::RightParen) {
            Some(close) => Expr::Paren(ParenExpr {
                expr: Box::new(inner),
                span: open.span.to(close.span),
                closed: true,
            }),
            None => {
                if self.peek().is_none() {
                    self.unclosed(open.span, "left parenthesis");
                } else {
                    self.unexpected("parenthesized expression, expected \")\"");
                }
                let span = Span::new(open.span.start, inner.span().end.max(open.span.end));
                Expr::Paren(ParenExpr {
                    expr: Box::new(inner),
                    span: self.unclosed_span(span),
                    closed: false,
                })
            }
        }
    }

    /// An unclosed group at end of input extends to the end of the text.
    fn unclosed_span(&self, span: Span) -> Span {
        if self.peek().is_none() {
            Span::new(span.start, self.end.max(span.end))
        } else {
            span
        }
    }

    /// Comma separated expressions up to `)`. The opening parenthesis is the next token.
    fn parse_arguments(&mut self, context: &str) -> (Vec<Expr>, Span, bool) {
        let Some(open) = self.bump() else {
            return (Vec::new(), Span::empty(self.end), false);
        };
        let mut args = Vec::new();
        loop {
            if let Some(close) = self.eat(Token::RightParen) {
                return (args, open.span.to(close.span), true);
            }
            let Some(lexeme) = self.peek() else {
                self.unclosed(open.span, "left parenthesis");
                return (args, Span::new(open.span.start, self.end), false);
            };
            if lexeme.token.is_closing() {
                self.unexpected(context);
                let end = args.last().map_or(open.span.end, |arg: &Expr| arg.span().end);
                return (args, Span::new(open.span.start, end), false);
            }

            args.push(self.parse_expr(0));

            if self.eat(Token::Comma).is_some() {
                continue;
            }
            match self.peek_token() {
                Some(Token::RightParen) | None => {}
                Some(token) if token.is_closing() => {}
                Some(_) => {
                    self.unexpected(context);
                    self.bump();
                }
            }
        }
    }

    fn parse_call(&mut self, name: Lexeme<'a>) -> Expr {
        self.bump();
        let func = Ident {
            name: name.text.to_string(),
            span: name.span,
        };
        let (args, args_span, closed) = self.parse_arguments("function call arguments");
        let span = func.span.to(args_span);
        Expr::Call(Call {
            func,
            args,
            args_span,
            closed,
            span,
        })
    }

    fn parse_grouping(&mut self) -> Option<Grouping> {
        let without = if self.at_keyword("by") {
            false
        } else if self.at_keyword("without") {
            true
        } else {
            return None;
        };
        let keyword = self.bump()?;
        let labels = self.parse_label_list(keyword.span);
        Some(Grouping {
            without,
            keyword_span: keyword.span,
            labels,
        })
    }

    fn parse_aggregate(&mut self, op: AggregateOp, name: Lexeme<'a>) -> Expr {
        self.bump();
        let mut grouping = self.parse_grouping();

        if !self.at(Token::LeftParen) {
            self.unexpected("aggregation, expected \"(\"");
            let end = grouping.as_ref().map_or(name.span.end, |g| g.labels.span.end);
            let span = Span::new(name.span.start, end);
            return Expr::Aggregate(AggregateExpr {
                op,
                op_span: name.span,
                grouping,
                param: None,
                expr: Box::new(Expr::Invalid(Span::empty(end))),
                args_span: Span::empty(end),
                closed: false,
                span,
            });
        }

        let (mut args, args_span, closed) = self.parse_arguments("aggregation");
        if grouping.is_none() && closed {
            grouping = self.parse_grouping();
        }

        let expected = if op.parameter_type().is_some() { 2 } else { 1 };
        if closed && args.len() != expected {
            self.error(
                args_span,
                format!(
                    "wrong number of arguments for aggregate expression provided, expected {}, got {}",
                    expected,
                    args.len()
                ),
            );
        }

        let placeholder = Span::empty(if closed {
            args_span.end - 1
        } else {
            args_span.end
        });
        let (param, expr) = if expected == 2 {
            let mut drained = args.drain(..);
            let param = drained.next();
            let expr = drained.next();
            (param, expr)
        } else {
            (None, args.drain(..).next())
        };

        let mut span = name.span.to(args_span);
        if let Some(grouping) = &grouping {
            span = span.to(grouping.labels.span);
        }
        Expr::Aggregate(AggregateExpr {
            op,
            op_span: name.span,
            grouping,
            param: param.map(Box::new),
            expr: Box::new(expr.unwrap_or(Expr::Invalid(placeholder))),
            args_span,
            closed,
            span,
        })
    }

    /// `( label, label, ... )` following `keyword`.
    fn parse_label_list(&mut self, keyword: Span) -> LabelList {
        let Some(open) = self.eat(Token::LeftParen) else {
            self.unexpected("grouping, expected \"(\"");
            return LabelList {
                labels: Vec::new(),
                span: Span::empty(keyword.end),
                closed: false,
            };
        };
        let mut labels = Vec::new();
        loop {
            match self.peek() {
                None => {
                    self.unclosed(open.span, "left parenthesis");
                    return LabelList {
                        labels,
                        span: Span::new(open.span.start, self.end),
                        closed: false,
                    };
                }
                Some(lexeme) if lexeme.token == Token::RightParen => {
                    self.bump();
                    return LabelList {
                        labels,
                        span: open.span.to(lexeme.span),
                        closed: true,
                    };
                }
                Some(lexeme) if lexeme.token == Token::Identifier => {
                    self.bump();
                    labels.push(Ident {
                        name: lexeme.text.to_string(),
                        span: lexeme.span,
                    });
                    if self.eat(Token::Comma).is_none()
                        && !self.at(Token::RightParen)
                        && self.peek().is_some()
                    {
                        self.unexpected("grouping opts, expected \",\" or \")\"");
                    }
                }
                Some(lexeme) if lexeme.token.is_closing() => {
                    self.unexpected("grouping opts, expected label");
                    let end = labels.last().map_or(open.span.end, |label: &Ident| label.span.end);
                    return LabelList {
                        labels,
                        span: Span::new(open.span.start, end),
                        closed: false,
                    };
                }
                Some(_) => {
                    self.unexpected("grouping opts, expected label");
                    self.bump();
                }
            }
        }
    }

    /// A selector starting at `{`, optionally preceded by an already consumed metric name.
    fn parse_vector_selector(&mut self, name: Option<Ident>) -> Expr {
        let matchers = self.parse_label_matchers();
        let mut span = matchers.span;
        if let Some(name) = &name {
            span = name.span.to(span);
        }
        Expr::VectorSelector(VectorSelector {
            name,
            matchers: Some(matchers),
            modifiers: Modifiers::default(),
            span,
        })
    }

    fn parse_label_matchers(&mut self) -> LabelMatchers {
        let open = match self.bump() {
            Some(open) => open.span,
            None => Span::empty(self.end),
        };
        let mut matchers = Vec::new();
        loop {
            let Some(lexeme) = self.peek() else {
                self.error(
                    Span::new(open.start, self.end),
                    "unexpected end of input inside braces",
                );
                return LabelMatchers {
                    matchers,
                    span: Span::new(open.start, self.end),
                    closed: false,
                };
            };
            match lexeme.token {
                Token::RightBrace => {
                    self.bump();
                    return LabelMatchers {
                        matchers,
                        span: open.to(lexeme.span),
                        closed: true,
                    };
                }
                Token::Identifier => {
                    let matcher = self.parse_label_matcher(lexeme);
                    matchers.push(matcher);
                    if self.eat(Token::Comma).is_none() {
                        match self.peek_token() {
                            Some(Token::RightBrace) | None => {}
                            Some(token) if token.is_closing() => {}
                            Some(_) => {
                                self.unexpected("label matching, expected \",\" or \"}\"");
                                self.bump();
                            }
                        }
                    }
                }
                token if token.is_closing() => {
                    self.unexpected("label matching, expected \"}\"");
                    let end = matchers
                        .last()
                        .map_or(open.end, |matcher: &LabelMatcher| matcher.span.end);
                    return LabelMatchers {
                        matchers,
                        span: Span::new(open.start, end),
                        closed: false,
                    };
                }
                _ => {
                    self.unexpected("label matching, expected label name");
                    self.bump();
                }
            }
        }
    }

    fn parse_label_matcher(&mut self, name_lexeme: Lexeme<'a>) -> LabelMatcher {
        self.bump();
        let name = Ident {
            name: name_lexeme.text.to_string(),
            span: name_lexeme.span,
        };

        let op = match self.peek_token() {
            Some(Token::Assign) => Some(MatchOp::Equal),
            Some(Token::Neq) => Some(MatchOp::NotEqual),
            Some(Token::EqlRegex) => Some(MatchOp::RegexMatch),
            Some(Token::NeqRegex) => Some(MatchOp::RegexNoMatch),
            _ => None,
        };
        let Some(op) = op else {
            self.unexpected("label matching, expected label matching operator");
            return LabelMatcher {
                span: name.span,
                name,
                op: None,
                op_span: None,
                value: None,
            };
        };
        let op_span = self.bump().map(|lexeme| lexeme.span);

        let value = match self.peek() {
            Some(lexeme)
                if matches!(lexeme.token, Token::String | Token::UnterminatedString) =>
            {
                self.bump();
                Some(self.string_literal(lexeme))
            }
            _ => {
                self.unexpected("label matching, expected string");
                None
            }
        };

        let end = value
            .as_ref()
            .map(|value| value.span.end)
            .or(op_span.map(|span| span.end))
            .unwrap_or(name.span.end);
        LabelMatcher {
            span: Span::new(name.span.start, end),
            name,
            op: Some(op),
            op_span,
            value,
        }
    }

    fn parse_duration_literal(&mut self, context: &str) -> Option<DurationLiteral> {
        let Some(lexeme) = self.peek() else {
            self.unexpected(context);
            return None;
        };
        match lexeme.token {
            Token::Duration => {
                self.bump();
                match parse_duration(lexeme.text) {
                    Ok(value) => Some(DurationLiteral {
                        value,
                        span: lexeme.span,
                    }),
                    Err(err) => {
                        self.error(lexeme.span, err.to_string());
                        None
                    }
                }
            }
            Token::Number => {
                self.bump();
                self.error(
                    lexeme.span,
                    format!("missing unit character in duration {:?}", lexeme.text),
                );
                None
            }
            _ => {
                self.unexpected(context);
                None
            }
        }
    }

    /// `[range]` or `[range:step]` after `expr`.
    fn parse_range_suffix(&mut self, expr: Expr) -> Expr {
        let Some(open) = self.bump() else {
            return expr;
        };
        let range = self.parse_duration_literal("range, expected duration");

        let subquery = self.eat(Token::Colon).is_some();
        let step = if subquery && !self.at(Token::RightBracket) {
            self.parse_duration_literal("subquery, expected duration")
        } else {
            None
        };

        let brackets = match self.eat(Token::RightBracket) {
            Some(close) => open.span.to(close.span),
            None => {
                if self.peek().is_none() {
                    self.unclosed(open.span, "left bracket");
                    Span::new(open.span.start, self.end)
                } else {
                    self.unexpected("range, expected \"]\"");
                    let end = step
                        .as_ref()
                        .or(range.as_ref())
                        .map_or(open.span.end, |duration| duration.span.end);
                    Span::new(open.span.start, end)
                }
            }
        };
        let span = expr.span().to(brackets);

        if subquery {
            Expr::Subquery(SubqueryExpr {
                expr: Box::new(expr),
                range,
                step,
                brackets,
                modifiers: Modifiers::default(),
                span,
            })
        } else {
            Expr::MatrixSelector(MatrixSelector {
                selector: Box::new(expr),
                range,
                brackets,
                modifiers: Modifiers::default(),
                span,
            })
        }
    }

    fn parse_offset(&mut self, expr: &mut Expr) {
        let Some(keyword) = self.bump() else {
            return;
        };
        let negative = self.eat(Token::Sub).is_some();
        let Some(duration) = self.parse_duration_literal("offset, expected duration") else {
            return;
        };
        let modifier = OffsetModifier {
            duration: duration.value,
            negative,
            span: keyword.span.to(duration.span),
        };

        let span = modifier.span;
        match expr.modifiers_mut() {
            Some(modifiers) if modifiers.offset.is_some() => {
                self.error(span, "offset may not be set multiple times");
            }
            Some(modifiers) => {
                modifiers.offset = Some(modifier);
                extend_span(expr, span);
            }
            None => self.error(
                span,
                "offset modifier must be preceded by an instant vector selector or range vector selector or a subquery",
            ),
        }
    }

    fn parse_at(&mut self, expr: &mut Expr) {
        let Some(at) = self.bump() else {
            return;
        };
        let negative = self.eat(Token::Sub).is_some();
        let Some(lexeme) = self.peek() else {
            self.unexpected("@ modifier, expected timestamp");
            return;
        };

        let (value, end) = match lexeme.token {
            Token::Number => {
                self.bump();
                match lexeme.text.parse::<f64>() {
                    Ok(value) => (
                        AtValue::Timestamp(if negative { -value } else { value }),
                        lexeme.span.end,
                    ),
                    Err(_) => {
                        self.error(lexeme.span, format!("invalid timestamp {:?}", lexeme.text));
                        return;
                    }
                }
            }
            Token::Identifier
                if !negative
                    && (lexeme.text == "start" || lexeme.text == "end")
                    && self.peek_nth_token(1) == Some(Token::LeftParen) =>
            {
                self.bump();
                self.bump();
                let value = if lexeme.text == "start" {
                    AtValue::Start
                } else {
                    AtValue::End
                };
                match self.eat(Token::RightParen) {
                    Some(close) => (value, close.span.end),
                    None => {
                        self.unexpected("@ modifier, expected \")\"");
                        return;
                    }
                }
            }
            _ => {
                self.unexpected("@ modifier, expected timestamp");
                return;
            }
        };

        let span = Span::new(at.span.start, end);
        let modifier = AtModifier { value, span };
        match expr.modifiers_mut() {
            Some(modifiers) if modifiers.at.is_some() => {
                self.error(span, "@ <timestamp> may not be set multiple times");
            }
            Some(modifiers) => {
                modifiers.at = Some(modifier);
                extend_span(expr, span);
            }
            None => self.error(
                span,
                "@ modifier must be preceded by an instant vector selector or range vector selector or a subquery",
            ),
        }
    }
}

fn extend_span(expr: &mut Expr, other: Span) {
    if let Some(span) = expr.span_mut() {
        *span = span.to(other);
    }
}

/// Strip the quotes from a string token and resolve escapes. Backtick strings are raw.
pub(crate) fn unquote(text: &str, terminated: bool) -> String {
    let mut chars = text.chars();
    let Some(quote) = chars.next() else {
        return String::new();
    };
    let mut body = chars.as_str();
    if terminated {
        body = &body[..body.len().saturating_sub(quote.len_utf8())];
    }
    if quote == '`' {
        return body.to_string();
    }

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('a') => out.push('\u{7}'),
            Some('b') => out.push('\u{8}'),
            Some('f') => out.push('\u{c}'),
            Some('v') => out.push('\u{b}'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
