//! Semantic checks on a parsed tree
//!
//! Type rules for operators, function arguments and aggregations, plus label matcher
//! validation. Subtrees whose type is unknown (because they failed to parse) are not checked,
//! and argument counts are not checked for calls still missing their closing parenthesis.

use crate::ast::*;
use crate::error::ParseError;
use crate::functions;
use crate::span::Span;
use regex::Regex;
use std::collections::HashSet;

pub fn check(expr: &Expr) -> Vec<ParseError> {
    let mut checker = Checker::default();
    checker.expr(expr);
    checker.errors
}

#[derive(Default)]
struct Checker {
    errors: Vec<ParseError>,
}

impl Checker {
    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.errors.push(ParseError::error(span, message));
    }

    fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.errors.push(ParseError::warning(span, message));
    }

    fn expect_type(&mut self, expr: &Expr, expected: ValueType, context: &str) {
        let actual = expr.value_type();
        if actual != ValueType::Unknown && actual != expected {
            self.error(
                expr.span(),
                format!("expected type {} in {}, got {}", expected, context, actual),
            );
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(_) | Expr::String(_) | Expr::Invalid(_) => {}
            Expr::VectorSelector(selector) => self.vector_selector(selector),
            Expr::MatrixSelector(matrix) => {
                self.expr(&matrix.selector);
                match matrix.selector.as_ref() {
                    Expr::VectorSelector(selector) => {
                        if selector.modifiers.offset.is_some() || selector.modifiers.at.is_some() {
                            self.error(
                                matrix.brackets,
                                "no offset or @ modifiers allowed before range",
                            );
                        }
                    }
                    Expr::Invalid(_) => {}
                    other => self.error(
                        other.span().to(matrix.brackets),
                        "ranges only allowed for vector selectors",
                    ),
                }
                self.modifiers(&matrix.modifiers);
            }
            Expr::Subquery(subquery) => {
                self.expr(&subquery.expr);
                let actual = subquery.expr.value_type();
                if actual != ValueType::Vector && actual != ValueType::Unknown {
                    self.error(
                        subquery.span,
                        format!("subquery is only allowed on instant vector, got {}", actual),
                    );
                }
                self.modifiers(&subquery.modifiers);
            }
            Expr::Call(call) => self.call(call),
            Expr::Aggregate(aggregate) => self.aggregate(aggregate),
            Expr::Binary(binary) => self.binary(binary),
            Expr::Unary(unary) => {
                self.expr(&unary.expr);
                let actual = unary.expr.value_type();
                if !matches!(
                    actual,
                    ValueType::Scalar | ValueType::Vector | ValueType::Unknown
                ) {
                    self.error(
                        unary.span,
                        format!(
                            "unary expression only allowed on expressions of type scalar or instant vector, got {}",
                            actual
                        ),
                    );
                }
            }
            Expr::Paren(paren) => self.expr(&paren.expr),
        }
    }

    fn modifiers(&mut self, modifiers: &Modifiers) {
        if let Some(offset) = &modifiers.offset {
            if offset.negative {
                self.warning(
                    offset.span,
                    "negative offset looks into the future relative to the evaluation time",
                );
            }
        }
    }

    fn vector_selector(&mut self, selector: &VectorSelector) {
        self.modifiers(&selector.modifiers);
        let Some(matchers) = &selector.matchers else {
            return;
        };

        for matcher in &matchers.matchers {
            let (Some(op), Some(value)) = (matcher.op, &matcher.value) else {
                continue;
            };
            if op.is_regex() {
                if let Err(err) = anchored_regex(&value.value) {
                    self.error(
                        value.span,
                        format!("invalid regular expression in label matcher: {}", err),
                    );
                }
            }
            if matcher.name.name == "__name__" {
                if let Some(name) = &selector.name {
                    self.error(
                        matcher.span,
                        format!(
                            "metric name must not be set twice: {:?} or {:?}",
                            name.name, value.value
                        ),
                    );
                }
            }
        }

        if !matchers.closed || selector.name.is_some() {
            return;
        }
        let has_non_empty = matchers.matchers.iter().any(|matcher| {
            match (matcher.op, &matcher.value) {
                (Some(op), Some(value)) => !matches_empty(op, &value.value),
                _ => true,
            }
        });
        if !has_non_empty {
            self.error(
                selector.span,
                "vector selector must contain at least one non-empty matcher",
            );
        }
    }

    fn call(&mut self, call: &Call) {
        for arg in &call.args {
            self.expr(arg);
        }

        let Some(function) = functions::lookup(&call.func.name) else {
            self.error(
                call.func.span,
                format!("unknown function with name {:?}", call.func.name),
            );
            return;
        };

        if call.closed {
            let given = call.args.len();
            let too_few = given < function.min_args;
            let too_many = function.max_args().is_some_and(|max| given > max);
            if too_few || too_many {
                let expected = match function.max_args() {
                    Some(max) if max == function.min_args => max.to_string(),
                    Some(max) => format!("{} to {}", function.min_args, max),
                    None => format!("at least {}", function.min_args),
                };
                self.error(
                    call.args_span,
                    format!(
                        "expected {} argument(s) in call to {:?}, got {}",
                        expected, function.name, given
                    ),
                );
            }
        }

        let context = format!("call to function {:?}", function.name);
        for (index, arg) in call.args.iter().enumerate() {
            if let Some(expected) = function.arg_type(index) {
                self.expect_type(arg, expected, &context);
            }
        }
    }

    fn aggregate(&mut self, aggregate: &AggregateExpr) {
        if let Some(param) = &aggregate.param {
            self.expr(param);
            if let Some(expected) = aggregate.op.parameter_type() {
                self.expect_type(param, expected, "aggregation parameter");
            }
        }
        self.expr(&aggregate.expr);
        self.expect_type(&aggregate.expr, ValueType::Vector, "aggregation expression");

        if let Some(grouping) = &aggregate.grouping {
            self.duplicate_labels(&grouping.labels);
        }
    }

    fn duplicate_labels(&mut self, list: &LabelList) {
        let mut seen = HashSet::new();
        for label in &list.labels {
            if !seen.insert(label.name.as_str()) {
                self.warning(
                    label.span,
                    format!("label {:?} is listed more than once", label.name),
                );
            }
        }
    }

    fn binary(&mut self, binary: &BinaryExpr) {
        self.expr(&binary.lhs);
        self.expr(&binary.rhs);

        let lhs = binary.lhs.value_type();
        let rhs = binary.rhs.value_type();
        if lhs == ValueType::Unknown || rhs == ValueType::Unknown {
            return;
        }

        for (side, ty) in [(&binary.lhs, lhs), (&binary.rhs, rhs)] {
            if !matches!(ty, ValueType::Scalar | ValueType::Vector) {
                self.error(
                    side.span(),
                    format!(
                        "binary expression must contain only scalar and instant vector types, got {}",
                        ty
                    ),
                );
                return;
            }
        }

        let both_scalar = lhs == ValueType::Scalar && rhs == ValueType::Scalar;
        if binary.op.is_set_operator() && (lhs == ValueType::Scalar || rhs == ValueType::Scalar) {
            self.error(
                binary.op_span,
                format!(
                    "set operator {:?} not allowed in binary scalar expression",
                    binary.op.as_str()
                ),
            );
        }
        if binary.op.is_comparison() && both_scalar && !binary.return_bool {
            self.error(
                binary.op_span,
                "comparisons between scalars must use BOOL modifier",
            );
        }
        if let Some(matching) = &binary.matching {
            if lhs != ValueType::Vector || rhs != ValueType::Vector {
                self.error(
                    matching.keyword_span,
                    "vector matching only allowed between instant vectors",
                );
            }
            if binary.op.is_set_operator() && matching.group.is_some() {
                self.error(
                    matching.keyword_span,
                    format!(
                        "no grouping allowed for {:?} operation",
                        binary.op.as_str()
                    ),
                );
            }
            self.duplicate_labels(&matching.labels);
        }
    }
}

fn anchored_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

/// Whether a matcher also selects series that lack the label.
fn matches_empty(op: MatchOp, value: &str) -> bool {
    match op {
        MatchOp::Equal => value.is_empty(),
        MatchOp::NotEqual => !value.is_empty(),
        MatchOp::RegexMatch => anchored_regex(value).is_ok_and(|re| re.is_match("")),
        MatchOp::RegexNoMatch => anchored_regex(value).is_ok_and(|re| !re.is_match("")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_matchers() {
        assert!(matches_empty(MatchOp::Equal, ""));
        assert!(!matches_empty(MatchOp::Equal, "api"));
        assert!(matches_empty(MatchOp::RegexMatch, ".*"));
        assert!(!matches_empty(MatchOp::RegexMatch, ".+"));
        assert!(matches_empty(MatchOp::NotEqual, "api"));
        assert!(!matches_empty(MatchOp::RegexNoMatch, ".*"));
    }
}
