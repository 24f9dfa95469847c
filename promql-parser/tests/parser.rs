//! End to end parser tests: valid queries, error reporting and tree shape

use promql_parser::ast::{AggregateOp, BinaryOp, Expr, UnaryOp};
use promql_parser::{parse, ParseOutput, Severity};
use rstest::rstest;

fn render_errors(output: &ParseOutput) -> String {
    output
        .errors
        .iter()
        .map(|error| format!("{} {}: {}", error.span, error.severity, error.message))
        .collect::<Vec<_>>()
        .join("\n")
}

#[rstest]
#[case("up")]
#[case(r#"http_requests_total{job="api", method!~"GET|POST"}"#)]
#[case("rate(http_requests_total[5m])")]
#[case("sum by (job) (rate(http_requests_total[5m]))")]
#[case("sum(rate(http_requests_total[5m])) without (instance)")]
#[case("topk(5, up)")]
#[case(r#"count_values("value", up)"#)]
#[case("histogram_quantile(0.9, sum by (le) (rate(request_duration_seconds_bucket[5m])))")]
#[case("up offset 5m @ 1609746000")]
#[case("rate(up[5m] offset 1h)")]
#[case("max_over_time(rate(up[5m])[1h:5m])")]
#[case("a / on (job) group_left (instance) b")]
#[case("up > bool 1")]
#[case("1 + 2 * 3 ^ 2")]
#[case("-up")]
#[case("time() - process_start_time_seconds")]
#[case(r#"label_replace(up, "dst", "$1", "src", "(.*)")"#)]
#[case(r#"absent(nonexistent{job="x"})"#)]
#[case("foo @ start()")]
#[case(r#"{__name__="up"}"#)]
#[case("round(up)")]
#[case("day_of_week()")]
#[case("vector(1) and on () up")]
#[case("# leading comment\nup")]
#[case("job:http_requests:rate5m > 0.5")]
#[case("SUM(up) BY (job)")]
fn valid_queries_have_no_errors(#[case] source: &str) {
    let output = parse(source);
    assert!(
        output.errors.is_empty(),
        "{source:?} reported:\n{}",
        render_errors(&output)
    );
}

#[rstest]
#[case("rate(up)", "expected type range vector in call to function \"rate\", got instant vector")]
#[case("foo{", "unexpected end of input inside braces")]
#[case("sum(", "unclosed left parenthesis")]
#[case("(up", "unclosed left parenthesis")]
#[case("{}", "vector selector must contain at least one non-empty matcher")]
#[case(r#"{job=~".*"}"#, "vector selector must contain at least one non-empty matcher")]
#[case(r#"foo{job=~"("}"#, "invalid regular expression in label matcher")]
#[case("unknown_fn(up)", "unknown function with name \"unknown_fn\"")]
#[case("1 > 2", "comparisons between scalars must use BOOL modifier")]
#[case("1 and up", "set operator \"and\" not allowed in binary scalar expression")]
#[case("up[5m] + 1", "binary expression must contain only scalar and instant vector types")]
#[case("rate(up[5m])[5m]", "ranges only allowed for vector selectors")]
#[case("histogram_quantile(0.9)", "expected 2 argument(s) in call to \"histogram_quantile\", got 1")]
#[case("topk(up)", "wrong number of arguments for aggregate expression provided, expected 2, got 1")]
#[case("foo @ 1 @ 2", "@ <timestamp> may not be set multiple times")]
#[case("1 offset 5m", "offset modifier must be preceded by an instant vector selector")]
#[case("foo[5]", "missing unit character in duration")]
#[case("foo[5m", "unclosed left bracket")]
#[case("sum + 1", "in aggregation, expected \"(\"")]
#[case("-\"a\"", "unary expression only allowed on expressions of type scalar or instant vector")]
#[case("up )", "unexpected \")\"")]
#[case("\"abc", "unterminated quoted string")]
#[case("up + ", "unexpected end of input")]
#[case("up == bool", "unexpected end of input")]
#[case("a + bool b", "bool modifier can only be used on comparison operators")]
#[case("up $", "unexpected character \"$\"")]
#[case("metric{job=\"a\"} offset 5m offset 1h", "offset may not be set multiple times")]
#[case("up[5m][10m:1m]", "subquery is only allowed on instant vector, got range vector")]
#[case("up offset", "unexpected end of input in offset")]
#[case("up offset -", "unexpected end of input in offset")]
#[case("rate(x[5m]) offset", "unexpected end of input in offset")]
#[case("x[5m:1m] offset", "unexpected end of input in offset")]
#[case("up offset 5m offset", "unexpected end of input in offset")]
fn invalid_queries_report_errors(#[case] source: &str, #[case] expected: &str) {
    let output = parse(source);
    assert!(
        output
            .errors
            .iter()
            .any(|error| error.is_error() && error.message.contains(expected)),
        "{source:?} did not report {expected:?}, got:\n{}",
        render_errors(&output)
    );
}

#[test]
fn unclosed_call_reports_exactly_one_error() {
    let output = parse("rate(http_requests_total[5m]");
    insta::assert_snapshot!(render_errors(&output), @"4..28 error: unclosed left parenthesis");
    assert!(matches!(output.expr, Expr::Call(ref call) if !call.closed && call.args.len() == 1));
}

#[test]
fn unclosed_selector_keeps_partial_matchers() {
    let output = parse(r#"up{job="api", inst"#);
    let Expr::VectorSelector(selector) = &output.expr else {
        panic!("expected selector, got {:?}", output.expr);
    };
    let matchers = selector.matchers.as_ref().expect("matchers parsed");
    assert!(!matchers.closed);
    assert_eq!(matchers.matchers.len(), 2);
    assert_eq!(matchers.matchers[1].name.name, "inst");
    assert_eq!(matchers.matchers[1].op, None);
}

#[rstest]
#[case("foo offset -5m", "negative offset")]
#[case("sum by (job, job) (up)", "label \"job\" is listed more than once")]
#[case("a + on (job, job) b", "label \"job\" is listed more than once")]
fn suspicious_constructs_are_warnings(#[case] source: &str, #[case] expected: &str) {
    let output = parse(source);
    assert_eq!(output.errors.len(), 1, "{}", render_errors(&output));
    assert_eq!(output.errors[0].severity, Severity::Warning);
    assert!(output.errors[0].message.contains(expected));
    assert!(!output.has_errors());
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    let output = parse("1 + 2 * 3");
    let Expr::Binary(add) = &output.expr else {
        panic!("expected binary expression");
    };
    assert_eq!(add.op, BinaryOp::Add);
    assert!(matches!(add.rhs.as_ref(), Expr::Binary(mul) if mul.op == BinaryOp::Mul));
}

#[test]
fn power_is_right_associative() {
    let output = parse("2 ^ 3 ^ 2");
    let Expr::Binary(outer) = &output.expr else {
        panic!("expected binary expression");
    };
    assert_eq!(outer.op, BinaryOp::Pow);
    assert!(matches!(outer.lhs.as_ref(), Expr::Number(_)));
    assert!(matches!(outer.rhs.as_ref(), Expr::Binary(inner) if inner.op == BinaryOp::Pow));
}

#[test]
fn unary_minus_applies_after_power() {
    let output = parse("-2 ^ 2");
    let Expr::Unary(unary) = &output.expr else {
        panic!("expected unary expression");
    };
    assert_eq!(unary.op, UnaryOp::Neg);
    assert!(matches!(unary.expr.as_ref(), Expr::Binary(pow) if pow.op == BinaryOp::Pow));
}

#[test]
fn and_binds_tighter_than_or() {
    let output = parse("a or b and c");
    let Expr::Binary(or) = &output.expr else {
        panic!("expected binary expression");
    };
    assert_eq!(or.op, BinaryOp::Or);
    assert!(matches!(or.rhs.as_ref(), Expr::Binary(and) if and.op == BinaryOp::And));
}

#[test]
fn grouping_may_follow_aggregation_arguments() {
    let output = parse("sum(up) by (job, instance)");
    let Expr::Aggregate(aggregate) = &output.expr else {
        panic!("expected aggregation");
    };
    assert_eq!(aggregate.op, AggregateOp::Sum);
    let grouping = aggregate.grouping.as_ref().expect("grouping parsed");
    assert!(!grouping.without);
    let labels: Vec<_> = grouping.labels.labels.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(labels, vec!["job", "instance"]);
    assert_eq!(aggregate.span.end, 26);
}

#[test]
fn parameterised_aggregation_splits_arguments() {
    let output = parse("topk(5, rate(up[5m]))");
    let Expr::Aggregate(aggregate) = &output.expr else {
        panic!("expected aggregation");
    };
    assert!(matches!(aggregate.param.as_deref(), Some(Expr::Number(n)) if n.value == 5.0));
    assert!(matches!(aggregate.expr.as_ref(), Expr::Call(_)));
}

#[test]
fn errors_are_sorted_and_unique_per_offset() {
    let output = parse("rate(up) + foo{ )");
    let starts: Vec<_> = output.errors.iter().map(|error| error.span.start).collect();
    let mut sorted = starts.clone();
    sorted.sort_unstable();
    assert_eq!(starts, sorted);
}
