//! Property-based tests for the error tolerant parser
//!
//! Whatever the input, the parser must return a tree whose spans stay inside the text, report
//! at most one error per start offset, and rebase cleanly when the query sits inside a larger
//! document.

use promql_parser::{parse, parse_at, path_at, Node};
use proptest::prelude::*;

/// Fragments that combine into plausible, often broken, queries.
fn fragment_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("rate(".to_string()),
        Just("sum by (job) (".to_string()),
        Just("http_requests_total".to_string()),
        Just("{job=\"api\"".to_string()),
        Just("{".to_string()),
        Just("}".to_string()),
        Just("(".to_string()),
        Just(")".to_string()),
        Just("[5m".to_string()),
        Just("]".to_string()),
        Just("[1h:5m]".to_string()),
        Just(" offset 5m".to_string()),
        Just(" @ 100".to_string()),
        Just(" + ".to_string()),
        Just(" and on (instance) ".to_string()),
        Just(",".to_string()),
        Just("\"unterminated".to_string()),
        Just("=~".to_string()),
        "[a-z_]{1,8}",
        "[0-9]{1,3}(\\.[0-9])?",
    ]
}

fn query_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(fragment_strategy(), 0..12).prop_map(|parts| parts.concat())
}

fn all_nodes<'a>(node: Node<'a>, out: &mut Vec<Node<'a>>) {
    out.push(node);
    for child in node.children() {
        all_nodes(child, out);
    }
}

proptest! {
    #[test]
    fn spans_stay_inside_text(source in query_strategy()) {
        let output = parse(&source);
        let mut nodes = Vec::new();
        all_nodes(Node::Expr(&output.expr), &mut nodes);
        for node in nodes {
            let span = node.span();
            prop_assert!(span.start <= span.end);
            prop_assert!(span.end <= source.len(), "{:?} outside {:?}", span, source);
        }
        for error in &output.errors {
            prop_assert!(error.span.end <= source.len());
        }
    }

    #[test]
    fn arbitrary_ascii_never_panics(source in "[ -~]{0,60}") {
        let output = parse(&source);
        prop_assert!(output.expr.span().end <= source.len());
    }

    #[test]
    fn parse_at_shifts_every_span(source in query_strategy(), base in 0usize..500) {
        let plain = parse(&source);
        let shifted = parse_at(&source, base, &|| false).expect("never cancelled");
        prop_assert_eq!(plain.errors.len(), shifted.errors.len());
        for (a, b) in plain.errors.iter().zip(&shifted.errors) {
            prop_assert_eq!(a.span.shift(base), b.span);
            prop_assert_eq!(&a.message, &b.message);
        }
        prop_assert_eq!(plain.expr.span().shift(base), shifted.expr.span());
    }

    #[test]
    fn path_nodes_nest(source in query_strategy(), offset in 0usize..80) {
        let output = parse(&source);
        let path = path_at(&output.expr, offset);
        for pair in path.windows(2) {
            let (outer, inner) = (pair[0].span(), pair[1].span());
            prop_assert!(outer.start <= inner.start && inner.end <= outer.end);
        }
    }
}
