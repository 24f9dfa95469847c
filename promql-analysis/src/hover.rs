//! Hover descriptions for the node under the cursor

use crate::document::Document;
use crate::metadata::MetadataSnapshot;
use lsp_types::Range;
use promql_parser::ast::{Expr, MatchOp};
use promql_parser::duration::format_duration;
use promql_parser::functions;
use promql_parser::{path_at, Node, NodeKind, Span};

/// Markdown text describing a node, and the node's range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoverInfo {
    pub contents: String,
    pub range: Range,
}

pub fn hover(
    document: &Document,
    offset: usize,
    snapshot: &MetadataSnapshot,
) -> Option<HoverInfo> {
    let query = document.query_at(offset)?;
    let mut path = path_at(&query.expr, offset);
    if path.is_empty() && offset > query.span.start {
        path = path_at(&query.expr, offset - 1);
    }

    // Innermost node first; a node without a description defers to its parent.
    path.iter().rev().find_map(|node| {
        let (contents, span) = describe(*node, offset, snapshot)?;
        Some(HoverInfo {
            contents,
            range: document.mapper().lossy_range(span),
        })
    })
}

fn describe(node: Node<'_>, offset: usize, snapshot: &MetadataSnapshot) -> Option<(String, Span)> {
    match node.kind() {
        NodeKind::FunctionName => {
            let Node::FunctionName(ident) = node else {
                return None;
            };
            Some((describe_function(&ident.name), ident.span))
        }
        NodeKind::Call => {
            let Node::Expr(Expr::Call(call)) = node else {
                return None;
            };
            Some((describe_function(&call.func.name), call.func.span))
        }
        NodeKind::Aggregate => {
            let Node::Expr(Expr::Aggregate(aggregate)) = node else {
                return None;
            };
            if !aggregate.op_span.touches(offset) {
                return None;
            }
            let op = aggregate.op;
            let mut text = format!(
                "```promql\n{}\n```\n\n{}\n\nAggregation operator. Group with `by (...)` or `without (...)`.",
                op.name(),
                op.description()
            );
            if let Some(param) = op.parameter_type() {
                text.push_str(&format!(
                    "\n\nTakes a leading {} parameter: `{}(<{}>, <instant-vector>)`.",
                    param,
                    op.name(),
                    param.signature_name()
                ));
            }
            Some((text, aggregate.op_span))
        }
        NodeKind::VectorSelector => {
            let Node::Expr(Expr::VectorSelector(selector)) = node else {
                return None;
            };
            let metric = selector.metric_name()?;
            let span = selector
                .name
                .as_ref()
                .map_or(selector.span, |name| name.span);
            Some((describe_metric(metric, snapshot), span))
        }
        NodeKind::MatrixSelector => {
            let Node::Expr(Expr::MatrixSelector(matrix)) = node else {
                return None;
            };
            let range = matrix.range.as_ref()?;
            Some((
                format!(
                    "Range vector selector over the last `{}`.",
                    format_duration(range.value)
                ),
                matrix.brackets,
            ))
        }
        NodeKind::Subquery => {
            let Node::Expr(Expr::Subquery(subquery)) = node else {
                return None;
            };
            let range = subquery.range.as_ref()?;
            let step = subquery.step.as_ref().map_or_else(
                || "the default evaluation interval".to_string(),
                |step| format!("`{}`", format_duration(step.value)),
            );
            Some((
                format!(
                    "Subquery over the last `{}` with a resolution of {}.",
                    format_duration(range.value),
                    step
                ),
                subquery.brackets,
            ))
        }
        NodeKind::LabelMatcher => {
            let Node::LabelMatcher(matcher) = node else {
                return None;
            };
            let op = matcher.op?;
            let value = matcher.value.as_ref()?;
            let verb = match op {
                MatchOp::Equal => "equal to",
                MatchOp::NotEqual => "not equal to",
                MatchOp::RegexMatch => "matching",
                MatchOp::RegexNoMatch => "not matching",
            };
            let known = snapshot.label_values(None, &matcher.name.name).len();
            Some((
                format!(
                    "Label `{}` {} `{}`\n\n{} known value(s).",
                    matcher.name.name, verb, value.value, known
                ),
                matcher.span,
            ))
        }
        NodeKind::Label => {
            let Node::Label(ident) = node else {
                return None;
            };
            Some((format!("Label `{}`", ident.name), ident.span))
        }
        NodeKind::Number => {
            let Node::Expr(Expr::Number(number)) = node else {
                return None;
            };
            Some((format!("Scalar `{}`", number.value), number.span))
        }
        NodeKind::String => {
            let Node::Expr(Expr::String(string)) = node else {
                return None;
            };
            Some((format!("String `{:?}`", string.value), string.span))
        }
        NodeKind::Duration => {
            let Node::Duration(duration) = node else {
                return None;
            };
            Some((
                format!(
                    "Duration `{}` ({} seconds)",
                    format_duration(duration.value),
                    duration.value.as_secs_f64()
                ),
                duration.span,
            ))
        }
        NodeKind::Binary => {
            let Node::Expr(Expr::Binary(binary)) = node else {
                return None;
            };
            if !binary.op_span.touches(offset) {
                return None;
            }
            let kind = if binary.op.is_set_operator() {
                "Set operator"
            } else if binary.op.is_comparison() {
                "Comparison operator"
            } else {
                "Arithmetic operator"
            };
            Some((
                format!("{} `{}`", kind, binary.op.as_str()),
                binary.op_span,
            ))
        }
        NodeKind::Unary
        | NodeKind::Paren
        | NodeKind::Invalid
        | NodeKind::LabelMatchers
        | NodeKind::LabelList => None,
    }
}

fn describe_function(name: &str) -> String {
    match functions::lookup(name) {
        Some(function) => format!(
            "```promql\n{}\n```\n\n{}",
            function.signature(),
            function.description
        ),
        None => format!("Unknown function `{}`", name),
    }
}

fn describe_metric(metric: &str, snapshot: &MetadataSnapshot) -> String {
    let mut text = format!("```promql\n{}\n```", metric);
    match snapshot.metadata(metric) {
        Some(metadata) => {
            if !metadata.metric_type.is_empty() {
                text.push_str(&format!("\n\nType: `{}`", metadata.metric_type));
            }
            if !metadata.help.is_empty() {
                text.push_str(&format!("\n\n{}", metadata.help));
            }
            if !metadata.unit.is_empty() {
                text.push_str(&format!("\n\nUnit: `{}`", metadata.unit));
            }
        }
        None if snapshot.has_metric(metric) => {
            text.push_str("\n\nNo metadata available for this metric.");
        }
        None => text.push_str("\n\nMetric not found on the Prometheus server."),
    }
    text
}
