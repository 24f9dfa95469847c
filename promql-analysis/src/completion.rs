//! Context-aware completion for PromQL queries
//!
//! The cursor is resolved to the innermost AST node containing it, which decides between
//! three contexts: a full expression (metric names, functions, aggregation operators), a
//! label name, or a label value. Candidates are filtered against the partial token in front
//! of the cursor and ranked in two tiers: prefix matches first, then subsequence matches.

use crate::document::{CompiledQuery, Document};
use crate::metadata::MetadataSnapshot;
use lsp_types::{
    CompletionItem, CompletionItemKind, CompletionTextEdit, Documentation, InsertTextFormat,
    TextEdit,
};
use promql_parser::ast::{AggregateOp, Expr, StringLiteral};
use promql_parser::{functions, path_at, Node, NodeKind, Span};
use std::collections::HashSet;

pub const DEFAULT_MAX_ITEMS: usize = 100;

/// A completion suggestion before ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionCandidate {
    pub label: String,
    pub detail: Option<String>,
    pub documentation: Option<String>,
    pub kind: CompletionItemKind,
    pub insert_text: Option<String>,
    pub snippet: bool,
}

impl CompletionCandidate {
    fn new(label: impl Into<String>, kind: CompletionItemKind) -> Self {
        Self {
            label: label.into(),
            detail: None,
            documentation: None,
            kind,
            insert_text: None,
            snippet: false,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn with_documentation(mut self, documentation: impl Into<String>) -> Self {
        self.documentation = Some(documentation.into());
        self
    }

    fn with_insert_text(mut self, text: impl Into<String>) -> Self {
        self.insert_text = Some(text.into());
        self
    }

    fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.insert_text = Some(snippet.into());
        self.snippet = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompletionResult {
    pub items: Vec<CompletionItem>,
    pub is_incomplete: bool,
}

/// What kind of token the cursor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionContext<'a> {
    Expression,
    LabelName {
        metric: Option<&'a str>,
    },
    LabelValue {
        metric: Option<&'a str>,
        label: &'a str,
        /// Quote character to wrap inserted values in, when the value has no quotes yet.
        quote: Option<char>,
        /// Quote character of the surrounding string, used for escaping.
        enclosing: char,
    },
}

/// A classified cursor: the context and where the partial token starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    pub context: CompletionContext<'a>,
    pub token_start: usize,
}

pub fn complete(
    document: &Document,
    offset: usize,
    snapshot: &MetadataSnapshot,
    max_items: usize,
) -> CompletionResult {
    let Some(query) = document.query_at(offset) else {
        return CompletionResult::default();
    };
    let Some(classification) = classify(query, document.text(), offset) else {
        return CompletionResult::default();
    };

    let text = document.text();
    let start = classification.token_start.min(offset);
    let prefix = text.get(start..offset).unwrap_or_default();
    let end = token_end(classification.context, text, offset).min(query.span.end.max(offset));
    let range = document.mapper().lossy_range(Span::new(start, end));

    let candidates = candidates(classification.context, snapshot);
    let mut ranked = rank(candidates, prefix);
    let truncated = ranked.len() > max_items;
    ranked.truncate(max_items);

    let items = ranked
        .into_iter()
        .enumerate()
        .map(|(index, candidate)| {
            let new_text = candidate
                .insert_text
                .clone()
                .unwrap_or_else(|| candidate.label.clone());
            CompletionItem {
                label: candidate.label,
                kind: Some(candidate.kind),
                detail: candidate.detail,
                documentation: candidate.documentation.map(Documentation::String),
                sort_text: Some(format!("{:05}", index)),
                filter_text: Some(prefix_filter(prefix, &new_text)),
                insert_text_format: Some(if candidate.snippet {
                    InsertTextFormat::SNIPPET
                } else {
                    InsertTextFormat::PLAIN_TEXT
                }),
                text_edit: Some(CompletionTextEdit::Edit(TextEdit { range, new_text })),
                ..Default::default()
            }
        })
        .collect();

    CompletionResult {
        items,
        is_incomplete: truncated || !snapshot.is_loaded(),
    }
}

/// End of the token under the cursor, so accepting an item replaces the whole token and not
/// only the part before the cursor.
fn token_end(context: CompletionContext, text: &str, offset: usize) -> usize {
    let rest = text.get(offset..).unwrap_or_default();
    let len = match context {
        CompletionContext::Expression => {
            identifier_len(rest, |c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
        }
        CompletionContext::LabelName { .. } => {
            identifier_len(rest, |c| c.is_ascii_alphanumeric() || c == '_')
        }
        CompletionContext::LabelValue { quote: Some(_), .. } => 0,
        CompletionContext::LabelValue { enclosing, .. } => string_content_len(rest, enclosing),
    };
    offset + len
}

fn identifier_len(rest: &str, is_ident: impl Fn(char) -> bool) -> usize {
    rest.find(|c: char| !is_ident(c)).unwrap_or(rest.len())
}

/// Bytes up to the closing `quote`, skipping escapes in non-raw strings.
fn string_content_len(rest: &str, quote: char) -> usize {
    let mut chars = rest.char_indices();
    while let Some((index, c)) = chars.next() {
        if c == quote || c == '\n' {
            return index;
        }
        if c == '\\' && quote != '`' {
            chars.next();
        }
    }
    rest.len()
}

/// Editors filter on `filter_text` against the replaced token; keep the token itself so the
/// ranking computed here is not undone client side.
fn prefix_filter(prefix: &str, new_text: &str) -> String {
    if prefix.is_empty() {
        new_text.to_string()
    } else {
        prefix.to_string()
    }
}

/// Resolve the completion context at `cursor`, retrying one byte to the left when the
/// cursor sits right after a token.
pub fn classify<'a>(
    query: &'a CompiledQuery,
    text: &str,
    cursor: usize,
) -> Option<Classification<'a>> {
    classify_at(query, text, cursor, cursor)
        .or_else(|| {
            cursor
                .checked_sub(1)
                .filter(|lookup| *lookup >= query.span.start)
                .and_then(|lookup| classify_at(query, text, lookup, cursor))
        })
        .or_else(|| match &query.expr {
            Expr::Invalid(span) if span.is_empty() => Some(Classification {
                context: CompletionContext::Expression,
                token_start: cursor,
            }),
            _ => None,
        })
}

fn classify_at<'a>(
    query: &'a CompiledQuery,
    text: &str,
    lookup: usize,
    cursor: usize,
) -> Option<Classification<'a>> {
    let path = path_at(&query.expr, lookup);
    let (node, ancestors) = path.split_last()?;
    classify_node(*node, ancestors, text, cursor)
}

fn classify_node<'a>(
    node: Node<'a>,
    ancestors: &[Node<'a>],
    text: &str,
    cursor: usize,
) -> Option<Classification<'a>> {
    let expression = |token_start| Classification {
        context: CompletionContext::Expression,
        token_start,
    };
    let label_name = |metric, token_start| Classification {
        context: CompletionContext::LabelName { metric },
        token_start,
    };

    match node.kind() {
        NodeKind::Number
        | NodeKind::String
        | NodeKind::MatrixSelector
        | NodeKind::Subquery
        | NodeKind::Duration => None,
        NodeKind::Invalid => Some(expression(cursor)),
        NodeKind::VectorSelector => {
            let Node::Expr(Expr::VectorSelector(selector)) = node else {
                return None;
            };
            let name = selector.name.as_ref()?;
            if !name.span.touches(cursor) {
                return None;
            }
            Some(expression(name.span.start))
        }
        NodeKind::FunctionName => Some(expression(node.span().start)),
        NodeKind::Call => {
            let Node::Expr(Expr::Call(call)) = node else {
                return None;
            };
            if inside(call.args_span, call.closed, cursor) && empty_slot(node, cursor) {
                Some(expression(cursor))
            } else {
                None
            }
        }
        NodeKind::Aggregate => {
            let Node::Expr(Expr::Aggregate(aggregate)) = node else {
                return None;
            };
            if aggregate.op_span.touches(cursor) {
                return Some(expression(aggregate.op_span.start));
            }
            if !aggregate.args_span.is_empty()
                && inside(aggregate.args_span, aggregate.closed, cursor)
                && empty_slot(node, cursor)
            {
                Some(expression(cursor))
            } else {
                None
            }
        }
        NodeKind::Paren => {
            let Node::Expr(Expr::Paren(paren)) = node else {
                return None;
            };
            if inside(paren.span, paren.closed, cursor) && empty_slot(node, cursor) {
                Some(expression(cursor))
            } else {
                None
            }
        }
        NodeKind::Binary => {
            let Node::Expr(Expr::Binary(binary)) = node else {
                return None;
            };
            // A keyword operator still being typed is not followed by an operand yet.
            let keyword = binary.op.as_str().starts_with(|c: char| c.is_ascii_alphabetic());
            let after_op = if keyword {
                cursor > binary.op_span.end
            } else {
                cursor >= binary.op_span.end
            };
            if after_op && empty_slot(node, cursor) {
                Some(expression(cursor))
            } else {
                None
            }
        }
        NodeKind::Unary => {
            if cursor > node.span().start && empty_slot(node, cursor) {
                Some(expression(cursor))
            } else {
                None
            }
        }
        NodeKind::LabelMatchers => {
            let Node::LabelMatchers(matchers) = node else {
                return None;
            };
            let on_matcher = matchers
                .matchers
                .iter()
                .any(|matcher| matcher.span.touches(cursor));
            if inside(matchers.span, matchers.closed, cursor) && !on_matcher {
                Some(label_name(selector_metric(ancestors), cursor))
            } else {
                None
            }
        }
        NodeKind::LabelMatcher => {
            let Node::LabelMatcher(matcher) = node else {
                return None;
            };
            let metric = selector_metric(ancestors);
            if matcher.name.span.touches(cursor) {
                return Some(label_name(metric, matcher.name.span.start));
            }
            let label = matcher.name.name.as_str();
            match (&matcher.value, matcher.op_span) {
                (Some(value), _) => {
                    let content = value.content_span();
                    if !content.touches(cursor) || cursor <= value.span.start {
                        return None;
                    }
                    Some(Classification {
                        context: CompletionContext::LabelValue {
                            metric,
                            label,
                            quote: None,
                            enclosing: quote_char(value, text),
                        },
                        token_start: content.start,
                    })
                }
                (None, Some(op_span)) if cursor >= op_span.end => Some(Classification {
                    context: CompletionContext::LabelValue {
                        metric,
                        label,
                        quote: Some('"'),
                        enclosing: '"',
                    },
                    token_start: cursor,
                }),
                _ => None,
            }
        }
        NodeKind::LabelList => {
            let Node::LabelList(list) = node else {
                return None;
            };
            let on_label = list.labels.iter().any(|label| label.span.touches(cursor));
            if inside(list.span, list.closed, cursor) && !on_label {
                Some(label_name(grouping_metric(ancestors), cursor))
            } else {
                None
            }
        }
        NodeKind::Label => {
            // The parent is the label list; the clause owning it is one level further up.
            let owners = ancestors.len().saturating_sub(1);
            Some(label_name(
                grouping_metric(&ancestors[..owners]),
                node.span().start,
            ))
        }
    }
}

/// Whether `cursor` is past the opening delimiter of `span` and, for closed groups, before
/// the closing one.
fn inside(span: Span, closed: bool, cursor: usize) -> bool {
    cursor > span.start && (!closed || cursor < span.end)
}

/// True when no non-empty child of `node` touches the cursor.
fn empty_slot(node: Node<'_>, cursor: usize) -> bool {
    node.children().iter().all(|child| {
        let span = child.span();
        span.is_empty() || !span.touches(cursor)
    })
}

fn quote_char(value: &StringLiteral, text: &str) -> char {
    text.get(value.span.start..)
        .and_then(|rest| rest.chars().next())
        .filter(|c| matches!(c, '"' | '\'' | '`'))
        .unwrap_or('"')
}

/// Metric of the selector enclosing a `{...}` block.
fn selector_metric<'a>(ancestors: &[Node<'a>]) -> Option<&'a str> {
    ancestors.iter().rev().find_map(|node| match node {
        Node::Expr(Expr::VectorSelector(selector)) => selector.metric_name(),
        _ => None,
    })
}

/// Metric that the labels of a grouping or vector matching clause refer to.
fn grouping_metric<'a>(ancestors: &[Node<'a>]) -> Option<&'a str> {
    match ancestors.last()? {
        Node::Expr(Expr::Aggregate(aggregate)) => metric_of(&aggregate.expr),
        Node::Expr(Expr::Binary(binary)) => {
            metric_of(&binary.lhs).or_else(|| metric_of(&binary.rhs))
        }
        _ => None,
    }
}

/// The first metric name selected anywhere in `expr`.
fn metric_of(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::VectorSelector(selector) => selector.metric_name(),
        Expr::MatrixSelector(matrix) => metric_of(&matrix.selector),
        Expr::Subquery(subquery) => metric_of(&subquery.expr),
        Expr::Call(call) => call.args.iter().find_map(metric_of),
        Expr::Aggregate(aggregate) => metric_of(&aggregate.expr),
        Expr::Binary(binary) => metric_of(&binary.lhs).or_else(|| metric_of(&binary.rhs)),
        Expr::Unary(unary) => metric_of(&unary.expr),
        Expr::Paren(paren) => metric_of(&paren.expr),
        Expr::Number(_) | Expr::String(_) | Expr::Invalid(_) => None,
    }
}

fn candidates(
    context: CompletionContext<'_>,
    snapshot: &MetadataSnapshot,
) -> Vec<CompletionCandidate> {
    match context {
        CompletionContext::Expression => expression_candidates(snapshot),
        CompletionContext::LabelName { metric } => snapshot
            .label_names(metric)
            .into_iter()
            .map(|label| {
                CompletionCandidate::new(label, CompletionItemKind::VALUE).with_detail("label")
            })
            .collect(),
        CompletionContext::LabelValue {
            metric,
            label,
            quote,
            enclosing,
        } => snapshot
            .label_values(metric, label)
            .into_iter()
            .map(|value| {
                let escaped = escape(value, enclosing);
                let insert = match quote {
                    Some(quote) => format!("{quote}{escaped}{quote}"),
                    None => escaped,
                };
                CompletionCandidate::new(value, CompletionItemKind::VALUE)
                    .with_detail(format!("value of {}", label))
                    .with_insert_text(insert)
            })
            .collect(),
    }
}

fn expression_candidates(snapshot: &MetadataSnapshot) -> Vec<CompletionCandidate> {
    let mut items = Vec::new();

    for metric in snapshot.metric_names() {
        let mut candidate = CompletionCandidate::new(metric, CompletionItemKind::VALUE);
        match snapshot.metadata(metric) {
            Some(metadata) => {
                candidate = candidate.with_detail(if metadata.metric_type.is_empty() {
                    "metric".to_string()
                } else {
                    format!("{} metric", metadata.metric_type)
                });
                if !metadata.help.is_empty() {
                    candidate = candidate.with_documentation(metadata.help.clone());
                }
            }
            None => candidate = candidate.with_detail("metric"),
        }
        items.push(candidate);
    }

    for function in functions::all() {
        items.push(
            CompletionCandidate::new(function.name, CompletionItemKind::FUNCTION)
                .with_detail(function.signature())
                .with_documentation(function.description)
                .with_snippet(format!("{}($1)", function.name)),
        );
    }

    for op in AggregateOp::ALL {
        items.push(
            CompletionCandidate::new(op.name(), CompletionItemKind::FUNCTION)
                .with_detail("aggregation operator")
                .with_documentation(op.description())
                .with_snippet(format!("{}($1)", op.name())),
        );
    }

    items
}

fn escape(value: &str, quote: char) -> String {
    if quote == '`' {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == quote {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    Prefix,
    Fuzzy,
}

fn tier(label: &str, prefix: &str) -> Option<Tier> {
    if prefix.is_empty() {
        return Some(Tier::Prefix);
    }
    let label = label.to_lowercase();
    let prefix = prefix.to_lowercase();
    if label.starts_with(&prefix) {
        return Some(Tier::Prefix);
    }
    let mut chars = label.chars();
    prefix
        .chars()
        .all(|wanted| chars.any(|c| c == wanted))
        .then_some(Tier::Fuzzy)
}

/// Filter, de-duplicate and order candidates against the typed prefix.
pub fn rank(candidates: Vec<CompletionCandidate>, prefix: &str) -> Vec<CompletionCandidate> {
    let mut seen = HashSet::new();
    let mut ranked: Vec<(Tier, CompletionCandidate)> = candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.label.clone()))
        .filter_map(|candidate| tier(&candidate.label, prefix).map(|tier| (tier, candidate)))
        .collect();
    ranked.sort_by(|(a_tier, a), (b_tier, b)| {
        a_tier
            .cmp(b_tier)
            .then_with(|| a.label.to_lowercase().cmp(&b.label.to_lowercase()))
            .then_with(|| a.label.cmp(&b.label))
    });
    ranked.into_iter().map(|(_, candidate)| candidate).collect()
}
