//! Uniform view over AST nodes
//!
//! Tooling (completion, hover) needs to walk from the root to the node under a cursor without
//! caring about the concrete struct at each level. [`Node`] is a closed set of borrowed
//! variants covering every position-bearing part of the tree.

use crate::ast::{
    DurationLiteral, Expr, Grouping, Ident, LabelList, LabelMatcher, LabelMatchers,
    VectorMatching,
};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    Expr(&'a Expr),
    LabelMatchers(&'a LabelMatchers),
    LabelMatcher(&'a LabelMatcher),
    /// A parenthesised label list in `by`, `without`, `on`, `ignoring` or `group_x`.
    LabelList(&'a LabelList),
    /// A label name inside a [`Node::LabelList`].
    Label(&'a Ident),
    /// The name of a function call.
    FunctionName(&'a Ident),
    Duration(&'a DurationLiteral),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Number,
    String,
    VectorSelector,
    MatrixSelector,
    Subquery,
    Call,
    Aggregate,
    Binary,
    Unary,
    Paren,
    Invalid,
    LabelMatchers,
    LabelMatcher,
    LabelList,
    Label,
    FunctionName,
    Duration,
}

impl<'a> Node<'a> {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Expr(expr) => match expr {
                Expr::Number(_) => NodeKind::Number,
                Expr::String(_) => NodeKind::String,
                Expr::VectorSelector(_) => NodeKind::VectorSelector,
                Expr::MatrixSelector(_) => NodeKind::MatrixSelector,
                Expr::Subquery(_) => NodeKind::Subquery,
                Expr::Call(_) => NodeKind::Call,
                Expr::Aggregate(_) => NodeKind::Aggregate,
                Expr::Binary(_) => NodeKind::Binary,
                Expr::Unary(_) => NodeKind::Unary,
                Expr::Paren(_) => NodeKind::Paren,
                Expr::Invalid(_) => NodeKind::Invalid,
            },
            Node::LabelMatchers(_) => NodeKind::LabelMatchers,
            Node::LabelMatcher(_) => NodeKind::LabelMatcher,
            Node::LabelList(_) => NodeKind::LabelList,
            Node::Label(_) => NodeKind::Label,
            Node::FunctionName(_) => NodeKind::FunctionName,
            Node::Duration(_) => NodeKind::Duration,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Node::Expr(expr) => expr.span(),
            Node::LabelMatchers(matchers) => matchers.span,
            Node::LabelMatcher(matcher) => matcher.span,
            Node::LabelList(list) => list.span,
            Node::Label(ident) | Node::FunctionName(ident) => ident.span,
            Node::Duration(duration) => duration.span,
        }
    }

    /// Direct children in source order.
    pub fn children(&self) -> Vec<Node<'a>> {
        let mut children = Vec::new();
        match *self {
            Node::Expr(expr) => match expr {
                Expr::Number(_) | Expr::String(_) | Expr::Invalid(_) => {}
                Expr::VectorSelector(selector) => {
                    if let Some(matchers) = &selector.matchers {
                        children.push(Node::LabelMatchers(matchers));
                    }
                }
                Expr::MatrixSelector(matrix) => {
                    children.push(Node::Expr(&matrix.selector));
                    if let Some(range) = &matrix.range {
                        children.push(Node::Duration(range));
                    }
                }
                Expr::Subquery(subquery) => {
                    children.push(Node::Expr(&subquery.expr));
                    if let Some(range) = &subquery.range {
                        children.push(Node::Duration(range));
                    }
                    if let Some(step) = &subquery.step {
                        children.push(Node::Duration(step));
                    }
                }
                Expr::Call(call) => {
                    children.push(Node::FunctionName(&call.func));
                    children.extend(call.args.iter().map(Node::Expr));
                }
                Expr::Aggregate(aggregate) => {
                    let grouping = aggregate.grouping.as_ref().map(grouping_node);
                    let grouping_first = aggregate.grouping.as_ref().is_some_and(|grouping| {
                        grouping.keyword_span.start < aggregate.args_span.start
                    });
                    if grouping_first {
                        children.extend(grouping);
                    }
                    if let Some(param) = &aggregate.param {
                        children.push(Node::Expr(param));
                    }
                    children.push(Node::Expr(&aggregate.expr));
                    if !grouping_first {
                        children.extend(grouping);
                    }
                }
                Expr::Binary(binary) => {
                    children.push(Node::Expr(&binary.lhs));
                    if let Some(matching) = &binary.matching {
                        push_matching(&mut children, matching);
                    }
                    children.push(Node::Expr(&binary.rhs));
                }
                Expr::Unary(unary) => children.push(Node::Expr(&unary.expr)),
                Expr::Paren(paren) => children.push(Node::Expr(&paren.expr)),
            },
            Node::LabelMatchers(matchers) => {
                children.extend(matchers.matchers.iter().map(Node::LabelMatcher));
            }
            Node::LabelList(list) => children.extend(list.labels.iter().map(Node::Label)),
            Node::LabelMatcher(_) | Node::Label(_) | Node::FunctionName(_) | Node::Duration(_) => {}
        }
        children
    }
}

fn grouping_node(grouping: &Grouping) -> Node<'_> {
    Node::LabelList(&grouping.labels)
}

fn push_matching<'a>(children: &mut Vec<Node<'a>>, matching: &'a VectorMatching) {
    children.push(Node::LabelList(&matching.labels));
    if let Some(labels) = matching.group.as_ref().and_then(|group| group.labels.as_ref()) {
        children.push(Node::LabelList(labels));
    }
}

/// Path from the root to the innermost node whose span contains `offset`, root first.
///
/// Containment is half-open, so empty placeholder nodes are never part of a path. Returns an
/// empty path when the root itself does not contain `offset`.
pub fn path_at(root: &Expr, offset: usize) -> Vec<Node<'_>> {
    let mut path = Vec::new();
    let mut current = Node::Expr(root);
    if !current.span().contains(offset) {
        return path;
    }
    loop {
        path.push(current);
        match current
            .children()
            .into_iter()
            .find(|child| child.span().contains(offset))
        {
            Some(child) => current = child,
            None => return path,
        }
    }
}
