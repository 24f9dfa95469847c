//! PromQL abstract syntax tree
//!
//! The tree is produced by an error tolerant parser, so every node may be incomplete: groups
//! carry a `closed` flag, optional pieces are `Option`s, and an operand that could not be parsed
//! at all is an [`Expr::Invalid`] placeholder. All spans index the full document text.

use crate::span::Span;
use std::fmt;
use std::time::Duration;

/// The type a PromQL expression evaluates to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Scalar,
    String,
    Vector,
    Matrix,
    /// Type of an expression that did not parse, or calls an unknown function.
    Unknown,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Scalar => "scalar",
            ValueType::String => "string",
            ValueType::Vector => "instant vector",
            ValueType::Matrix => "range vector",
            ValueType::Unknown => "unknown",
        }
    }

    /// Short form used in function signatures.
    pub fn signature_name(&self) -> &'static str {
        match self {
            ValueType::Scalar => "scalar",
            ValueType::String => "string",
            ValueType::Vector => "instant-vector",
            ValueType::Matrix => "range-vector",
            ValueType::Unknown => "any",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NumberLiteral {
    pub value: f64,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringLiteral {
    /// Unquoted, unescaped value.
    pub value: String,
    pub span: Span,
    pub terminated: bool,
}

impl StringLiteral {
    /// The span between the quotes.
    pub fn content_span(&self) -> Span {
        let start = (self.span.start + 1).min(self.span.end);
        let end = if self.terminated {
            self.span.end.saturating_sub(1).max(start)
        } else {
            self.span.end
        };
        Span::new(start, end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurationLiteral {
    pub value: Duration,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchOp {
    Equal,
    NotEqual,
    RegexMatch,
    RegexNoMatch,
}

impl MatchOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchOp::Equal => "=",
            MatchOp::NotEqual => "!=",
            MatchOp::RegexMatch => "=~",
            MatchOp::RegexNoMatch => "!~",
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, MatchOp::RegexMatch | MatchOp::RegexNoMatch)
    }
}

/// One `name op "value"` entry inside selector braces. `op` and `value` are absent while the
/// user is still typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatcher {
    pub name: Ident,
    pub op: Option<MatchOp>,
    pub op_span: Option<Span>,
    pub value: Option<StringLiteral>,
    pub span: Span,
}

/// The `{...}` part of a selector; `span` includes the braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMatchers {
    pub matchers: Vec<LabelMatcher>,
    pub span: Span,
    pub closed: bool,
}

/// A parenthesised list of label names, as in `by (job, instance)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelList {
    pub labels: Vec<Ident>,
    pub span: Span,
    pub closed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AtValue {
    Timestamp(f64),
    Start,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtModifier {
    pub value: AtValue,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetModifier {
    pub duration: Duration,
    pub negative: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Modifiers {
    pub offset: Option<OffsetModifier>,
    pub at: Option<AtModifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorSelector {
    pub name: Option<Ident>,
    pub matchers: Option<LabelMatchers>,
    pub modifiers: Modifiers,
    pub span: Span,
}

impl VectorSelector {
    /// The metric name, whether written before the braces or as a `__name__="..."` matcher.
    pub fn metric_name(&self) -> Option<&str> {
        if let Some(name) = &self.name {
            return Some(name.name.as_str());
        }
        self.matchers.as_ref().and_then(|matchers| {
            matchers.matchers.iter().find_map(|matcher| {
                match (&matcher.op, &matcher.value) {
                    (Some(MatchOp::Equal), Some(value)) if matcher.name.name == "__name__" => {
                        Some(value.value.as_str())
                    }
                    _ => None,
                }
            })
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixSelector {
    pub selector: Box<Expr>,
    pub range: Option<DurationLiteral>,
    /// The `[...]` part.
    pub brackets: Span,
    pub modifiers: Modifiers,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryExpr {
    pub expr: Box<Expr>,
    pub range: Option<DurationLiteral>,
    pub step: Option<DurationLiteral>,
    pub brackets: Span,
    pub modifiers: Modifiers,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub func: Ident,
    pub args: Vec<Expr>,
    /// The parenthesised argument list.
    pub args_span: Span,
    pub closed: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateOp {
    Sum,
    Avg,
    Count,
    Min,
    Max,
    Group,
    Stddev,
    Stdvar,
    Topk,
    Bottomk,
    CountValues,
    Quantile,
    Limitk,
    LimitRatio,
}

impl AggregateOp {
    pub const ALL: &'static [AggregateOp] = &[
        AggregateOp::Sum,
        AggregateOp::Avg,
        AggregateOp::Count,
        AggregateOp::Min,
        AggregateOp::Max,
        AggregateOp::Group,
        AggregateOp::Stddev,
        AggregateOp::Stdvar,
        AggregateOp::Topk,
        AggregateOp::Bottomk,
        AggregateOp::CountValues,
        AggregateOp::Quantile,
        AggregateOp::Limitk,
        AggregateOp::LimitRatio,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        AggregateOp::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }

    pub fn name(&self) -> &'static str {
        match self {
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Group => "group",
            AggregateOp::Stddev => "stddev",
            AggregateOp::Stdvar => "stdvar",
            AggregateOp::Topk => "topk",
            AggregateOp::Bottomk => "bottomk",
            AggregateOp::CountValues => "count_values",
            AggregateOp::Quantile => "quantile",
            AggregateOp::Limitk => "limitk",
            AggregateOp::LimitRatio => "limit_ratio",
        }
    }

    /// Type of the leading parameter, for the operators that take one.
    pub fn parameter_type(&self) -> Option<ValueType> {
        match self {
            AggregateOp::Topk
            | AggregateOp::Bottomk
            | AggregateOp::Quantile
            | AggregateOp::Limitk
            | AggregateOp::LimitRatio => Some(ValueType::Scalar),
            AggregateOp::CountValues => Some(ValueType::String),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AggregateOp::Sum => "Calculate sum over dimensions.",
            AggregateOp::Avg => "Calculate the average over dimensions.",
            AggregateOp::Count => "Count number of elements in the vector.",
            AggregateOp::Min => "Select minimum over dimensions.",
            AggregateOp::Max => "Select maximum over dimensions.",
            AggregateOp::Group => "All values in the resulting vector are 1.",
            AggregateOp::Stddev => "Calculate population standard deviation over dimensions.",
            AggregateOp::Stdvar => "Calculate population standard variance over dimensions.",
            AggregateOp::Topk => "Largest k elements by sample value.",
            AggregateOp::Bottomk => "Smallest k elements by sample value.",
            AggregateOp::CountValues => "Count number of elements with the same value.",
            AggregateOp::Quantile => "Calculate φ-quantile (0 ≤ φ ≤ 1) over dimensions.",
            AggregateOp::Limitk => "Sample k elements.",
            AggregateOp::LimitRatio => "Sample elements with approximately r ratio.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub without: bool,
    pub keyword_span: Span,
    pub labels: LabelList,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub op: AggregateOp,
    pub op_span: Span,
    pub grouping: Option<Grouping>,
    pub param: Option<Box<Expr>>,
    pub expr: Box<Expr>,
    pub args_span: Span,
    pub closed: bool,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Atan2,
    Eql,
    Neq,
    Gtr,
    Lss,
    Gte,
    Lte,
    And,
    Or,
    Unless,
}

impl BinaryOp {
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And | BinaryOp::Unless => 2,
            BinaryOp::Eql
            | BinaryOp::Neq
            | BinaryOp::Gtr
            | BinaryOp::Lss
            | BinaryOp::Gte
            | BinaryOp::Lte => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod | BinaryOp::Atan2 => 5,
            BinaryOp::Pow => 6,
        }
    }

    pub fn is_right_associative(&self) -> bool {
        matches!(self, BinaryOp::Pow)
    }

    pub fn is_comparison(&self) -> bool {
        self.precedence() == 3
    }

    pub fn is_set_operator(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Unless)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Pow => "^",
            BinaryOp::Atan2 => "atan2",
            BinaryOp::Eql => "==",
            BinaryOp::Neq => "!=",
            BinaryOp::Gtr => ">",
            BinaryOp::Lss => "<",
            BinaryOp::Gte => ">=",
            BinaryOp::Lte => "<=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Unless => "unless",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupSide {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupModifier {
    pub side: GroupSide,
    pub keyword_span: Span,
    pub labels: Option<LabelList>,
}

/// `on (...)` / `ignoring (...)` with an optional `group_left` / `group_right`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorMatching {
    pub on: bool,
    pub keyword_span: Span,
    pub labels: LabelList,
    pub group: Option<GroupModifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub op_span: Span,
    pub return_bool: bool,
    pub matching: Option<VectorMatching>,
    pub lhs: Box<Expr>,
    pub rhs: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    pub op: UnaryOp,
    pub expr: Box<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParenExpr {
    pub expr: Box<Expr>,
    pub span: Span,
    pub closed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(NumberLiteral),
    String(StringLiteral),
    VectorSelector(VectorSelector),
    MatrixSelector(MatrixSelector),
    Subquery(SubqueryExpr),
    Call(Call),
    Aggregate(AggregateExpr),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    Paren(ParenExpr),
    /// Placeholder for an operand that could not be parsed.
    Invalid(Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Number(number) => number.span,
            Expr::String(string) => string.span,
            Expr::VectorSelector(selector) => selector.span,
            Expr::MatrixSelector(matrix) => matrix.span,
            Expr::Subquery(subquery) => subquery.span,
            Expr::Call(call) => call.span,
            Expr::Aggregate(aggregate) => aggregate.span,
            Expr::Binary(binary) => binary.span,
            Expr::Unary(unary) => unary.span,
            Expr::Paren(paren) => paren.span,
            Expr::Invalid(span) => *span,
        }
    }

    pub(crate) fn span_mut(&mut self) -> Option<&mut Span> {
        match self {
            Expr::VectorSelector(selector) => Some(&mut selector.span),
            Expr::MatrixSelector(matrix) => Some(&mut matrix.span),
            Expr::Subquery(subquery) => Some(&mut subquery.span),
            _ => None,
        }
    }

    pub(crate) fn modifiers_mut(&mut self) -> Option<&mut Modifiers> {
        match self {
            Expr::VectorSelector(selector) => Some(&mut selector.modifiers),
            Expr::MatrixSelector(matrix) => Some(&mut matrix.modifiers),
            Expr::Subquery(subquery) => Some(&mut subquery.modifiers),
            _ => None,
        }
    }

    pub fn value_type(&self) -> ValueType {
        match self {
            Expr::Number(_) => ValueType::Scalar,
            Expr::String(_) => ValueType::String,
            Expr::VectorSelector(_) => ValueType::Vector,
            Expr::MatrixSelector(_) | Expr::Subquery(_) => ValueType::Matrix,
            Expr::Call(call) => crate::functions::lookup(&call.func.name)
                .map(|function| function.return_type)
                .unwrap_or(ValueType::Unknown),
            Expr::Aggregate(_) => ValueType::Vector,
            Expr::Binary(binary) => {
                match (binary.lhs.value_type(), binary.rhs.value_type()) {
                    (ValueType::Scalar, ValueType::Scalar) => ValueType::Scalar,
                    (ValueType::Unknown, _) | (_, ValueType::Unknown) => ValueType::Unknown,
                    _ => ValueType::Vector,
                }
            }
            Expr::Unary(unary) => unary.expr.value_type(),
            Expr::Paren(paren) => paren.expr.value_type(),
            Expr::Invalid(_) => ValueType::Unknown,
        }
    }

    /// Strips any number of enclosing parentheses.
    pub fn unparen(&self) -> &Expr {
        match self {
            Expr::Paren(paren) => paren.expr.unparen(),
            other => other,
        }
    }
}
