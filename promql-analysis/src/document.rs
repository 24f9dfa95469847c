//! Versioned documents and their compiled queries
//!
//! A [`Document`] is built in one go from a text snapshot: the text is split into query
//! regions, every region is parsed on its own with spans in document coordinates, and the
//! diagnostics are derived from the result. Documents are never mutated afterwards; an edit
//! produces a new document.

use crate::cancel::CancellationToken;
use crate::diagnostics;
use crate::error::Cancelled;
use crate::extract::{regions, DocumentKind, Region};
use crate::position::PositionMapper;
use lsp_types::{Diagnostic, Url};
use promql_parser::{parse_at, Expr, ParseError, Span};
use std::sync::Arc;

/// The parse result of one query region.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub uri: Url,
    /// The region in document byte offsets.
    pub span: Span,
    pub expr: Expr,
    pub errors: Vec<ParseError>,
}

impl CompiledQuery {
    pub fn compile(
        uri: &Url,
        region: Region<'_>,
        cancel: &CancellationToken,
    ) -> Result<Self, Cancelled> {
        let is_cancelled = || cancel.is_cancelled();
        let output = parse_at(region.text, region.start, &is_cancelled)?;
        Ok(Self {
            uri: uri.clone(),
            span: Span::new(region.start, region.end),
            expr: output.expr,
            errors: output.errors,
        })
    }

    /// The region text, given the full document text.
    pub fn text<'a>(&self, document_text: &'a str) -> &'a str {
        &document_text[self.span.range()]
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    uri: Url,
    version: i32,
    kind: DocumentKind,
    text: Arc<str>,
    mapper: PositionMapper,
    queries: Vec<CompiledQuery>,
    diagnostics: Vec<Diagnostic>,
}

impl Document {
    pub fn compile(
        uri: Url,
        version: i32,
        kind: DocumentKind,
        text: impl Into<Arc<str>>,
        cancel: &CancellationToken,
    ) -> Result<Self, Cancelled> {
        let text: Arc<str> = text.into();
        let mapper = PositionMapper::new(text.clone());

        let mut queries = Vec::new();
        for region in regions(kind, &text) {
            if cancel.is_cancelled() {
                return Err(Cancelled);
            }
            queries.push(CompiledQuery::compile(&uri, region, cancel)?);
        }
        let diagnostics = diagnostics::diagnostics(&queries, &mapper);

        Ok(Self {
            uri,
            version,
            kind,
            text,
            mapper,
            queries,
            diagnostics,
        })
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn mapper(&self) -> &PositionMapper {
        &self.mapper
    }

    pub fn queries(&self) -> &[CompiledQuery] {
        &self.queries
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The query whose region contains `offset`; the region end counts as inside.
    pub fn query_at(&self, offset: usize) -> Option<&CompiledQuery> {
        self.queries.iter().find(|query| query.span.touches(offset))
    }
}
