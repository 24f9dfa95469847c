//! Transport independent language service
//!
//! Both the LSP server and the HTTP adapter drive the same [`LanguageService`]: it owns the
//! document cache, shares the metadata cache and delegates the analysis itself to a
//! [`FeatureProvider`].

use crate::cache::DocumentCache;
use crate::error::{CacheError, ServiceError};
use crate::metadata::MetadataService;
use lsp_types::{
    CompletionList, Diagnostic, Hover, HoverContents, MarkupContent, MarkupKind, Position, Url,
};
use promql_analysis::{
    complete, hover, CompletionResult, Document, DocumentKind, HoverInfo, MetadataSnapshot,
    DEFAULT_MAX_ITEMS,
};
use std::sync::Arc;

pub trait FeatureProvider: Send + Sync + 'static {
    fn diagnostics(&self, document: &Document) -> Vec<Diagnostic>;
    fn hover(
        &self,
        document: &Document,
        offset: usize,
        snapshot: &MetadataSnapshot,
    ) -> Option<HoverInfo>;
    fn completion(
        &self,
        document: &Document,
        offset: usize,
        snapshot: &MetadataSnapshot,
        max_items: usize,
    ) -> CompletionResult;
}

#[derive(Default)]
pub struct DefaultFeatureProvider;

impl DefaultFeatureProvider {
    pub fn new() -> Self {
        Self
    }
}

impl FeatureProvider for DefaultFeatureProvider {
    fn diagnostics(&self, document: &Document) -> Vec<Diagnostic> {
        document.diagnostics().to_vec()
    }

    fn hover(
        &self,
        document: &Document,
        offset: usize,
        snapshot: &MetadataSnapshot,
    ) -> Option<HoverInfo> {
        hover(document, offset, snapshot)
    }

    fn completion(
        &self,
        document: &Document,
        offset: usize,
        snapshot: &MetadataSnapshot,
        max_items: usize,
    ) -> CompletionResult {
        complete(document, offset, snapshot, max_items)
    }
}

pub struct LanguageService<P = DefaultFeatureProvider> {
    documents: DocumentCache,
    metadata: Arc<MetadataService>,
    features: Arc<P>,
    max_completion_items: usize,
}

impl LanguageService<DefaultFeatureProvider> {
    pub fn new(metadata: Arc<MetadataService>) -> Self {
        Self::with_features(metadata, Arc::new(DefaultFeatureProvider::new()))
    }
}

impl<P: FeatureProvider> LanguageService<P> {
    pub fn with_features(metadata: Arc<MetadataService>, features: Arc<P>) -> Self {
        Self {
            documents: DocumentCache::new(),
            metadata,
            features,
            max_completion_items: DEFAULT_MAX_ITEMS,
        }
    }

    pub fn with_max_completion_items(mut self, max_items: usize) -> Self {
        self.max_completion_items = max_items;
        self
    }

    pub fn metadata(&self) -> &Arc<MetadataService> {
        &self.metadata
    }

    pub fn documents(&self) -> &DocumentCache {
        &self.documents
    }

    /// Open a document; its kind comes from `language_id`, or from the URI path without one.
    pub async fn open(
        &self,
        uri: Url,
        version: i32,
        language_id: Option<&str>,
        text: String,
    ) -> Result<Arc<Document>, CacheError> {
        let kind = DocumentKind::detect(language_id, uri.path());
        self.documents.open(uri, version, kind, text).await
    }

    pub async fn change(
        &self,
        uri: &Url,
        version: i32,
        text: String,
    ) -> Result<Arc<Document>, CacheError> {
        self.documents.change(uri, version, text).await
    }

    pub async fn close(&self, uri: &Url) -> Result<(), CacheError> {
        self.documents.close(uri).await
    }

    pub fn document_diagnostics(&self, document: &Document) -> Vec<Diagnostic> {
        self.features.diagnostics(document)
    }

    pub async fn diagnostics(&self, uri: &Url) -> Result<Vec<Diagnostic>, ServiceError> {
        let document = self.documents.get(uri).await?;
        Ok(self.document_diagnostics(&document))
    }

    pub async fn hover(
        &self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<Hover>, ServiceError> {
        let document = self.documents.get(uri).await?;
        let offset = document.mapper().to_offset(position)?;
        let snapshot = self.metadata.snapshot();
        Ok(self
            .features
            .hover(&document, offset, &snapshot)
            .map(|info| Hover {
                contents: HoverContents::Markup(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: info.contents,
                }),
                range: Some(info.range),
            }))
    }

    pub async fn completion(
        &self,
        uri: &Url,
        position: Position,
    ) -> Result<CompletionList, ServiceError> {
        let document = self.documents.get(uri).await?;
        let offset = document.mapper().to_offset(position)?;
        let snapshot = self.metadata.snapshot();
        let result = self
            .features
            .completion(&document, offset, &snapshot, self.max_completion_items);
        Ok(CompletionList {
            is_incomplete: result.is_incomplete,
            items: result.items,
        })
    }
}
