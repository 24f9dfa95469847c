//! Registry of open documents
//!
//! Documents are compiled on the blocking pool, outside the map lock, and swapped in under the
//! write lock so readers only ever see a fully built [`Document`]. Every URI tracks the token
//! of its newest compilation: a newer change or a close cancels it, and a compilation whose
//! version is no longer the newest is discarded instead of stored.

use crate::error::CacheError;
use lsp_types::Url;
use promql_analysis::{CancellationToken, Cancelled, Document, DocumentKind};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

struct Entry {
    document: Arc<Document>,
    /// Highest version accepted so far, including one still compiling.
    latest_version: i32,
    pending: CancellationToken,
}

#[derive(Default)]
pub struct DocumentCache {
    entries: RwLock<HashMap<Url, Entry>>,
}

impl DocumentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile and store a document. Opening a URI that is already open replaces it.
    pub async fn open(
        &self,
        uri: Url,
        version: i32,
        kind: DocumentKind,
        text: String,
    ) -> Result<Arc<Document>, CacheError> {
        let token = CancellationToken::new();
        let document = compile(uri.clone(), version, kind, text, token.clone()).await?;

        let mut entries = self.entries.write().await;
        let replaced = entries.insert(
            uri.clone(),
            Entry {
                document: document.clone(),
                latest_version: version,
                pending: token,
            },
        );
        if let Some(previous) = replaced {
            warn!(%uri, version, "document opened twice, replacing the stored version");
            previous.pending.cancel();
        } else {
            debug!(%uri, version, "document opened");
        }
        Ok(document)
    }

    /// Recompile a document from its full new text.
    pub async fn change(
        &self,
        uri: &Url,
        version: i32,
        text: String,
    ) -> Result<Arc<Document>, CacheError> {
        let (kind, token) = {
            let mut entries = self.entries.write().await;
            let entry = entries
                .get_mut(uri)
                .ok_or_else(|| CacheError::NotFound(uri.clone()))?;
            if version <= entry.latest_version {
                return Err(CacheError::VersionConflict {
                    uri: uri.clone(),
                    current: entry.latest_version,
                    received: version,
                });
            }
            entry.pending.cancel();
            entry.pending = CancellationToken::new();
            entry.latest_version = version;
            (entry.document.kind(), entry.pending.clone())
        };

        let document = compile(uri.clone(), version, kind, text, token).await?;

        let mut entries = self.entries.write().await;
        match entries.get_mut(uri) {
            Some(entry) if entry.latest_version == version => {
                entry.document = document.clone();
                debug!(%uri, version, "document changed");
                Ok(document)
            }
            _ => {
                debug!(%uri, version, "discarding stale compilation");
                Err(CacheError::Cancelled(uri.clone()))
            }
        }
    }

    /// Forget a document and cancel its compilation. Readers holding the document keep it.
    pub async fn close(&self, uri: &Url) -> Result<(), CacheError> {
        let entry = self
            .entries
            .write()
            .await
            .remove(uri)
            .ok_or_else(|| CacheError::NotFound(uri.clone()))?;
        entry.pending.cancel();
        debug!(%uri, "document closed");
        Ok(())
    }

    pub async fn get(&self, uri: &Url) -> Result<Arc<Document>, CacheError> {
        self.entries
            .read()
            .await
            .get(uri)
            .map(|entry| entry.document.clone())
            .ok_or_else(|| CacheError::NotFound(uri.clone()))
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

async fn compile(
    uri: Url,
    version: i32,
    kind: DocumentKind,
    text: String,
    token: CancellationToken,
) -> Result<Arc<Document>, CacheError> {
    let task_uri = uri.clone();
    let joined = tokio::task::spawn_blocking(move || {
        Document::compile(task_uri, version, kind, text, &token)
    })
    .await;
    match joined {
        Ok(Ok(document)) => Ok(Arc::new(document)),
        Ok(Err(Cancelled)) => Err(CacheError::Cancelled(uri)),
        Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
        Err(_) => Err(CacheError::Cancelled(uri)),
    }
}
