//! Stateless HTTP adapter
//!
//! Every request carries a full query in `expr`. The adapter opens it as a throwaway document,
//! runs one operation on it and closes it again, so nothing survives between requests.
//!
//! ```text
//! GET /diagnostics?expr=<query>
//! GET /hover?expr=<query>&line=<n>&char=<n>
//! GET /completion?expr=<query>&line=<n>&char=<n>
//! ```

use crate::error::{CacheError, ServiceError};
use crate::service::LanguageService;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use lsp_types::{CompletionItem, Diagnostic, Hover, Position, Url};
use promql_analysis::CancellationToken;
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

type Params = HashMap<String, String>;

#[derive(Clone)]
pub struct RestState {
    service: Arc<LanguageService>,
    next_id: Arc<AtomicU64>,
}

impl RestState {
    pub fn new(service: Arc<LanguageService>) -> Self {
        Self {
            service,
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn next_uri(&self) -> Result<Url, RestError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Url::parse(&format!("inmemory:///{id}.promql"))
            .map_err(|err| RestError::Internal(err.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum RestError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Internal(String),
}

impl From<ServiceError> for RestError {
    fn from(error: ServiceError) -> Self {
        match error {
            ServiceError::Position(error) => RestError::BadRequest(error.to_string()),
            ServiceError::Cache(error) => RestError::Internal(error.to_string()),
        }
    }
}

impl From<CacheError> for RestError {
    fn from(error: CacheError) -> Self {
        RestError::Internal(error.to_string())
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = match self {
            RestError::BadRequest(_) => StatusCode::BAD_REQUEST,
            RestError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

pub fn router(state: RestState) -> Router {
    Router::new()
        .route("/diagnostics", get(diagnostics))
        .route("/hover", get(hover))
        .route("/completion", get(completion))
        .fallback(|| async { (StatusCode::NOT_FOUND, "Not found") })
        .with_state(state)
}

/// Serve the adapter on `port` until `shutdown` fires.
pub async fn serve(
    service: Arc<LanguageService>,
    port: u16,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "serving HTTP API");
    axum::serve(listener, router(RestState::new(service)))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

fn required<'a>(params: &'a Params, name: &str) -> Result<&'a str, RestError> {
    params
        .get(name)
        .map(String::as_str)
        .ok_or_else(|| RestError::BadRequest(format!("Param {name} is not specified")))
}

fn position(params: &Params) -> Result<Position, RestError> {
    let number = |name: &str| -> Result<u32, RestError> {
        required(params, name)?
            .trim()
            .parse()
            .map_err(|_| RestError::BadRequest(format!("Param {name} is not a valid number")))
    };
    Ok(Position::new(number("line")?, number("char")?))
}

/// Open `expr` as a throwaway document, run `operation` on it and close it again.
async fn with_document<T, F, Fut>(
    state: &RestState,
    params: &Params,
    operation: F,
) -> Result<T, RestError>
where
    F: FnOnce(Url) -> Fut,
    Fut: Future<Output = Result<T, RestError>>,
{
    let expr = required(params, "expr")?;
    let uri = state.next_uri()?;
    state
        .service
        .open(uri.clone(), 0, Some("promql"), expr.to_string())
        .await?;
    debug!(%uri, "request document opened");

    let guard = RequestDocument::new(state.service.clone(), uri.clone());
    let result = operation(uri).await;
    guard.close().await;
    result
}

/// Closes a request document, also when the request future is dropped half way.
struct RequestDocument {
    service: Arc<LanguageService>,
    uri: Option<Url>,
}

impl RequestDocument {
    fn new(service: Arc<LanguageService>, uri: Url) -> Self {
        Self {
            service,
            uri: Some(uri),
        }
    }

    async fn close(mut self) {
        if let Some(uri) = self.uri.take() {
            close_document(&self.service, &uri).await;
        }
    }
}

impl Drop for RequestDocument {
    fn drop(&mut self) {
        let Some(uri) = self.uri.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%uri, "no runtime left to close request document");
            return;
        };
        debug!(%uri, "request dropped, closing its document");
        let service = self.service.clone();
        runtime.spawn(async move { close_document(&service, &uri).await });
    }
}

async fn close_document(service: &LanguageService, uri: &Url) {
    if let Err(error) = service.close(uri).await {
        warn!(%error, "request document was already closed");
    }
}

async fn diagnostics(
    State(state): State<RestState>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<Diagnostic>>, RestError> {
    let service = state.service.clone();
    with_document(&state, &params, |uri| async move {
        Ok(service.diagnostics(&uri).await?)
    })
    .await
    .map(Json)
}

async fn hover(
    State(state): State<RestState>,
    Query(params): Query<Params>,
) -> Result<Json<Option<Hover>>, RestError> {
    required(&params, "expr")?;
    let position = position(&params)?;
    let service = state.service.clone();
    with_document(&state, &params, |uri| async move {
        Ok(service.hover(&uri, position).await?)
    })
    .await
    .map(Json)
}

async fn completion(
    State(state): State<RestState>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<CompletionItem>>, RestError> {
    required(&params, "expr")?;
    let position = position(&params)?;
    let service = state.service.clone();
    with_document(&state, &params, |uri| async move {
        Ok(service.completion(&uri, position).await?.items)
    })
    .await
    .map(Json)
}
