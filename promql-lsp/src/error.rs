use lsp_types::Url;
use promql_analysis::PositionError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("document {0} is not open")]
    NotFound(Url),
    #[error("version {received} of {uri} is not newer than version {current}")]
    VersionConflict {
        uri: Url,
        current: i32,
        received: i32,
    },
    #[error("compilation of {0} was cancelled")]
    Cancelled(Url),
}

/// Failures talking to the Prometheus server. The metadata cache keeps serving its last
/// snapshot whenever one of these occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("prometheus at {url} is unreachable: {message}")]
    SourceUnreachable { url: String, message: String },
    #[error("invalid prometheus url: {0}")]
    InvalidUrl(String),
    #[error("failed to decode response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("metadata refresh was cancelled")]
    Cancelled,
    #[error("metadata source changed during refresh")]
    Superseded,
}

/// Errors of the read operations of the language service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Position(#[from] PositionError),
}
