//! PromQL language server
//!
//! Two front ends share one [`LanguageService`]:
//!
//!     - [`PromqlLanguageServer`] speaks LSP over stdin/stdout through tower-lsp. Documents
//!       are opened, changed and closed by the editor and diagnostics are pushed after every
//!       change.
//!     - [`rest`] exposes diagnostics, hover and completion over HTTP for one-off queries.
//!
//! Layout
//!
//!     - cache: open documents, versioned and compiled off the async runtime
//!     - metadata / prometheus: metric and label names fetched from a Prometheus server and
//!       refreshed in the background
//!     - service: the transport independent operations and the feature seam
//!     - server / rest: the two transports
//!
//! Analysis itself (completion, hover, diagnostics) lives in `promql-analysis`; this crate
//! only decides which document and which metadata snapshot a request sees.

pub mod cache;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod prometheus;
pub mod rest;
pub mod server;
pub mod service;

pub use error::{CacheError, MetadataError, ServiceError};
pub use metadata::MetadataService;
pub use server::{LspClient, PromqlLanguageServer};
pub use service::{DefaultFeatureProvider, FeatureProvider, LanguageService};
