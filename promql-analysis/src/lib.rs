//! Editor analysis for PromQL documents
//!
//! Everything here works on immutable snapshots: a [`Document`] is compiled once from a text
//! version and a [`MetadataSnapshot`] is swapped in whole after every refresh. Completion,
//! hover and diagnostics are pure functions over the two, so the server layer only has to
//! decide which snapshot is current.
//!
//! Offsets are UTF-8 byte offsets into the full document text. The [`PositionMapper`] converts
//! them to and from protocol positions.

pub mod cancel;
pub mod completion;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod extract;
pub mod hover;
pub mod metadata;
pub mod position;

pub use cancel::CancellationToken;
pub use completion::{complete, CompletionResult, DEFAULT_MAX_ITEMS};
pub use document::{CompiledQuery, Document};
pub use error::{Cancelled, PositionError};
pub use extract::DocumentKind;
pub use hover::{hover, HoverInfo};
pub use metadata::{MetadataSnapshot, MetricMetadata, SnapshotBuilder};
pub use position::PositionMapper;
