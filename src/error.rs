//! Error taxonomy for the ingestion and retrieval pipeline.
//!
//! Per-document failures (decode, tabular parse) are collected by the
//! pipeline and never abort a batch. Configuration-class errors
//! (dimension mismatch, unloaded embedder, corrupt artifacts) are fatal
//! to the current operation and surfaced immediately.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    /// No candidate encoding produced clean text for this document.
    #[error("no candidate encoding could decode '{filename}'")]
    Decode { filename: String },

    /// `embed`/`embed_batch` called before `Embedder::load`.
    #[error("embedding model not loaded; call load() first")]
    EmbedderNotLoaded,

    /// A vector's dimension differs from the index's declared dimension.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// `add`/`search` called on an index with no prior `init`.
    #[error("vector index not initialized; call init() first")]
    IndexNotInitialized,

    /// A persisted artifact failed validation on reload.
    #[error("corrupt storage artifact at {path}: {reason}")]
    CorruptArtifact { path: PathBuf, reason: String },

    /// The embedding service rejected a request or returned a malformed
    /// response.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// A row-oriented document could not be parsed.
    #[error("tabular parse error in '{filename}': {source}")]
    Tabular {
        filename: String,
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("embedding request failed: {0}")]
    Http(#[from] reqwest::Error),
}
