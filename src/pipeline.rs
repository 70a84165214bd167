//! Ingestion pipeline orchestration.
//!
//! Coordinates the full upload flow: decode → threshold routing →
//! chunking → embedding → index/metadata storage. Small batches skip
//! retrieval entirely and keep their raw text for direct prompt
//! inclusion; larger batches are chunked, embedded, and indexed.
//!
//! Per-document failures are collected and reported; a single bad
//! document never aborts the rest of its batch.

use crate::chunk;
use crate::config::Config;
use crate::decode;
use crate::embedding::Embedder;
use crate::error::RagError;
use crate::index::VectorIndex;
use crate::models::{Document, FileReport, FileStatus, IngestionOutcome};
use crate::store::MetadataStore;

/// Approximate chars-per-token ratio for the threshold estimate.
const CHARS_PER_TOKEN: usize = 4;

/// One uploaded file, as handed over by the upload boundary.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Process-wide pipeline state: the embedder, the vector index, the
/// metadata store, the monotone doc-id counter, and per-session routing
/// state. One context per process, constructed explicitly and passed
/// to the pipeline and retriever.
pub struct RagContext {
    pub embedder: Embedder,
    pub index: VectorIndex,
    pub store: MetadataStore,
    next_doc_id: i64,
    /// Name of the most recently uploaded document, consulted by
    /// retrieval prioritization.
    pub last_uploaded: Option<String>,
    /// Whether the current corpus routes queries through retrieval.
    pub rag_enabled: bool,
    /// Raw decoded documents retained when the last batch fell below
    /// the RAG threshold. Session state, never persisted.
    pub raw_documents: Vec<Document>,
}

impl RagContext {
    /// Fresh context with empty stores. Nothing is read from disk.
    pub fn new(config: &Config) -> Self {
        Self {
            embedder: Embedder::new(config.embedding.clone()),
            index: VectorIndex::new(config.storage.index_path.clone()),
            store: MetadataStore::new(config.storage.metadata_path.clone()),
            next_doc_id: 0,
            last_uploaded: None,
            rag_enabled: false,
            raw_documents: Vec::new(),
        }
    }

    /// Reopen a context from persisted artifacts.
    ///
    /// Both artifacts present restores the corpus; both absent starts
    /// empty; one present without the other means a previous clear or
    /// persist was interrupted and is reported as corrupt state.
    pub fn open(config: &Config) -> Result<Self, RagError> {
        let index_exists = config.storage.index_path.exists();
        let metadata_exists = config.storage.metadata_path.exists();
        if index_exists != metadata_exists {
            let (present, absent) = if index_exists {
                (&config.storage.index_path, &config.storage.metadata_path)
            } else {
                (&config.storage.metadata_path, &config.storage.index_path)
            };
            return Err(RagError::CorruptArtifact {
                path: present.clone(),
                reason: format!("present without its sibling {}", absent.display()),
            });
        }

        let mut ctx = Self::new(config);
        if index_exists {
            ctx.index.init(config.embedding.dims)?;
            ctx.store.reload()?;
            if ctx.index.entry_count() != ctx.store.len() {
                return Err(RagError::CorruptArtifact {
                    path: config.storage.metadata_path.clone(),
                    reason: format!(
                        "index holds {} entries but metadata holds {} records",
                        ctx.index.entry_count(),
                        ctx.store.len()
                    ),
                });
            }
            ctx.rag_enabled = !ctx.index.is_empty();
            ctx.next_doc_id = ctx.store.max_doc_id().map_or(0, |max| max + 1);
        }
        Ok(ctx)
    }

    /// Clear the index and the metadata store together, preserving the
    /// entry-count parity invariant. Idempotent.
    pub fn clear(&mut self) -> Result<(), RagError> {
        self.index.clear()?;
        self.store.clear()?;
        self.rag_enabled = false;
        self.raw_documents.clear();
        Ok(())
    }

    /// (index entries, metadata records) — equal after any completed
    /// operation.
    pub fn counts(&self) -> (usize, usize) {
        (self.index.entry_count(), self.store.len())
    }
}

/// Deterministic, length-proportional token estimate used for the
/// RAG-activation threshold.
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Ingest one upload batch.
///
/// Every new batch replaces the prior corpus: both stores are cleared
/// up front, then the batch either stays raw (total token estimate
/// below the threshold) or is chunked, embedded, and indexed. Both
/// artifacts are persisted once, after the whole batch.
pub async fn ingest(
    ctx: &mut RagContext,
    config: &Config,
    files: &[UploadedFile],
) -> Result<IngestionOutcome, RagError> {
    ctx.embedder.load()?;

    let mut reports = Vec::with_capacity(files.len());
    let mut documents = Vec::new();
    for file in files {
        match decode::decode_document(&file.name, &file.bytes) {
            Ok(doc) => {
                tracing::debug!(file = %doc.name, encoding = doc.encoding, "decoded upload");
                documents.push(doc);
            }
            Err(err) => {
                tracing::warn!(file = %file.name, "decode failed: {err}");
                reports.push(FileReport {
                    filename: file.name.clone(),
                    status: FileStatus::Failed {
                        reason: err.to_string(),
                    },
                });
            }
        }
    }

    let total_token_estimate: usize = documents.iter().map(|d| estimate_tokens(&d.body)).sum();

    // A new batch always replaces prior corpus state, in both stores.
    ctx.clear()?;
    ctx.last_uploaded = documents.last().map(|d| d.name.clone());

    if total_token_estimate < config.ingestion.rag_token_threshold {
        tracing::info!(
            total_token_estimate,
            threshold = config.ingestion.rag_token_threshold,
            "batch below RAG threshold; retaining raw content"
        );
        for doc in &documents {
            reports.push(FileReport {
                filename: doc.name.clone(),
                status: FileStatus::RawRetained,
            });
        }
        ctx.raw_documents = documents;
        return Ok(IngestionOutcome {
            rag_enabled: false,
            total_token_estimate,
            chunks_indexed: 0,
            reports,
        });
    }

    ctx.rag_enabled = true;
    ctx.index.init(ctx.embedder.dims()?)?;

    let mut chunks_indexed = 0usize;
    for doc in &documents {
        let chunks = match chunk::split_document(doc, &config.chunking) {
            Ok(chunks) => chunks,
            Err(err) => {
                tracing::warn!(file = %doc.name, "chunking failed: {err}");
                reports.push(FileReport {
                    filename: doc.name.clone(),
                    status: FileStatus::Failed {
                        reason: err.to_string(),
                    },
                });
                continue;
            }
        };

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = ctx.embedder.embed_batch(&texts).await?;

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let doc_id = ctx.next_doc_id;
            ctx.index.add(doc_id, vector)?;
            ctx.store.put(
                doc_id,
                chunk.text.clone(),
                chunk.source_filename.clone(),
            );
            ctx.next_doc_id += 1;
        }

        tracing::info!(file = %doc.name, chunks = chunks.len(), "indexed document");
        chunks_indexed += chunks.len();
        reports.push(FileReport {
            filename: doc.name.clone(),
            status: FileStatus::Indexed {
                chunks: chunks.len(),
            },
        });
    }

    // One persist per batch, not per chunk, to bound I/O.
    ctx.index.persist()?;
    ctx.store.persist()?;

    Ok(IngestionOutcome {
        rag_enabled: true,
        total_token_estimate,
        chunks_indexed,
        reports,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(6000)), 1500);
    }

    #[test]
    fn test_estimate_tokens_counts_chars_not_bytes() {
        // Four CJK characters are one estimated token, like four ASCII.
        assert_eq!(estimate_tokens("文字測試"), 1);
    }
}
