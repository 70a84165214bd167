//! # RAG Harness
//!
//! A document ingestion and retrieval pipeline for chat assistants.
//!
//! RAG Harness takes uploaded documents, chunks them (with a dedicated
//! path for row-oriented data), embeds each chunk into a fixed-dimension
//! vector, and indexes the vectors for inner-product similarity search.
//! At query time it embeds the question, searches the index, resolves
//! hits back to their source text, and returns a ranked context list for
//! the caller's prompt construction. Batches too small to benefit from
//! retrieval skip indexing entirely and keep their raw text.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────┐   ┌─────────────────┐
//! │ Uploads  │──▶│     Pipeline       │──▶│  VectorIndex    │
//! │ (bytes)  │   │ Decode+Chunk+Embed │   │ + MetadataStore │
//! └──────────┘   └───────────────────┘   └───────┬─────────┘
//!                                                │
//!                    ┌───────────────────────────┤
//!                    ▼                           ▼
//!               ┌──────────┐              ┌──────────┐
//!               │Retriever │              │   CLI    │
//!               │ (ranked) │              │  (rag)   │
//!               └──────────┘              └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init                        # create the storage directory
//! rag ingest notes.txt data.csv   # decode, chunk, embed, index
//! rag query "what does this file say about deadlines?"
//! rag status                      # entry counts and parity
//! rag clear                       # drop both artifacts together
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`decode`] | Candidate-encoding byte decoding |
//! | [`chunk`] | Free-text and tabular chunking |
//! | [`embedding`] | Embedding model abstraction |
//! | [`index`] | Flat inner-product vector index |
//! | [`store`] | Doc-id-keyed metadata store |
//! | [`pipeline`] | Ingestion orchestration |
//! | [`retrieve`] | Search and prioritization |

pub mod chunk;
pub mod config;
pub mod decode;
pub mod embedding;
pub mod error;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod retrieve;
pub mod store;
