//! Query-time retrieval and prioritization.
//!
//! Embeds the query, over-fetches from the index, resolves each hit
//! through the metadata store, optionally moves hits from the most
//! recently uploaded file to the front, and truncates to the final
//! context size. An empty result means "no relevant context" and is
//! never an error.

use crate::config::RetrievalConfig;
use crate::error::RagError;
use crate::models::RetrievalHit;
use crate::pipeline::RagContext;

/// Generic query phrases that refer to the most recent upload.
const LAST_FILE_MARKERS: [&str; 2] = ["this file", "the last file"];

/// Retrieve ranked context for a query.
///
/// Does not mutate the index or the metadata store; the only side
/// effect is the embedding call (and lazily loading the embedder).
pub async fn retrieve(
    ctx: &mut RagContext,
    config: &RetrievalConfig,
    query: &str,
) -> Result<Vec<RetrievalHit>, RagError> {
    ctx.embedder.load()?;

    // Uninitialized and zero-entry indexes both mean "no context".
    if ctx.index.is_empty() {
        return Ok(Vec::new());
    }

    let query_vector = ctx.embedder.embed(query).await?;

    // Over-fetch so prioritization has room to reshuffle before the
    // final truncation.
    let overfetch = config.top_k.saturating_mul(config.overfetch_factor);
    let hits = ctx.index.search(&query_vector, overfetch)?;

    let mut resolved = Vec::with_capacity(hits.len());
    for (doc_id, score) in hits {
        match ctx.store.get(doc_id) {
            Some(record) => resolved.push(RetrievalHit {
                doc_id,
                score,
                source_filename: record.source_filename.clone(),
                text: record.text.clone(),
            }),
            None => {
                // Should not happen given the index/metadata parity
                // invariant; drop the hit rather than fail the query.
                tracing::warn!(doc_id, "search hit has no metadata record; dropping");
            }
        }
    }

    let mut ordered = prioritize(resolved, query, ctx.last_uploaded.as_deref());
    ordered.truncate(config.top_k);
    Ok(ordered)
}

/// Move hits from the most recent upload to the front when the query
/// refers to it, preserving each partition's score-descending order.
/// Otherwise the index ordering is returned untouched.
pub fn prioritize(
    hits: Vec<RetrievalHit>,
    query: &str,
    last_uploaded: Option<&str>,
) -> Vec<RetrievalHit> {
    let Some(last) = last_uploaded else {
        return hits;
    };
    if !refers_to_last_upload(query, last) {
        return hits;
    }

    let (mut prioritized, rest): (Vec<_>, Vec<_>) = hits
        .into_iter()
        .partition(|hit| hit.source_filename.eq_ignore_ascii_case(last));
    prioritized.extend(rest);
    prioritized
}

/// Keyword heuristic, not an intent classifier: a case-insensitive
/// substring match against the generic markers or the filename itself.
fn refers_to_last_upload(query: &str, last_uploaded: &str) -> bool {
    let query = query.to_lowercase();
    LAST_FILE_MARKERS.iter().any(|marker| query.contains(marker))
        || query.contains(last_uploaded.to_lowercase().as_str())
}
