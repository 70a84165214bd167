//! Document chunking.
//!
//! Free-running text is split into bounded, overlapping windows whose
//! cut points prefer natural boundaries (paragraph, line, sentence,
//! word) over hard character cuts. Row-oriented documents (CSV) are
//! split one chunk per data row, each row rendered as a JSON object
//! that preserves header order.
//!
//! Chunking is a pure function of the document text and configuration.

use crate::config::ChunkingConfig;
use crate::error::RagError;
use crate::models::{Chunk, ChunkOrigin, Document};

/// Cut-point separators, in priority order.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Split a document according to its shape: row-oriented files go
/// through the tabular path, everything else through the free-text
/// window splitter.
pub fn split_document(doc: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, RagError> {
    if is_tabular(&doc.name) {
        split_rows(doc, config)
    } else {
        Ok(free_text_chunks(doc, config))
    }
}

/// Whether a filename declares a row-oriented document.
pub fn is_tabular(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".csv")
}

/// Split text into windows of at most `max_chunk_size` characters, with
/// exactly `overlap` characters repeated between consecutive windows.
///
/// Each window's end is the latest separator occurrence past the
/// progress floor (the greater of `overlap` and half the window);
/// absent any usable separator the window is cut hard at the size
/// limit. Indices are character positions, never bytes, so multi-byte
/// text cannot be split inside a code point.
pub fn split_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let max = config.max_chunk_size;
    let overlap = config.overlap;

    if text.trim().is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    if total <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end_limit = start + max;
        if end_limit >= total {
            chunks.push(chars[start..total].iter().collect());
            break;
        }

        let window: String = chars[start..end_limit].iter().collect();
        let cut = find_cut(&window, max, overlap);
        let end = start + cut;
        chunks.push(chars[start..end].iter().collect::<String>());
        start = end - overlap;
    }

    chunks
}

/// Pick the cut point for one window, in characters.
fn find_cut(window: &str, max: usize, overlap: usize) -> usize {
    // Floor guarantees forward progress (cut > overlap) and keeps
    // windows reasonably full.
    let floor = overlap.max(max / 2);
    for sep in SEPARATORS {
        if let Some(byte_idx) = window.rfind(sep) {
            let cut = window[..byte_idx].chars().count() + sep.chars().count();
            if cut > floor {
                return cut;
            }
        }
    }
    max
}

fn free_text_chunks(doc: &Document, config: &ChunkingConfig) -> Vec<Chunk> {
    split_text(&doc.body, config)
        .into_iter()
        .map(|text| Chunk {
            text,
            source_filename: doc.name.clone(),
            origin: ChunkOrigin::FreeText,
        })
        .collect()
}

/// One chunk per data row. Rows are atomic: a row longer than
/// `max_chunk_size` is kept whole rather than split mid-record.
fn split_rows(doc: &Document, config: &ChunkingConfig) -> Result<Vec<Chunk>, RagError> {
    let mut reader = csv::ReaderBuilder::new().from_reader(doc.body.as_bytes());

    let headers = match reader.headers() {
        Ok(headers) => headers.clone(),
        Err(source) => {
            return Err(RagError::Tabular {
                filename: doc.name.clone(),
                source,
            })
        }
    };

    if headers.len() == 0 || headers.iter().all(|h| h.trim().is_empty()) {
        tracing::warn!(
            file = %doc.name,
            "row-oriented document has no usable header; falling back to free-text chunking"
        );
        return Ok(free_text_chunks(doc, config));
    }

    let mut chunks = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|source| RagError::Tabular {
            filename: doc.name.clone(),
            source,
        })?;

        let mut fields = serde_json::Map::new();
        for (name, value) in headers.iter().zip(record.iter()) {
            fields.insert(
                name.to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }

        chunks.push(Chunk {
            text: serde_json::Value::Object(fields).to_string(),
            source_filename: doc.name.clone(),
            // 1-based, counting the header row: first data row is 2.
            origin: ChunkOrigin::TabularRow { row_index: i + 2 },
        });
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(max_chunk_size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_size,
            overlap,
        }
    }

    fn doc(name: &str, body: &str) -> Document {
        Document {
            name: name.to_string(),
            body: body.to_string(),
            encoding: "UTF-8",
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = split_text("Hello, world!", &cfg(500, 100));
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_whitespace_only_no_chunks() {
        assert!(split_text("   \n\n  ", &cfg(500, 100)).is_empty());
        assert!(split_text("", &cfg(500, 100)).is_empty());
    }

    #[test]
    fn test_chunk_bound_holds() {
        let text = "word ".repeat(400);
        for (max, overlap) in [(500, 100), (64, 16), (7, 2)] {
            let chunks = split_text(&text, &cfg(max, overlap));
            assert!(chunks.len() > 1);
            for c in &chunks {
                let len = c.chars().count();
                assert!(len >= 1 && len <= max, "len {} out of bound for max {}", len, max);
            }
        }
    }

    #[test]
    fn test_exact_overlap_between_consecutive_chunks() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        let overlap = 24;
        let chunks = split_text(&text, &cfg(120, overlap));
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let prev: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            let tail: String = prev[prev.len() - overlap..].iter().collect();
            let head: String = next[..overlap].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn test_paragraph_boundary_preferred() {
        // The paragraph break sits in the second half of the first
        // window, so it should win over the later word boundaries.
        let text = format!("{}\n\n{}", "a".repeat(70), "b".repeat(200));
        let chunks = split_text(&text, &cfg(100, 10));
        assert!(chunks[0].ends_with("\n\n"), "chunk was {:?}", chunks[0]);
    }

    #[test]
    fn test_hard_cut_without_separators() {
        let text = "x".repeat(1000);
        let chunks = split_text(&text, &cfg(100, 20));
        assert_eq!(chunks[0].chars().count(), 100);
        for c in &chunks {
            assert!(c.chars().count() <= 100);
        }
    }

    #[test]
    fn test_multibyte_text_not_split_inside_code_points() {
        let text = "這是一段測試文字。".repeat(100);
        let chunks = split_text(&text, &cfg(50, 10));
        for c in &chunks {
            assert!(c.chars().count() <= 50);
        }
    }

    #[test]
    fn test_is_tabular_case_insensitive() {
        assert!(is_tabular("report.csv"));
        assert!(is_tabular("REPORT.CSV"));
        assert!(!is_tabular("report.txt"));
        assert!(!is_tabular("csv"));
    }

    #[test]
    fn test_tabular_round_trip() {
        let chunks = split_document(&doc("t.csv", "a,b\n1,2"), &cfg(500, 100)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].origin, ChunkOrigin::TabularRow { row_index: 2 });
        let parsed: serde_json::Value = serde_json::from_str(&chunks[0].text).unwrap();
        assert_eq!(parsed, serde_json::json!({"a": "1", "b": "2"}));
    }

    #[test]
    fn test_tabular_preserves_header_order() {
        let chunks = split_document(&doc("t.csv", "zeta,alpha\n1,2"), &cfg(500, 100)).unwrap();
        assert_eq!(chunks[0].text, r#"{"zeta":"1","alpha":"2"}"#);
    }

    #[test]
    fn test_tabular_row_numbering_counts_header() {
        let chunks = split_document(&doc("t.csv", "a,b\n1,2\n3,4\n5,6"), &cfg(500, 100)).unwrap();
        let rows: Vec<_> = chunks.iter().map(|c| c.origin.clone()).collect();
        assert_eq!(
            rows,
            vec![
                ChunkOrigin::TabularRow { row_index: 2 },
                ChunkOrigin::TabularRow { row_index: 3 },
                ChunkOrigin::TabularRow { row_index: 4 },
            ]
        );
    }

    #[test]
    fn test_blank_header_degrades_to_free_text() {
        let chunks = split_document(&doc("t.csv", ",\nsome,data"), &cfg(500, 100)).unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert_eq!(c.origin, ChunkOrigin::FreeText);
        }
    }

    #[test]
    fn test_ragged_row_fails_that_document() {
        let err = split_document(&doc("t.csv", "a,b\n1,2,3"), &cfg(500, 100)).unwrap_err();
        assert!(matches!(err, RagError::Tabular { .. }));
    }

    #[test]
    fn test_header_only_csv_yields_no_chunks() {
        let chunks = split_document(&doc("t.csv", "a,b\n"), &cfg(500, 100)).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_free_text_chunks_carry_source() {
        let chunks = split_document(&doc("notes.txt", "Some prose."), &cfg(500, 100)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source_filename, "notes.txt");
        assert_eq!(chunks[0].origin, ChunkOrigin::FreeText);
    }
}
