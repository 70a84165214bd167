//! Upload-boundary byte decoding.
//!
//! Uploaded files arrive as raw bytes with no declared charset. Each
//! document is decoded by walking a fixed, ordered ladder of candidate
//! encodings; the first one that decodes without errors wins. Failure is
//! per-document and never aborts the rest of a batch.

use encoding_rs::Encoding;

use crate::error::RagError;
use crate::models::Document;

/// Candidate encodings, tried in order. WHATWG labels, resolved through
/// `encoding_rs`; `gb2312` folds into GBK per the Encoding Standard.
pub const CANDIDATE_ENCODINGS: [&str; 5] = ["utf-8", "big5", "gbk", "gb2312", "latin1"];

/// Decode raw bytes into text, returning the text and the canonical name
/// of the winning encoding.
///
/// A candidate succeeds only if it decodes without errors and the result
/// contains no NUL character. The NUL screen matters because the Latin-1
/// tail of the ladder maps every byte; without it, binary uploads would
/// always "decode".
pub fn decode_bytes(bytes: &[u8]) -> Option<(String, &'static str)> {
    for label in CANDIDATE_ENCODINGS {
        let Some(encoding) = Encoding::for_label(label.as_bytes()) else {
            continue;
        };
        let (text, used, had_errors) = encoding.decode(bytes);
        if had_errors || text.contains('\0') {
            continue;
        }
        return Some((text.into_owned(), used.name()));
    }
    None
}

/// Decode one uploaded file into a [`Document`].
pub fn decode_document(name: &str, bytes: &[u8]) -> Result<Document, RagError> {
    match decode_bytes(bytes) {
        Some((body, encoding)) => Ok(Document {
            name: name.to_string(),
            body,
            encoding,
        }),
        None => Err(RagError::Decode {
            filename: name.to_string(),
        }),
    }
}
