//! Flat inner-product vector index.
//!
//! Append-only similarity index over embedded vectors: an exhaustive
//! inner-product scan over packed rows, with an explicit integer doc id
//! per entry (the join key into the metadata store). Inner product is
//! cosine-equivalent because the embedder normalizes every vector.
//!
//! Durability is a single binary artifact: a small header (magic,
//! format version, dimension, entry count) followed by the id table and
//! the packed little-endian `f32` rows. The artifact and the metadata
//! file are deleted together on `clear`.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use crate::error::RagError;

const MAGIC: [u8; 4] = *b"RAGX";
const FORMAT_VERSION: u32 = 1;

pub struct VectorIndex {
    path: PathBuf,
    dim: Option<usize>,
    doc_ids: Vec<i64>,
    /// Packed row-major vector data, `doc_ids.len() * dim` floats.
    vectors: Vec<f32>,
}

impl VectorIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dim: None,
            doc_ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    /// Create or reopen an index of the declared dimension.
    ///
    /// Reopens the persisted artifact when one exists; a dimension
    /// mismatch against the artifact is a configuration error caught
    /// here, not at search time. Idempotent for a matching dimension.
    pub fn init(&mut self, dim: usize) -> Result<(), RagError> {
        match self.dim {
            Some(existing) if existing == dim => Ok(()),
            Some(existing) => Err(RagError::DimensionMismatch {
                expected: existing,
                actual: dim,
            }),
            None => {
                if self.path.exists() {
                    self.load_artifact(dim)
                } else {
                    self.dim = Some(dim);
                    Ok(())
                }
            }
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dim
    }

    pub fn entry_count(&self) -> usize {
        self.doc_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_ids.is_empty()
    }

    /// Append one vector. Rejects a dimension mismatch.
    pub fn add(&mut self, doc_id: i64, vector: &[f32]) -> Result<(), RagError> {
        let dim = self.dim.ok_or(RagError::IndexNotInitialized)?;
        if vector.len() != dim {
            return Err(RagError::DimensionMismatch {
                expected: dim,
                actual: vector.len(),
            });
        }
        self.doc_ids.push(doc_id);
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    /// Exhaustive inner-product search, highest similarity first.
    ///
    /// Returns at most `k` entries; an index holding fewer than `k`
    /// returns everything it has, and an empty index returns an empty
    /// list. Ties break on ascending doc id for determinism.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(i64, f32)>, RagError> {
        let dim = self.dim.ok_or(RagError::IndexNotInitialized)?;
        if query.len() != dim {
            return Err(RagError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }
        if self.doc_ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(i64, f32)> = self
            .doc_ids
            .iter()
            .enumerate()
            .map(|(row, &doc_id)| {
                let offset = row * dim;
                let score = self.vectors[offset..offset + dim]
                    .iter()
                    .zip(query)
                    .map(|(a, b)| a * b)
                    .sum();
                (doc_id, score)
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Write the artifact. Temp-file-and-rename, so a crash mid-write
    /// cannot leave a torn artifact beside live metadata.
    pub fn persist(&self) -> Result<(), RagError> {
        let dim = self.dim.ok_or(RagError::IndexNotInitialized)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            writer.write_all(&MAGIC)?;
            writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
            writer.write_all(&(dim as u32).to_le_bytes())?;
            writer.write_all(&(self.doc_ids.len() as u64).to_le_bytes())?;
            for doc_id in &self.doc_ids {
                writer.write_all(&doc_id.to_le_bytes())?;
            }
            for value in &self.vectors {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Drop all entries and delete the artifact. Leaves the index
    /// uninitialized: `add` is valid only after a fresh `init`.
    /// Idempotent, including on a never-initialized index.
    pub fn clear(&mut self) -> Result<(), RagError> {
        self.dim = None;
        self.doc_ids.clear();
        self.vectors.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn corrupt(&self, reason: &str) -> RagError {
        RagError::CorruptArtifact {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }

    fn load_artifact(&mut self, expected_dim: usize) -> Result<(), RagError> {
        let mut reader = BufReader::new(File::open(&self.path)?);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|_| self.corrupt("truncated header"))?;
        if magic != MAGIC {
            return Err(self.corrupt("bad magic"));
        }

        let version = read_u32(&mut reader).map_err(|_| self.corrupt("truncated header"))?;
        if version != FORMAT_VERSION {
            return Err(self.corrupt(&format!("unsupported format version {version}")));
        }

        let dim = read_u32(&mut reader).map_err(|_| self.corrupt("truncated header"))? as usize;
        if dim != expected_dim {
            return Err(RagError::DimensionMismatch {
                expected: expected_dim,
                actual: dim,
            });
        }

        let count = read_u64(&mut reader).map_err(|_| self.corrupt("truncated header"))? as usize;

        let mut doc_ids = Vec::with_capacity(count);
        for _ in 0..count {
            doc_ids.push(read_i64(&mut reader).map_err(|_| self.corrupt("truncated id table"))?);
        }

        let mut vectors = vec![0.0f32; count * dim];
        for slot in vectors.iter_mut() {
            *slot = read_f32(&mut reader).map_err(|_| self.corrupt("truncated vector data"))?;
        }

        self.dim = Some(dim);
        self.doc_ids = doc_ids;
        self.vectors = vectors;
        Ok(())
    }
}

fn read_u32(reader: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(reader: &mut impl Read) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_i64(reader: &mut impl Read) -> std::io::Result<i64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_f32(reader: &mut impl Read) -> std::io::Result<f32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_index() -> (tempfile::TempDir, VectorIndex) {
        let dir = tempfile::tempdir().unwrap();
        let index = VectorIndex::new(dir.path().join("index.bin"));
        (dir, index)
    }

    #[test]
    fn test_search_monotonic_scores() {
        let (_dir, mut index) = temp_index();
        index.init(2).unwrap();
        index.add(0, &[1.0, 0.0]).unwrap();
        index.add(1, &[0.0, 1.0]).unwrap();
        index.add(2, &[0.7, 0.7]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
        assert_eq!(hits[0].0, 0);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let (_dir, mut index) = temp_index();
        index.init(2).unwrap();
        index.add(0, &[1.0, 0.0]).unwrap();
        index.add(1, &[0.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 50).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_empty_index() {
        let (_dir, mut index) = temp_index();
        index.init(4).unwrap();
        assert!(index.search(&[0.0; 4], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_before_init_fails() {
        let (_dir, index) = temp_index();
        assert!(matches!(
            index.search(&[1.0, 0.0], 5),
            Err(RagError::IndexNotInitialized)
        ));
    }

    #[test]
    fn test_add_dimension_mismatch() {
        let (_dir, mut index) = temp_index();
        index.init(3).unwrap();
        let err = index.add(0, &[1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_add_after_clear_requires_init() {
        let (_dir, mut index) = temp_index();
        index.init(2).unwrap();
        index.add(0, &[1.0, 0.0]).unwrap();
        index.clear().unwrap();
        assert!(matches!(
            index.add(1, &[1.0, 0.0]),
            Err(RagError::IndexNotInitialized)
        ));
        index.init(2).unwrap();
        index.add(1, &[1.0, 0.0]).unwrap();
        assert_eq!(index.entry_count(), 1);
    }

    #[test]
    fn test_persist_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");

        let mut index = VectorIndex::new(&path);
        index.init(2).unwrap();
        index.add(7, &[0.6, 0.8]).unwrap();
        index.add(9, &[1.0, 0.0]).unwrap();
        index.persist().unwrap();

        let mut reopened = VectorIndex::new(&path);
        reopened.init(2).unwrap();
        assert_eq!(reopened.entry_count(), 2);
        let hits = reopened.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].0, 9);
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reopen_dimension_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");

        let mut index = VectorIndex::new(&path);
        index.init(4).unwrap();
        index.add(0, &[0.5; 4]).unwrap();
        index.persist().unwrap();

        let mut reopened = VectorIndex::new(&path);
        assert!(matches!(
            reopened.init(8),
            Err(RagError::DimensionMismatch {
                expected: 8,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_clear_idempotent() {
        let (_dir, mut index) = temp_index();
        // Never initialized, no artifact on disk
        index.clear().unwrap();
        index.clear().unwrap();

        index.init(2).unwrap();
        index.add(0, &[1.0, 0.0]).unwrap();
        index.persist().unwrap();
        index.clear().unwrap();
        index.clear().unwrap();
        assert_eq!(index.entry_count(), 0);
        assert!(index.dimension().is_none());
    }

    #[test]
    fn test_clear_deletes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");

        let mut index = VectorIndex::new(&path);
        index.init(2).unwrap();
        index.add(0, &[1.0, 0.0]).unwrap();
        index.persist().unwrap();
        assert!(path.exists());

        index.clear().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_bad_magic_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        fs::write(&path, b"not an index artifact").unwrap();

        let mut index = VectorIndex::new(&path);
        assert!(matches!(
            index.init(2),
            Err(RagError::CorruptArtifact { .. })
        ));
    }
}
