//! Metadata store: the join from index entries back to source text.
//!
//! One record per index entry, keyed by the same integer doc id space.
//! In memory the keys are integers; on disk they are the decimal string
//! form inside a JSON object, and reload refuses any key that does not
//! parse back to the original integer.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::RagError;
use crate::models::MetadataRecord;

#[derive(Serialize, Deserialize)]
struct RecordOnDisk {
    text: String,
    source_filename: String,
}

pub struct MetadataStore {
    path: PathBuf,
    records: BTreeMap<i64, MetadataRecord>,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: BTreeMap::new(),
        }
    }

    pub fn put(&mut self, doc_id: i64, text: String, source_filename: String) {
        self.records.insert(
            doc_id,
            MetadataRecord {
                doc_id,
                text,
                source_filename,
            },
        );
    }

    pub fn get(&self, doc_id: i64) -> Option<&MetadataRecord> {
        self.records.get(&doc_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest doc id present, used to resume monotone id assignment
    /// after a reload.
    pub fn max_doc_id(&self) -> Option<i64> {
        self.records.keys().next_back().copied()
    }

    /// Drop all records and delete the artifact. Idempotent.
    pub fn clear(&mut self) -> Result<(), RagError> {
        self.records.clear();
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write all records as a JSON object keyed by decimal doc id.
    /// Temp-file-and-rename so a crash cannot leave a torn artifact.
    pub fn persist(&self) -> Result<(), RagError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut on_disk = serde_json::Map::new();
        for (doc_id, record) in &self.records {
            on_disk.insert(
                doc_id.to_string(),
                serde_json::to_value(RecordOnDisk {
                    text: record.text.clone(),
                    source_filename: record.source_filename.clone(),
                })?,
            );
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(
            &tmp,
            serde_json::to_string_pretty(&serde_json::Value::Object(on_disk))?,
        )?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Load records from the artifact, replacing in-memory state.
    /// A missing artifact reloads as empty; a key that does not parse
    /// back to an integer is a corrupt artifact.
    pub fn reload(&mut self) -> Result<(), RagError> {
        if !self.path.exists() {
            self.records.clear();
            return Ok(());
        }

        let data = fs::read_to_string(&self.path)?;
        let parsed: BTreeMap<String, RecordOnDisk> = serde_json::from_str(&data)?;

        let mut records = BTreeMap::new();
        for (key, value) in parsed {
            let doc_id: i64 = key.parse().map_err(|_| RagError::CorruptArtifact {
                path: self.path.clone(),
                reason: format!("metadata key '{key}' is not an integer doc id"),
            })?;
            records.insert(
                doc_id,
                MetadataRecord {
                    doc_id,
                    text: value.text,
                    source_filename: value.source_filename,
                },
            );
        }

        self.records = records;
        Ok(())
    }
}
