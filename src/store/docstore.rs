//! Docstore plus the position → docstore-key mapping that ties it to a [`VecIndex`].
//!
//! [`VecIndex`]: super::VecIndex

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{DocvecError, Result};
use crate::types::MetadataRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Docstore {
    pub docstore: BTreeMap<String, MetadataRecord>,
    pub index_to_docstore_id: BTreeMap<u64, String>,
}

impl Docstore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records in the docstore.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docstore.len()
    }

    #[must_use]
    pub fn mapping_len(&self) -> usize {
        self.index_to_docstore_id.len()
    }

    pub fn insert(&mut self, position: u64, key: String, record: MetadataRecord) {
        self.index_to_docstore_id.insert(position, key.clone());
        self.docstore.insert(key, record);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&MetadataRecord> {
        self.docstore.get(key)
    }

    #[must_use]
    pub fn record_at(&self, position: u64) -> Option<&MetadataRecord> {
        self.index_to_docstore_id
            .get(&position)
            .and_then(|key| self.docstore.get(key))
    }

    /// Mapping entries in position order, each resolved to its record.
    pub fn entries(&self) -> impl Iterator<Item = (u64, &str, Option<&MetadataRecord>)> {
        self.index_to_docstore_id
            .iter()
            .map(|(position, key)| (*position, key.as_str(), self.docstore.get(key)))
    }

    /// Checks that the mapping covers exactly `0..vectors`, that every key resolves,
    /// and that no two positions share a key.
    pub fn check_alignment(&self, vectors: usize) -> Result<()> {
        if self.index_to_docstore_id.len() != vectors {
            return Err(DocvecError::corrupt(format!(
                "{} mapping entries for {} vectors",
                self.index_to_docstore_id.len(),
                vectors
            )));
        }
        if self.docstore.len() != vectors {
            return Err(DocvecError::corrupt(format!(
                "{} docstore records for {} vectors",
                self.docstore.len(),
                vectors
            )));
        }
        let mut seen = BTreeSet::new();
        for (expected, (position, key)) in self.index_to_docstore_id.iter().enumerate() {
            if *position != expected as u64 {
                return Err(DocvecError::corrupt(format!(
                    "vector position {expected} has no mapping entry"
                )));
            }
            if !self.docstore.contains_key(key) {
                return Err(DocvecError::corrupt(format!(
                    "position {position} maps to missing docstore key `{key}`"
                )));
            }
            if !seen.insert(key.as_str()) {
                return Err(DocvecError::corrupt(format!(
                    "docstore key `{key}` is mapped from more than one position"
                )));
            }
        }
        Ok(())
    }
}
