//! The combined, cross-document store: vector index, docstore, and JSON metadata mirror.
//!
//! The three files always describe the same generation. They are loaded together,
//! verified together, and replaced together through one journaled [`StagedCommit`].
//! A commit cut short between renames is rolled back by [`CombinedStore::recover`].

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::constants::{
    COMBINED_INDEX_FILE, COMBINED_JOURNAL_FILE, COMBINED_METADATA_FILE, COMBINED_STORE_FILE,
    MERGE_SUMMARY_FILE,
};
use crate::error::{DocvecError, Result};
use crate::io::{
    StagedCommit, encode_docstore, encode_metadata, encode_vec_index, read_docstore,
    read_metadata, read_vec_index,
};
use crate::store::{Docstore, VecIndex};
use crate::types::{MergeSummary, MetadataRecord, StoreStats};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedPaths {
    pub dir: PathBuf,
    pub index_path: PathBuf,
    pub store_path: PathBuf,
    pub metadata_path: PathBuf,
    pub summary_path: PathBuf,
    pub journal_path: PathBuf,
}

impl CombinedPaths {
    #[must_use]
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            index_path: dir.join(COMBINED_INDEX_FILE),
            store_path: dir.join(COMBINED_STORE_FILE),
            metadata_path: dir.join(COMBINED_METADATA_FILE),
            summary_path: dir.join(MERGE_SUMMARY_FILE),
            journal_path: dir.join(COMBINED_JOURNAL_FILE),
        }
    }

    fn members(&self) -> [&Path; 3] {
        [&self.index_path, &self.store_path, &self.metadata_path]
    }
}

#[derive(Debug, Clone)]
pub struct CombinedStore {
    paths: CombinedPaths,
    vectors: VecIndex,
    docstore: Docstore,
    metadata: Vec<MetadataRecord>,
}

impl CombinedStore {
    /// Empty in-memory store rooted at `dir`; nothing touches disk until [`commit`](Self::commit).
    pub fn create(dir: &Path, dimension: usize) -> Result<Self> {
        Ok(Self {
            paths: CombinedPaths::new(dir),
            vectors: VecIndex::new(dimension)?,
            docstore: Docstore::new(),
            metadata: Vec::new(),
        })
    }

    /// `true` when all three files exist, `false` when none do. Anything in between is a
    /// torn store and is reported as corruption rather than silently replaced.
    pub fn exists(dir: &Path) -> Result<bool> {
        let paths = CombinedPaths::new(dir);
        let missing: Vec<&Path> = paths
            .members()
            .into_iter()
            .filter(|path| !path.is_file())
            .collect();
        match missing.len() {
            0 => Ok(true),
            3 => Ok(false),
            _ => Err(DocvecError::corrupt(format!(
                "combined store in {} is incomplete; missing {:?}",
                dir.display(),
                missing
            ))),
        }
    }

    /// Loads and verifies an existing store.
    pub fn open(dir: &Path) -> Result<Self> {
        let paths = CombinedPaths::new(dir);
        let store = Self {
            vectors: read_vec_index(&paths.index_path)?,
            docstore: read_docstore(&paths.store_path)?,
            metadata: read_metadata(&paths.metadata_path)?,
            paths,
        };
        let stats = store.verify()?;
        tracing::debug!(
            dir = ?dir,
            vectors = stats.vectors,
            max_id = stats.max_id,
            "combined store opened"
        );
        Ok(store)
    }

    pub fn open_if_exists(dir: &Path) -> Result<Option<Self>> {
        if Self::exists(dir)? {
            Self::open(dir).map(Some)
        } else {
            Ok(None)
        }
    }

    #[must_use]
    pub fn paths(&self) -> &CombinedPaths {
        &self.paths
    }

    #[must_use]
    pub fn vectors(&self) -> &VecIndex {
        &self.vectors
    }

    #[must_use]
    pub fn docstore(&self) -> &Docstore {
        &self.docstore
    }

    #[must_use]
    pub fn metadata(&self) -> &[MetadataRecord] {
        &self.metadata
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Largest id in the metadata array, found by a full scan so that external edits to the
    /// JSON mirror are honoured. `0` for an empty store.
    #[must_use]
    pub fn max_id(&self) -> u64 {
        self.metadata.iter().map(|record| record.id).max().unwrap_or(0)
    }

    #[must_use]
    pub fn next_id(&self) -> u64 {
        self.max_id() + 1
    }

    /// Appends one record and its vector at the next position.
    pub fn push(&mut self, record: MetadataRecord, vector: &[f32]) -> Result<()> {
        let key = record.key();
        if self.docstore.get(&key).is_some() || self.metadata.iter().any(|r| r.id == record.id) {
            return Err(DocvecError::corrupt(format!(
                "id {} is already present in the combined store",
                record.id
            )));
        }
        let position = self.vectors.len() as u64;
        self.vectors.add(vector)?;
        self.docstore.insert(position, key, record.clone());
        self.metadata.push(record);
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            vectors: self.vectors.len(),
            docstore_entries: self.docstore.len(),
            mapping_entries: self.docstore.mapping_len(),
            metadata_records: self.metadata.len(),
            zero_vectors: self.vectors.zero_count(),
            max_id: self.max_id(),
            dimension: self.vectors.dimension(),
        }
    }

    /// Checks every cross-file invariant and returns the resulting sizes.
    pub fn verify(&self) -> Result<StoreStats> {
        let stats = self.stats();
        if stats.metadata_records != stats.vectors {
            return Err(DocvecError::corrupt(format!(
                "{} metadata records for {} vectors",
                stats.metadata_records, stats.vectors
            )));
        }
        self.docstore.check_alignment(stats.vectors)?;
        for (key, record) in &self.docstore.docstore {
            if *key != record.key() {
                return Err(DocvecError::corrupt(format!(
                    "docstore key `{key}` holds record id {}",
                    record.id
                )));
            }
        }
        let mut ids = BTreeSet::new();
        for record in &self.metadata {
            if !ids.insert(record.id) {
                return Err(DocvecError::corrupt(format!(
                    "metadata id {} appears more than once",
                    record.id
                )));
            }
            if self.docstore.get(&record.key()).is_none() {
                return Err(DocvecError::corrupt(format!(
                    "metadata id {} has no docstore record",
                    record.id
                )));
            }
        }
        Ok(stats)
    }

    /// Replaces the on-disk generation with this one. The summary, when given, rides along
    /// in the same staged commit; without one, any summary left from an earlier
    /// generation is removed in that commit.
    pub fn commit(&self, summary: Option<&MergeSummary>) -> Result<()> {
        self.staged(summary)?.commit()?;
        tracing::info!(
            dir = ?self.paths.dir,
            vectors = self.vectors.len(),
            max_id = self.max_id(),
            "combined store committed"
        );
        Ok(())
    }

    /// Restores the last complete generation in `dir` if a commit was interrupted while
    /// renaming its files. Writers call this under the store lock before opening.
    pub fn recover(dir: &Path) -> Result<bool> {
        let recovered = StagedCommit::recover(&CombinedPaths::new(dir).journal_path)?;
        if recovered {
            tracing::warn!(dir = ?dir, "combined store rolled back to its previous generation");
        }
        Ok(recovered)
    }

    fn staged(&self, summary: Option<&MergeSummary>) -> Result<StagedCommit> {
        fs_err::create_dir_all(&self.paths.dir)?;
        let mut staged = StagedCommit::journaled(&self.paths.journal_path);
        staged.stage(&self.paths.index_path, &encode_vec_index(&self.vectors)?)?;
        staged.stage(&self.paths.store_path, &encode_docstore(&self.docstore)?)?;
        staged.stage(&self.paths.metadata_path, &encode_metadata(&self.metadata)?)?;
        match summary {
            Some(summary) => {
                let mut bytes = serde_json::to_vec_pretty(summary)?;
                bytes.push(b'\n');
                staged.stage(&self.paths.summary_path, &bytes)?;
            }
            None => staged.stage_removal(&self.paths.summary_path),
        }
        Ok(staged)
    }

    #[cfg(test)]
    pub(crate) fn commit_interrupted(
        &self,
        summary: Option<&MergeSummary>,
        renames: usize,
    ) -> Result<()> {
        self.staged(summary)?.commit_interrupted(renames)
    }

    pub(crate) fn into_parts(self) -> (CombinedPaths, VecIndex, Docstore, Vec<MetadataRecord>) {
        (self.paths, self.vectors, self.docstore, self.metadata)
    }

    pub(crate) fn from_parts(
        paths: CombinedPaths,
        vectors: VecIndex,
        docstore: Docstore,
        metadata: Vec<MetadataRecord>,
    ) -> Self {
        Self {
            paths,
            vectors,
            docstore,
            metadata,
        }
    }
}
