//! Per-document vector index produced right after embedding one source document.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::constants::{
    LOCAL_INDEX_EXTENSION, LOCAL_INDEX_PREFIX, LOCAL_METADATA_PREFIX, LOCAL_STORE_EXTENSION,
    LOCAL_STORE_PREFIX,
};
use crate::error::{DocvecError, Result};
use crate::io::{
    StagedCommit, encode_docstore, encode_metadata, encode_vec_index, read_docstore,
    read_vec_index,
};
use crate::store::{Docstore, VecIndex};
use crate::types::{MetadataRecord, Segment};

/// File locations of one local index, derived from its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIndexPaths {
    pub name: String,
    pub index_path: PathBuf,
    pub store_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl LocalIndexPaths {
    #[must_use]
    pub fn for_name(dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            index_path: dir.join(format!("{LOCAL_INDEX_PREFIX}{name}{LOCAL_INDEX_EXTENSION}")),
            store_path: dir.join(format!("{LOCAL_STORE_PREFIX}{name}{LOCAL_STORE_EXTENSION}")),
            metadata_path: dir.join(format!("{LOCAL_METADATA_PREFIX}{name}.json")),
        }
    }

    /// Recovers the paths from a `local_index_<name>.vecindex` file name.
    #[must_use]
    pub fn from_index_file(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?;
        let name = file_name
            .strip_prefix(LOCAL_INDEX_PREFIX)?
            .strip_suffix(LOCAL_INDEX_EXTENSION)?;
        if name.is_empty() {
            return None;
        }
        let dir = path.parent().unwrap_or_else(|| Path::new(""));
        Some(Self::for_name(dir, name))
    }

    /// File name of the vector index, used as the source label in merge summaries.
    #[must_use]
    pub fn index_file_name(&self) -> String {
        self.index_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone())
    }
}

#[derive(Debug, Clone)]
pub struct LocalIndex {
    pub name: String,
    pub vectors: VecIndex,
    pub docstore: Docstore,
}

impl LocalIndex {
    /// Pairs segment *i* with vector *i*. Docstore keys are fresh UUIDs; record ids are the
    /// per-document segment ids.
    pub fn build(name: &str, segments: &[Segment], vectors: VecIndex) -> Result<Self> {
        if segments.len() != vectors.len() {
            return Err(DocvecError::EmbeddingCountMismatch {
                inputs: segments.len(),
                outputs: vectors.len(),
            });
        }
        let mut docstore = Docstore::new();
        for (position, segment) in segments.iter().enumerate() {
            docstore.insert(
                position as u64,
                Uuid::new_v4().to_string(),
                MetadataRecord::from(segment),
            );
        }
        Ok(Self {
            name: name.to_string(),
            vectors,
            docstore,
        })
    }

    /// Loads the vector index and docstore; the metadata JSON is not needed and not read.
    pub fn open(paths: &LocalIndexPaths) -> Result<Self> {
        for (artifact, path) in [
            ("vector index", &paths.index_path),
            ("docstore", &paths.store_path),
        ] {
            if !path.is_file() {
                return Err(DocvecError::MissingLocalArtifact {
                    name: paths.name.clone(),
                    artifact,
                    path: path.clone(),
                });
            }
        }
        let vectors = read_vec_index(&paths.index_path)?;
        let docstore = read_docstore(&paths.store_path)?;
        docstore
            .check_alignment(vectors.len())
            .map_err(|err| err.in_context(&format!("local index `{}`", paths.name)))?;
        Ok(Self {
            name: paths.name.clone(),
            vectors,
            docstore,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Metadata records in vector-position order.
    #[must_use]
    pub fn records(&self) -> Vec<MetadataRecord> {
        self.docstore
            .entries()
            .filter_map(|(_, _, record)| record.cloned())
            .collect()
    }

    /// Writes the index, docstore, and metadata mirror into `dir` in one staged commit.
    pub fn write(&self, dir: &Path, segments: &[Segment]) -> Result<LocalIndexPaths> {
        fs_err::create_dir_all(dir)?;
        let paths = LocalIndexPaths::for_name(dir, &self.name);
        let mut staged = StagedCommit::new();
        staged.stage(&paths.index_path, &encode_vec_index(&self.vectors)?)?;
        staged.stage(&paths.store_path, &encode_docstore(&self.docstore)?)?;
        staged.stage(&paths.metadata_path, &encode_metadata(segments)?)?;
        staged.commit()?;
        tracing::info!(
            local_index = %self.name,
            vectors = self.vectors.len(),
            dir = ?dir,
            "local index written"
        );
        Ok(paths)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SegmentCategory;
    use tempfile::TempDir;

    fn segments(n: u64) -> Vec<Segment> {
        (1..=n)
            .map(|id| Segment {
                id,
                page: 1 + (id as u32) / 3,
                text: format!("customs guidance paragraph {id}"),
                source_file: "guide.pdf".into(),
                category: SegmentCategory::Paragraph,
                keyword: None,
            })
            .collect()
    }

    fn vectors(n: usize) -> VecIndex {
        let rows: Vec<Vec<f32>> = (0..n).map(|i| vec![i as f32 + 1.0; 4]).collect();
        VecIndex::from_vectors(4, &rows).expect("vectors")
    }

    #[test]
    fn paths_round_trip_through_file_name() {
        let paths = LocalIndexPaths::for_name(Path::new("/data/embedded"), "guide_2024");
        let recovered = LocalIndexPaths::from_index_file(&paths.index_path).expect("paths");
        assert_eq!(recovered, paths);
        assert!(LocalIndexPaths::from_index_file(Path::new("/x/other.vecindex")).is_none());
        assert!(LocalIndexPaths::from_index_file(Path::new("/x/local_index_.vecindex")).is_none());
    }

    #[test]
    fn build_requires_one_vector_per_segment() {
        let err = LocalIndex::build("guide", &segments(3), vectors(2)).expect_err("mismatch");
        assert!(matches!(
            err,
            DocvecError::EmbeddingCountMismatch {
                inputs: 3,
                outputs: 2
            }
        ));
    }

    #[test]
    fn written_index_reopens_with_same_records() {
        let dir = TempDir::new().expect("tempdir");
        let segs = segments(5);
        let local = LocalIndex::build("guide", &segs, vectors(5)).expect("build");
        let paths = local.write(dir.path(), &segs).expect("write");
        assert!(paths.metadata_path.is_file());

        let reopened = LocalIndex::open(&paths).expect("open");
        assert_eq!(reopened.len(), 5);
        let ids: Vec<u64> = reopened.records().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(reopened.vectors, local.vectors);
    }

    #[test]
    fn missing_docstore_is_reported_by_name() {
        let dir = TempDir::new().expect("tempdir");
        let segs = segments(2);
        let local = LocalIndex::build("guide", &segs, vectors(2)).expect("build");
        let paths = local.write(dir.path(), &segs).expect("write");
        fs_err::remove_file(&paths.store_path).expect("remove");

        match LocalIndex::open(&paths).expect_err("missing") {
            DocvecError::MissingLocalArtifact { name, artifact, .. } => {
                assert_eq!(name, "guide");
                assert_eq!(artifact, "docstore");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
