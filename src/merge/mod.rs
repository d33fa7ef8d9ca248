//! Batch merge and extension of local indices into the combined store.
//!
//! Local indices are laid end to end. A running `prev_total` shifts each local position into
//! the combined position space, and a running `doc_counter` hands out the sequential ids that
//! replace the local UUID keys. Vectors are copied through untouched.

mod validate;

use std::path::Path;

use chrono::Local;
use tracing::instrument;

use crate::constants::LOCAL_INDEX_EXTENSION;
use crate::error::{DocvecError, Result};
use crate::lock::StoreLock;
use crate::store::{CombinedStore, LocalIndex, LocalIndexPaths};
use crate::types::{MergeOptions, MergeReport, MergeSummary, ValidationReport};

pub use validate::validate_merge;
use validate::validate_against;

/// Lists the local indices in `dir`, sorted by file name so id assignment is reproducible.
pub fn discover_local_indices(dir: &Path) -> Result<Vec<LocalIndexPaths>> {
    let mut found = Vec::new();
    for entry in fs_err::read_dir(dir)? {
        let path = entry?.path();
        let is_index = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(LOCAL_INDEX_EXTENSION));
        if !is_index || !path.is_file() {
            continue;
        }
        match LocalIndexPaths::from_index_file(&path) {
            Some(paths) => found.push(paths),
            None => tracing::debug!(file = ?path, "ignoring vector index without local prefix"),
        }
    }
    if found.is_empty() {
        return Err(DocvecError::NoLocalIndices {
            dir: dir.to_path_buf(),
        });
    }
    found.sort_by(|a, b| a.index_path.cmp(&b.index_path));
    tracing::info!(dir = ?dir, count = found.len(), "local indices discovered");
    Ok(found)
}

/// Merges `sources` into a new in-memory combined store rooted at `combined_dir`.
///
/// Nothing is written; the caller validates and commits.
pub fn merge_local_indices(
    sources: &[LocalIndexPaths],
    combined_dir: &Path,
) -> Result<CombinedStore> {
    let locals = open_all(sources, combined_dir)?;
    let dimension = locals[0].vectors.dimension();
    let base = CombinedStore::create(combined_dir, dimension)?;
    merge_into(base, &locals)
}

/// Full batch merge of every local index in `embedded_dir`, replacing any combined store in
/// `combined_dir`.
#[instrument(
    target = "docvec::merge",
    skip_all,
    fields(embedded = %embedded_dir.display(), combined = %combined_dir.display())
)]
pub fn merge_directory(
    embedded_dir: &Path,
    combined_dir: &Path,
    options: &MergeOptions,
) -> Result<MergeReport> {
    let sources = discover_local_indices(embedded_dir)?;
    let _lock = StoreLock::acquire(combined_dir, &options.lock)?;
    CombinedStore::recover(combined_dir)?;
    if matches!(CombinedStore::exists(combined_dir), Ok(true) | Err(_)) {
        tracing::warn!(dir = ?combined_dir, "replacing existing combined store");
    }
    batch_merge(&sources, combined_dir, options)
}

/// Merges further local indices into an existing combined store. Ids continue from the
/// store's current maximum; an absent store makes this a plain batch merge.
#[instrument(
    target = "docvec::merge",
    skip_all,
    fields(combined = %combined_dir.display(), sources = sources.len())
)]
pub fn extend_store(
    combined_dir: &Path,
    sources: &[LocalIndexPaths],
    options: &MergeOptions,
) -> Result<MergeReport> {
    let _lock = StoreLock::acquire(combined_dir, &options.lock)?;
    CombinedStore::recover(combined_dir)?;
    let Some(existing) = CombinedStore::open_if_exists(combined_dir)? else {
        tracing::info!(dir = ?combined_dir, "no combined store yet; running batch merge");
        return batch_merge(sources, combined_dir, options);
    };

    let baseline = (existing.len(), existing.docstore().len());
    let first_id = existing.next_id();
    let locals = open_all(sources, combined_dir)?;
    let merged = merge_into(existing, &locals)?;
    let validation = validate_against(sources, baseline, &merged)?;
    finish(merged, sources, first_id, validation, options)
}

fn batch_merge(
    sources: &[LocalIndexPaths],
    combined_dir: &Path,
    options: &MergeOptions,
) -> Result<MergeReport> {
    let merged = merge_local_indices(sources, combined_dir)?;
    let validation = validate_merge(sources, &merged)?;
    finish(merged, sources, 1, validation, options)
}

fn finish(
    merged: CombinedStore,
    sources: &[LocalIndexPaths],
    first_id: u64,
    validation: ValidationReport,
    options: &MergeOptions,
) -> Result<MergeReport> {
    let stats = merged.verify()?;
    let source_files: Vec<String> = sources.iter().map(LocalIndexPaths::index_file_name).collect();
    let summary = options.write_summary.then(|| MergeSummary {
        total_documents: stats.metadata_records,
        total_vectors: stats.vectors,
        source_files: source_files.clone(),
        created_at: Local::now().to_rfc3339(),
        documents: merged.metadata().to_vec(),
    });
    merged.commit(summary.as_ref())?;

    tracing::info!(
        sources = sources.len(),
        first_id,
        last_id = stats.max_id,
        total = stats.vectors,
        "merge committed"
    );
    Ok(MergeReport {
        combined_dir: merged.paths().dir.clone(),
        source_files,
        first_id,
        last_id: stats.max_id,
        validation,
        stats,
    })
}

/// Opens every source; an empty source list is an error, not an empty merge.
fn open_all(sources: &[LocalIndexPaths], combined_dir: &Path) -> Result<Vec<LocalIndex>> {
    if sources.is_empty() {
        return Err(DocvecError::NoLocalIndices {
            dir: combined_dir.to_path_buf(),
        });
    }
    sources.iter().map(LocalIndex::open).collect()
}

fn merge_into(base: CombinedStore, locals: &[LocalIndex]) -> Result<CombinedStore> {
    let mut doc_counter = base.next_id();
    let (paths, mut vectors, mut docstore, mut metadata) = base.into_parts();
    let mut prev_total = vectors.len() as u64;

    for local in locals {
        vectors.append(&local.vectors).inspect_err(|err| {
            tracing::error!(local_index = %local.name, error = %err, "dimension mismatch");
        })?;
        for (local_position, key, record) in local.docstore.entries() {
            let record = record.ok_or_else(|| {
                DocvecError::corrupt(format!(
                    "local index `{}`: position {local_position} maps to missing key `{key}`",
                    local.name
                ))
            })?;
            let merged = record.with_id(doc_counter);
            docstore.insert(prev_total + local_position, merged.key(), merged.clone());
            metadata.push(merged);
            doc_counter += 1;
        }
        tracing::debug!(
            local_index = %local.name,
            vectors = local.len(),
            offset = prev_total,
            "local index merged"
        );
        prev_total += local.len() as u64;
    }

    Ok(CombinedStore::from_parts(paths, vectors, docstore, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{encode_docstore, read_docstore};
    use crate::store::VecIndex;
    use crate::types::{LockSettings, Segment, SegmentCategory};
    use tempfile::TempDir;

    const DIM: usize = 3;

    fn write_local(dir: &Path, name: &str, n: u64, dim: usize) -> LocalIndexPaths {
        let segments: Vec<Segment> = (1..=n)
            .map(|id| Segment {
                id,
                page: id as u32,
                text: format!("{name} clause {id} on origin rules"),
                source_file: format!("{name}.pdf"),
                category: SegmentCategory::Paragraph,
                keyword: None,
            })
            .collect();
        let rows: Vec<Vec<f32>> = (1..=n).map(|id| vec![id as f32; dim]).collect();
        let vectors = VecIndex::from_vectors(dim, &rows).expect("vectors");
        LocalIndex::build(name, &segments, vectors)
            .expect("build")
            .write(dir, &segments)
            .expect("write")
    }

    fn options() -> MergeOptions {
        MergeOptions {
            lock: LockSettings {
                timeout_ms: 200,
                poll_ms: 5,
            },
            write_summary: true,
        }
    }

    #[test]
    fn discovery_is_sorted_and_ignores_other_files() {
        let dir = TempDir::new().expect("tempdir");
        write_local(dir.path(), "b_second", 1, DIM);
        write_local(dir.path(), "a_first", 1, DIM);
        fs_err::write(dir.path().join("notes.vecindex"), b"junk").expect("write");
        fs_err::write(dir.path().join("readme.txt"), b"junk").expect("write");

        let found = discover_local_indices(dir.path()).expect("discover");
        let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a_first", "b_second"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        assert!(matches!(
            discover_local_indices(dir.path()),
            Err(DocvecError::NoLocalIndices { .. })
        ));
    }

    #[test]
    fn merged_ids_are_dense_and_traceable() {
        let embedded = TempDir::new().expect("tempdir");
        let sources = vec![
            write_local(embedded.path(), "a", 3, DIM),
            write_local(embedded.path(), "b", 1, DIM),
            write_local(embedded.path(), "c", 4, DIM),
        ];
        let combined = TempDir::new().expect("tempdir");
        let merged = merge_local_indices(&sources, combined.path()).expect("merge");

        let ids: Vec<u64> = merged.metadata().iter().map(|r| r.id).collect();
        assert_eq!(ids, (1..=8).collect::<Vec<_>>());
        // Position 3 is the first (and only) segment of `b`.
        let record = merged.docstore().record_at(3).expect("record");
        assert_eq!(record.id, 4);
        assert_eq!(record.source_file, "b.pdf");
        assert_eq!(record.page, 1);
        assert_eq!(merged.vectors().vector(3), Some(&[1.0f32, 1.0, 1.0][..]));
        // Position 7 is the fourth segment of `c`.
        assert_eq!(merged.vectors().vector(7), Some(&[4.0f32, 4.0, 4.0][..]));

        let report = validate_merge(&sources, &merged).expect("validate");
        assert_eq!(report.source_vectors, 8);
        assert_eq!(report.merged_documents, 8);
    }

    #[test]
    fn validation_catches_an_engineered_mismatch() {
        let embedded = TempDir::new().expect("tempdir");
        let sources = vec![
            write_local(embedded.path(), "a", 2, DIM),
            write_local(embedded.path(), "b", 2, DIM),
        ];
        let combined = TempDir::new().expect("tempdir");
        let merged = merge_local_indices(&sources, combined.path()).expect("merge");

        // Source `b` grows after the merge read it.
        write_local(embedded.path(), "b", 3, DIM);
        match validate_merge(&sources, &merged).expect_err("mismatch") {
            DocvecError::MergeValidation {
                what,
                expected,
                actual,
            } => {
                assert_eq!(what, "vector");
                assert_eq!((expected, actual), (5, 4));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn validation_catches_an_unmapped_document() {
        let embedded = TempDir::new().expect("tempdir");
        let sources = vec![
            write_local(embedded.path(), "a", 2, DIM),
            write_local(embedded.path(), "b", 2, DIM),
        ];
        let combined = TempDir::new().expect("tempdir");
        let merged = merge_local_indices(&sources, combined.path()).expect("merge");

        // Source `b` gains a docstore record with no position while its vectors stay put.
        let mut docstore = read_docstore(&sources[1].store_path).expect("read docstore");
        let mut stray = docstore.docstore.values().next().cloned().expect("record");
        stray.id = 99;
        docstore.docstore.insert("unmapped".to_string(), stray);
        fs_err::write(
            &sources[1].store_path,
            encode_docstore(&docstore).expect("encode"),
        )
        .expect("rewrite");

        match validate_merge(&sources, &merged).expect_err("mismatch") {
            DocvecError::MergeValidation {
                what,
                expected,
                actual,
            } => {
                assert_eq!(what, "document");
                assert_eq!((expected, actual), (5, 4));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_local_store_aborts_without_writing() {
        let embedded = TempDir::new().expect("tempdir");
        write_local(embedded.path(), "a", 2, DIM);
        let broken = write_local(embedded.path(), "b", 2, DIM);
        fs_err::remove_file(&broken.store_path).expect("remove");
        let combined = TempDir::new().expect("tempdir");

        let err = merge_directory(embedded.path(), combined.path(), &options()).expect_err("fatal");
        assert!(matches!(err, DocvecError::MissingLocalArtifact { .. }));
        assert!(!CombinedStore::exists(combined.path()).expect("exists"));
    }

    #[test]
    fn mixed_dimensions_are_fatal() {
        let embedded = TempDir::new().expect("tempdir");
        let sources = vec![
            write_local(embedded.path(), "a", 1, DIM),
            write_local(embedded.path(), "b", 1, DIM + 1),
        ];
        let combined = TempDir::new().expect("tempdir");
        assert!(matches!(
            merge_local_indices(&sources, combined.path()),
            Err(DocvecError::VecDimensionMismatch { .. })
        ));
    }

    #[test]
    fn merge_directory_commits_store_and_summary() {
        let embedded = TempDir::new().expect("tempdir");
        write_local(embedded.path(), "a", 2, DIM);
        write_local(embedded.path(), "b", 3, DIM);
        let combined = TempDir::new().expect("tempdir");

        let report = merge_directory(embedded.path(), combined.path(), &options()).expect("merge");
        assert_eq!((report.first_id, report.last_id), (1, 5));
        assert_eq!(
            report.source_files,
            vec!["local_index_a.vecindex", "local_index_b.vecindex"]
        );

        let reopened = CombinedStore::open(combined.path()).expect("open");
        assert_eq!(reopened.len(), 5);
        let summary: MergeSummary = serde_json::from_slice(
            &fs_err::read(&reopened.paths().summary_path).expect("summary"),
        )
        .expect("json");
        assert_eq!(summary.total_documents, 5);
        assert_eq!(summary.documents.len(), 5);
    }

    #[test]
    fn extend_continues_after_the_existing_maximum() {
        let embedded = TempDir::new().expect("tempdir");
        write_local(embedded.path(), "a", 3, DIM);
        let combined = TempDir::new().expect("tempdir");
        merge_directory(embedded.path(), combined.path(), &options()).expect("merge");

        let later = TempDir::new().expect("tempdir");
        let extra = vec![write_local(later.path(), "z", 2, DIM)];
        let report = extend_store(combined.path(), &extra, &options()).expect("extend");
        assert_eq!((report.first_id, report.last_id), (4, 5));
        assert_eq!(report.validation.source_vectors, 5);

        let reopened = CombinedStore::open(combined.path()).expect("open");
        let record = reopened.docstore().record_at(4).expect("record");
        assert_eq!(record.id, 5);
        assert_eq!(record.source_file, "z.pdf");
    }

    #[test]
    fn merge_without_summary_drops_the_previous_summary() {
        let embedded = TempDir::new().expect("tempdir");
        write_local(embedded.path(), "a", 3, DIM);
        let combined = TempDir::new().expect("tempdir");
        merge_directory(embedded.path(), combined.path(), &options()).expect("merge");
        let summary_path = combined.path().join(crate::constants::MERGE_SUMMARY_FILE);
        assert!(summary_path.is_file());

        write_local(embedded.path(), "b", 4, DIM);
        let quiet = MergeOptions {
            write_summary: false,
            ..options()
        };
        merge_directory(embedded.path(), combined.path(), &quiet).expect("re-merge");
        assert_eq!(CombinedStore::open(combined.path()).expect("open").len(), 7);
        assert!(!summary_path.exists());
    }

    #[test]
    fn extend_rolls_back_an_interrupted_commit_first() {
        let embedded = TempDir::new().expect("tempdir");
        write_local(embedded.path(), "a", 3, DIM);
        let combined = TempDir::new().expect("tempdir");
        merge_directory(embedded.path(), combined.path(), &options()).expect("merge");

        let mut torn = CombinedStore::open(combined.path()).expect("open");
        let record = crate::types::MetadataRecord {
            id: 4,
            page: 1,
            text: "never acknowledged".into(),
            source_file: "lost.json".into(),
            category: SegmentCategory::Paragraph,
        };
        torn.push(record, &[0.5; DIM]).expect("push");
        torn.commit_interrupted(None, 1).expect("vecindex renamed only");

        let later = TempDir::new().expect("tempdir");
        let extra = vec![write_local(later.path(), "z", 2, DIM)];
        let report = extend_store(combined.path(), &extra, &options()).expect("extend");
        assert_eq!((report.first_id, report.last_id), (4, 5));
        let reopened = CombinedStore::open(combined.path()).expect("open");
        assert_eq!(reopened.len(), 5);
        let record = reopened.docstore().record_at(3).expect("record");
        assert_eq!(record.source_file, "z.pdf");
    }

    #[test]
    fn extend_without_store_is_a_batch_merge() {
        let later = TempDir::new().expect("tempdir");
        let extra = vec![write_local(later.path(), "z", 2, DIM)];
        let combined = TempDir::new().expect("tempdir");
        let report = extend_store(combined.path(), &extra, &options()).expect("extend");
        assert_eq!((report.first_id, report.last_id), (1, 2));
    }
}
