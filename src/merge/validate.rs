//! Post-merge conservation check.
//!
//! Every source file is read again from disk, independently of the copy the merge used, and
//! the summed counts must match the merged store exactly.

use crate::error::{DocvecError, Result};
use crate::io::{read_docstore, read_vec_index};
use crate::store::{CombinedStore, LocalIndexPaths};
use crate::types::ValidationReport;

/// Validates a batch merge of `sources` into `merged`.
pub fn validate_merge(
    sources: &[LocalIndexPaths],
    merged: &CombinedStore,
) -> Result<ValidationReport> {
    validate_against(sources, (0, 0), merged)
}

/// `baseline` is the `(vectors, documents)` the combined store held before the merge.
pub(crate) fn validate_against(
    sources: &[LocalIndexPaths],
    baseline: (usize, usize),
    merged: &CombinedStore,
) -> Result<ValidationReport> {
    let (mut source_vectors, mut source_documents) = baseline;
    for paths in sources {
        let vectors = read_vec_index(&paths.index_path)?;
        let docstore = read_docstore(&paths.store_path)?;
        source_vectors += vectors.len();
        source_documents += docstore.len();
    }

    let report = ValidationReport {
        source_vectors,
        source_documents,
        merged_vectors: merged.len(),
        merged_documents: merged.docstore().len(),
    };
    if report.source_vectors != report.merged_vectors {
        return Err(DocvecError::MergeValidation {
            what: "vector",
            expected: report.source_vectors,
            actual: report.merged_vectors,
        });
    }
    if report.source_documents != report.merged_documents {
        return Err(DocvecError::MergeValidation {
            what: "document",
            expected: report.source_documents,
            actual: report.merged_documents,
        });
    }
    merged.verify()?;

    tracing::info!(
        sources = sources.len(),
        vectors = report.merged_vectors,
        documents = report.merged_documents,
        "merge validation passed"
    );
    Ok(report)
}
