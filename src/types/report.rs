//! Outcome reports returned by the producer, merger, and verifier.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::record::MetadataRecord;

/// Vectors for a batch of inputs plus a trail of every degradation applied.
#[derive(Debug, Clone, Default)]
pub struct BatchEmbeddingResult {
    /// One vector per input, in input order.
    pub embeddings: Vec<Vec<f32>>,
    /// Input positions whose vector is an all-zero placeholder.
    pub zero_filled: Vec<usize>,
    /// Start positions of batches that needed a smaller chunk size.
    pub reduced_batches: Vec<usize>,
    /// Start positions of batches that failed even at the minimum chunk size.
    pub failed_batches: Vec<usize>,
}

impl BatchEmbeddingResult {
    #[must_use]
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        !self.zero_filled.is_empty() || !self.failed_batches.is_empty()
    }
}

/// Counts re-derived from the source files after a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub source_vectors: usize,
    pub source_documents: usize,
    pub merged_vectors: usize,
    pub merged_documents: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    pub combined_dir: PathBuf,
    pub source_files: Vec<String>,
    pub first_id: u64,
    pub last_id: u64,
    pub validation: ValidationReport,
    pub stats: StoreStats,
}

/// Human-inspectable summary written next to the combined store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeSummary {
    pub total_documents: usize,
    pub total_vectors: usize,
    pub source_files: Vec<String>,
    pub created_at: String,
    pub documents: Vec<MetadataRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendReport {
    pub ids: Vec<u64>,
    /// True when the call bootstrapped a new combined store.
    pub created: bool,
    pub zero_filled: usize,
    pub stats: StoreStats,
}

/// Sizes of each part of a combined store; all four counts agree on a healthy store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub vectors: usize,
    pub docstore_entries: usize,
    pub mapping_entries: usize,
    pub metadata_records: usize,
    pub zero_vectors: usize,
    pub max_id: u64,
    pub dimension: usize,
}
