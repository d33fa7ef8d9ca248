//! Local index production: segments in, one per-document vector index out.

use std::path::Path;

use tracing::instrument;

use crate::embed::{BatchEmbedder, EmbeddingProvider};
use crate::error::Result;
use crate::extract::extract_segments;
use crate::store::{LocalIndex, LocalIndexPaths, VecIndex};
use crate::types::{BatchEmbeddingResult, ParsedDocument, Segment};

/// Embeds `segments` and pairs vector *i* with segment *i*.
pub fn build_local_index<P: EmbeddingProvider>(
    name: &str,
    segments: &[Segment],
    embedder: &BatchEmbedder<P>,
) -> Result<(LocalIndex, BatchEmbeddingResult)> {
    let embedded = embedder.embed_segments(segments)?;
    if embedded.is_degraded() {
        tracing::warn!(
            local_index = name,
            zero_filled = embedded.zero_filled.len(),
            failed_batches = embedded.failed_batches.len(),
            "local index built with degraded embeddings"
        );
    }
    let vectors = VecIndex::from_vectors(embedder.config().dimension, &embedded.embeddings)?;
    let local = LocalIndex::build(name, segments, vectors)?;
    Ok((local, embedded))
}

/// Extracts, embeds, and writes one parsed document as `name` under `out_dir`.
#[instrument(target = "docvec::producer", skip_all, fields(local_index = name))]
pub fn ingest_document<P: EmbeddingProvider>(
    document: &ParsedDocument,
    name: &str,
    source_file: &str,
    out_dir: &Path,
    embedder: &BatchEmbedder<P>,
) -> Result<(LocalIndexPaths, BatchEmbeddingResult)> {
    let segments = extract_segments(document, source_file)?;
    tracing::info!(
        local_index = name,
        source_file,
        segments = segments.len(),
        "embedding document"
    );
    let (local, embedded) = build_local_index(name, &segments, embedder)?;
    let paths = local.write(out_dir, &segments)?;
    Ok((paths, embedded))
}
