#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;

use docvec_core::{
    BatchEmbedder, DocvecError, ElementContent, EmbedderConfig, EmbeddingProvider,
    LocalIndexPaths, LockSettings, MergeOptions, ParsedDocument, ParsedElement, Result,
    producer::ingest_document,
};

pub const DIM: usize = 16;

/// Deterministic text-derived vector; never all-zero.
pub fn fingerprint(text: &str) -> Vec<f32> {
    let seed = text
        .bytes()
        .fold(17u64, |acc, b| acc.wrapping_mul(131).wrapping_add(u64::from(b)));
    let mut rng = fastrand::Rng::with_seed(seed);
    (0..DIM).map(|_| rng.f32() + 0.01).collect()
}

/// Provider that rejects requests above `max_request` and any text in `poisoned`.
#[derive(Default)]
pub struct HashProvider {
    pub max_request: Option<usize>,
    pub poisoned: HashSet<String>,
}

impl EmbeddingProvider for HashProvider {
    fn name(&self) -> &str {
        "hash"
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if self.max_request.is_some_and(|max| texts.len() > max) {
            return Err(DocvecError::Embedding {
                reason: "request too large".into(),
            });
        }
        if texts.iter().any(|t| self.poisoned.contains(*t)) {
            return Err(DocvecError::Embedding {
                reason: "rejected input".into(),
            });
        }
        Ok(texts.iter().map(|t| fingerprint(t)).collect())
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if self.poisoned.contains(text) {
            return Err(DocvecError::Embedding {
                reason: "rejected input".into(),
            });
        }
        Ok(fingerprint(text))
    }
}

pub fn embedder(provider: HashProvider) -> BatchEmbedder<HashProvider> {
    BatchEmbedder::new(provider, EmbedderConfig::default().with_dimension(DIM))
}

pub fn quick_lock() -> LockSettings {
    LockSettings {
        timeout_ms: 300,
        poll_ms: 5,
    }
}

pub fn merge_options() -> MergeOptions {
    MergeOptions {
        lock: quick_lock(),
        write_summary: true,
    }
}

pub fn paragraph(page: u32, html: &str) -> ParsedElement {
    ParsedElement {
        category: Some("paragraph".into()),
        page: Some(page),
        content: Some(ElementContent {
            html: Some(html.into()),
            ..ElementContent::default()
        }),
    }
}

/// A parsed document with `n` paragraphs of distinct text.
pub fn document(name: &str, n: usize) -> ParsedDocument {
    ParsedDocument {
        elements: (0..n)
            .map(|i| {
                paragraph(
                    1 + (i as u32) / 4,
                    &format!("<p>{name}: provision {i} covering duty relief</p>"),
                )
            })
            .collect(),
    }
}

/// Ingests a synthetic document of `n` segments into `dir`.
pub fn ingest(dir: &Path, name: &str, n: usize, provider: HashProvider) -> LocalIndexPaths {
    let (paths, _) = ingest_document(
        &document(name, n),
        name,
        &format!("{name}.pdf"),
        dir,
        &embedder(provider),
    )
    .unwrap();
    paths
}
