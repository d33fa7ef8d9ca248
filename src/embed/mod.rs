//! Embedding producer: turns segment text into vectors through an [`EmbeddingProvider`].
//!
//! Availability wins over correctness here. A batch that fails is re-sent in halved chunks
//! down to `min_batch_size`; if that still fails, every item of the batch is retried on its
//! own, and an item that fails again gets an all-zero vector. The output always has one
//! vector per input, and [`BatchEmbeddingResult::zero_filled`] names the placeholders so
//! callers can tell them apart from real embeddings.

#[cfg(feature = "api_embed")]
pub mod api;

use crate::error::{DocvecError, Result};
use crate::types::{BatchEmbeddingResult, EmbedderConfig, Segment};

/// Remote (or local) text embedding backend.
pub trait EmbeddingProvider {
    /// Short identifier for logs.
    fn name(&self) -> &str {
        "embedding-provider"
    }

    /// Embeds a batch of passages; one vector per input, in input order.
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>>;

    /// Embeds a single text. Used as the per-item fallback when batches keep failing.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for &T {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_documents(texts)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed_query(text)
    }
}

impl<T: EmbeddingProvider + ?Sized> EmbeddingProvider for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_documents(texts)
    }

    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed_query(text)
    }
}

/// Adaptive batching wrapper around a provider.
pub struct BatchEmbedder<P> {
    provider: P,
    config: EmbedderConfig,
}

impl<P: EmbeddingProvider> BatchEmbedder<P> {
    pub fn new(provider: P, config: EmbedderConfig) -> Self {
        Self {
            provider,
            config: config.normalized(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &EmbedderConfig {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn embed_segments(&self, segments: &[Segment]) -> Result<BatchEmbeddingResult> {
        let texts: Vec<&str> = segments.iter().map(|segment| segment.text.as_str()).collect();
        self.embed_texts(&texts)
    }

    pub fn embed_texts(&self, texts: &[&str]) -> Result<BatchEmbeddingResult> {
        let mut result = BatchEmbeddingResult {
            embeddings: Vec::with_capacity(texts.len()),
            ..BatchEmbeddingResult::default()
        };

        for (batch_no, batch) in texts.chunks(self.config.batch_size).enumerate() {
            let start = batch_no * self.config.batch_size;
            match self.embed_adaptive(batch) {
                Some((vectors, chunk_size)) => {
                    if chunk_size < batch.len() {
                        result.reduced_batches.push(start);
                    }
                    result.embeddings.extend(vectors);
                }
                None => {
                    tracing::warn!(
                        provider = self.provider.name(),
                        batch = batch_no + 1,
                        size = batch.len(),
                        "batch failed at minimum chunk size; embedding items individually"
                    );
                    result.failed_batches.push(start);
                    for (offset, text) in batch.iter().enumerate() {
                        match self.call_query(text) {
                            Ok(vector) => result.embeddings.push(vector),
                            Err(err) => {
                                tracing::warn!(
                                    position = start + offset,
                                    error = %err,
                                    "item embedding failed; substituting zero vector"
                                );
                                result.zero_filled.push(start + offset);
                                result.embeddings.push(self.zero_vector());
                            }
                        }
                    }
                }
            }
        }

        if result.embeddings.len() != texts.len() {
            return Err(DocvecError::EmbeddingCountMismatch {
                inputs: texts.len(),
                outputs: result.embeddings.len(),
            });
        }
        tracing::debug!(
            provider = self.provider.name(),
            inputs = texts.len(),
            zero_filled = result.zero_filled.len(),
            reduced_batches = result.reduced_batches.len(),
            "embedding complete"
        );
        Ok(result)
    }

    /// Embeds one text with the same fallback chain as a batch of one.
    pub fn embed_one(&self, text: &str) -> Result<(Vec<f32>, bool)> {
        let mut result = self.embed_texts(&[text])?;
        let zero_filled = !result.zero_filled.is_empty();
        let vector = result
            .embeddings
            .pop()
            .ok_or(DocvecError::EmbeddingCountMismatch {
                inputs: 1,
                outputs: 0,
            })?;
        Ok((vector, zero_filled))
    }

    /// Sends `batch` whole, then in halved chunks down to the configured floor. Returns the
    /// vectors and the chunk size that succeeded.
    fn embed_adaptive(&self, batch: &[&str]) -> Option<(Vec<Vec<f32>>, usize)> {
        let mut chunk_size = batch.len();
        loop {
            match self.embed_in_chunks(batch, chunk_size) {
                Ok(vectors) => return Some((vectors, chunk_size)),
                Err(err) => {
                    tracing::warn!(
                        chunk_size,
                        error = %err,
                        "embedding chunk failed; retrying with smaller chunks"
                    );
                }
            }
            if chunk_size <= self.config.min_batch_size {
                return None;
            }
            chunk_size = (chunk_size / 2).max(self.config.min_batch_size);
        }
    }

    fn embed_in_chunks(&self, batch: &[&str], chunk_size: usize) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(batch.len());
        for chunk in batch.chunks(chunk_size.max(1)) {
            vectors.extend(self.call_documents(chunk)?);
        }
        Ok(vectors)
    }

    fn call_documents(&self, chunk: &[&str]) -> Result<Vec<Vec<f32>>> {
        let vectors = self.provider.embed_documents(chunk)?;
        if vectors.len() != chunk.len() {
            return Err(DocvecError::EmbeddingCountMismatch {
                inputs: chunk.len(),
                outputs: vectors.len(),
            });
        }
        for vector in &vectors {
            self.check_dimension(vector)?;
        }
        Ok(vectors)
    }

    fn call_query(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed_query(text)?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() == self.config.dimension {
            Ok(())
        } else {
            Err(DocvecError::VecDimensionMismatch {
                expected: self.config.dimension,
                actual: vector.len(),
            })
        }
    }

    fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; self.config.dimension]
    }
}
