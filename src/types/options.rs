//! Tunable options for embedding, locking, and merging.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_EMBED_BATCH_SIZE, EMBEDDING_DIMENSION, MIN_EMBED_BATCH_SIZE};

const DEFAULT_LOCK_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_LOCK_POLL_MS: u64 = 25;

/// Batching policy of the embedding producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbedderConfig {
    /// Segments sent per request before any reduction.
    pub batch_size: usize,
    /// Floor for the halving retry; below this the batch is given up.
    pub min_batch_size: usize,
    /// Expected vector dimension; also the length of zero placeholders.
    pub dimension: usize,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            min_batch_size: MIN_EMBED_BATCH_SIZE,
            dimension: EMBEDDING_DIMENSION,
        }
    }
}

impl EmbedderConfig {
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    pub(crate) fn normalized(&self) -> Self {
        let min_batch_size = self.min_batch_size.max(1);
        Self {
            batch_size: self.batch_size.max(min_batch_size),
            min_batch_size,
            dimension: self.dimension,
        }
    }
}

/// How long writers wait for the single-writer lock of a combined store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    pub timeout_ms: u64,
    pub poll_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            poll_ms: DEFAULT_LOCK_POLL_MS,
        }
    }
}

/// Options for batch merges and extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOptions {
    pub lock: LockSettings,
    /// Also write `merge_summary.json` next to the combined files.
    pub write_summary: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            lock: LockSettings::default(),
            write_summary: true,
        }
    }
}
