//! Incremental append of new text into the combined store, without a re-merge.

use std::path::Path;

use chrono::Local;
use tracing::instrument;

use crate::constants::APPEND_TIMESTAMP_FORMAT;
use crate::embed::{BatchEmbedder, EmbeddingProvider};
use crate::error::{DocvecError, Result};
use crate::lock::StoreLock;
use crate::store::CombinedStore;
use crate::types::{AppendReport, LockSettings, MetadataRecord, SegmentCategory};

/// One piece of text to append.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub content: String,
    /// Identifier the source file name is derived from; defaults to the local time.
    pub timestamp: Option<String>,
}

impl AppendRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            timestamp: None,
        }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    fn source_file(&self, now: &str) -> String {
        format!("{}.json", self.timestamp.as_deref().unwrap_or(now))
    }
}

/// Appends one text as the next id of the combined store in `dir`, creating the store
/// when none exists.
pub fn append_text<P: EmbeddingProvider>(
    dir: &Path,
    request: &AppendRequest,
    embedder: &BatchEmbedder<P>,
    lock: &LockSettings,
) -> Result<AppendReport> {
    append_batch(dir, std::slice::from_ref(request), embedder, lock)
}

/// Appends several texts under one lock and one commit; ids are consecutive.
#[instrument(
    target = "docvec::append",
    skip_all,
    fields(dir = %dir.display(), requests = requests.len())
)]
pub fn append_batch<P: EmbeddingProvider>(
    dir: &Path,
    requests: &[AppendRequest],
    embedder: &BatchEmbedder<P>,
    lock: &LockSettings,
) -> Result<AppendReport> {
    if requests.is_empty() || requests.iter().any(|r| r.content.trim().is_empty()) {
        return Err(DocvecError::EmptyContent);
    }

    let _lock = StoreLock::acquire(dir, lock)?;
    CombinedStore::recover(dir)?;
    let (mut store, created) = match CombinedStore::open_if_exists(dir)? {
        Some(store) => (store, false),
        None => {
            tracing::info!(dir = ?dir, "no combined store; creating a new one");
            (CombinedStore::create(dir, embedder.config().dimension)?, true)
        }
    };
    store.verify().map_err(|err| err.in_context("before append"))?;

    let now = Local::now().format(APPEND_TIMESTAMP_FORMAT).to_string();
    let mut ids = Vec::with_capacity(requests.len());
    let mut zero_filled = 0usize;
    for request in requests {
        let (vector, zeroed) = embedder.embed_one(&request.content)?;
        if zeroed {
            zero_filled += 1;
        }
        let record = MetadataRecord {
            id: store.next_id(),
            page: 1,
            text: request.content.clone(),
            source_file: request.source_file(&now),
            category: SegmentCategory::Paragraph,
        };
        ids.push(record.id);
        store.push(record, &vector)?;
    }

    let stats = store.verify().map_err(|err| err.in_context("after append"))?;
    store.commit(None)?;
    tracing::info!(
        dir = ?dir,
        ids = ?ids,
        zero_filled,
        total = stats.vectors,
        "append committed"
    );
    Ok(AppendReport {
        ids,
        created,
        zero_filled,
        stats,
    })
}
