//! Shared constants for on-disk layout, embedding defaults, and segment filtering.

/// Output dimensionality of the default passage embedding model.
pub const EMBEDDING_DIMENSION: usize = 768;

/// Segments shorter than this many characters are never embedded or recorded.
pub const MIN_SEGMENT_CHARS: usize = 10;

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 70;
/// Smallest chunk size the adaptive batcher will retry with.
pub const MIN_EMBED_BATCH_SIZE: usize = 2;

/// Element categories that carry embeddable prose.
pub const ELIGIBLE_CATEGORIES: &[&str] = &["paragraph", "list", "table", "heading"];
/// The forms pipeline skips headings.
pub const FORM_CATEGORIES: &[&str] = &["paragraph", "list", "table"];

pub const VEC_INDEX_MAGIC: [u8; 4] = *b"DVX1";
pub const VEC_INDEX_VERSION: u16 = 1;
pub const DOCSTORE_MAGIC: [u8; 4] = *b"DVS1";
pub const DOCSTORE_VERSION: u16 = 1;

pub const COMBINED_INDEX_FILE: &str = "combined.vecindex";
pub const COMBINED_STORE_FILE: &str = "combined.docstore";
pub const COMBINED_METADATA_FILE: &str = "combined_documents.json";
pub const MERGE_SUMMARY_FILE: &str = "merge_summary.json";
pub const STORE_LOCK_FILE: &str = ".docvec.lock";
/// Present only while a combined-store commit is renaming files into place.
pub const COMBINED_JOURNAL_FILE: &str = "combined.commit";

pub const LOCAL_INDEX_PREFIX: &str = "local_index_";
pub const LOCAL_INDEX_EXTENSION: &str = ".vecindex";
pub const LOCAL_STORE_PREFIX: &str = "local_store_";
pub const LOCAL_STORE_EXTENSION: &str = ".docstore";
pub const LOCAL_METADATA_PREFIX: &str = "metadata_";

/// Upper bound for a single artifact read back from disk.
pub const MAX_ARTIFACT_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// `strftime` layout of the identifiers used as synthetic source names on append.
pub const APPEND_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
