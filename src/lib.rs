#![deny(clippy::all, clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
#![cfg_attr(
    test,
    allow(
        clippy::useless_vec,
        clippy::uninlined_format_args,
        clippy::cast_possible_truncation,
        clippy::float_cmp,
        clippy::cast_precision_loss
    )
)]
#![allow(clippy::module_name_repetitions)]
//
// Documentation lints: internal helpers are self-describing; public APIs carry docs.
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
//
// Cast safety: counts and positions are bounded by the on-disk `u64` fields and the
// in-memory `usize` vectors they index.
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_lossless)]
//
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::len_without_is_empty)]

/// The docvec-core crate version (matches `Cargo.toml`).
pub const DOCVEC_CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod append;
pub mod constants;
pub mod embed;
pub mod error;
pub mod extract;
pub mod io;
mod lock;
pub mod merge;
pub mod producer;
pub mod store;
pub mod types;

pub use append::{AppendRequest, append_batch, append_text};
pub use constants::*;
pub use embed::{BatchEmbedder, EmbeddingProvider};
#[cfg(feature = "api_embed")]
pub use embed::api::{ApiEmbedConfig, ApiEmbedder};
pub use error::{DocvecError, Result};
pub use extract::{extract_form_segments, extract_segments, html_to_text};
pub use lock::StoreLock;
pub use merge::{
    discover_local_indices, extend_store, merge_directory, merge_local_indices, validate_merge,
};
pub use producer::build_local_index;
pub use store::{CombinedStore, Docstore, LocalIndex, LocalIndexPaths, VecIndex};
pub use types::{
    AppendReport, BatchEmbeddingResult, ElementContent, EmbedderConfig, LockSettings,
    MergeOptions, MergeReport, MergeSummary, MetadataRecord, ParsedDocument, ParsedElement,
    Segment, SegmentCategory, StoreStats, ValidationReport,
};

use bincode::config::{self, Config};

/// Encoding used for every bincode artifact written by this crate.
pub(crate) fn artifact_config() -> impl Config {
    config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}
