//! Public types exposed by the `docvec-core` crate.

pub mod options;
pub mod record;
pub mod report;
pub mod segment;

pub use options::{EmbedderConfig, LockSettings, MergeOptions};
pub use record::MetadataRecord;
pub use report::{
    AppendReport, BatchEmbeddingResult, MergeReport, MergeSummary, StoreStats, ValidationReport,
};
pub use segment::{ElementContent, ParsedDocument, ParsedElement, Segment, SegmentCategory};
