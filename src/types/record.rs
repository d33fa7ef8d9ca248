use serde::{Deserialize, Serialize};

use super::segment::{Segment, SegmentCategory};

fn default_page() -> u32 {
    1
}

/// Provenance and text of one embedded segment, keyed by its global id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub id: u64,
    #[serde(default = "default_page")]
    pub page: u32,
    pub text: String,
    #[serde(default)]
    pub source_file: String,
    #[serde(default)]
    pub category: SegmentCategory,
}

impl MetadataRecord {
    /// Copy of this record under a new global id.
    #[must_use]
    pub fn with_id(&self, id: u64) -> Self {
        Self {
            id,
            ..self.clone()
        }
    }

    /// Docstore key of this record in a combined store.
    #[must_use]
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

impl From<&Segment> for MetadataRecord {
    fn from(segment: &Segment) -> Self {
        Self {
            id: segment.id,
            page: segment.page,
            text: segment.text.clone(),
            source_file: segment.source_file.clone(),
            category: segment.category,
        }
    }
}
