//! Parsed document elements and the text segments extracted from them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural role of a segment inside its source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentCategory {
    Paragraph,
    List,
    Table,
    Heading,
    #[default]
    #[serde(other)]
    Unknown,
}

impl SegmentCategory {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::List => "list",
            Self::Table => "table",
            Self::Heading => "heading",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "paragraph" => Self::Paragraph,
            "list" => Self::List,
            "table" => Self::Table,
            "heading" => Self::Heading,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for SegmentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One paragraph, list, table, or heading extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Dense, 1-based id within the source document.
    pub id: u64,
    pub page: u32,
    pub text: String,
    pub source_file: String,
    #[serde(default)]
    pub category: SegmentCategory,
    /// Topic tag assigned by the forms pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

/// Output of the document-parse service: a flat list of layout elements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedDocument {
    #[serde(default)]
    pub elements: Vec<ParsedElement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedElement {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub content: Option<ElementContent>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ElementContent {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}
