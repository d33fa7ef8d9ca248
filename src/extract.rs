//! Segment extraction from document-parse output.
//!
//! The parse service returns layout elements whose body is HTML. Only prose-bearing
//! categories survive, the markup is flattened to text, and anything shorter than
//! [`MIN_SEGMENT_CHARS`] is dropped before ids are assigned, so ids stay dense.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{ELIGIBLE_CATEGORIES, FORM_CATEGORIES, MIN_SEGMENT_CHARS};
use crate::error::{DocvecError, Result};
use crate::types::{ParsedDocument, Segment, SegmentCategory};

#[allow(clippy::expect_used)]
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->|</?[A-Za-z!?][^>]*>").expect("tag regex compiles"));
#[allow(clippy::expect_used)]
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("entity regex compiles")
});
#[allow(clippy::expect_used)]
static ORDINAL_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+_").expect("ordinal regex compiles"));

/// Extracts paragraph, list, table, and heading segments from a parsed document.
///
/// `source_file` is recorded verbatim on every segment (callers pass the file name,
/// not the full path).
pub fn extract_segments(document: &ParsedDocument, source_file: &str) -> Result<Vec<Segment>> {
    let segments = collect(document, source_file, ELIGIBLE_CATEGORIES, None);
    if segments.is_empty() {
        return Err(DocvecError::NoSegments {
            source_file: source_file.to_string(),
        });
    }
    Ok(segments)
}

/// Forms variant: headings are skipped and every segment is tagged with a keyword
/// derived from the folder the form lives in (`03_export_declaration` → `export_declaration`).
pub fn extract_form_segments(
    document: &ParsedDocument,
    source_file: &str,
    folder_name: &str,
) -> Result<Vec<Segment>> {
    let keyword = ORDINAL_PREFIX_RE.replace(folder_name, "").into_owned();
    let segments = collect(document, source_file, FORM_CATEGORIES, Some(keyword));
    if segments.is_empty() {
        return Err(DocvecError::NoSegments {
            source_file: source_file.to_string(),
        });
    }
    Ok(segments)
}

fn collect(
    document: &ParsedDocument,
    source_file: &str,
    categories: &[&str],
    keyword: Option<String>,
) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut next_id = 1u64;
    let mut skipped_short = 0usize;

    for (position, element) in document.elements.iter().enumerate() {
        let Some(category) = element.category.as_deref() else {
            continue;
        };
        if !categories.contains(&category) {
            continue;
        }
        let Some(page) = element.page else {
            tracing::warn!(
                element = position,
                source_file,
                "element is missing its page number; skipped"
            );
            continue;
        };
        let Some(html) = element
            .content
            .as_ref()
            .and_then(|content| content.html.as_deref())
        else {
            tracing::warn!(
                element = position,
                source_file,
                "element has no html content; skipped"
            );
            continue;
        };
        let text = html_to_text(html);
        if text.chars().count() < MIN_SEGMENT_CHARS {
            skipped_short += 1;
            continue;
        }
        segments.push(Segment {
            id: next_id,
            page,
            text,
            source_file: source_file.to_string(),
            category: SegmentCategory::from_label(category),
            keyword: keyword.clone(),
        });
        next_id += 1;
    }

    tracing::debug!(
        source_file,
        elements = document.elements.len(),
        segments = segments.len(),
        skipped_short,
        "extracted segments"
    );
    segments
}

/// Flattens an HTML fragment: tags are removed, each text node is trimmed, and the
/// non-empty nodes are concatenated without a separator.
#[must_use]
pub fn html_to_text(html: &str) -> String {
    TAG_RE
        .split(html)
        .map(decode_entities)
        .map(|node| node.trim().to_string())
        .filter(|node| !node.is_empty())
        .collect()
}

fn decode_entities(text: &str) -> String {
    ENTITY_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let entity = &caps[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    _ => None,
                }
            };
            decoded.map_or_else(|| caps[0].to_string(), String::from)
        })
        .into_owned()
}
