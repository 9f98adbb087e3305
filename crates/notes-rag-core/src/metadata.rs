//! Obsidian-style annotation extraction.
//!
//! [`extract_metadata`] is the default extractor used by the header
//! chunker. It pulls three de-duplicated sets out of raw chunk text:
//!
//! | Field | Pattern | Captured |
//! |-------|---------|----------|
//! | `tags` | `#word` | the word, without `#` |
//! | `urls` | `http(s)://…` | up to whitespace or `)` |
//! | `internal_links` | `[[Note]]` | the text inside the brackets |
//!
//! Callers that want different annotations implement
//! [`MetadataExtractor`] (any `Fn(&str) -> M` already does) and pass it to
//! [`chunk_by_headers_with`](crate::chunk::chunk_by_headers_with).

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\w+)").expect("valid regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://[^\s)]+").expect("valid regex"));
static LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[([^\]]+)\]\]").expect("valid regex"));

/// Annotations derived from a chunk's text.
///
/// Sets are ordered only so that serialization is deterministic;
/// uniqueness is the contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NoteMetadata {
    pub tags: BTreeSet<String>,
    pub urls: BTreeSet<String>,
    pub internal_links: BTreeSet<String>,
}

impl NoteMetadata {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.urls.is_empty() && self.internal_links.is_empty()
    }
}

/// Capability interface for chunk annotation.
///
/// Implementations must be pure: identical text yields identical output.
pub trait MetadataExtractor {
    type Metadata;

    fn extract(&self, text: &str) -> Self::Metadata;
}

impl<F, M> MetadataExtractor for F
where
    F: Fn(&str) -> M,
{
    type Metadata = M;

    fn extract(&self, text: &str) -> M {
        self(text)
    }
}

/// Default extractor: tags, URLs, and `[[internal links]]`.
pub fn extract_metadata(text: &str) -> NoteMetadata {
    let tags = TAG_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    let urls = URL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect();

    let internal_links = LINK_RE
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .collect();

    NoteMetadata {
        tags,
        urls,
        internal_links,
    }
}
