//! Header-aware markdown chunker.
//!
//! Splits a loosely structured markdown note into [`Chunk`]s, one per
//! section opened by a header at a *boundary depth*, and tags each chunk
//! with the header path active where it starts.
//!
//! # Algorithm
//!
//! A single forward pass folds every line into a [`ChunkerState`]:
//!
//! 1. Text lines are appended to the current buffer.
//! 2. A header at a boundary depth flushes the buffer as a chunk (using
//!    the header path *before* this header) and starts a new buffer with
//!    the header line. Text seen before any header stays attached to the
//!    first header instead of becoming its own chunk.
//! 3. A header at any other depth updates the header path but stays in
//!    the current buffer.
//! 4. Every header sets its depth in the path and clears deeper depths.
//! 5. The remaining buffer is flushed at the end. Buffers whose trimmed
//!    text is empty are never emitted.
//!
//! Metadata is computed per emitted chunk by a [`MetadataExtractor`].
//!
//! # Example
//!
//! ```rust
//! use notes_rag_core::chunk::{chunk_by_headers, BoundaryDepths};
//!
//! let doc = "# A\nfoo\n## B\nbar #tag1 [[Note1]]\n";
//! let chunks = chunk_by_headers(doc, &BoundaryDepths::new([1, 2]));
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].headers.get(2), Some("B"));
//! assert!(chunks[1].metadata.tags.contains("tag1"));
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Context};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};

use crate::metadata::{extract_metadata, MetadataExtractor, NoteMetadata};

/// Deepest markdown header level.
pub const MAX_HEADER_DEPTH: usize = 6;

/// Header hierarchy: depth → most recent header text at that depth.
///
/// Serializes as `{"h1": "...", "h2": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderPath(BTreeMap<usize, String>);

impl HeaderPath {
    pub fn new() -> Self {
        Self::default()
    }

    /// The path after entering a header at `depth`.
    ///
    /// Sets `depth` to `text` and drops every entry deeper than `depth`.
    /// Shallower entries are kept.
    pub fn enter(&self, depth: usize, text: &str) -> Self {
        let mut next: BTreeMap<usize, String> = self
            .0
            .iter()
            .filter(|(d, _)| **d < depth)
            .map(|(d, t)| (*d, t.clone()))
            .collect();
        next.insert(depth, text.to_string());
        Self(next)
    }

    /// Only the entries at depth `max_depth` or shallower.
    pub fn restricted_to(&self, max_depth: usize) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(d, _)| **d <= max_depth)
                .map(|(d, t)| (*d, t.clone()))
                .collect(),
        )
    }

    pub fn get(&self, depth: usize) -> Option<&str> {
        self.0.get(&depth).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn depths(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.0.iter().map(|(d, t)| (*d, t.as_str()))
    }

    /// Breadcrumb form, shallowest first: `"A > B > C"`.
    pub fn breadcrumb(&self) -> String {
        self.0.values().cloned().collect::<Vec<_>>().join(" > ")
    }
}

impl Serialize for HeaderPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (depth, text) in &self.0 {
            map.serialize_entry(&format!("h{}", depth), text)?;
        }
        map.end()
    }
}

/// Header depths that open a new chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryDepths(BTreeSet<usize>);

impl BoundaryDepths {
    pub fn new(depths: impl IntoIterator<Item = usize>) -> Self {
        Self(depths.into_iter().collect())
    }

    pub fn contains(&self, depth: usize) -> bool {
        self.0.contains(&depth)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// Reject empty sets and depths outside `1..=6`.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.0.is_empty() {
            bail!("at least one boundary depth is required");
        }
        if let Some(bad) = self.0.iter().find(|d| **d == 0 || **d > MAX_HEADER_DEPTH) {
            bail!(
                "boundary depth {} is out of range (1..={})",
                bad,
                MAX_HEADER_DEPTH
            );
        }
        Ok(())
    }
}

impl Default for BoundaryDepths {
    fn default() -> Self {
        Self::new([1, 2, 3])
    }
}

impl FromStr for BoundaryDepths {
    type Err = anyhow::Error;

    /// Parse a comma-separated list such as `"1,2,3"`.
    fn from_str(s: &str) -> anyhow::Result<Self> {
        let mut depths = BTreeSet::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let depth: usize = part
                .parse()
                .with_context(|| format!("invalid header depth: '{}'", part))?;
            depths.insert(depth);
        }
        let parsed = Self(depths);
        parsed.validate()?;
        Ok(parsed)
    }
}

impl fmt::Display for BoundaryDepths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|d| d.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

/// A single line, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    Header { depth: usize, text: &'a str },
    Text,
}

/// A line is a header when, after leading whitespace, it starts with
/// one or more `#`. Depth is the number of leading marks.
pub fn classify(line: &str) -> Line<'_> {
    let trimmed = line.trim_start();
    let depth = trimmed.bytes().take_while(|b| *b == b'#').count();
    if depth == 0 {
        Line::Text
    } else {
        Line::Header {
            depth,
            text: trimmed[depth..].trim(),
        }
    }
}

/// A retrieval-sized section of a note.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk<M = NoteMetadata> {
    /// Section lines joined with `\n` and trimmed. Never empty.
    pub content: String,
    /// Header path where the section starts, limited to depths at or
    /// above `boundary_depth`.
    pub headers: HeaderPath,
    /// Depth of the boundary header that opened this chunk, if any.
    pub boundary_depth: Option<usize>,
    pub metadata: M,
}

/// A chunk before metadata is attached.
#[derive(Debug, Clone, PartialEq)]
struct Section {
    content: String,
    headers: HeaderPath,
    boundary_depth: Option<usize>,
}

/// Accumulator threaded through the per-line fold.
#[derive(Debug, Default)]
pub struct ChunkerState<'a> {
    current: Vec<&'a str>,
    headers: HeaderPath,
    opened_by: Option<usize>,
    sections: Vec<Section>,
}

impl<'a> ChunkerState<'a> {
    /// Consume one line and return the next state.
    pub fn step(mut self, line: &'a str, boundaries: &BoundaryDepths) -> Self {
        match classify(line) {
            Line::Text => self.current.push(line),
            Line::Header { depth, text } => {
                if boundaries.contains(depth) {
                    if self.current.is_empty() {
                        self.current.push(line);
                    } else if !self.headers.is_empty() {
                        self.flush();
                        self.current.push(line);
                    } else {
                        // Preface text before the first header joins this section.
                        self.current.push(line);
                    }
                    self.opened_by = Some(depth);
                } else {
                    self.current.push(line);
                }
                self.headers = self.headers.enter(depth, text);
            }
        }
        self
    }

    /// Current header path.
    pub fn headers(&self) -> &HeaderPath {
        &self.headers
    }

    /// Number of sections emitted so far.
    pub fn emitted(&self) -> usize {
        self.sections.len()
    }

    fn flush(&mut self) {
        let lines = std::mem::take(&mut self.current);
        let opened_by = self.opened_by.take();
        let content = lines.join("\n").trim().to_string();
        if content.is_empty() {
            return;
        }
        let headers = match opened_by {
            Some(depth) => self.headers.restricted_to(depth),
            None => self.headers.clone(),
        };
        self.sections.push(Section {
            content,
            headers,
            boundary_depth: opened_by,
        });
    }

    fn finish(mut self) -> Vec<Section> {
        self.flush();
        self.sections
    }
}

/// Chunk `text` with the default [`extract_metadata`] annotations.
pub fn chunk_by_headers(text: &str, boundaries: &BoundaryDepths) -> Vec<Chunk> {
    chunk_by_headers_with(text, boundaries, &extract_metadata)
}

/// Chunk `text`, annotating each chunk with `extractor`.
pub fn chunk_by_headers_with<E: MetadataExtractor>(
    text: &str,
    boundaries: &BoundaryDepths,
    extractor: &E,
) -> Vec<Chunk<E::Metadata>> {
    text.lines()
        .fold(ChunkerState::default(), |state, line| {
            state.step(line, boundaries)
        })
        .finish()
        .into_iter()
        .map(|s| {
            let metadata = extractor.extract(&s.content);
            Chunk {
                content: s.content,
                headers: s.headers,
                boundary_depth: s.boundary_depth,
                metadata,
            }
        })
        .collect()
}

/// One record per non-empty line, trimmed.
pub fn chunk_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// SHA-256 hex digest of chunk text, used to detect changed content.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
