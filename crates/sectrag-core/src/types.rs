//! Domain types shared by the chunking, index and retrieval engines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Section label used when a document has no recognised heading.
pub const BODY_SECTION: &str = "body";
/// Section label for text that precedes the first recognised heading.
pub const PREFACE_SECTION: &str = "preface";

/// A loaded source document. `id` is its arrival order in the corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: usize,
    pub name: String,
    pub text: String,
}

/// A labelled, half-open byte range `[start, end)` of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionSpan {
    pub label: String,
    pub start: usize,
    pub end: usize,
}

impl SectionSpan {
    pub fn new(label: impl Into<String>, start: usize, end: usize) -> Self {
        Self { label: label.into(), start, end }
    }

    pub fn len(&self) -> usize { self.end - self.start }

    pub fn is_empty(&self) -> bool { self.start == self.end }
}

/// Per-chunk metadata record; this is what `meta.json` holds, one per vector.
///
/// - `doc_id`: arrival order of the parent document
/// - `chunk_id`: dense per-document counter in section traversal order
/// - `source`: document name
/// - `section`: lowercased section label
/// - `sentence_start`/`sentence_end`: half-open range into the section's sentences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub doc_id: usize,
    pub chunk_id: usize,
    pub source: String,
    pub section: String,
    pub sentence_start: usize,
    pub sentence_end: usize,
}

/// A window of sentences from one section of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(flatten)]
    pub meta: ChunkMeta,
    pub text: String,
}

impl Chunk {
    pub fn section(&self) -> &str { &self.meta.section }
}

/// Distance function of a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Squared Euclidean distance over raw vectors; lower is closer.
    #[default]
    L2,
    /// Inner product over L2-normalised vectors; higher is closer.
    Cosine,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::L2 => "l2",
            Metric::Cosine => "cosine",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "l2" => Ok(Metric::L2),
            "cosine" => Ok(Metric::Cosine),
            other => Err(Error::UnsupportedMetric(other.to_string())),
        }
    }
}

/// Raw score of an index hit, tagged by how it orders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Score {
    /// Lower is better (L2 metric).
    Distance(f32),
    /// Higher is better (cosine metric).
    Similarity(f32),
}

impl Score {
    /// Map onto a higher-is-better similarity; distances go through `1 / (1 + d)`.
    pub fn similarity(self) -> f32 {
        match self {
            Score::Distance(d) => 1.0 / (1.0 + d),
            Score::Similarity(s) => s,
        }
    }

    pub fn value(self) -> f32 {
        match self {
            Score::Distance(v) | Score::Similarity(v) => v,
        }
    }
}
