//! Section-aware sentence-window chunking.
//!
//! Each document is cut into section spans at recognised heading terms, each
//! span is segmented into sentences, and overlapping windows of sentences
//! become [`Chunk`]s. `chunk_id` is dense per document across all spans.
use regex::Regex;
use tracing::{debug, info};

use crate::config::{ChunkingConfig, DEFAULT_SECTION_HEADINGS};
use crate::error::{Error, Result};
use crate::sentences::{collapse_whitespace, PunctuationSplitter};
use crate::traits::SentenceSplitter;
use crate::types::{Chunk, ChunkMeta, Document, SectionSpan, BODY_SECTION, PREFACE_SECTION};

/// A heading term found in a document, as a byte range plus lowercased label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingMatch {
    pub start: usize,
    pub end: usize,
    pub label: String,
}

pub struct Chunker<S = PunctuationSplitter> {
    config: ChunkingConfig,
    headings: Regex,
    splitter: S,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Result<Self> { Self::with_splitter(config, PunctuationSplitter) }
}

impl<S: SentenceSplitter> Chunker<S> {
    /// Fails with a configuration error when the window could never advance
    /// or the heading vocabulary does not compile. An empty vocabulary means
    /// [`DEFAULT_SECTION_HEADINGS`].
    pub fn with_splitter(config: ChunkingConfig, splitter: S) -> Result<Self> {
        config.validate()?;
        let mut terms: Vec<String> = config
            .headings
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .map(regex::escape)
            .collect();
        if terms.is_empty() {
            terms = DEFAULT_SECTION_HEADINGS.iter().copied().map(regex::escape).collect();
        }
        let pattern = format!(r"(?i)\b({})\b", terms.join("|"));
        let headings = Regex::new(&pattern).map_err(|e| Error::Config(format!("bad heading vocabulary: {e}")))?;
        Ok(Self { config, headings, splitter })
    }

    pub fn config(&self) -> &ChunkingConfig { &self.config }

    /// Whole-word, case-insensitive heading matches sorted by start offset.
    pub fn find_headings(&self, text: &str) -> Vec<HeadingMatch> {
        let mut matches: Vec<HeadingMatch> = self
            .headings
            .find_iter(text)
            .map(|m| HeadingMatch { start: m.start(), end: m.end(), label: m.as_str().trim().to_lowercase() })
            .collect();
        matches.sort_by_key(|m| m.start);
        matches
    }

    /// Contiguous spans covering `[0, text.len())`.
    pub fn section_spans(&self, text: &str) -> Vec<SectionSpan> {
        let matches = self.find_headings(text);
        if matches.is_empty() {
            return vec![SectionSpan::new(BODY_SECTION, 0, text.len())];
        }

        let mut spans = Vec::with_capacity(matches.len() + 1);
        if matches[0].start > 0 {
            spans.push(SectionSpan::new(PREFACE_SECTION, 0, matches[0].start));
        }
        for (i, m) in matches.iter().enumerate() {
            let end = matches.get(i + 1).map_or(text.len(), |next| next.start);
            spans.push(SectionSpan::new(m.label.clone(), m.start, end));
        }
        spans
    }

    /// Sentences of a section with whitespace collapsed; empties dropped.
    pub fn split_sentences(&self, text: &str) -> Result<Vec<String>> {
        let raw = self.splitter.split(text).map_err(|e| Error::Segmentation(format!("{e:#}")))?;
        Ok(raw.iter().map(|s| collapse_whitespace(s)).filter(|s| !s.is_empty()).collect())
    }

    pub fn chunk_document(&self, doc: &Document) -> Result<Vec<Chunk>> {
        let spans = self.section_spans(&doc.text);
        info!(doc_id = doc.id, source = %doc.name, sections = spans.len(), "section-aware chunking");

        let mut chunks = Vec::new();
        for span in &spans {
            let sentences = self.split_sentences(doc.text[span.start..span.end].trim())?;
            if sentences.is_empty() {
                continue;
            }
            let before = chunks.len();
            for (start, end) in window_ranges(sentences.len(), self.config.sentences_per_chunk, self.config.overlap_sentences) {
                let text = sentences[start..end].join(" ");
                if text.is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    meta: ChunkMeta {
                        doc_id: doc.id,
                        chunk_id: chunks.len(),
                        source: doc.name.clone(),
                        section: span.label.clone(),
                        sentence_start: start,
                        sentence_end: end,
                    },
                    text,
                });
            }
            debug!(section = %span.label, chunks = chunks.len() - before, "section chunked");
        }
        info!(doc_id = doc.id, chunks = chunks.len(), "document chunked");
        Ok(chunks)
    }

    /// Chunks for every document, in document order.
    pub fn chunk(&self, documents: &[Document]) -> Result<Vec<Chunk>> {
        let mut all_chunks = Vec::new();
        for doc in documents {
            all_chunks.extend(self.chunk_document(doc)?);
        }
        info!(documents = documents.len(), chunks = all_chunks.len(), "all documents chunked");
        Ok(all_chunks)
    }
}

/// Half-open sentence ranges of a window of `size` sliding by `size - overlap`
/// over `n` sentences. Requires `overlap < size`.
///
/// Sliding continues while the window start is inside the section, so the
/// tail sentences covered by the overlap get a window of their own. A section
/// shorter than `size` is a single chunk.
pub fn window_ranges(n: usize, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    debug_assert!(overlap < size);
    if n == 0 {
        return Vec::new();
    }
    if n < size {
        return vec![(0, n)];
    }
    let step = size - overlap;
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < n {
        ranges.push((start, (start + size).min(n)));
        start += step;
    }
    ranges
}
