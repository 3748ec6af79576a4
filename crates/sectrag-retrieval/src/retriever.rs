use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use sectrag_core::config::RetrievalConfig;
use sectrag_core::error::Result;
use sectrag_core::sentences::collapse_whitespace;
use sectrag_core::traits::{Embedder, IdentityRewriter, QueryRewriter};
use sectrag_core::types::{Chunk, Score};
use sectrag_embed::embed_query;
use sectrag_vector::{SearchHit, SharedIndex};

/// One entry of a result set, best first.
#[derive(Debug, Clone, Serialize)]
pub struct RankedChunk {
    pub chunk: Arc<Chunk>,
    /// Row in the index backing store.
    pub position: usize,
    pub raw_score: Score,
    /// `raw_score` mapped to higher-is-better.
    pub similarity: f32,
    /// Section weight applied to `similarity`.
    pub priority: f32,
    pub final_score: f32,
}

/// Trim, collapse whitespace runs, lowercase.
pub fn normalize_query(query: &str) -> String { collapse_whitespace(query).to_lowercase() }

pub struct Retriever<E> {
    index: SharedIndex,
    embedder: E,
    config: RetrievalConfig,
    rewriter: Box<dyn QueryRewriter>,
}

impl<E: Embedder> Retriever<E> {
    pub fn new(index: SharedIndex, embedder: E, config: RetrievalConfig) -> Self {
        Self { index, embedder, config, rewriter: Box::new(IdentityRewriter) }
    }

    /// Install a query rewrite and turn `rewrite_query` on.
    pub fn with_rewriter(mut self, rewriter: impl QueryRewriter + 'static) -> Self {
        self.rewriter = Box::new(rewriter);
        self.config.rewrite_query = true;
        self
    }

    pub fn config(&self) -> &RetrievalConfig { &self.config }

    pub fn index(&self) -> &SharedIndex { &self.index }

    pub fn embedder(&self) -> &E { &self.embedder }

    /// The text that actually gets embedded for `query`.
    pub fn prepare_query(&self, query: &str) -> String {
        let normalized = normalize_query(query);
        if self.config.rewrite_query {
            self.rewriter.rewrite(&normalized)
        } else {
            normalized
        }
    }

    /// At most `top_k` chunks ordered by descending final score. Fewer come
    /// back when filtering leaves fewer; that is not an error.
    pub fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RankedChunk>> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        let text = self.prepare_query(query);
        let vector = embed_query(&self.embedder, &text)?;
        let oversampled = top_k.saturating_mul(self.config.oversample_factor.max(1));
        let hits = self.index.search_one(&vector, oversampled)?;
        debug!(query = %text, candidates = hits.len(), requested = oversampled, "raw candidates");
        Ok(self.rerank(hits, top_k))
    }

    /// Drop skipped sections, weight by section priority, stable-sort, cut.
    pub fn rerank(&self, hits: Vec<SearchHit>, top_k: usize) -> Vec<RankedChunk> {
        let mut ranked: Vec<RankedChunk> = hits
            .into_iter()
            .filter(|hit| !self.config.is_skipped(hit.chunk.section()))
            .map(|hit| {
                let similarity = hit.score.similarity();
                let priority = self.config.priority(hit.chunk.section());
                RankedChunk {
                    position: hit.position,
                    raw_score: hit.score,
                    similarity,
                    priority,
                    final_score: similarity * priority,
                    chunk: hit.chunk,
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
        ranked.truncate(top_k);
        ranked
    }
}
