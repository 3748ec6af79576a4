//! Stage orchestrator: chunk → embed → index → ask.
//!
//! Each stage checks that the previous one ran and fails with a precondition
//! error otherwise. Accelerator trouble is logged and never fails a stage.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use sectrag_core::config::Settings;
use sectrag_core::error::{Error, Result};
use sectrag_core::traits::{Embedder, QueryRewriter};
use sectrag_core::types::{Chunk, Metric};
use sectrag_core::{Chunker, Corpus};
use sectrag_embed::{embed_in_batches, HashEmbedder, TimeoutEmbedder};
use sectrag_vector::{Accelerator, SharedIndex};

use crate::retriever::{RankedChunk, Retriever};

pub struct Pipeline<E> {
    settings: Settings,
    metric: Metric,
    accelerator: Option<Accelerator>,
    chunker: Chunker,
    embedder: Arc<E>,
    retriever: Retriever<Arc<E>>,
    chunks: Vec<Chunk>,
    embeddings: Option<Vec<Vec<f32>>>,
    verbose: bool,
}

impl Pipeline<HashEmbedder> {
    /// Pipeline over the built-in hashed embedder at `embedding.dimension`.
    pub fn offline(settings: Settings) -> Result<Self> {
        let embedder = HashEmbedder::new(settings.embedding.dimension);
        Self::new(settings, embedder)
    }
}

impl<E: Embedder + 'static> Pipeline<TimeoutEmbedder<E>> {
    /// Bound every embedding call by `embedding.timeout_secs`.
    pub fn with_timeout(settings: Settings, embedder: E) -> Result<Self> {
        let timeout = Duration::from_secs(settings.embedding.timeout_secs);
        Self::new(settings, TimeoutEmbedder::new(embedder, timeout))
    }
}

impl<E: Embedder> Pipeline<E> {
    pub fn new(settings: Settings, embedder: E) -> Result<Self> {
        settings.validate()?;
        let metric = settings.index.metric()?;
        let accelerator = settings.index.accelerator.as_deref().map(str::parse::<Accelerator>).transpose()?;
        if embedder.dim() != settings.embedding.dimension {
            warn!(
                configured = settings.embedding.dimension,
                embedder = embedder.dim(),
                "embedder dimension differs from configuration; using the embedder's"
            );
        }
        let chunker = Chunker::new(settings.chunking.clone())?;
        let embedder = Arc::new(embedder);
        let retriever = Retriever::new(SharedIndex::new(), Arc::clone(&embedder), settings.retrieval.clone());
        Ok(Self { settings, metric, accelerator, chunker, embedder, retriever, chunks: Vec::new(), embeddings: None, verbose: false })
    }

    /// Show a progress bar while embedding.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_rewriter(mut self, rewriter: impl QueryRewriter + 'static) -> Self {
        self.retriever = self.retriever.with_rewriter(rewriter);
        self
    }

    pub fn settings(&self) -> &Settings { &self.settings }

    pub fn retriever(&self) -> &Retriever<Arc<E>> { &self.retriever }

    pub fn index(&self) -> &SharedIndex { self.retriever.index() }

    /// Chunks waiting to be embedded and indexed.
    pub fn pending_chunks(&self) -> &[Chunk] { &self.chunks }

    pub fn chunk(&mut self, corpus: &Corpus) -> Result<usize> {
        let chunks = self.chunker.chunk(corpus.documents())?;
        self.chunks = chunks;
        self.embeddings = None;
        Ok(self.chunks.len())
    }

    pub fn embed(&mut self) -> Result<usize> {
        if self.chunks.is_empty() {
            return Err(Error::precondition("no chunks to embed; run chunk() first"));
        }
        let texts: Vec<String> = self.chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_in_batches(&*self.embedder, &texts, self.settings.embedding.batch_size, self.verbose)?;
        let n = vectors.len();
        self.embeddings = Some(vectors);
        Ok(n)
    }

    /// Build the index from the embedded chunks, or extend it if it already
    /// exists. The pending batch is released only once the index holds it.
    pub fn build_index(&mut self) -> Result<()> {
        let Some(vectors) = self.embeddings.as_ref() else {
            return Err(Error::precondition("no embeddings to index; run embed() first"));
        };
        let index = self.retriever.index();
        if let (Some(expected), Some(first)) = (index.dim(), vectors.first()) {
            if first.len() != expected {
                return Err(Error::DimensionMismatch { expected, actual: first.len() });
            }
        }
        if index.is_built() {
            index.add(vectors, self.chunks.clone())?;
        } else {
            index.build(vectors, self.chunks.clone(), self.metric)?;
        }
        self.embeddings = None;
        self.chunks.clear();
        info!(vectors = index.len(), metric = %self.metric, "index ready");
        if let Some(accelerator) = self.accelerator {
            self.accelerate(accelerator);
        }
        Ok(())
    }

    /// `chunk`, `embed` and `build_index` in one call. Returns chunks indexed.
    pub fn ingest(&mut self, corpus: &Corpus) -> Result<usize> {
        let n = self.chunk(corpus)?;
        if n == 0 {
            warn!(documents = corpus.len(), "corpus produced no chunks; nothing indexed");
            return Ok(0);
        }
        self.embed()?;
        self.build_index()?;
        Ok(n)
    }

    /// Retrieve with the configured `top_k`.
    pub fn ask(&self, query: &str) -> Result<Vec<RankedChunk>> { self.ask_k(query, self.settings.retrieval.top_k) }

    pub fn ask_k(&self, query: &str, top_k: usize) -> Result<Vec<RankedChunk>> {
        if !self.index().is_built() {
            return Err(Error::precondition("index is not built; ingest or load first"));
        }
        self.retriever.retrieve(query, top_k)
    }

    pub fn save(&self, dir: &Path) -> Result<()> { self.index().save(dir) }

    pub fn load(&mut self, dir: &Path) -> Result<()> {
        self.index().load(dir)?;
        if let Some(dim) = self.index().dim() {
            if dim != self.embedder.dim() {
                warn!(index = dim, embedder = self.embedder.dim(), "loaded index dimension differs from the embedder");
            }
        }
        if let Some(accelerator) = self.accelerator {
            self.accelerate(accelerator);
        }
        Ok(())
    }

    /// Try to move the index onto `accelerator`. Returns whether it moved;
    /// failure is a warning and the index keeps serving from where it was.
    pub fn accelerate(&self, accelerator: Accelerator) -> bool {
        match self.index().move_to_accelerator(accelerator) {
            Ok(()) => true,
            Err(e) => {
                warn!(%accelerator, error = %e, "accelerator unavailable; index stays on host");
                false
            }
        }
    }
}
