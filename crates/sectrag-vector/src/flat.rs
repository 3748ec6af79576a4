//! Exact nearest-neighbour index over a dense row-major matrix.
//!
//! Rows are scored against every query (squared L2, or inner product over
//! unit vectors for cosine) and the best `k` are returned. Vectors and chunk
//! payloads are kept in two parallel sequences of equal length.
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use sectrag_core::error::{Error, Result};
use sectrag_core::types::{Chunk, ChunkMeta, Metric, Score};

use crate::accelerator::{Accelerator, DeviceMatrix};
use crate::store::{self, IndexArtifact, CHUNKS_FILE, META_FILE, VECTORS_FILE};

/// Position reported by [`FlatIndex::raw_search`] for an unfilled slot.
pub const NO_MATCH: i64 = -1;

/// Where searches run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    Host,
    Device(Accelerator),
}

/// One nearest-neighbour result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    /// Row of the backing matrix (insertion order).
    pub position: usize,
    pub score: Score,
    pub chunk: Arc<Chunk>,
}

#[derive(Debug)]
pub struct FlatIndex {
    metric: Metric,
    dim: usize,
    /// Search-ready rows; unit length under cosine.
    vectors: Vec<f32>,
    /// Rows as inserted, kept only under cosine where they differ from `vectors`.
    originals: Option<Vec<f32>>,
    chunks: Vec<Arc<Chunk>>,
    device: Option<DeviceMatrix>,
}

fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v {
            *x /= norm;
        }
    }
}

fn flatten(vectors: &[Vec<f32>], dim: usize) -> Result<Vec<f32>> {
    let mut flat = Vec::with_capacity(vectors.len() * dim);
    for v in vectors {
        if v.len() != dim {
            return Err(Error::DimensionMismatch { expected: dim, actual: v.len() });
        }
        flat.extend_from_slice(v);
    }
    Ok(flat)
}

fn placeholder_meta(position: usize) -> ChunkMeta {
    ChunkMeta {
        doc_id: 0,
        chunk_id: position,
        source: String::new(),
        section: String::new(),
        sentence_start: 0,
        sentence_end: 0,
    }
}

impl FlatIndex {
    /// Build from `vectors` and their parallel `chunks`. The dimension is taken
    /// from the first vector and every other vector must match it.
    pub fn build(vectors: &[Vec<f32>], chunks: Vec<Chunk>, metric: Metric) -> Result<Self> {
        if vectors.is_empty() {
            return Err(Error::precondition("cannot build an index from zero vectors"));
        }
        if vectors.len() != chunks.len() {
            return Err(Error::precondition(format!(
                "{} vectors but {} chunk payloads",
                vectors.len(),
                chunks.len()
            )));
        }
        let dim = vectors[0].len();
        if dim == 0 {
            return Err(Error::precondition("vectors have zero dimensions"));
        }
        let raw = flatten(vectors, dim)?;
        let mut index = Self { metric, dim, vectors: Vec::new(), originals: None, chunks: Vec::new(), device: None };
        index.append(raw, chunks);
        info!(vectors = index.len(), dim, metric = %metric, "flat index built");
        Ok(index)
    }

    /// Push rows and payloads; returns the offset (in floats) of the first new row.
    fn append(&mut self, raw: Vec<f32>, chunks: Vec<Chunk>) -> usize {
        let start = self.vectors.len();
        match self.metric {
            Metric::L2 => self.vectors.extend(raw),
            Metric::Cosine => {
                self.vectors.extend_from_slice(&raw);
                for row in self.vectors[start..].chunks_exact_mut(self.dim) {
                    l2_normalize(row);
                }
                self.originals.get_or_insert_with(Vec::new).extend(raw);
            }
        }
        self.chunks.extend(chunks.into_iter().map(Arc::new));
        start
    }

    pub fn add(&mut self, vectors: &[Vec<f32>], chunks: Vec<Chunk>) -> Result<()> {
        if vectors.len() != chunks.len() {
            return Err(Error::precondition(format!(
                "{} vectors but {} chunk payloads",
                vectors.len(),
                chunks.len()
            )));
        }
        if vectors.is_empty() {
            return Ok(());
        }
        let raw = flatten(vectors, self.dim)?;
        let start = self.append(raw, chunks);

        let failed = match self.device.as_mut() {
            Some(device) => device.append(&self.vectors[start..], vectors.len()).err().map(|e| (device.accelerator(), e)),
            None => None,
        };
        if let Some((accelerator, e)) = failed {
            warn!(%accelerator, error = %e, "device copy could not be extended; searching on host");
            self.device = None;
        }
        info!(added = vectors.len(), total = self.len(), "vectors added to flat index");
        Ok(())
    }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    pub fn dim(&self) -> usize { self.dim }

    pub fn metric(&self) -> Metric { self.metric }

    pub fn chunks(&self) -> &[Arc<Chunk>] { &self.chunks }

    /// Backing rows as they are searched (normalised under cosine).
    pub fn search_vectors(&self) -> &[f32] { &self.vectors }

    /// Rows as they were inserted.
    pub fn raw_vectors(&self) -> &[f32] { self.originals.as_deref().unwrap_or(&self.vectors) }

    pub fn residency(&self) -> Residency {
        match &self.device {
            Some(device) => Residency::Device(device.accelerator()),
            None => Residency::Host,
        }
    }

    /// Upload the current rows to `accelerator` without changing the index.
    pub fn upload(&self, accelerator: Accelerator) -> Result<DeviceMatrix> {
        DeviceMatrix::upload(accelerator, &self.vectors, self.len(), self.dim)
    }

    /// Install a device copy produced by [`FlatIndex::upload`]. Fails if rows
    /// were added since the upload.
    pub fn attach(&mut self, device: DeviceMatrix) -> Result<()> {
        if device.rows() != self.len() {
            return Err(Error::Accelerator(format!(
                "device copy has {} rows but the index has {}",
                device.rows(),
                self.len()
            )));
        }
        info!(accelerator = %device.accelerator(), vectors = self.len(), "flat index resident on device");
        self.device = Some(device);
        Ok(())
    }

    /// On error the index keeps searching where it did before.
    pub fn move_to_accelerator(&mut self, accelerator: Accelerator) -> Result<()> {
        let device = self.upload(accelerator)?;
        self.attach(device)
    }

    pub fn to_host(&mut self) { self.device = None; }

    pub fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<SearchHit>>> {
        queries.iter().map(|q| self.search_one(q, k)).collect()
    }

    /// Up to `k` hits, best first. Sentinel or out-of-range positions from the
    /// raw search never reach the caller.
    pub fn search_one(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let (scores, positions) = self.raw_search(query, k)?;
        let hits = positions
            .iter()
            .zip(scores)
            .filter_map(|(&pos, score)| {
                let position = usize::try_from(pos).ok().filter(|&p| p < self.chunks.len())?;
                Some(SearchHit { position, score: self.tag(score), chunk: Arc::clone(&self.chunks[position]) })
            })
            .collect();
        Ok(hits)
    }

    fn tag(&self, raw: f32) -> Score {
        match self.metric {
            Metric::L2 => Score::Distance(raw),
            Metric::Cosine => Score::Similarity(raw),
        }
    }

    /// Exactly `k` `(score, position)` slots, best first; slots beyond the
    /// index size hold [`NO_MATCH`] and an infinitely bad score.
    pub fn raw_search(&self, query: &[f32], k: usize) -> Result<(Vec<f32>, Vec<i64>)> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if k == 0 {
            return Ok((Vec::new(), Vec::new()));
        }
        let mut q = query.to_vec();
        if self.metric == Metric::Cosine {
            l2_normalize(&mut q);
        }

        let metric = self.metric;
        let order = |a: &(usize, f32), b: &(usize, f32)| -> Ordering {
            let by_score = match metric {
                Metric::L2 => a.1.total_cmp(&b.1),
                Metric::Cosine => b.1.total_cmp(&a.1),
            };
            by_score.then(a.0.cmp(&b.0))
        };
        let mut ranked: Vec<(usize, f32)> = self.row_scores(&q).into_iter().enumerate().collect();
        let take = k.min(ranked.len());
        if take > 0 && take < ranked.len() {
            ranked.select_nth_unstable_by(take - 1, order);
            ranked.truncate(take);
        }
        ranked.sort_by(order);

        let worst = match metric {
            Metric::L2 => f32::INFINITY,
            Metric::Cosine => f32::NEG_INFINITY,
        };
        let mut scores = Vec::with_capacity(k);
        let mut positions = Vec::with_capacity(k);
        for (pos, score) in ranked {
            positions.push(pos as i64);
            scores.push(score);
        }
        scores.resize(k, worst);
        positions.resize(k, NO_MATCH);
        Ok((scores, positions))
    }

    fn row_scores(&self, q: &[f32]) -> Vec<f32> {
        if let Some(device) = &self.device {
            match device.scores(self.metric, q) {
                Ok(scores) if scores.len() == self.len() => return scores,
                Ok(scores) => warn!(rows = scores.len(), expected = self.len(), "device returned wrong row count; scoring on host"),
                Err(e) => warn!(accelerator = %device.accelerator(), error = %e, "device search failed; scoring on host"),
            }
        }
        self.host_scores(q)
    }

    fn host_scores(&self, q: &[f32]) -> Vec<f32> {
        self.vectors
            .chunks_exact(self.dim)
            .map(|row| match self.metric {
                Metric::L2 => row.iter().zip(q).map(|(a, b)| (a - b) * (a - b)).sum(),
                Metric::Cosine => row.iter().zip(q).map(|(a, b)| a * b).sum(),
            })
            .collect()
    }

    /// Write all four artifacts into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        store::write_index(dir, self.metric, self.dim, &self.vectors)?;
        store::write_matrix(dir, self.len(), self.dim, self.raw_vectors())?;
        let meta: Vec<&ChunkMeta> = self.chunks.iter().map(|c| &c.meta).collect();
        store::write_meta(dir, &meta)?;
        store::write_texts(dir, self.chunks.iter().map(|c| c.text.as_str()))?;
        info!(dir = %dir.display(), vectors = self.len(), dim = self.dim, metric = %self.metric, "flat index saved");
        Ok(())
    }

    /// Only `index.flat` is required; payloads fall back to placeholders when
    /// the metadata or text artifacts are absent.
    pub fn load(dir: &Path) -> Result<Self> {
        let IndexArtifact { metric, dim, count, data } = store::read_index(dir)?;

        let originals = match store::read_matrix(dir)? {
            Some((rows, cols, raw)) if rows == count && cols == dim && raw.len() == rows * cols => {
                (metric == Metric::Cosine).then_some(raw)
            }
            Some((rows, cols, _)) => {
                warn!(file = VECTORS_FILE, rows, cols, count, dim, "raw vector artifact does not match the index; ignoring it");
                (metric == Metric::Cosine).then(|| data.clone())
            }
            None => {
                debug!(file = VECTORS_FILE, "no raw vector artifact");
                (metric == Metric::Cosine).then(|| data.clone())
            }
        };

        let metas = match store::read_meta(dir)? {
            Some(metas) if metas.len() == count => metas,
            Some(metas) => {
                return Err(Error::Corrupt(format!("{META_FILE} has {} records for {count} vectors", metas.len())));
            }
            None => {
                warn!(file = META_FILE, "no metadata artifact; chunk payloads get placeholder metadata");
                (0..count).map(placeholder_meta).collect()
            }
        };
        let texts = match store::read_texts(dir)? {
            Some(texts) if texts.len() == count => texts,
            Some(texts) => {
                return Err(Error::Corrupt(format!("{CHUNKS_FILE} has {} lines for {count} vectors", texts.len())));
            }
            None => {
                warn!(file = CHUNKS_FILE, "no chunk text artifact; chunk payloads have empty text");
                vec![String::new(); count]
            }
        };
        let chunks = metas.into_iter().zip(texts).map(|(meta, text)| Arc::new(Chunk { meta, text })).collect();

        info!(dir = %dir.display(), vectors = count, dim, metric = %metric, "flat index loaded");
        Ok(Self { metric, dim, vectors: data, originals, chunks, device: None })
    }
}
