//! Embedding capabilities: a deterministic offline embedder, the corpus batch
//! driver, and a wrapper that bounds each external call with a timeout.
use std::hash::{Hash, Hasher};

use anyhow::Result;
use twox_hash::XxHash64;

pub use sectrag_core::traits::Embedder;

pub mod batch;
pub mod timeout;

pub use batch::{embed_in_batches, embed_query};
pub use timeout::TimeoutEmbedder;

/// Hashed bag-of-words embedder.
///
/// Tokens are lowercased and stripped of surrounding punctuation, hashed into
/// one of `dim` buckets, and the bucket counts are L2-normalised. Same text,
/// same vector; useful offline and in tests where loading a model is not an
/// option.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if token.is_empty() {
                continue;
            }
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let idx = (hasher.finish() % self.dim as u64) as usize;
            v[idx] += 1.0;
        }
        let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
