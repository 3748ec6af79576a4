use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use sectrag_core::error::{Error, Result};
use sectrag_core::traits::Embedder;

/// Embed `texts` in fixed-size batches, sequentially, preserving input order.
///
/// Every batch must come back with one vector per input and each vector must
/// have `embedder.dim()` entries.
pub fn embed_in_batches<E>(embedder: &E, texts: &[String], batch_size: usize, show_progress: bool) -> Result<Vec<Vec<f32>>>
where
    E: Embedder + ?Sized,
{
    if batch_size == 0 {
        return Err(Error::Config("batch_size must be positive".into()));
    }
    let pb = if show_progress { ProgressBar::new(texts.len() as u64) } else { ProgressBar::hidden() };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    let dim = embedder.dim();
    let mut out = Vec::with_capacity(texts.len());
    for (batch_no, batch) in texts.chunks(batch_size).enumerate() {
        let start = batch_no * batch_size;
        let vectors = embedder.embed_batch(batch).map_err(|e| Error::Embedding(format!("{e:#}")))?;
        if vectors.len() != batch.len() {
            return Err(Error::Embedding(format!(
                "embedder returned {} vectors for {} inputs",
                vectors.len(),
                batch.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::Embedding(format!("embedder declared dim {dim} but returned {}", bad.len())));
        }
        out.extend(vectors);
        pb.inc(batch.len() as u64);
        debug!(start, end = start + batch.len(), "encoded batch");
    }
    pb.finish_and_clear();
    info!(vectors = out.len(), dim, "embedding complete");
    Ok(out)
}

/// Embed a single query string.
pub fn embed_query<E>(embedder: &E, text: &str) -> Result<Vec<f32>>
where
    E: Embedder + ?Sized,
{
    let mut vectors = embedder
        .embed_batch(&[text.to_string()])
        .map_err(|e| Error::Embedding(format!("{e:#}")))?;
    if vectors.len() != 1 {
        return Err(Error::Embedding(format!("embedder returned {} vectors for one query", vectors.len())));
    }
    Ok(vectors.remove(0))
}
