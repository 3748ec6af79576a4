use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::warn;

use sectrag_core::traits::Embedder;

/// Bounds every `embed_batch` call on the wrapped embedder.
///
/// The call runs on a worker thread; when the deadline passes the caller gets
/// an error and the worker's eventual result is dropped.
pub struct TimeoutEmbedder<E> {
    inner: Arc<E>,
    timeout: Duration,
}

impl<E: Embedder + 'static> TimeoutEmbedder<E> {
    pub fn new(inner: E, timeout: Duration) -> Self { Self { inner: Arc::new(inner), timeout } }

    pub fn timeout(&self) -> Duration { self.timeout }
}

impl<E: Embedder + 'static> Embedder for TimeoutEmbedder<E> {
    fn dim(&self) -> usize { self.inner.dim() }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let (tx, rx) = mpsc::channel();
        let inner = Arc::clone(&self.inner);
        let texts = texts.to_vec();
        thread::Builder::new()
            .name("sectrag-embed".to_string())
            .spawn(move || {
                let _ = tx.send(inner.embed_batch(&texts));
            })?;
        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "embedding call timed out");
                Err(anyhow!("embedding timed out after {:?}", self.timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(anyhow!("embedding worker exited without a result")),
        }
    }
}
