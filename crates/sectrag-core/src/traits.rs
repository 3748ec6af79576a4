/// Opaque text → vector capability.
///
/// `embed_batch` returns one vector per input, in input order, each of
/// length `dim()`.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// Sentence-boundary capability used by the chunker.
pub trait SentenceSplitter: Send + Sync {
    fn split(&self, text: &str) -> anyhow::Result<Vec<String>>;
}

/// Pluggable rewrite applied to the normalised query before embedding.
pub trait QueryRewriter: Send + Sync {
    fn rewrite(&self, query: &str) -> String;
}

/// Leaves the query untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityRewriter;

impl QueryRewriter for IdentityRewriter {
    fn rewrite(&self, query: &str) -> String { query.to_string() }
}

impl<F> QueryRewriter for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn rewrite(&self, query: &str) -> String { self(query) }
}

impl<T: Embedder + ?Sized> Embedder for Box<T> {
    fn dim(&self) -> usize { (**self).dim() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { (**self).embed_batch(texts) }
}

impl<T: Embedder + ?Sized> Embedder for std::sync::Arc<T> {
    fn dim(&self) -> usize { (**self).dim() }
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { (**self).embed_batch(texts) }
}
