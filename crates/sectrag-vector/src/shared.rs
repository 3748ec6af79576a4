use std::path::Path;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::info;

use sectrag_core::error::{Error, Result};
use sectrag_core::types::{Chunk, Metric};

use crate::accelerator::{Accelerator, DeviceMatrix};
use crate::flat::{FlatIndex, Residency, SearchHit};

/// Handle to a flat index shared between one writer and many readers.
///
/// `None` inside the lock is the empty state; `build` and `load` move it to
/// built exactly once. Searches take the read lock, so they never observe a
/// half-applied `add`.
#[derive(Debug, Clone, Default)]
pub struct SharedIndex {
    inner: Arc<RwLock<Option<FlatIndex>>>,
}

fn not_built() -> Error { Error::precondition("index has not been built or loaded") }

impl SharedIndex {
    pub fn new() -> Self { Self::default() }

    fn read(&self) -> Result<RwLockReadGuard<'_, Option<FlatIndex>>> {
        self.inner.read().map_err(|_| Error::precondition("index lock poisoned by a panicked writer"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Option<FlatIndex>>> {
        self.inner.write().map_err(|_| Error::precondition("index lock poisoned by a panicked writer"))
    }

    fn install(&self, index: FlatIndex) -> Result<()> {
        let mut guard = self.write()?;
        if guard.is_some() {
            return Err(Error::precondition("index is already built"));
        }
        *guard = Some(index);
        Ok(())
    }

    pub fn is_built(&self) -> bool { self.read().map(|g| g.is_some()).unwrap_or(false) }

    pub fn build(&self, vectors: &[Vec<f32>], chunks: Vec<Chunk>, metric: Metric) -> Result<()> {
        if self.is_built() {
            return Err(Error::precondition("index is already built"));
        }
        self.install(FlatIndex::build(vectors, chunks, metric)?)
    }

    pub fn load(&self, dir: &Path) -> Result<()> {
        if self.is_built() {
            return Err(Error::precondition("index is already built"));
        }
        self.install(FlatIndex::load(dir)?)
    }

    pub fn add(&self, vectors: &[Vec<f32>], chunks: Vec<Chunk>) -> Result<()> {
        let mut guard = self.write()?;
        guard.as_mut().ok_or_else(not_built)?.add(vectors, chunks)
    }

    pub fn search(&self, queries: &[Vec<f32>], k: usize) -> Result<Vec<Vec<SearchHit>>> {
        self.read()?.as_ref().ok_or_else(not_built)?.search(queries, k)
    }

    pub fn search_one(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.read()?.as_ref().ok_or_else(not_built)?.search_one(query, k)
    }

    pub fn save(&self, dir: &Path) -> Result<()> { self.read()?.as_ref().ok_or_else(not_built)?.save(dir) }

    /// Run `f` against the built index under the read lock.
    pub fn with_index<R>(&self, f: impl FnOnce(&FlatIndex) -> R) -> Result<R> {
        Ok(f(self.read()?.as_ref().ok_or_else(not_built)?))
    }

    pub fn len(&self) -> usize { self.with_index(FlatIndex::len).unwrap_or(0) }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn dim(&self) -> Option<usize> { self.with_index(FlatIndex::dim).ok() }

    pub fn metric(&self) -> Option<Metric> { self.with_index(FlatIndex::metric).ok() }

    pub fn residency(&self) -> Option<Residency> { self.with_index(FlatIndex::residency).ok() }

    /// Copy the rows under the read lock, upload with no lock held, then
    /// install under the write lock if no rows arrived in between. On any
    /// error the index is left as it was.
    pub fn move_to_accelerator(&self, accelerator: Accelerator) -> Result<()> {
        let (rows, dim, snapshot) = self.with_index(|idx| (idx.len(), idx.dim(), idx.search_vectors().to_vec()))?;
        let device = DeviceMatrix::upload(accelerator, &snapshot, rows, dim)?;
        drop(snapshot);
        let mut guard = self.write()?;
        guard.as_mut().ok_or_else(not_built)?.attach(device)?;
        info!(%accelerator, rows, "shared index moved to accelerator");
        Ok(())
    }

    pub fn to_host(&self) -> Result<()> {
        let mut guard = self.write()?;
        guard.as_mut().ok_or_else(not_built)?.to_host();
        Ok(())
    }
}
