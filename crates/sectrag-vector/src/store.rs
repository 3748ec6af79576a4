//! On-disk layout of a saved index directory.
//!
//! | file             | content                                        | required |
//! |------------------|------------------------------------------------|----------|
//! | `index.flat`     | [`IndexHeader`] + search-ready f32 matrix      | yes      |
//! | `embeddings.f32` | [`MatrixHeader`] + vectors as inserted         | no       |
//! | `meta.json`      | one [`ChunkMeta`] per row, insertion order     | no       |
//! | `chunks.txt`     | one chunk text per line, newlines flattened    | no       |
//!
//! Matrices are stored in host byte order. Every file is written to a temp
//! file in the target directory and renamed into place.
use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::Path;

use bytemuck::{Pod, Zeroable};
use tempfile::NamedTempFile;

use sectrag_core::error::{Error, Result};
use sectrag_core::types::{ChunkMeta, Metric};

pub const INDEX_FILE: &str = "index.flat";
pub const VECTORS_FILE: &str = "embeddings.f32";
pub const META_FILE: &str = "meta.json";
pub const CHUNKS_FILE: &str = "chunks.txt";

const INDEX_MAGIC: [u8; 8] = *b"SECTFLAT";
const MATRIX_MAGIC: [u8; 8] = *b"SECTMAT1";
const INDEX_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct IndexHeader {
    magic: [u8; 8],
    version: u32,
    metric: u32,
    dim: u64,
    count: u64,
    /// blake3 of the f32 block that follows the header.
    digest: [u8; 32],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MatrixHeader {
    magic: [u8; 8],
    rows: u64,
    cols: u64,
}

/// Contents of `index.flat` after validation.
#[derive(Debug)]
pub struct IndexArtifact {
    pub metric: Metric,
    pub dim: usize,
    pub count: usize,
    pub data: Vec<f32>,
}

fn metric_code(metric: Metric) -> u32 {
    match metric {
        Metric::L2 => 0,
        Metric::Cosine => 1,
    }
}

fn metric_from_code(code: u32) -> Result<Metric> {
    match code {
        0 => Ok(Metric::L2),
        1 => Ok(Metric::Cosine),
        other => Err(Error::Corrupt(format!("unknown metric code {other} in {INDEX_FILE}"))),
    }
}

/// Write `bytes` to `path` via a sibling temp file and an atomic rename.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Read a file, mapping "not found" to `None`.
fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn decode_f32(block: &[u8], what: &str) -> Result<Vec<f32>> {
    if block.len() % std::mem::size_of::<f32>() != 0 {
        return Err(Error::Corrupt(format!("{what}: data block is {} bytes, not a whole number of f32", block.len())));
    }
    Ok(bytemuck::pod_collect_to_vec::<u8, f32>(block))
}

pub fn write_index(dir: &Path, metric: Metric, dim: usize, data: &[f32]) -> Result<()> {
    let block: &[u8] = bytemuck::cast_slice(data);
    let header = IndexHeader {
        magic: INDEX_MAGIC,
        version: INDEX_VERSION,
        metric: metric_code(metric),
        dim: dim as u64,
        count: (data.len() / dim.max(1)) as u64,
        digest: *blake3::hash(block).as_bytes(),
    };
    let mut bytes = Vec::with_capacity(std::mem::size_of::<IndexHeader>() + block.len());
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(block);
    write_atomic(&dir.join(INDEX_FILE), &bytes)
}

pub fn read_index(dir: &Path) -> Result<IndexArtifact> {
    let path = dir.join(INDEX_FILE);
    let bytes = read_optional(&path)?.ok_or_else(|| Error::MissingArtifact(path.clone()))?;
    let header_len = std::mem::size_of::<IndexHeader>();
    if bytes.len() < header_len {
        return Err(Error::Corrupt(format!("{INDEX_FILE} is truncated ({} bytes)", bytes.len())));
    }
    let header: IndexHeader = bytemuck::pod_read_unaligned(&bytes[..header_len]);
    if header.magic != INDEX_MAGIC {
        return Err(Error::Corrupt(format!("{INDEX_FILE} has wrong magic")));
    }
    if header.version != INDEX_VERSION {
        return Err(Error::Corrupt(format!("{INDEX_FILE} version {} is not supported", header.version)));
    }
    let block = &bytes[header_len..];
    if blake3::hash(block).as_bytes() != &header.digest {
        return Err(Error::Corrupt(format!("{INDEX_FILE} digest mismatch")));
    }
    let metric = metric_from_code(header.metric)?;
    let (dim, count) = (header.dim as usize, header.count as usize);
    let data = decode_f32(block, INDEX_FILE)?;
    if dim == 0 || data.len() != dim * count {
        return Err(Error::Corrupt(format!(
            "{INDEX_FILE} declares {count}x{dim} but holds {} values",
            data.len()
        )));
    }
    Ok(IndexArtifact { metric, dim, count, data })
}

pub fn write_matrix(dir: &Path, rows: usize, cols: usize, data: &[f32]) -> Result<()> {
    let header = MatrixHeader { magic: MATRIX_MAGIC, rows: rows as u64, cols: cols as u64 };
    let block: &[u8] = bytemuck::cast_slice(data);
    let mut bytes = Vec::with_capacity(std::mem::size_of::<MatrixHeader>() + block.len());
    bytes.extend_from_slice(bytemuck::bytes_of(&header));
    bytes.extend_from_slice(block);
    write_atomic(&dir.join(VECTORS_FILE), &bytes)
}

/// Returns `(rows, cols, data)` if the raw-vector artifact exists.
pub fn read_matrix(dir: &Path) -> Result<Option<(usize, usize, Vec<f32>)>> {
    let Some(bytes) = read_optional(&dir.join(VECTORS_FILE))? else { return Ok(None) };
    let header_len = std::mem::size_of::<MatrixHeader>();
    if bytes.len() < header_len {
        return Err(Error::Corrupt(format!("{VECTORS_FILE} is truncated")));
    }
    let header: MatrixHeader = bytemuck::pod_read_unaligned(&bytes[..header_len]);
    if header.magic != MATRIX_MAGIC {
        return Err(Error::Corrupt(format!("{VECTORS_FILE} has wrong magic")));
    }
    let data = decode_f32(&bytes[header_len..], VECTORS_FILE)?;
    Ok(Some((header.rows as usize, header.cols as usize, data)))
}

pub fn write_meta(dir: &Path, meta: &[&ChunkMeta]) -> Result<()> {
    let json = serde_json::to_vec_pretty(meta)?;
    write_atomic(&dir.join(META_FILE), &json)
}

pub fn read_meta(dir: &Path) -> Result<Option<Vec<ChunkMeta>>> {
    match read_optional(&dir.join(META_FILE))? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// One line per chunk; embedded line breaks become spaces so line count
/// always equals chunk count.
pub fn write_texts<'a, I>(dir: &Path, texts: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = String::new();
    for text in texts {
        out.extend(text.chars().map(|c| if c == '\n' || c == '\r' { ' ' } else { c }));
        out.push('\n');
    }
    write_atomic(&dir.join(CHUNKS_FILE), out.as_bytes())
}

pub fn read_texts(dir: &Path) -> Result<Option<Vec<String>>> {
    match read_optional(&dir.join(CHUNKS_FILE))? {
        Some(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            Ok(Some(text.lines().map(|l| l.trim().to_string()).collect()))
        }
        None => Ok(None),
    }
}

