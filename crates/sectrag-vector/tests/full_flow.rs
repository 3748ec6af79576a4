use std::fs;

use sectrag_core::error::{Error, ErrorKind};
use sectrag_core::types::{Chunk, ChunkMeta, Metric};
use sectrag_embed::{embed_in_batches, embed_query, HashEmbedder};
use sectrag_vector::store::{CHUNKS_FILE, INDEX_FILE, META_FILE, VECTORS_FILE};
use sectrag_vector::{FlatIndex, SharedIndex};
use tempfile::TempDir;

const TEXTS: &[&str] = &[
    "Transformers replace recurrence with self attention over the whole sequence.",
    "We evaluate on three translation benchmarks and report BLEU.",
    "Dropout of 0.1 is applied to every sublayer output.",
    "Training took twelve hours on eight accelerators.",
    "Attention weights are computed from scaled dot products of queries and keys.",
    "Future work includes local attention for long inputs.",
];

fn corpus_chunks() -> Vec<Chunk> {
    TEXTS
        .iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            meta: ChunkMeta {
                doc_id: i / 3,
                chunk_id: i % 3,
                source: format!("paper{}.txt", i / 3),
                section: if i % 2 == 0 { "method".to_string() } else { "results".to_string() },
                sentence_start: 0,
                sentence_end: 1,
            },
            text: text.to_string(),
        })
        .collect()
}

fn build(metric: Metric) -> anyhow::Result<(HashEmbedder, FlatIndex)> {
    let embedder = HashEmbedder::new(64);
    let texts: Vec<String> = TEXTS.iter().map(|t| t.to_string()).collect();
    let vectors = embed_in_batches(&embedder, &texts, 4, false)?;
    let index = FlatIndex::build(&vectors, corpus_chunks(), metric)?;
    Ok((embedder, index))
}

#[test]
fn embedded_chunks_find_themselves() -> anyhow::Result<()> {
    let (embedder, index) = build(Metric::Cosine)?;
    for (i, text) in TEXTS.iter().enumerate() {
        let q = embed_query(&embedder, text)?;
        let hits = index.search_one(&q, 3)?;
        assert_eq!(hits[0].position, i);
        assert!((hits[0].score.similarity() - 1.0).abs() < 1e-4);
    }
    Ok(())
}

#[test]
fn save_then_load_reproduces_index_and_results() -> anyhow::Result<()> {
    for metric in [Metric::L2, Metric::Cosine] {
        let (embedder, index) = build(metric)?;
        let tmp = TempDir::new()?;
        let dir = tmp.path().join("index");
        index.save(&dir)?;
        for file in [INDEX_FILE, VECTORS_FILE, META_FILE, CHUNKS_FILE] {
            assert!(dir.join(file).is_file(), "{file} written");
        }

        let loaded = FlatIndex::load(&dir)?;
        assert_eq!(loaded.len(), index.len());
        assert_eq!(loaded.dim(), index.dim());
        assert_eq!(loaded.metric(), metric);
        assert_eq!(loaded.raw_vectors(), index.raw_vectors());
        for (a, b) in loaded.chunks().iter().zip(index.chunks()) {
            assert_eq!(a.meta, b.meta);
            assert_eq!(a.text, b.text);
        }

        let queries = vec![
            embed_query(&embedder, "attention over queries and keys")?,
            embed_query(&embedder, "how long did training take")?,
        ];
        let before = index.search(&queries, 4)?;
        let after = loaded.search(&queries, 4)?;
        for (x, y) in before.iter().zip(&after) {
            let xs: Vec<_> = x.iter().map(|h| (h.position, h.score)).collect();
            let ys: Vec<_> = y.iter().map(|h| (h.position, h.score)).collect();
            assert_eq!(xs, ys);
        }
    }
    Ok(())
}

#[test]
fn load_requires_only_the_index_artifact() -> anyhow::Result<()> {
    let (_, index) = build(Metric::L2)?;
    let tmp = TempDir::new()?;

    let err = FlatIndex::load(tmp.path()).unwrap_err();
    assert!(matches!(err, Error::MissingArtifact(_)));
    assert_eq!(err.kind(), ErrorKind::Io);

    index.save(tmp.path())?;
    for file in [VECTORS_FILE, META_FILE, CHUNKS_FILE] {
        fs::remove_file(tmp.path().join(file))?;
    }
    let loaded = FlatIndex::load(tmp.path())?;
    assert_eq!(loaded.len(), TEXTS.len());
    assert_eq!(loaded.chunks()[4].meta.chunk_id, 4);
    assert!(loaded.chunks()[4].text.is_empty());
    assert_eq!(loaded.raw_vectors(), index.raw_vectors());
    Ok(())
}

#[test]
fn tampered_or_mismatched_artifacts_are_rejected() -> anyhow::Result<()> {
    let (_, index) = build(Metric::L2)?;
    let tmp = TempDir::new()?;
    index.save(tmp.path())?;

    let mut meta: Vec<ChunkMeta> = serde_json::from_slice(&fs::read(tmp.path().join(META_FILE))?)?;
    meta.pop();
    fs::write(tmp.path().join(META_FILE), serde_json::to_vec(&meta)?)?;
    assert!(matches!(FlatIndex::load(tmp.path()).unwrap_err(), Error::Corrupt(_)));

    index.save(tmp.path())?;
    let path = tmp.path().join(INDEX_FILE);
    let mut bytes = fs::read(&path)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&path, bytes)?;
    let err = FlatIndex::load(tmp.path()).unwrap_err();
    assert!(matches!(err, Error::Corrupt(_)));
    assert_eq!(err.kind(), ErrorKind::Io);

    index.save(tmp.path())?;
    let path = tmp.path().join(VECTORS_FILE);
    let mut bytes = fs::read(&path)?;
    bytes.pop();
    fs::write(&path, bytes)?;
    assert!(matches!(FlatIndex::load(tmp.path()).unwrap_err(), Error::Corrupt(_)));
    Ok(())
}

#[test]
fn multiline_chunk_text_is_stored_on_one_line() -> anyhow::Result<()> {
    let mut chunk = corpus_chunks().remove(0);
    chunk.text = "first line\nsecond line\r\nthird".to_string();
    let index = FlatIndex::build(&[vec![1.0, 0.0]], vec![chunk], Metric::L2)?;
    let tmp = TempDir::new()?;
    index.save(tmp.path())?;

    let stored = fs::read_to_string(tmp.path().join(CHUNKS_FILE))?;
    assert_eq!(stored.lines().count(), 1);
    let loaded = FlatIndex::load(tmp.path())?;
    assert_eq!(loaded.chunks()[0].text, "first line second line  third");
    Ok(())
}

#[test]
fn shared_index_loads_once_and_keeps_growing() -> anyhow::Result<()> {
    let (embedder, index) = build(Metric::Cosine)?;
    let tmp = TempDir::new()?;
    index.save(tmp.path())?;

    let shared = SharedIndex::new();
    shared.load(tmp.path())?;
    assert_eq!(shared.load(tmp.path()).unwrap_err().kind(), ErrorKind::Precondition);

    let extra = "Label smoothing hurts perplexity but improves BLEU.".to_string();
    let v = embed_query(&embedder, &extra)?;
    let mut chunk = corpus_chunks().remove(1);
    chunk.meta.chunk_id = 3;
    chunk.text = extra.clone();
    shared.add(&[v.clone()], vec![chunk])?;
    let hits = shared.search_one(&v, 1)?;
    assert_eq!(hits[0].position, TEXTS.len());
    assert_eq!(hits[0].chunk.text, extra);

    let again = tmp.path().join("again");
    shared.save(&again)?;
    assert_eq!(FlatIndex::load(&again)?.len(), TEXTS.len() + 1);
    Ok(())
}
