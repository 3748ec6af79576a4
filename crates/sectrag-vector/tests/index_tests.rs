use sectrag_core::error::{Error, ErrorKind};
use sectrag_core::types::{Chunk, ChunkMeta, Metric, Score};
use sectrag_vector::{Accelerator, FlatIndex, Residency, SharedIndex, NO_MATCH};

fn chunk(i: usize, section: &str) -> Chunk {
    Chunk {
        meta: ChunkMeta {
            doc_id: 0,
            chunk_id: i,
            source: "paper.txt".to_string(),
            section: section.to_string(),
            sentence_start: i,
            sentence_end: i + 1,
        },
        text: format!("chunk number {i}"),
    }
}

fn chunks(n: usize) -> Vec<Chunk> { (0..n).map(|i| chunk(i, "body")).collect() }

fn positions(hits: &[sectrag_vector::SearchHit]) -> Vec<usize> { hits.iter().map(|h| h.position).collect() }

#[test]
fn build_rejects_empty_and_misaligned_input() {
    let err = FlatIndex::build(&[], Vec::new(), Metric::L2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let err = FlatIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0]], chunks(1), Metric::L2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    let err = FlatIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0, 2.0]], chunks(2), Metric::Cosine).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3 }));
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn l2_hits_come_back_by_increasing_distance() {
    let vectors = vec![vec![0.0, 0.0], vec![1.0, 0.0], vec![3.0, 0.0]];
    let index = FlatIndex::build(&vectors, chunks(3), Metric::L2).unwrap();

    let hits = index.search_one(&[0.9, 0.0], 3).unwrap();
    assert_eq!(positions(&hits), vec![1, 0, 2]);
    match hits[0].score {
        Score::Distance(d) => assert!((d - 0.01).abs() < 1e-5, "squared distance, got {d}"),
        other => panic!("expected a distance, got {other:?}"),
    }
    assert_eq!(hits[0].chunk.text, "chunk number 1");
}

#[test]
fn cosine_ranks_by_direction_not_magnitude() {
    let vectors = vec![vec![1.0, 0.0], vec![1.0, 1.0], vec![0.0, 1.0]];
    let index = FlatIndex::build(&vectors, chunks(3), Metric::Cosine).unwrap();
    let hits = index.search_one(&[2.0, 0.1], 3).unwrap();
    assert_eq!(positions(&hits), vec![0, 1, 2]);
    assert!(matches!(hits[0].score, Score::Similarity(s) if s > 0.99));

    let scaled: Vec<Vec<f32>> = vectors.iter().map(|v| v.iter().map(|x| x * 10.0).collect()).collect();
    let scaled_index = FlatIndex::build(&scaled, chunks(3), Metric::Cosine).unwrap();
    let scaled_hits = scaled_index.search_one(&[10.0, 0.5], 3).unwrap();
    assert_eq!(positions(&scaled_hits), positions(&hits));
    for (a, b) in hits.iter().zip(&scaled_hits) {
        assert!((a.score.value() - b.score.value()).abs() < 1e-5);
    }
    // Inserted vectors are kept as given
    assert_eq!(scaled_index.raw_vectors()[..2], [10.0, 0.0]);
}

#[test]
fn k_beyond_index_size_is_padded_then_filtered() {
    let index = FlatIndex::build(&[vec![1.0], vec![2.0], vec![3.0]], chunks(3), Metric::L2).unwrap();

    let (scores, raw_positions) = index.raw_search(&[0.0], 10).unwrap();
    assert_eq!(raw_positions.len(), 10);
    assert_eq!(raw_positions[..3], [0, 1, 2]);
    assert!(raw_positions[3..].iter().all(|&p| p == NO_MATCH));
    assert!(scores[3..].iter().all(|s| s.is_infinite()));

    let hits = index.search_one(&[0.0], 10).unwrap();
    assert_eq!(positions(&hits), vec![0, 1, 2]);
    assert!(index.search_one(&[0.0], 0).unwrap().is_empty());
}

#[test]
fn ties_keep_insertion_order() {
    let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]];
    let index = FlatIndex::build(&vectors, chunks(4), Metric::L2).unwrap();
    let hits = index.search_one(&[1.0, 0.0], 3).unwrap();
    assert_eq!(positions(&hits), vec![0, 2, 1]);
}

#[test]
fn add_appends_and_checks_dimension() {
    let mut index = FlatIndex::build(&[vec![0.0, 0.0]], chunks(1), Metric::L2).unwrap();
    let err = index.add(&[vec![1.0, 2.0, 3.0]], vec![chunk(1, "body")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert_eq!(index.len(), 1);

    index.add(&[vec![5.0, 5.0]], vec![chunk(1, "results")]).unwrap();
    assert_eq!(index.len(), 2);
    let hits = index.search_one(&[5.0, 5.0], 1).unwrap();
    assert_eq!(hits[0].position, 1);
    assert_eq!(hits[0].chunk.section(), "results");

    let err = index.search_one(&[1.0], 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);
}

#[test]
fn shared_index_enforces_lifecycle() {
    let shared = SharedIndex::new();
    assert!(!shared.is_built());
    assert_eq!(shared.search_one(&[1.0, 0.0], 3).unwrap_err().kind(), ErrorKind::Precondition);
    assert_eq!(shared.add(&[vec![1.0, 0.0]], chunks(1)).unwrap_err().kind(), ErrorKind::Precondition);

    shared.build(&[vec![1.0, 0.0], vec![0.0, 1.0]], chunks(2), Metric::Cosine).unwrap();
    assert!(shared.is_built());
    assert_eq!(shared.metric(), Some(Metric::Cosine));
    let err = shared.build(&[vec![1.0, 0.0]], chunks(1), Metric::L2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Precondition);

    shared.add(&[vec![0.7, 0.7]], vec![chunk(2, "body")]).unwrap();
    assert_eq!(shared.len(), 3);
    let batches = shared.search(&[vec![1.0, 0.0], vec![0.0, 1.0]], 1).unwrap();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0][0].position, 0);
    assert_eq!(batches[1][0].position, 1);
}

#[test]
fn concurrent_readers_see_whole_adds() {
    let shared = SharedIndex::new();
    shared.build(&[vec![0.0, 0.0]], chunks(1), Metric::L2).unwrap();

    std::thread::scope(|s| {
        let writer = shared.clone();
        s.spawn(move || {
            for i in 1..50 {
                writer.add(&[vec![i as f32, 0.0], vec![0.0, i as f32]], vec![chunk(2 * i - 1, "body"), chunk(2 * i, "body")]).unwrap();
            }
        });
        for _ in 0..4 {
            let reader = shared.clone();
            s.spawn(move || {
                for _ in 0..50 {
                    let n = reader.with_index(|idx| {
                        assert_eq!(idx.search_vectors().len(), idx.len() * idx.dim());
                        idx.len()
                    });
                    assert_eq!(n.unwrap() % 2, 1);
                }
            });
        }
    });
    assert_eq!(shared.len(), 99);
}

#[test]
fn accelerator_names_parse() {
    assert_eq!("cpu".parse::<Accelerator>().unwrap(), Accelerator::Cpu);
    assert_eq!("CUDA:1".parse::<Accelerator>().unwrap(), Accelerator::Cuda(1));
    assert_eq!("metal".parse::<Accelerator>().unwrap(), Accelerator::Metal(0));
    assert_eq!(Accelerator::Cuda(2).to_string(), "cuda:2");
    assert_eq!("tpu".parse::<Accelerator>().unwrap_err().kind(), ErrorKind::Configuration);
    assert_eq!("cuda:x".parse::<Accelerator>().unwrap_err().kind(), ErrorKind::Configuration);
}

#[test]
fn tensor_search_matches_host_search() {
    for metric in [Metric::L2, Metric::Cosine] {
        let vectors: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32 * 0.5, (i % 7) as f32, 1.0 - i as f32 * 0.1]).collect();
        let host = FlatIndex::build(&vectors, chunks(20), metric).unwrap();
        let mut device = FlatIndex::build(&vectors, chunks(20), metric).unwrap();
        device.move_to_accelerator(Accelerator::Cpu).unwrap();
        assert_eq!(device.residency(), Residency::Device(Accelerator::Cpu));

        let query = [3.1, 2.0, 0.4];
        let a = host.search_one(&query, 5).unwrap();
        let b = device.search_one(&query, 5).unwrap();
        assert_eq!(positions(&a), positions(&b), "{metric}");
        for (x, y) in a.iter().zip(&b) {
            assert!((x.score.value() - y.score.value()).abs() < 1e-3, "{metric}: {:?} vs {:?}", x.score, y.score);
        }

        // Rows added after the move are searched on the device too
        device.add(&[vec![100.0, 100.0, 100.0]], vec![chunk(20, "body")]).unwrap();
        assert_eq!(device.residency(), Residency::Device(Accelerator::Cpu));
        let hit = &device.search_one(&[100.0, 100.0, 100.0], 1).unwrap()[0];
        assert_eq!(hit.position, 20);

        device.to_host();
        assert_eq!(device.residency(), Residency::Host);
    }
}

#[cfg(not(feature = "cuda"))]
#[test]
fn failed_accelerator_move_leaves_index_on_host() {
    let shared = SharedIndex::new();
    shared.build(&[vec![1.0, 0.0], vec![0.0, 1.0]], chunks(2), Metric::L2).unwrap();

    let err = shared.move_to_accelerator(Accelerator::Cuda(0)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalCapability);
    assert_eq!(shared.residency(), Some(Residency::Host));
    assert_eq!(shared.search_one(&[0.0, 1.0], 1).unwrap()[0].position, 1);

    shared.move_to_accelerator(Accelerator::Cpu).unwrap();
    assert_eq!(shared.residency(), Some(Residency::Device(Accelerator::Cpu)));
}
