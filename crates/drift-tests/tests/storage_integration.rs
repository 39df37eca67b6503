//! Storage integration tests: ingest, assembly, warm starts, and the
//! ledger accounting that cache operations leave behind.

use drift_core::{sha256_file, FileHash};
use drift_proto::ActionType;
use drift_tests::{init_tracing, TestNode};
use rand::RngCore;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut data);
    data
}

#[tokio::test]
async fn test_round_trip_ingest_assemble() {
    init_tracing();

    let node = TestNode::start().await.unwrap();
    let data = random_bytes(2_500_000);
    let input = node.write_file("input.bin", &data).unwrap();

    let hash = node.upload(&input).unwrap();
    assert_eq!(node.store().chunk_count(), 3);

    let output = node.scratch_path("output.bin");
    assert!(node.fetch(&hash, &output).await.unwrap());
    assert_eq!(FileHash::from_hex(sha256_file(&output).unwrap()), hash);

    // 3 puts from the upload, 3 gets from the assembly; nothing sealed yet
    // at the default threshold.
    let actions = node.ledger().current_block().actions;
    let puts = actions
        .iter()
        .filter(|a| a.action_type == ActionType::CachePut && a.file_hash == hash)
        .count();
    let gets = actions
        .iter()
        .filter(|a| a.action_type == ActionType::CacheGet && a.file_hash == hash)
        .count();
    assert_eq!(puts, 3);
    assert_eq!(gets, 3);

    node.stop().await;
}

#[tokio::test]
async fn test_upload_empty_file() {
    init_tracing();

    let node = TestNode::start().await.unwrap();
    let input = node.write_file("empty.bin", b"").unwrap();

    let hash = node.upload(&input).unwrap();
    assert_eq!(node.store().chunk_count(), 0);

    // With zero chunks there is nothing to assemble.
    let output = node.scratch_path("out.bin");
    assert!(!node.fetch(&hash, &output).await.unwrap());

    node.stop().await;
}

#[tokio::test]
async fn test_exact_chunk_multiple() {
    init_tracing();

    let node = TestNode::start().await.unwrap();
    let data = random_bytes(2 * 1024 * 1024);
    let input = node.write_file("exact.bin", &data).unwrap();

    let hash = node.upload(&input).unwrap();
    assert_eq!(node.store().chunk_count(), 2);
    assert_eq!(node.store().get_chunk(&hash, 0).unwrap().data.len(), 1024 * 1024);
    assert_eq!(node.store().get_chunk(&hash, 1).unwrap().data.len(), 1024 * 1024);

    node.stop().await;
}

#[tokio::test]
async fn test_warm_start_still_serves_file() {
    init_tracing();

    let mut node = TestNode::start().await.unwrap();
    let data = random_bytes(1_500_000);
    let input = node.write_file("input.bin", &data).unwrap();
    let hash = node.upload(&input).unwrap();

    node.restart().await.unwrap();

    // The cache survived on disk, including each chunk's total-chunks
    // manifest, so local assembly works without any peer contact.
    assert_eq!(node.store().chunk_count(), 2);
    assert_eq!(node.store().total_chunks_of(&hash), Some(2));

    let output = node.scratch_path("restored.bin");
    assert!(node.fetch(&hash, &output).await.unwrap());
    assert_eq!(std::fs::read(&output).unwrap(), data);

    node.stop().await;
}

#[tokio::test]
async fn test_chunk_eviction_by_age() {
    init_tracing();

    let node = TestNode::start().await.unwrap();
    let input = node.write_file("input.bin", &random_bytes(10_000)).unwrap();
    node.upload(&input).unwrap();
    assert_eq!(node.store().chunk_count(), 1);

    // Fresh chunks survive an eviction pass; a zero-age pass removes them.
    assert_eq!(node.store().evict_older_than(300_000), 0);
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(node.store().evict_older_than(0), 1);
    assert_eq!(node.store().chunk_count(), 0);

    node.stop().await;
}
