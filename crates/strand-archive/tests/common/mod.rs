#![allow(dead_code)]

use opendal::Operator;
use strand_archive::{Archive, Drive, FeedId};
use strand_core::config::{ChunkingConfig, StrandConfig};
use strand_log::{Core, Feed};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn memory_op() -> Operator {
    Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish()
}

/// Config with small index pages so ordinary test files span several.
pub fn paged_config(index_page_chunks: usize) -> StrandConfig {
    StrandConfig {
        chunking: ChunkingConfig {
            index_page_chunks,
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn drive(config: &StrandConfig) -> Drive {
    Drive::new(memory_op(), config).expect("drive")
}

/// Deterministic bytes that FastCDC cuts at varied positions.
pub fn pseudo_random(size: usize, seed: u32) -> Vec<u8> {
    let mut x = seed.wrapping_mul(2654435761).wrapping_add(1);
    (0..size)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            (x >> 24) as u8
        })
        .collect()
}

pub async fn append_bytes(archive: &Archive, name: &str, data: &[u8]) -> u64 {
    let mut writer = archive
        .append(name)
        .await
        .unwrap()
        .into_writer()
        .expect("file entry");
    for piece in data.chunks(10_000) {
        writer.write(piece).await.unwrap();
    }
    writer.finish().await.unwrap()
}

/// Hand a feed's tree to another storage namespace, as replication would
/// before any block moves.
pub async fn copy_tree(from: &Core, to: &Core, id: &FeedId) {
    let tree = from.operator().read(&from.tree_key(id)).await.unwrap();
    to.operator().write(&to.tree_key(id), tree).await.unwrap();
}

/// Deliver blocks from `src` into `dst` through the replication ingress.
pub async fn sync_blocks(src: &Feed, dst: &Feed, blocks: impl IntoIterator<Item = u64>) {
    for i in blocks {
        let data = src.get(i).await.unwrap();
        dst.put(i, data).await.unwrap();
    }
}
