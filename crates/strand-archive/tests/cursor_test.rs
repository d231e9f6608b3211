//! Byte-offset random access through the paged index.

mod common;

use std::time::Duration;

use strand_core::config::StrandConfig;

use common::*;

#[tokio::test]
async fn cursor_reads_whole_file_chunk_by_chunk() {
    init_tracing();
    let drive = drive(&paged_config(3));
    let archive = drive.create(None);
    let data = pseudo_random(120_000, 9);
    let index = append_bytes(&archive, "f.bin", &data).await;

    let mut cursor = archive.create_file_cursor(index).await.unwrap().unwrap();
    assert_eq!(cursor.len(), data.len() as u64);

    let mut out = Vec::new();
    while let Some(piece) = cursor.read().await.unwrap() {
        assert!(!piece.is_empty());
        out.extend_from_slice(&piece);
        assert_eq!(cursor.position(), out.len() as u64);
    }
    assert_eq!(out, data);
    assert!(cursor.read().await.unwrap().is_none());
}

#[tokio::test]
async fn read_at_matches_byte_ranges() {
    let drive = drive(&paged_config(2));
    let archive = drive.create(None);
    let data = pseudo_random(100_000, 13);
    let index = append_bytes(&archive, "f.bin", &data).await;
    let mut cursor = archive.create_file_cursor(index).await.unwrap().unwrap();

    for (offset, len) in [(0usize, 10usize), (4095, 2), (17_000, 30_000), (99_990, 10), (50_000, 0)] {
        let got = cursor.read_at(offset as u64, len).await.unwrap();
        assert_eq!(got.as_ref(), &data[offset..offset + len], "range {offset}+{len}");
        assert_eq!(cursor.position(), (offset + len) as u64);
    }

    // short at end of file
    let tail = cursor.read_at(99_995, 100).await.unwrap();
    assert_eq!(tail.as_ref(), &data[99_995..]);
}

#[tokio::test]
async fn seek_bounds() {
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);
    let index = append_bytes(&archive, "small", b"hello, world!").await;
    let mut cursor = archive.create_file_cursor(index).await.unwrap().unwrap();

    assert_eq!(cursor.seek(7).unwrap(), 7);
    assert_eq!(cursor.read().await.unwrap().unwrap().as_ref(), b"world!");
    assert_eq!(cursor.seek(13).unwrap(), 13);
    assert!(cursor.read().await.unwrap().is_none());
    assert!(cursor.seek(14).unwrap_err().is_validation());
}

#[tokio::test]
async fn empty_file_cursor_is_empty() {
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);
    let index = append_bytes(&archive, "empty", b"").await;
    let mut cursor = archive.create_file_cursor(index).await.unwrap().unwrap();
    assert!(cursor.is_empty());
    assert!(cursor.read().await.unwrap().is_none());
    assert!(cursor.read_at(0, 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn sparse_cursor_fetches_only_what_it_touches() {
    let config = paged_config(4);
    let producer = drive(&config);
    let source = producer.create(None);
    let data = pseudo_random(200_000, 17);
    append_bytes(&source, "big", &data).await;
    let id = producer.finalize(&source).await.unwrap();

    let consumer = drive(&config);
    copy_tree(producer.core(), consumer.core(), &id).await;
    let remote = consumer.open(id, None).await.unwrap();
    sync_blocks(source.feed(), remote.feed(), [0]).await;
    let link = remote.entry(0).await.unwrap().unwrap().link().cloned().unwrap();
    copy_tree(producer.core(), consumer.core(), &link.id).await;

    let source_content = source.select(0).await.unwrap().unwrap();
    let mut cursor = remote.create_file_cursor(0).await.unwrap().unwrap();
    let content = cursor.content().clone();
    let offset = 150_000u64;

    // serve whatever the cursor asks for, one block at a time
    let server = {
        let src = source_content.feed().clone();
        let dst = content.feed().clone();
        tokio::spawn(async move {
            loop {
                let wants = dst.wants();
                for want in wants {
                    let data = src.get(want.block).await.unwrap();
                    dst.put(want.block, data).await.unwrap();
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
    };

    let got = tokio::time::timeout(Duration::from_secs(5), cursor.read_at(offset, 64))
        .await
        .unwrap()
        .unwrap();
    server.abort();
    assert_eq!(got.as_ref(), &data[offset as usize..offset as usize + 64]);

    // every index page was critical, but only the chunk holding the offset moved
    let fetched: Vec<u64> = (0..content.content_blocks()).filter(|&b| content.has(b)).collect();
    assert!(!fetched.is_empty() && fetched.len() <= 2, "fetched {fetched:?}");
}
