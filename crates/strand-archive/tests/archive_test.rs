//! Producer-side behaviour: append, entry lookup, streams, finalize.

mod common;

use futures::{StreamExt, TryStreamExt};
use strand_archive::{Appended, ArchiveError, EntryKind, EntryMeta, EntryType};
use strand_chunks::delta;
use strand_core::config::StrandConfig;
use strand_log::LogError;

use common::*;

#[tokio::test]
async fn file_entry_roundtrip() {
    init_tracing();
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);

    let mut writer = archive
        .append(EntryMeta::new("a.txt").with_type(EntryType::File))
        .await
        .unwrap()
        .into_writer()
        .unwrap();
    writer.write(b"hello, world!").await.unwrap();
    assert_eq!(archive.entries(), 0, "nothing committed before finish");
    assert_eq!(writer.finish().await.unwrap(), 0);

    let entry = archive.entry(0).await.unwrap().unwrap();
    assert_eq!(entry.name, "a.txt");
    assert_eq!(entry.size(), 13);
    assert_eq!(entry.mode, 0o644);
    let link = entry.link().unwrap();
    assert!(link.blocks >= 1);

    let blocks: Vec<_> = archive
        .create_file_stream(0, 0, None)
        .try_collect()
        .await
        .unwrap();
    assert_eq!(blocks.concat(), b"hello, world!");
}

#[tokio::test]
async fn directory_entry_has_no_link() {
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);
    append_bytes(&archive, "a.txt", b"hello, world!").await;

    let appended = archive
        .append(EntryMeta::new("docs").with_type(EntryType::Directory))
        .await
        .unwrap();
    assert_eq!(appended.index(), Some(1));
    assert_eq!(archive.entries(), 2);

    let entry = archive.entry(1).await.unwrap().unwrap();
    assert_eq!(entry.kind, EntryKind::Directory);
    assert_eq!(entry.mode, 0o755);
    assert!(entry.link().is_none());
    assert_eq!(entry.size(), 0);

    assert!(archive.select(1).await.unwrap().is_none());
    assert!(archive.create_file_cursor(1).await.unwrap().is_none());
    let blocks: Vec<_> = archive.create_file_stream(1, 0, None).collect().await;
    assert!(blocks.is_empty());
}

#[tokio::test]
async fn bare_name_becomes_file_with_default_mode() {
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);

    let writer = match archive.append("plain.txt").await.unwrap() {
        Appended::File(w) => w,
        other => panic!("expected a file writer, got {other:?}"),
    };
    let index = writer.finish().await.unwrap();

    let entry = archive.entry(index).await.unwrap().unwrap();
    assert_eq!(entry.entry_type(), EntryType::File);
    assert_eq!(entry.mode, 0o644);
    assert_eq!(entry.size(), 0);
    let link = entry.link().expect("empty files are still linked");
    assert_eq!(link.blocks, 0);
    assert!(link.index.is_empty());
}

#[tokio::test]
async fn type_is_inferred_from_mode_bits() {
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);

    archive
        .append(EntryMeta::new("link").with_mode(0o120777))
        .await
        .unwrap();
    archive
        .append(EntryMeta::new("pipe").with_mode(0o010600))
        .await
        .unwrap();

    let link = archive.entry(0).await.unwrap().unwrap();
    assert_eq!(link.entry_type(), EntryType::Symlink);
    assert_eq!(link.mode, 0o120777);
    assert_eq!(archive.entry(1).await.unwrap().unwrap().entry_type(), EntryType::Fifo);
}

#[tokio::test]
async fn entry_count_only_grows_on_success() {
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);

    let err = archive.append(EntryMeta::new("")).await.unwrap_err();
    assert!(err.is_validation());
    assert_eq!(archive.entries(), 0);

    for (n, name) in ["one", "two", "three"].iter().enumerate() {
        archive
            .append(EntryMeta::new(*name).with_type(EntryType::Directory))
            .await
            .unwrap();
        assert_eq!(archive.entries(), n as u64 + 1);
    }

    // a writer abandoned half way commits nothing
    let mut writer = archive.append("partial.bin").await.unwrap().into_writer().unwrap();
    writer.write(&pseudo_random(100_000, 1)).await.unwrap();
    assert!(writer.abort() > 0);
    assert_eq!(archive.entries(), 3);

    archive.finalize().await.unwrap();
    let err = archive
        .append(EntryMeta::new("late").with_type(EntryType::Directory))
        .await
        .unwrap_err();
    assert!(matches!(err.log_error::<LogError>(), Some(LogError::Finalized)));
    assert_eq!(archive.entries(), 3);
}

#[tokio::test]
async fn file_commit_after_finalize_fails_without_counting() {
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);

    let mut writer = archive.append("late.txt").await.unwrap().into_writer().unwrap();
    writer.write(b"too late").await.unwrap();
    archive.finalize().await.unwrap();

    let err = writer.finish().await.unwrap_err();
    assert!(matches!(err, ArchiveError::Log(_)));
    assert_eq!(archive.entries(), 0);
}

#[tokio::test]
async fn finalize_fixes_id_once() {
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);
    assert!(archive.id().is_none());
    append_bytes(&archive, "x", b"x").await;

    let id = drive.finalize(&archive).await.unwrap();
    assert_eq!(archive.id(), Some(id));
    assert!(!archive.is_writable());
    assert!(drive.archive(&id).is_some());
    assert_eq!(drive.ids(), vec![id]);

    let again = archive.finalize().await.unwrap_err();
    assert!(matches!(again.log_error::<LogError>(), Some(LogError::Finalized)));
}

#[tokio::test]
async fn entry_stream_honours_start_and_limit() {
    let drive = drive(&StrandConfig::default());
    let archive = drive.create(None);
    for name in ["a", "b", "c", "d"] {
        archive
            .append(EntryMeta::new(name).with_type(EntryType::Directory))
            .await
            .unwrap();
    }

    let all: Vec<_> = archive.create_entry_stream(0, None).try_collect().await.unwrap();
    assert_eq!(all.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(), ["a", "b", "c", "d"]);

    let some: Vec<_> = archive.create_entry_stream(1, Some(2)).try_collect().await.unwrap();
    assert_eq!(some.iter().map(|e| e.name.as_str()).collect::<Vec<_>>(), ["b", "c"]);

    let tail: Vec<_> = archive.create_entry_stream(3, Some(10)).try_collect().await.unwrap();
    assert_eq!(tail.len(), 1);

    let none: Vec<_> = archive.create_entry_stream(9, None).try_collect().await.unwrap();
    assert!(none.is_empty());
    assert!(archive.entry(9).await.unwrap().is_none());
}

#[tokio::test]
async fn file_stream_window_stops_at_content_blocks() {
    let drive = drive(&paged_config(4));
    let archive = drive.create(None);
    let data = pseudo_random(300_000, 7);
    let index = append_bytes(&archive, "big.bin", &data).await;

    let entry = archive.entry(index).await.unwrap().unwrap();
    let link = entry.link().unwrap();
    let content_blocks = link.blocks - delta::unpack(&link.index).unwrap().len() as u64;
    assert!(content_blocks > 4);

    let all: Vec<_> = archive.create_file_stream(index, 0, None).try_collect().await.unwrap();
    assert_eq!(all.len() as u64, content_blocks, "index blocks are not content");
    assert_eq!(all.concat(), data);

    let window: Vec<_> = archive
        .create_file_stream(index, 2, Some(3))
        .try_collect()
        .await
        .unwrap();
    assert_eq!(window, all[2..5].to_vec());

    let past_end: Vec<_> = archive
        .create_file_stream(index, content_blocks, None)
        .try_collect()
        .await
        .unwrap();
    assert!(past_end.is_empty());

    let missing: Vec<_> = archive.create_file_stream(42, 0, None).try_collect().await.unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn append_file_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let data = pseudo_random(50_000, 3);
    std::fs::write(dir.path().join("notes.bin"), &data).unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();

    let drive = drive(&StrandConfig::default());
    let archive = drive.create(Some(dir.path().to_path_buf()));

    let file = archive.append_file("notes.bin", None).await.unwrap();
    let sub = archive.append_file("sub", Some("renamed")).await.unwrap();

    let entry = archive.entry(file).await.unwrap().unwrap();
    assert_eq!(entry.name, "notes.bin");
    assert_eq!(entry.size(), data.len() as u64);
    let blocks: Vec<_> = archive.create_file_stream(file, 0, None).try_collect().await.unwrap();
    assert_eq!(blocks.concat(), data);

    let dir_entry = archive.entry(sub).await.unwrap().unwrap();
    assert_eq!(dir_entry.name, "renamed");
    assert_eq!(dir_entry.entry_type(), EntryType::Directory);
    assert!(dir_entry.link().is_none());

    let err = archive.append_file("missing.bin", None).await.unwrap_err();
    assert!(matches!(err, ArchiveError::Io(_)));
    assert_eq!(archive.entries(), 2);
}
