//! File append pipeline: bytes -> FastCDC chunks -> content feed -> link.

use bytes::Bytes;
use strand_chunks::{PagedIndex, StreamChunker};
use strand_core::{ArchiveResult, Entry, EntryKind, Link};
use strand_log::Feed;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

use crate::archive::Archive;

const READ_BUF: usize = 64 * 1024;

/// Result of `Archive::append`.
#[derive(Debug)]
pub enum Appended {
    /// A non-file entry, already committed at `index`.
    Entry { index: u64 },
    /// A file entry waiting for its bytes.
    File(FileWriter),
}

impl Appended {
    /// Committed position, for non-file entries.
    pub fn index(&self) -> Option<u64> {
        match self {
            Appended::Entry { index } => Some(*index),
            Appended::File(_) => None,
        }
    }

    pub fn into_writer(self) -> Option<FileWriter> {
        match self {
            Appended::File(w) => Some(w),
            Appended::Entry { .. } => None,
        }
    }
}

/// Byte sink for one file's content.
///
/// Chunks are appended to a fresh content feed as soon as their boundaries
/// settle. `finish` appends the index pages, seals the feed, and commits the
/// entry; until then the archive's entry count is unchanged.
pub struct FileWriter {
    archive: Archive,
    name: String,
    mode: u32,
    feed: Feed,
    chunker: StreamChunker,
    chunk_ends: Vec<u64>,
    size: u64,
    done: bool,
}

impl FileWriter {
    pub(crate) fn new(archive: Archive, name: String, mode: u32) -> Self {
        let feed = archive.core().add();
        let chunker = StreamChunker::new(archive.settings().chunk_sizes);
        debug!(name = %name, feed = %feed.label(), "file append started");
        FileWriter {
            archive,
            name,
            mode,
            feed,
            chunker,
            chunk_ends: Vec::new(),
            size: 0,
            done: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bytes accepted so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Content blocks written so far.
    pub fn chunks(&self) -> u64 {
        self.chunk_ends.len() as u64
    }

    async fn append_chunks(&mut self, chunks: Vec<Bytes>) -> ArchiveResult<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let mut end = self.chunk_ends.last().copied().unwrap_or(0);
        for chunk in &chunks {
            end += chunk.len() as u64;
            self.chunk_ends.push(end);
        }
        self.feed.append_batch(&chunks).await?;
        Ok(())
    }

    pub async fn write(&mut self, data: &[u8]) -> ArchiveResult<()> {
        self.size += data.len() as u64;
        let chunks = self.chunker.push(data);
        self.append_chunks(chunks).await
    }

    /// Pump a reader to exhaustion. Returns the number of bytes read.
    pub async fn write_from<R>(&mut self, mut reader: R) -> ArchiveResult<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; READ_BUF];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            self.write(&buf[..n]).await?;
            total += n as u64;
        }
        Ok(total)
    }

    /// Seal the content feed and commit the entry. Returns its position.
    pub async fn finish(mut self) -> ArchiveResult<u64> {
        let chunker = std::mem::replace(
            &mut self.chunker,
            StreamChunker::new(self.archive.settings().chunk_sizes),
        );
        self.append_chunks(chunker.finish()).await?;

        let content_blocks = self.chunk_ends.len() as u64;
        let index = PagedIndex::build(&self.chunk_ends, self.archive.settings().index_page_chunks);
        let root = index.packed_starts();
        let pages: Vec<Bytes> = index.into_pages().into_iter().map(Bytes::from).collect();
        self.feed.append_batch(&pages).await?;

        let id = self.feed.finalize().await?;
        let link = Link {
            id,
            blocks: self.feed.blocks(),
            index: root,
        };
        debug_assert_eq!(link.blocks, content_blocks + pages.len() as u64);

        let entry = Entry {
            name: self.name.clone(),
            mode: self.mode,
            kind: EntryKind::File {
                size: self.size,
                link: Some(link),
            },
        };
        let position = self.archive.write_entry(&entry).await?;
        self.done = true;

        info!(
            name = %entry.name,
            feed = %id,
            size = self.size,
            chunks = content_blocks,
            index_blocks = pages.len(),
            "file committed"
        );
        Ok(position)
    }

    /// Abandon the file. Returns the number of content blocks left behind.
    ///
    /// Blocks are content addressed and may be shared with other feeds, so
    /// nothing is deleted.
    pub fn abort(mut self) -> u64 {
        self.done = true;
        let orphaned = self.feed.blocks();
        warn!(
            name = %self.name,
            feed = %self.feed.label(),
            orphaned,
            unchunked = self.chunker.buffered(),
            "file append aborted; content blocks left in storage"
        );
        orphaned
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        if !self.done && self.feed.blocks() > 0 {
            warn!(
                name = %self.name,
                feed = %self.feed.label(),
                orphaned = self.feed.blocks(),
                unchunked = self.chunker.buffered(),
                "file writer dropped before finish"
            );
        }
    }
}

impl std::fmt::Debug for FileWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWriter")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("chunks", &self.chunk_ends.len())
            .field("buffered", &self.chunker.buffered())
            .finish()
    }
}
