//! Byte-offset random access over a file's content feed.
//!
//! Offsets are resolved through the paged index: the link's root list picks
//! the page, the page picks the chunk. The last page read is cached, so
//! sequential reads touch each index block once.

use bytes::{Bytes, BytesMut};
use strand_chunks::{ChunkSpan, IndexPage};
use strand_core::{ArchiveError, ArchiveResult};

use crate::archive::Archive;
use crate::select::{ContentFeed, ContentLease};

pub struct FileCursor {
    content: ContentFeed,
    position: u64,
    page: Option<(usize, IndexPage)>,
    // keeps the entry's index wants alive while the cursor is in use
    _lease: ContentLease,
}

impl FileCursor {
    fn new(lease: ContentLease) -> Self {
        FileCursor {
            content: lease.content().clone(),
            position: 0,
            page: None,
            _lease: lease,
        }
    }

    pub fn content(&self) -> &ContentFeed {
        &self.content
    }

    /// File size in bytes.
    pub fn len(&self) -> u64 {
        self.content.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Move to `offset`. Seeking to the end is allowed; past it is not.
    pub fn seek(&mut self, offset: u64) -> ArchiveResult<u64> {
        if offset > self.len() {
            return Err(ArchiveError::Validation(format!(
                "seek to {offset} past end of {}-byte file",
                self.len()
            )));
        }
        self.position = offset;
        Ok(offset)
    }

    async fn locate(&mut self, offset: u64) -> ArchiveResult<ChunkSpan> {
        let k = self.content.page_for(offset).ok_or_else(|| {
            ArchiveError::Decode(format!("no index page covers offset {offset}"))
        })?;
        let cached = matches!(&self.page, Some((cached, _)) if *cached == k);
        if !cached {
            let page = self.content.page(k).await?;
            self.page = Some((k, page));
        }
        let span = self.page.as_ref().and_then(|(_, page)| page.locate(offset));
        self.content.check_span(offset, span)
    }

    /// Bytes from the current position to the end of its chunk.
    /// `None` at end of file.
    pub async fn read(&mut self) -> ArchiveResult<Option<Bytes>> {
        if self.position >= self.len() {
            return Ok(None);
        }
        let span = self.locate(self.position).await?;
        let block = self.content.get(span.chunk).await?;
        if block.len() as u64 != span.len() {
            return Err(ArchiveError::Decode(format!(
                "chunk {} is {} bytes but the index says {}",
                span.chunk,
                block.len(),
                span.len()
            )));
        }
        let data = block.slice((self.position - span.start) as usize..);
        self.position = span.end;
        Ok(Some(data))
    }

    /// Up to `len` bytes starting at `offset`; shorter only at end of file.
    pub async fn read_at(&mut self, offset: u64, len: usize) -> ArchiveResult<Bytes> {
        self.seek(offset)?;
        let mut out = BytesMut::with_capacity(len);
        while out.len() < len {
            let Some(mut data) = self.read().await? else {
                break;
            };
            let want = len - out.len();
            if data.len() > want {
                data.truncate(want);
            }
            out.extend_from_slice(&data);
        }
        self.position = offset + out.len() as u64;
        Ok(out.freeze())
    }
}

impl std::fmt::Debug for FileCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileCursor")
            .field("entry", &self.content.entry())
            .field("len", &self.len())
            .field("position", &self.position)
            .finish()
    }
}

impl Archive {
    /// Random-access reader for entry `i`; `None` if it has no content.
    ///
    /// The entry stays selected until the cursor is dropped.
    pub async fn create_file_cursor(&self, i: u64) -> ArchiveResult<Option<FileCursor>> {
        Ok(self.lease(i).await?.map(FileCursor::new))
    }
}
