//! Two-level paged chunk index.
//!
//! A file's chunk end offsets are grouped into pages of `page_chunks`
//! entries. Each page is stored as one trailing block of the content feed:
//!
//! ```text
//!   page k  = pack([first_chunk, end_0, end_1, ...])
//!   root    = pack([page_start_0, page_start_1, ...])   (Link.index)
//! ```
//!
//! `page_start_k` is the byte offset where the first chunk of page k begins,
//! so the root alone says which page covers an offset, and one page fetch
//! says which content block holds it.

use crate::delta::{pack, unpack};
use crate::error::ChunkError;

/// Byte range of one content chunk within the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    /// Chunk (content block) index
    pub chunk: u64,
    /// Inclusive start offset
    pub start: u64,
    /// Exclusive end offset
    pub end: u64,
}

impl ChunkSpan {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Encoded index for a whole file, ready to append.
#[derive(Debug, Clone, Default)]
pub struct PagedIndex {
    pages: Vec<Vec<u8>>,
    page_starts: Vec<u64>,
}

impl PagedIndex {
    /// Build the pages for a file whose chunks end at `chunk_ends`
    /// (strictly increasing, one entry per content block).
    pub fn build(chunk_ends: &[u64], page_chunks: usize) -> Self {
        let page_chunks = page_chunks.max(1);
        let mut pages = Vec::with_capacity(chunk_ends.len().div_ceil(page_chunks));
        let mut page_starts = Vec::with_capacity(pages.capacity());

        let mut prev_end = 0u64;
        for (k, ends) in chunk_ends.chunks(page_chunks).enumerate() {
            let mut values = Vec::with_capacity(ends.len() + 1);
            values.push((k * page_chunks) as u64);
            values.extend_from_slice(ends);

            page_starts.push(prev_end);
            pages.push(pack(&values));
            prev_end = ends[ends.len() - 1];
        }

        PagedIndex { pages, page_starts }
    }

    /// Encoded pages, in append order.
    pub fn pages(&self) -> &[Vec<u8>] {
        &self.pages
    }

    pub fn into_pages(self) -> Vec<Vec<u8>> {
        self.pages
    }

    pub fn page_starts(&self) -> &[u64] {
        &self.page_starts
    }

    /// The root list, as stored in a link.
    pub fn packed_starts(&self) -> Vec<u8> {
        pack(&self.page_starts)
    }
}

/// Which page covers `offset`, given the root list of page starts.
pub fn page_for_offset(page_starts: &[u64], offset: u64) -> Option<usize> {
    match page_starts.partition_point(|&s| s <= offset) {
        0 => None,
        n => Some(n - 1),
    }
}

/// One decoded index page.
#[derive(Debug, Clone)]
pub struct IndexPage {
    first_chunk: u64,
    start: u64,
    ends: Vec<u64>,
}

impl IndexPage {
    /// Decode a page block. `start` is the page's entry from the root list.
    pub fn decode(bytes: &[u8], start: u64) -> Result<Self, ChunkError> {
        let mut values = unpack(bytes)?;
        if values.len() < 2 {
            return Err(ChunkError::EmptyIndexPage);
        }
        let first_chunk = values.remove(0);
        Ok(IndexPage {
            first_chunk,
            start,
            ends: values,
        })
    }

    pub fn first_chunk(&self) -> u64 {
        self.first_chunk
    }

    /// Number of chunks described by this page.
    pub fn len(&self) -> usize {
        self.ends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ends.is_empty()
    }

    /// End offset of the last chunk in this page.
    pub fn end(&self) -> u64 {
        self.ends.last().copied().unwrap_or(self.start)
    }

    /// The chunk containing byte `offset`, if this page covers it.
    pub fn locate(&self, offset: u64) -> Option<ChunkSpan> {
        if offset < self.start {
            return None;
        }
        let i = self.ends.partition_point(|&e| e <= offset);
        if i == self.ends.len() {
            return None;
        }
        Some(ChunkSpan {
            chunk: self.first_chunk + i as u64,
            start: if i == 0 { self.start } else { self.ends[i - 1] },
            end: self.ends[i],
        })
    }
}
