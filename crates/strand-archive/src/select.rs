//! Selective retrieval: open a file's content feed and ask for its index.

use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;
use strand_chunks::{delta, page_for_offset, ChunkSpan, IndexPage};
use strand_core::{ArchiveError, ArchiveResult, Entry, FeedId, Link};
use strand_log::{Core, Feed, FeedOptions, LogError, WantRequest};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::archive::Archive;
use crate::events::{forward, ArchiveEvent};

/// Read handle on one file's content feed.
#[derive(Debug, Clone)]
pub struct ContentFeed {
    entry: u64,
    feed: Feed,
    link: Link,
    size: u64,
    content_blocks: u64,
    page_starts: Arc<Vec<u64>>,
}

impl ContentFeed {
    /// `None` for entries without a link.
    pub(crate) fn open(core: &Core, index: u64, entry: &Entry) -> ArchiveResult<Option<Self>> {
        let Some(link) = entry.link() else {
            return Ok(None);
        };
        let page_starts = delta::unpack(&link.index)
            .map_err(|e| ArchiveError::Decode(format!("link index of '{}': {e}", entry.name)))?;
        let index_blocks = page_starts.len() as u64;
        if index_blocks > link.blocks {
            return Err(ArchiveError::Decode(format!(
                "link of '{}' names {index_blocks} index blocks but only {} blocks",
                entry.name, link.blocks
            )));
        }

        let feed = core.get(
            link.id,
            FeedOptions {
                blocks: Some(link.blocks),
            },
        )?;
        Ok(Some(ContentFeed {
            entry: index,
            feed,
            content_blocks: link.blocks - index_blocks,
            link: link.clone(),
            size: entry.size(),
            page_starts: Arc::new(page_starts),
        }))
    }

    /// Position of the owning entry in the entry log.
    pub fn entry(&self) -> u64 {
        self.entry
    }

    pub fn id(&self) -> FeedId {
        self.link.id
    }

    pub fn link(&self) -> &Link {
        &self.link
    }

    /// The underlying feed, for replication.
    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Total blocks, index pages included.
    pub fn blocks(&self) -> u64 {
        self.link.blocks
    }

    /// Chunk payload blocks.
    pub fn content_blocks(&self) -> u64 {
        self.content_blocks
    }

    pub fn index_blocks(&self) -> Range<u64> {
        self.content_blocks..self.link.blocks
    }

    pub fn has(&self, block: u64) -> bool {
        self.feed.has(block)
    }

    /// Content block `block`, waiting for it if it is not local yet.
    pub async fn get(&self, block: u64) -> ArchiveResult<Bytes> {
        if block >= self.content_blocks {
            return Err(LogError::OutOfRange {
                index: block,
                len: self.content_blocks,
            }
            .into());
        }
        Ok(self.feed.get(block).await?)
    }

    /// Index page `k`, waiting for its block if needed.
    pub async fn page(&self, k: usize) -> ArchiveResult<IndexPage> {
        let start = *self.page_starts.get(k).ok_or_else(|| {
            ArchiveError::Decode(format!("index page {k} does not exist"))
        })?;
        let data = self.feed.get(self.content_blocks + k as u64).await?;
        IndexPage::decode(&data, start)
            .map_err(|e| ArchiveError::Decode(format!("index page {k}: {e}")))
    }

    /// Which page holds the chunk covering byte `offset`.
    pub fn page_for(&self, offset: u64) -> Option<usize> {
        if offset >= self.size {
            return None;
        }
        page_for_offset(&self.page_starts, offset)
    }

    /// The chunk covering byte `offset`, or `None` past the end of the file.
    pub async fn locate(&self, offset: u64) -> ArchiveResult<Option<ChunkSpan>> {
        let Some(k) = self.page_for(offset) else {
            return Ok(None);
        };
        let page = self.page(k).await?;
        self.check_span(offset, page.locate(offset)).map(Some)
    }

    pub(crate) fn check_span(&self, offset: u64, span: Option<ChunkSpan>) -> ArchiveResult<ChunkSpan> {
        match span {
            Some(span) if span.chunk < self.content_blocks => Ok(span),
            Some(span) => Err(ArchiveError::Decode(format!(
                "index maps offset {offset} to chunk {} of {}",
                span.chunk, self.content_blocks
            ))),
            None => Err(ArchiveError::Decode(format!(
                "index does not cover offset {offset} of {}",
                self.size
            ))),
        }
    }
}

/// Wants and notifications held on behalf of one entry.
///
/// Shared by an explicit `select` and by any streams or cursors reading the
/// entry; released when the last of them lets go.
pub(crate) struct Selection {
    pub(crate) content: ContentFeed,
    wanted: Vec<u64>,
    forwarder: JoinHandle<()>,
    explicit: bool,
    leases: usize,
}

impl Selection {
    fn idle(&self) -> bool {
        !self.explicit && self.leases == 0
    }
}

impl Drop for Selection {
    fn drop(&mut self) {
        for block in &self.wanted {
            self.content.feed.unwant(*block);
        }
        self.forwarder.abort();
    }
}

/// Keeps an entry's selection alive for one stream or cursor.
pub(crate) struct ContentLease {
    archive: Archive,
    entry: u64,
    content: ContentFeed,
}

impl ContentLease {
    pub(crate) fn content(&self) -> &ContentFeed {
        &self.content
    }
}

impl Drop for ContentLease {
    fn drop(&mut self) {
        let released = {
            let Ok(mut selections) = self.archive.inner.selections.lock() else {
                return;
            };
            let idle = match selections.get_mut(&self.entry) {
                Some(selection) => {
                    selection.leases = selection.leases.saturating_sub(1);
                    selection.idle()
                }
                None => false,
            };
            if idle {
                selections.remove(&self.entry)
            } else {
                None
            }
        };
        if released.is_some() {
            debug!(entry = self.entry, "content lease released");
        }
    }
}

impl Archive {
    /// Open entry `i`'s content feed, want its missing index blocks, and
    /// forward its block arrivals as `FileDownload`.
    async fn open_selection(&self, i: u64) -> ArchiveResult<Option<Selection>> {
        let Some(entry) = self.entry(i).await? else {
            return Ok(None);
        };
        let Some(content) = ContentFeed::open(self.core(), i, &entry)? else {
            return Ok(None);
        };
        content.feed.ready().await?;

        let blocks = content.feed.subscribe();
        let wanted: Vec<u64> = content
            .index_blocks()
            .filter(|&b| content.feed.want(WantRequest::critical(b)))
            .collect();
        let forwarder = forward(blocks, self.inner.events.clone(), move |b| {
            ArchiveEvent::FileDownload {
                entry: i,
                index: b.index,
                data: b.data,
            }
        });

        Ok(Some(Selection {
            content,
            wanted,
            forwarder,
            explicit: false,
            leases: 0,
        }))
    }

    /// Find or open entry `i`'s selection and record a holder with `claim`.
    async fn claim<F>(&self, i: u64, claim: F) -> ArchiveResult<Option<ContentFeed>>
    where
        F: Fn(&mut Selection) + Send,
    {
        if let Some(content) = self.claim_existing(i, &claim) {
            return Ok(Some(content));
        }

        let Some(mut selection) = self.open_selection(i).await? else {
            return Ok(None);
        };
        let mut selections = self.selections();
        if let Some(existing) = selections.get_mut(&i) {
            // lost a race with a concurrent open of the same entry
            claim(existing);
            let content = existing.content.clone();
            drop(selections);
            drop(selection);
            return Ok(Some(content));
        }
        claim(&mut selection);
        debug!(
            entry = i,
            feed = %selection.content.id(),
            blocks = selection.content.blocks(),
            critical = selection.wanted.len(),
            "entry selected"
        );
        let content = selection.content.clone();
        selections.insert(i, selection);
        Ok(Some(content))
    }

    fn claim_existing<F>(&self, i: u64, claim: &F) -> Option<ContentFeed>
    where
        F: Fn(&mut Selection),
    {
        let mut selections = self.selections();
        let selection = selections.get_mut(&i)?;
        claim(selection);
        Some(selection.content.clone())
    }

    /// Open entry `i`'s content feed and want its missing index blocks.
    ///
    /// `None` if the entry is absent or has no link. Selecting an entry
    /// that is already selected returns the existing handle.
    pub async fn select(&self, i: u64) -> ArchiveResult<Option<ContentFeed>> {
        self.claim(i, |selection| selection.explicit = true).await
    }

    /// Like `select`, but held only as long as the returned lease.
    pub(crate) async fn lease(&self, i: u64) -> ArchiveResult<Option<ContentLease>> {
        let content = self.claim(i, |selection| selection.leases += 1).await?;
        Ok(content.map(|content| ContentLease {
            archive: self.clone(),
            entry: i,
            content,
        }))
    }

    /// Release the wants of a prior `select`. Local blocks are kept.
    ///
    /// Streams and cursors still reading the entry keep its wants until they
    /// finish. Returns `false` if `i` was not selected.
    pub fn deselect(&self, i: u64) -> bool {
        let released = {
            let mut selections = self.selections();
            let Some(selection) = selections.get_mut(&i) else {
                return false;
            };
            if !selection.explicit {
                return false;
            }
            selection.explicit = false;
            if !selection.idle() {
                debug!(entry = i, leases = selection.leases, "entry deselected, still read");
                return true;
            }
            selections.remove(&i)
        };
        if let Some(selection) = released {
            debug!(entry = i, released = selection.wanted.len(), "entry deselected");
        }
        true
    }

    /// Entries with a live selection, from `select` or an open stream or
    /// cursor, in ascending order.
    pub fn selected(&self) -> Vec<u64> {
        let mut selected: Vec<u64> = self.selections().keys().copied().collect();
        selected.sort_unstable();
        selected
    }
}
