//! Lazy, pull-based streams over entries and file content.

use bytes::Bytes;
use futures::stream::{self, Stream};
use strand_core::{ArchiveResult, Entry};

use crate::archive::Archive;
use crate::select::ContentLease;

enum FileStreamState {
    Unopened { start: u64, limit: Option<u64> },
    Open { lease: ContentLease, next: u64, end: u64 },
}

impl Archive {
    /// Entries from `start`, at most `limit` of them, ending at the first
    /// position `entry` reports as absent.
    pub fn create_entry_stream(
        &self,
        start: u64,
        limit: Option<u64>,
    ) -> impl Stream<Item = ArchiveResult<Entry>> + Send + 'static {
        let archive = self.clone();
        stream::try_unfold((start, limit), move |(next, remaining)| {
            let archive = archive.clone();
            async move {
                if remaining == Some(0) {
                    return Ok(None);
                }
                let entry = archive.entry(next).await?;
                Ok(entry.map(|e| (e, (next + 1, remaining.map(|r| r - 1)))))
            }
        })
    }

    /// Content blocks of entry `i` from block `start`, at most `limit`.
    ///
    /// The first pull selects the entry for as long as the stream lives.
    /// Empty when the entry is missing or has no content; index blocks are
    /// never yielded.
    pub fn create_file_stream(
        &self,
        i: u64,
        start: u64,
        limit: Option<u64>,
    ) -> impl Stream<Item = ArchiveResult<Bytes>> + Send + 'static {
        let archive = self.clone();
        stream::try_unfold(
            FileStreamState::Unopened { start, limit },
            move |state| {
                let archive = archive.clone();
                async move {
                    let (lease, next, end) = match state {
                        FileStreamState::Unopened { start, limit } => {
                            let Some(lease) = archive.lease(i).await? else {
                                return Ok(None);
                            };
                            let available = lease.content().content_blocks();
                            let end = match limit {
                                Some(limit) => available.min(start.saturating_add(limit)),
                                None => available,
                            };
                            (lease, start, end)
                        }
                        FileStreamState::Open { lease, next, end } => (lease, next, end),
                    };
                    if next >= end {
                        return Ok(None);
                    }
                    let block = lease.content().get(next).await?;
                    Ok(Some((
                        block,
                        FileStreamState::Open {
                            lease,
                            next: next + 1,
                            end,
                        },
                    )))
                }
            },
        )
    }
}
