//! Archive notifications.

use bytes::Bytes;
use strand_log::{BlockEvent, Subscription};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum ArchiveEvent {
    /// The entry log is loaded and `entries` is known.
    Ready,
    /// An entry log block arrived.
    Download { index: u64, data: Bytes },
    /// A content block arrived for a selected entry.
    FileDownload { entry: u64, index: u64, data: Bytes },
}

/// Re-publish a feed's block events on the archive channel.
pub(crate) fn forward<F>(
    mut blocks: Subscription<BlockEvent>,
    events: broadcast::Sender<ArchiveEvent>,
    map: F,
) -> JoinHandle<()>
where
    F: Fn(BlockEvent) -> ArchiveEvent + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(block) = blocks.recv().await {
            // no subscribers is fine
            let _ = events.send(map(block));
        }
    })
}
