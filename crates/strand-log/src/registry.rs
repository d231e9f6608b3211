//! Feed registry: one storage namespace, one live handle per feed id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use opendal::Operator;
use strand_chunks::{hash_to_hex, Hash};
use strand_core::config::{EventsConfig, StrandConfig};
use strand_core::FeedId;
use tracing::debug;

use crate::error::{LogError, LogResult};
use crate::feed::{Feed, FeedInner, FeedOptions};

/// Entry point for creating and opening feeds.
///
/// Cheap to clone. Opening the same id twice while a handle is alive returns
/// the same underlying feed, so wants and waiters are shared.
#[derive(Clone)]
pub struct Core {
    inner: Arc<CoreInner>,
}

pub(crate) struct CoreInner {
    op: Operator,
    prefix: String,
    channel_capacity: usize,
    feeds: Mutex<HashMap<FeedId, Weak<FeedInner>>>,
}

impl Core {
    pub fn new(op: Operator, prefix: impl Into<String>) -> Self {
        Self::with_capacity(op, prefix, EventsConfig::default().channel_capacity)
    }

    pub fn with_capacity(op: Operator, prefix: impl Into<String>, channel_capacity: usize) -> Self {
        Core {
            inner: Arc::new(CoreInner {
                op,
                prefix: prefix.into().trim_end_matches('/').to_string(),
                channel_capacity: channel_capacity.max(1),
                feeds: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn from_config(op: Operator, config: &StrandConfig) -> Self {
        Self::with_capacity(op, &config.storage.prefix, config.events.channel_capacity)
    }

    pub fn operator(&self) -> &Operator {
        &self.inner.op
    }

    pub fn block_key(&self, hash: &Hash) -> String {
        format!("{}/blocks/{}", self.inner.prefix, hash_to_hex(hash))
    }

    pub fn tree_key(&self, id: &FeedId) -> String {
        format!("{}/feeds/{}", self.inner.prefix, id.to_hex())
    }

    pub(crate) fn channel_capacity(&self) -> usize {
        self.inner.channel_capacity
    }

    /// Create a new, empty writable feed.
    pub fn add(&self) -> Feed {
        let feed = Feed::writable(self.clone());
        debug!(label = %feed.label(), "created writable feed");
        feed
    }

    /// Open a finalized feed by id.
    ///
    /// Nothing is read until `Feed::ready`. `opts.blocks`, when given, is
    /// checked against the stored tree.
    pub fn get(&self, id: FeedId, opts: FeedOptions) -> LogResult<Feed> {
        let mut feeds = self.inner.feeds.lock().expect("feed registry lock poisoned");

        if let Some(inner) = feeds.get(&id).and_then(Weak::upgrade) {
            let feed = Feed::from_inner(inner);
            if let Some(expected) = opts.blocks {
                if let Some(actual) = feed.known_blocks() {
                    if actual != expected {
                        return Err(LogError::LengthMismatch { expected, actual });
                    }
                }
            }
            return Ok(feed);
        }

        feeds.retain(|_, weak| weak.strong_count() > 0);
        let feed = Feed::remote(self.clone(), id, opts);
        feeds.insert(id, feed.downgrade());
        debug!(feed = %id, "opened remote feed");
        Ok(feed)
    }

    /// Make a freshly finalized writable feed reachable through `get`.
    pub(crate) fn register(&self, id: FeedId, feed: &Feed) {
        let mut feeds = self.inner.feeds.lock().expect("feed registry lock poisoned");
        let live = feeds.get(&id).and_then(Weak::upgrade).is_some();
        if !live {
            feeds.insert(id, feed.downgrade());
        }
        feeds.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of feed handles currently alive in this registry.
    pub fn open_feeds(&self) -> usize {
        let feeds = self.inner.feeds.lock().expect("feed registry lock poisoned");
        feeds.values().filter(|w| w.strong_count() > 0).count()
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("prefix", &self.inner.prefix)
            .field("open_feeds", &self.open_feeds())
            .finish()
    }
}
