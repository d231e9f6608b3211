//! Append-only block feeds.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use bytes::Bytes;
use strand_chunks::{feed_root, hash_bytes, Hash};
use strand_core::FeedId;
use tokio::sync::{broadcast, oneshot, OnceCell};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{LogError, LogResult};
use crate::events::{BlockEvent, Subscription};
use crate::registry::Core;
use crate::tree::FeedTree;

/// Options for opening a remote feed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedOptions {
    /// Expected total block count, if known from a link
    pub blocks: Option<u64>,
}

/// Ask for a block that is not yet locally present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WantRequest {
    pub block: u64,
    /// Needed before anything else can proceed (e.g. index blocks)
    pub critical: bool,
}

impl WantRequest {
    pub fn new(block: u64) -> Self {
        WantRequest { block, critical: false }
    }

    pub fn critical(block: u64) -> Self {
        WantRequest { block, critical: true }
    }
}

/// An outstanding want, as seen by a replicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Want {
    pub block: u64,
    pub critical: bool,
    /// Number of requesters still holding this want
    pub refs: u32,
}

/// Handle to a feed. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Feed {
    inner: Arc<FeedInner>,
}

pub(crate) struct FeedInner {
    core: Core,
    label: Uuid,
    writable: bool,
    expected: Option<u64>,
    ready: OnceCell<()>,
    // serializes append/finalize; `state` is never held across an await
    append_lock: tokio::sync::Mutex<()>,
    state: Mutex<FeedState>,
    events: broadcast::Sender<BlockEvent>,
}

#[derive(Default)]
struct FeedState {
    id: Option<FeedId>,
    loaded: bool,
    hashes: Vec<Hash>,
    present: Vec<bool>,
    wants: BTreeMap<u64, Want>,
    waiters: HashMap<u64, Vec<oneshot::Sender<Bytes>>>,
}

impl Feed {
    pub(crate) fn writable(core: Core) -> Self {
        let (events, _) = broadcast::channel(core.channel_capacity());
        Feed {
            inner: Arc::new(FeedInner {
                core,
                label: Uuid::new_v4(),
                writable: true,
                expected: None,
                ready: OnceCell::new_with(Some(())),
                append_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(FeedState {
                    loaded: true,
                    ..Default::default()
                }),
                events,
            }),
        }
    }

    pub(crate) fn remote(core: Core, id: FeedId, opts: FeedOptions) -> Self {
        let (events, _) = broadcast::channel(core.channel_capacity());
        Feed {
            inner: Arc::new(FeedInner {
                core,
                label: Uuid::new_v4(),
                writable: false,
                expected: opts.blocks,
                ready: OnceCell::new(),
                append_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(FeedState {
                    id: Some(id),
                    ..Default::default()
                }),
                events,
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<FeedInner>) -> Self {
        Feed { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<FeedInner> {
        Arc::downgrade(&self.inner)
    }

    fn state(&self) -> MutexGuard<'_, FeedState> {
        self.inner.state.lock().expect("feed state lock poisoned")
    }

    /// Local handle label, stable for the lifetime of this feed handle.
    pub fn label(&self) -> Uuid {
        self.inner.label
    }

    /// Content address; `None` until a writable feed is finalized.
    pub fn id(&self) -> Option<FeedId> {
        self.state().id
    }

    pub fn is_writable(&self) -> bool {
        self.inner.writable
    }

    pub fn is_finalized(&self) -> bool {
        self.state().id.is_some()
    }

    /// Block count. Before a remote feed is ready this is the expected count
    /// (or 0 when none was given).
    pub fn blocks(&self) -> u64 {
        self.known_blocks().or(self.inner.expected).unwrap_or(0)
    }

    pub(crate) fn known_blocks(&self) -> Option<u64> {
        let st = self.state();
        st.loaded.then_some(st.hashes.len() as u64)
    }

    /// Number of blocks locally present.
    pub fn downloaded(&self) -> u64 {
        self.state().present.iter().filter(|p| **p).count() as u64
    }

    /// Whether block `index` is locally present.
    pub fn has(&self, index: u64) -> bool {
        self.state()
            .present
            .get(index as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Load a remote feed's tree and local block presence. Idempotent.
    pub async fn ready(&self) -> LogResult<()> {
        self.inner.ready.get_or_try_init(|| self.load()).await?;
        Ok(())
    }

    async fn load(&self) -> LogResult<()> {
        let Some(id) = self.id() else {
            return Ok(());
        };
        let op = self.inner.core.operator();

        let raw = match op.read(&self.inner.core.tree_key(&id)).await {
            Ok(buf) => buf.to_bytes(),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                return Err(LogError::NotFound(id.to_hex()));
            }
            Err(e) => return Err(e.into()),
        };
        let hashes = FeedTree::from_bytes(&raw)?.verify(&id)?;

        if let Some(expected) = self.inner.expected {
            if expected != hashes.len() as u64 {
                return Err(LogError::LengthMismatch {
                    expected,
                    actual: hashes.len() as u64,
                });
            }
        }

        let mut present = Vec::with_capacity(hashes.len());
        for hash in &hashes {
            present.push(op.exists(&self.inner.core.block_key(hash)).await?);
        }
        let local = present.iter().filter(|p| **p).count();

        let mut guard = self.state();
        let st = &mut *guard;
        st.wants
            .retain(|&block, _| !present.get(block as usize).copied().unwrap_or(false));
        st.hashes = hashes;
        st.present = present;
        st.loaded = true;

        debug!(feed = %id, blocks = st.hashes.len(), local, "feed ready");
        Ok(())
    }

    fn ensure_writable(&self) -> LogResult<()> {
        if !self.inner.writable || self.is_finalized() {
            return Err(LogError::Finalized);
        }
        Ok(())
    }

    async fn store(&self, hash: &Hash, data: &[u8]) -> LogResult<()> {
        let op = self.inner.core.operator();
        let key = self.inner.core.block_key(hash);
        // blocks are content addressed, so an existing key already holds these bytes
        if !op.exists(&key).await? {
            op.write(&key, data.to_vec()).await?;
        }
        Ok(())
    }

    async fn push_block(&self, data: &[u8]) -> LogResult<u64> {
        let hash = hash_bytes(data);
        self.store(&hash, data).await?;

        let mut st = self.state();
        st.hashes.push(hash);
        st.present.push(true);
        Ok(st.hashes.len() as u64 - 1)
    }

    /// Append one block; returns its index.
    pub async fn append(&self, data: &[u8]) -> LogResult<u64> {
        let _guard = self.inner.append_lock.lock().await;
        self.ensure_writable()?;
        let index = self.push_block(data).await?;
        debug!(label = %self.inner.label, index, len = data.len(), "appended block");
        Ok(index)
    }

    /// Append several blocks in order; returns the index of the first.
    pub async fn append_batch(&self, blocks: &[Bytes]) -> LogResult<u64> {
        let _guard = self.inner.append_lock.lock().await;
        self.ensure_writable()?;
        let first = self.state().hashes.len() as u64;
        for block in blocks {
            self.push_block(block).await?;
        }
        debug!(label = %self.inner.label, first, count = blocks.len(), "appended blocks");
        Ok(first)
    }

    /// Seal a writable feed: persist its tree and fix its content address.
    pub async fn finalize(&self) -> LogResult<FeedId> {
        let _guard = self.inner.append_lock.lock().await;
        self.ensure_writable()?;

        let hashes = self.state().hashes.clone();
        let id = FeedId::from(feed_root(&hashes));
        let tree = FeedTree::new(&hashes).to_bytes()?;
        self.inner
            .core
            .operator()
            .write(&self.inner.core.tree_key(&id), tree)
            .await?;

        self.state().id = Some(id);
        self.inner.core.register(id, self);
        info!(feed = %id, label = %self.inner.label, blocks = hashes.len(), "feed finalized");
        Ok(id)
    }

    /// Read block `index`, waiting for it to arrive if it is not local yet.
    pub async fn get(&self, index: u64) -> LogResult<Bytes> {
        self.ready().await?;

        let pending = {
            let mut st = self.state();
            let len = st.hashes.len() as u64;
            if index >= len {
                return Err(LogError::OutOfRange { index, len });
            }
            if st.present[index as usize] {
                Ok(st.hashes[index as usize])
            } else {
                let (tx, rx) = oneshot::channel();
                st.waiters.entry(index).or_default().push(tx);
                st.add_want(WantRequest::new(index));
                Err(rx)
            }
        };

        match pending {
            Ok(hash) => self.read_block(index, &hash).await,
            Err(rx) => {
                debug!(index, "waiting for block");
                PendingBlock {
                    feed: self.clone(),
                    index,
                    rx,
                }
                .wait()
                .await
            }
        }
    }

    async fn read_block(&self, index: u64, hash: &Hash) -> LogResult<Bytes> {
        let key = self.inner.core.block_key(hash);
        let data = self.inner.core.operator().read(&key).await?.to_bytes();
        if hash_bytes(&data) != *hash {
            return Err(LogError::Verification(format!(
                "block {index} does not match its content hash"
            )));
        }
        Ok(data)
    }

    /// Deliver a block fetched from elsewhere.
    ///
    /// The block is checked against the feed tree before it is stored.
    /// Returns `false` if it was already present. Pending `get`s are woken
    /// and subscribers notified.
    pub async fn put(&self, index: u64, data: Bytes) -> LogResult<bool> {
        self.ready().await?;

        let hash = {
            let st = self.state();
            let len = st.hashes.len() as u64;
            if index >= len {
                return Err(LogError::OutOfRange { index, len });
            }
            if st.present[index as usize] {
                return Ok(false);
            }
            st.hashes[index as usize]
        };

        if hash_bytes(&data) != hash {
            return Err(LogError::Verification(format!(
                "block {index} does not match its content hash"
            )));
        }
        self.store(&hash, &data).await?;

        let waiters = {
            let mut st = self.state();
            if st.present[index as usize] {
                // raced with another put of the same block
                return Ok(false);
            }
            st.present[index as usize] = true;
            st.wants.remove(&index);
            st.waiters.remove(&index).unwrap_or_default()
        };

        for tx in waiters {
            let _ = tx.send(data.clone());
        }
        let _ = self.inner.events.send(BlockEvent { index, data });
        debug!(index, "block downloaded");
        Ok(true)
    }

    /// Register interest in a block. Returns `false` if it is already local.
    pub fn want(&self, req: WantRequest) -> bool {
        let mut st = self.state();
        if st.present.get(req.block as usize).copied().unwrap_or(false) {
            return false;
        }
        st.add_want(req);
        true
    }

    /// Drop one reference to a want. Returns `false` if there was none.
    pub fn unwant(&self, block: u64) -> bool {
        self.state().remove_want(block)
    }

    /// Outstanding wants, ordered by block.
    pub fn wants(&self) -> Vec<Want> {
        self.state().wants.values().copied().collect()
    }

    /// Per-block notifications for blocks delivered through `put`.
    pub fn subscribe(&self) -> Subscription<BlockEvent> {
        Subscription::new(self.inner.events.subscribe())
    }
}

impl FeedState {
    fn add_want(&mut self, req: WantRequest) {
        self.wants
            .entry(req.block)
            .and_modify(|w| {
                w.refs += 1;
                w.critical |= req.critical;
            })
            .or_insert(Want {
                block: req.block,
                critical: req.critical,
                refs: 1,
            });
    }

    fn remove_want(&mut self, block: u64) -> bool {
        let Some(want) = self.wants.get_mut(&block) else {
            return false;
        };
        want.refs -= 1;
        if want.refs == 0 {
            self.wants.remove(&block);
        }
        true
    }
}

/// A `get` parked until `put` delivers its block.
///
/// Dropped before delivery (the caller gave up), it takes its waiter and its
/// want reference back out of the feed state.
struct PendingBlock {
    feed: Feed,
    index: u64,
    rx: oneshot::Receiver<Bytes>,
}

impl PendingBlock {
    async fn wait(mut self) -> LogResult<Bytes> {
        let index = self.index;
        (&mut self.rx).await.map_err(|_| LogError::Closed(index))
    }
}

impl Drop for PendingBlock {
    fn drop(&mut self) {
        self.rx.close();
        let Ok(mut guard) = self.feed.inner.state.lock() else {
            return;
        };
        let st = &mut *guard;
        // `put` removes the waiters and the want together, so a sender still
        // listed here means the want still counts this request
        let withdrawn = match st.waiters.get_mut(&self.index) {
            Some(waiters) => {
                let before = waiters.len();
                waiters.retain(|tx| !tx.is_closed());
                before - waiters.len()
            }
            None => 0,
        };
        if st.waiters.get(&self.index).is_some_and(Vec::is_empty) {
            st.waiters.remove(&self.index);
        }
        for _ in 0..withdrawn {
            st.remove_want(self.index);
        }
        if withdrawn > 0 {
            debug!(index = self.index, "abandoned wait for block");
        }
    }
}

impl std::fmt::Debug for Feed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.state();
        f.debug_struct("Feed")
            .field("id", &st.id)
            .field("label", &self.inner.label)
            .field("writable", &self.inner.writable)
            .field("blocks", &st.hashes.len())
            .finish()
    }
}
