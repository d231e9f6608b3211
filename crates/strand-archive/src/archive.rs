//! Archive: an entry log plus per-file content feeds.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use strand_chunks::ChunkSizes;
use strand_core::config::{ModeDefaults, StrandConfig};
use strand_core::{ArchiveError, ArchiveResult, Entry, EntryKind, EntryMeta, EntryType, FeedId};
use strand_log::{BlockEvent, Core, Feed, FeedOptions, Subscription};
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::append::{Appended, FileWriter};
use crate::events::{forward, ArchiveEvent};
use crate::select::Selection;

/// Per-archive knobs, usually derived from `StrandConfig`.
#[derive(Debug, Clone)]
pub struct ArchiveSettings {
    pub chunk_sizes: ChunkSizes,
    /// Chunk boundaries per trailing index block
    pub index_page_chunks: usize,
    pub modes: ModeDefaults,
    /// Directory relative source paths are resolved against in `append_file`
    pub base_dir: Option<PathBuf>,
    pub channel_capacity: usize,
}

impl ArchiveSettings {
    pub fn from_config(config: &StrandConfig) -> ArchiveResult<Self> {
        let chunk_sizes = ChunkSizes::from(&config.chunking);
        chunk_sizes
            .validate()
            .map_err(|e| ArchiveError::Validation(e.to_string()))?;
        if config.chunking.index_page_chunks == 0 {
            return Err(ArchiveError::Validation(
                "chunking.index_page_chunks must be at least 1".into(),
            ));
        }
        Ok(ArchiveSettings {
            chunk_sizes,
            index_page_chunks: config.chunking.index_page_chunks,
            modes: config.modes.clone(),
            base_dir: None,
            channel_capacity: config.events.channel_capacity.max(1),
        })
    }

    pub fn with_base_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.base_dir = dir;
        self
    }
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        let config = StrandConfig::default();
        ArchiveSettings {
            chunk_sizes: ChunkSizes::from(&config.chunking),
            index_page_chunks: config.chunking.index_page_chunks,
            modes: config.modes,
            base_dir: None,
            channel_capacity: config.events.channel_capacity,
        }
    }
}

/// A sparse archive. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Archive {
    pub(crate) inner: Arc<ArchiveInner>,
}

pub(crate) struct ArchiveInner {
    pub(crate) core: Core,
    pub(crate) log: Feed,
    pub(crate) settings: ArchiveSettings,
    pub(crate) events: broadcast::Sender<ArchiveEvent>,
    pub(crate) selections: Mutex<HashMap<u64, Selection>>,
    ready: OnceCell<()>,
    log_events: Mutex<Option<Subscription<BlockEvent>>>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ArchiveInner {
    fn drop(&mut self) {
        if let Ok(slot) = self.forwarder.get_mut() {
            if let Some(task) = slot.take() {
                task.abort();
            }
        }
        if let Ok(selections) = self.selections.get_mut() {
            selections.clear();
        }
    }
}

impl Archive {
    fn with_log(core: Core, log: Feed, settings: ArchiveSettings) -> Self {
        let (events, _) = broadcast::channel(settings.channel_capacity.max(1));
        // subscribe up front so nothing delivered before `ready` is missed
        let log_events = (!log.is_writable()).then(|| log.subscribe());
        Archive {
            inner: Arc::new(ArchiveInner {
                core,
                log,
                settings,
                events,
                selections: Mutex::new(HashMap::new()),
                ready: OnceCell::new(),
                log_events: Mutex::new(log_events),
                forwarder: Mutex::new(None),
            }),
        }
    }

    /// Producer: a new archive with an empty entry log.
    pub fn create(core: Core, settings: ArchiveSettings) -> Self {
        let log = core.add();
        debug!(label = %log.label(), "created archive");
        Self::with_log(core, log, settings)
    }

    /// Consumer: an existing archive by id. Call `ready` before reading.
    pub fn open(core: Core, id: FeedId, settings: ArchiveSettings) -> ArchiveResult<Self> {
        let log = core.get(id, FeedOptions::default())?;
        Ok(Self::with_log(core, log, settings))
    }

    /// Load the entry log. Idempotent; emits `ArchiveEvent::Ready` once.
    pub async fn ready(&self) -> ArchiveResult<()> {
        self.inner
            .ready
            .get_or_try_init(|| async {
                self.inner.log.ready().await?;

                let subscription = self.lock(&self.inner.log_events).take();
                if let Some(blocks) = subscription {
                    let task = forward(blocks, self.inner.events.clone(), |b| {
                        ArchiveEvent::Download {
                            index: b.index,
                            data: b.data,
                        }
                    });
                    *self.lock(&self.inner.forwarder) = Some(task);
                }

                let _ = self.inner.events.send(ArchiveEvent::Ready);
                debug!(
                    entries = self.entries(),
                    local = self.inner.log.downloaded(),
                    "archive ready"
                );
                Ok::<(), ArchiveError>(())
            })
            .await?;
        Ok(())
    }

    fn lock<'a, T>(&self, m: &'a Mutex<T>) -> MutexGuard<'a, T> {
        m.lock().expect("archive lock poisoned")
    }

    pub(crate) fn selections(&self) -> MutexGuard<'_, HashMap<u64, Selection>> {
        self.lock(&self.inner.selections)
    }

    /// Content address of the entry log; `None` while still producing.
    pub fn id(&self) -> Option<FeedId> {
        self.inner.log.id()
    }

    /// Number of committed entries.
    pub fn entries(&self) -> u64 {
        self.inner.log.blocks()
    }

    pub fn is_writable(&self) -> bool {
        self.inner.log.is_writable() && !self.inner.log.is_finalized()
    }

    /// The entry log, for replication.
    pub fn feed(&self) -> &Feed {
        &self.inner.log
    }

    pub fn core(&self) -> &Core {
        &self.inner.core
    }

    pub fn settings(&self) -> &ArchiveSettings {
        &self.inner.settings
    }

    pub fn subscribe(&self) -> Subscription<ArchiveEvent> {
        Subscription::new(self.inner.events.subscribe())
    }

    /// Entry `i`, or `None` if the log is shorter or the block is not local.
    pub async fn entry(&self, i: u64) -> ArchiveResult<Option<Entry>> {
        if i >= self.entries() || !self.inner.log.has(i) {
            return Ok(None);
        }
        let data = self.inner.log.get(i).await?;
        Entry::decode(&data).map(Some)
    }

    /// Start a new entry.
    ///
    /// Non-file entries are written immediately. Files return a
    /// [`FileWriter`]; the entry is only written by `FileWriter::finish`.
    pub async fn append(&self, meta: impl Into<EntryMeta>) -> ArchiveResult<Appended> {
        let (name, entry_type, mode) = meta.into().normalize(&self.inner.settings.modes)?;

        if entry_type == EntryType::File {
            let writer = FileWriter::new(self.clone(), name, mode);
            return Ok(Appended::File(writer));
        }

        let entry = Entry {
            name,
            mode,
            kind: EntryKind::empty(entry_type),
        };
        let index = self.write_entry(&entry).await?;
        Ok(Appended::Entry { index })
    }

    pub(crate) async fn write_entry(&self, entry: &Entry) -> ArchiveResult<u64> {
        let index = self.inner.log.append(&entry.encode()).await?;
        debug!(
            index,
            name = %entry.name,
            kind = %entry.entry_type(),
            size = entry.size(),
            "entry committed"
        );
        Ok(index)
    }

    /// Add a file from disk (or a directory, symlink, ... as a bare entry).
    ///
    /// Relative paths are resolved against the archive's base directory.
    /// `name` defaults to `path` as given.
    pub async fn append_file(&self, path: impl AsRef<Path>, name: Option<&str>) -> ArchiveResult<u64> {
        let path = path.as_ref();
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let source = match &self.inner.settings.base_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        };

        let meta = tokio::fs::symlink_metadata(&source).await?;
        let entry = EntryMeta::new(name).with_mode(mode_of(&meta));

        match self.append(entry).await? {
            Appended::Entry { index } => Ok(index),
            Appended::File(mut writer) => {
                let file = tokio::fs::File::open(&source).await?;
                writer.write_from(file).await?;
                writer.finish().await
            }
        }
    }

    /// Seal the entry log. Fixes `id` and freezes `entries`.
    pub async fn finalize(&self) -> ArchiveResult<FeedId> {
        let id = self.inner.log.finalize().await?;
        info!(archive = %id, entries = self.entries(), "archive finalized");
        Ok(id)
    }
}

#[cfg(unix)]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    meta.mode()
}

#[cfg(not(unix))]
fn mode_of(meta: &std::fs::Metadata) -> u32 {
    use strand_core::types::{S_IFDIR, S_IFLNK, S_IFREG};
    let ft = meta.file_type();
    if ft.is_dir() {
        S_IFDIR | 0o755
    } else if ft.is_symlink() {
        S_IFLNK | 0o644
    } else {
        S_IFREG | 0o644
    }
}

impl std::fmt::Debug for Archive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Archive")
            .field("id", &self.id())
            .field("entries", &self.entries())
            .field("writable", &self.is_writable())
            .finish()
    }
}
