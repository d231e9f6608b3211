//! Drive: archives keyed by id over one storage namespace.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use opendal::Operator;
use strand_core::config::StrandConfig;
use strand_core::{ArchiveResult, FeedId};
use strand_log::Core;
use tracing::info;

use crate::archive::{Archive, ArchiveSettings};

pub struct Drive {
    core: Core,
    settings: ArchiveSettings,
    archives: Mutex<HashMap<FeedId, Archive>>,
}

impl Drive {
    pub fn new(op: Operator, config: &StrandConfig) -> ArchiveResult<Self> {
        Ok(Drive {
            core: Core::from_config(op, config),
            settings: ArchiveSettings::from_config(config)?,
            archives: Mutex::new(HashMap::new()),
        })
    }

    /// Build the configured storage backend, check it is reachable, and
    /// wrap it.
    pub async fn from_config(config: &StrandConfig) -> anyhow::Result<Self> {
        let op = strand_storage::build_operator(&config.storage)
            .context("building storage operator")?;
        strand_storage::check_health(&op).await?;
        let drive = Drive::new(op, config).context("invalid archive settings")?;
        info!(
            backend = ?config.storage.backend,
            prefix = %config.storage.prefix,
            "drive ready"
        );
        Ok(drive)
    }

    pub fn core(&self) -> &Core {
        &self.core
    }

    fn archives(&self) -> std::sync::MutexGuard<'_, HashMap<FeedId, Archive>> {
        self.archives.lock().expect("drive lock poisoned")
    }

    /// Start producing a new archive. `directory` anchors `append_file`.
    pub fn create(&self, directory: Option<PathBuf>) -> Archive {
        Archive::create(
            self.core.clone(),
            self.settings.clone().with_base_dir(directory),
        )
    }

    /// Open an existing archive, loading its entry log.
    ///
    /// An archive already open (or finalized through this drive) is returned
    /// as is.
    pub async fn open(&self, id: FeedId, directory: Option<PathBuf>) -> ArchiveResult<Archive> {
        if let Some(archive) = self.archive(&id) {
            return Ok(archive);
        }
        let archive = Archive::open(
            self.core.clone(),
            id,
            self.settings.clone().with_base_dir(directory),
        )?;
        archive.ready().await?;

        let archive = self.archives().entry(id).or_insert(archive).clone();
        info!(archive = %id, entries = archive.entries(), "archive opened");
        Ok(archive)
    }

    /// Look up an open archive.
    pub fn archive(&self, id: &FeedId) -> Option<Archive> {
        self.archives().get(id).cloned()
    }

    /// Finalize a produced archive and make it reachable by id.
    pub async fn finalize(&self, archive: &Archive) -> ArchiveResult<FeedId> {
        let id = archive.finalize().await?;
        self.archives().entry(id).or_insert_with(|| archive.clone());
        Ok(id)
    }

    /// Ids of every archive this drive knows about.
    pub fn ids(&self) -> Vec<FeedId> {
        let mut ids: Vec<FeedId> = self.archives().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for Drive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Drive")
            .field("core", &self.core)
            .field("archives", &self.archives().len())
            .finish()
    }
}
