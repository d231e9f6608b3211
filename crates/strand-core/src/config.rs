use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::types::EntryType;

/// Top-level configuration (loaded from strand.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrandConfig {
    pub storage: StorageConfig,
    pub chunking: ChunkingConfig,
    pub modes: ModeDefaults,
    pub events: EventsConfig,
}

impl StrandConfig {
    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(StrandConfig::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        toml::from_str(&content).map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Fs,
    S3,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Block storage backend (default: memory)
    pub backend: StorageBackend,
    /// Root directory for the fs backend
    pub root: Option<PathBuf>,
    /// Key prefix for all blocks and feed trees (default: strand)
    pub prefix: String,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// S3 bucket name
    pub bucket: String,
    /// Refuse plaintext HTTP S3 endpoints
    pub enforce_tls: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            root: None,
            prefix: "strand".into(),
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "strand".into(),
            enforce_tls: false,
        }
    }
}

/// Content-defined chunking and index paging parameters.
///
/// Changing the sizes changes chunk boundaries, and therefore the content
/// address of every file written afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub min_size: u32,
    pub avg_size: u32,
    pub max_size: u32,
    /// Chunk boundaries per trailing index block
    pub index_page_chunks: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            min_size: 2 * 1024,
            avg_size: 4 * 1024,
            max_size: 16 * 1024,
            index_page_chunks: 4096,
        }
    }
}

/// Default permission bits applied when an entry arrives without a mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeDefaults {
    pub file: u32,
    pub directory: u32,
    pub symlink: u32,
    pub block_device: u32,
    pub character_device: u32,
    pub fifo: u32,
}

impl Default for ModeDefaults {
    fn default() -> Self {
        Self {
            file: 0o644,
            directory: 0o755,
            symlink: 0o644,
            block_device: 0o644,
            character_device: 0o644,
            fifo: 0o644,
        }
    }
}

impl ModeDefaults {
    pub fn for_type(&self, entry_type: EntryType) -> u32 {
        match entry_type {
            EntryType::File => self.file,
            EntryType::Directory => self.directory,
            EntryType::Symlink => self.symlink,
            EntryType::BlockDevice => self.block_device,
            EntryType::CharacterDevice => self.character_device,
            EntryType::Fifo => self.fifo,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Broadcast capacity for archive and feed notifications
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}
