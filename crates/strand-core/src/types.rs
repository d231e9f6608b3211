use prost::Message;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::ModeDefaults;
use crate::error::{ArchiveError, ArchiveResult};
use crate::proto::{EntryRecord, EntryTypeRecord, LinkRecord};

// POSIX file type bits (st_mode & S_IFMT)
pub const S_IFMT: u32 = 0o170000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;

/// Content address of a finalized feed: BLAKE3 over its block count and hashes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeedId([u8; 32]);

impl FeedId {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        FeedId(bytes)
    }

    /// Parse from a byte slice; `None` unless exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 32] = bytes.try_into().ok()?;
        Some(FeedId(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }

    pub fn from_hex(hex: &str) -> ArchiveResult<Self> {
        blake3::Hash::from_hex(hex)
            .map(|h| FeedId(*h.as_bytes()))
            .map_err(|e| ArchiveError::Validation(format!("invalid feed id '{hex}': {e}")))
    }
}

impl From<blake3::Hash> for FeedId {
    fn from(h: blake3::Hash) -> Self {
        FeedId(*h.as_bytes())
    }
}

impl fmt::Display for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FeedId({})", &self.to_hex()[..16])
    }
}

/// Kind of filesystem object an entry describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryType {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharacterDevice,
    Fifo,
}

impl EntryType {
    /// Infer the type from `st_mode` bits. Anything unrecognised is a file.
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFBLK => EntryType::BlockDevice,
            S_IFCHR => EntryType::CharacterDevice,
            S_IFDIR => EntryType::Directory,
            S_IFIFO => EntryType::Fifo,
            S_IFLNK => EntryType::Symlink,
            _ => EntryType::File,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::File => "file",
            EntryType::Directory => "directory",
            EntryType::Symlink => "symlink",
            EntryType::BlockDevice => "block-device",
            EntryType::CharacterDevice => "character-device",
            EntryType::Fifo => "fifo",
        }
    }

    fn to_record(self) -> EntryTypeRecord {
        match self {
            EntryType::File => EntryTypeRecord::File,
            EntryType::Directory => EntryTypeRecord::Directory,
            EntryType::Symlink => EntryTypeRecord::Symlink,
            EntryType::BlockDevice => EntryTypeRecord::BlockDevice,
            EntryType::CharacterDevice => EntryTypeRecord::CharacterDevice,
            EntryType::Fifo => EntryTypeRecord::Fifo,
        }
    }

    fn from_record(record: EntryTypeRecord) -> Self {
        match record {
            EntryTypeRecord::File => EntryType::File,
            EntryTypeRecord::Directory => EntryType::Directory,
            EntryTypeRecord::Symlink => EntryType::Symlink,
            EntryTypeRecord::BlockDevice => EntryType::BlockDevice,
            EntryTypeRecord::CharacterDevice => EntryType::CharacterDevice,
            EntryTypeRecord::Fifo => EntryType::Fifo,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(EntryType::File),
            "directory" => Ok(EntryType::Directory),
            "symlink" => Ok(EntryType::Symlink),
            "block-device" => Ok(EntryType::BlockDevice),
            "character-device" => Ok(EntryType::CharacterDevice),
            "fifo" => Ok(EntryType::Fifo),
            other => Err(ArchiveError::Validation(format!("unknown entry type: {other}"))),
        }
    }
}

/// Reference from a file entry to its content feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Content address of the content feed
    pub id: FeedId,
    /// Total block count, trailing index blocks included
    pub blocks: u64,
    /// Packed page-start offsets (one per index block)
    pub index: Vec<u8>,
}

/// Type-specific payload of an entry. Only files carry size and content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File { size: u64, link: Option<Link> },
    Directory,
    Symlink,
    BlockDevice,
    CharacterDevice,
    Fifo,
}

impl EntryKind {
    /// Payload for a type with nothing committed yet.
    pub fn empty(entry_type: EntryType) -> Self {
        match entry_type {
            EntryType::File => EntryKind::File { size: 0, link: None },
            EntryType::Directory => EntryKind::Directory,
            EntryType::Symlink => EntryKind::Symlink,
            EntryType::BlockDevice => EntryKind::BlockDevice,
            EntryType::CharacterDevice => EntryKind::CharacterDevice,
            EntryType::Fifo => EntryKind::Fifo,
        }
    }

    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryKind::File { .. } => EntryType::File,
            EntryKind::Directory => EntryType::Directory,
            EntryKind::Symlink => EntryType::Symlink,
            EntryKind::BlockDevice => EntryType::BlockDevice,
            EntryKind::CharacterDevice => EntryType::CharacterDevice,
            EntryKind::Fifo => EntryType::Fifo,
        }
    }
}

/// One committed record of the entry log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub mode: u32,
    pub kind: EntryKind,
}

impl Entry {
    pub fn entry_type(&self) -> EntryType {
        self.kind.entry_type()
    }

    /// Content length in bytes; always 0 for non-file entries.
    pub fn size(&self) -> u64 {
        match &self.kind {
            EntryKind::File { size, .. } => *size,
            _ => 0,
        }
    }

    pub fn link(&self) -> Option<&Link> {
        match &self.kind {
            EntryKind::File { link, .. } => link.as_ref(),
            _ => None,
        }
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, EntryKind::File { .. })
    }

    /// Encode into the protobuf wire record.
    pub fn encode(&self) -> Vec<u8> {
        let link = self.link().map(|l| LinkRecord {
            id: l.id.as_bytes().to_vec(),
            blocks: l.blocks,
            index: l.index.clone(),
        });
        let record = EntryRecord {
            name: self.name.clone(),
            r#type: self.entry_type().to_record() as i32,
            mode: self.mode,
            size: self.size(),
            link,
        };
        record.encode_to_vec()
    }

    /// Decode a wire record, rejecting records that break the entry invariants.
    pub fn decode(bytes: &[u8]) -> ArchiveResult<Self> {
        let record = EntryRecord::decode(bytes)?;

        let record_type = EntryTypeRecord::try_from(record.r#type)
            .map_err(|_| ArchiveError::Decode(format!("unknown entry type tag {}", record.r#type)))?;
        let entry_type = EntryType::from_record(record_type);

        if record.name.is_empty() {
            return Err(ArchiveError::Decode("entry has an empty name".into()));
        }

        let kind = match entry_type {
            EntryType::File => {
                let link = match record.link {
                    Some(l) => {
                        let id = FeedId::from_slice(&l.id).ok_or_else(|| {
                            ArchiveError::Decode(format!(
                                "link id must be {} bytes, got {}",
                                FeedId::LEN,
                                l.id.len()
                            ))
                        })?;
                        Some(Link {
                            id,
                            blocks: l.blocks,
                            index: l.index,
                        })
                    }
                    None => None,
                };
                EntryKind::File {
                    size: record.size,
                    link,
                }
            }
            other => {
                if record.link.is_some() || record.size != 0 {
                    return Err(ArchiveError::Decode(format!(
                        "{other} entry '{}' carries content",
                        record.name
                    )));
                }
                EntryKind::empty(other)
            }
        };

        Ok(Entry {
            name: record.name,
            mode: record.mode,
            kind,
        })
    }
}

/// Caller-supplied metadata for a new entry, before defaults are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMeta {
    pub name: String,
    pub entry_type: Option<EntryType>,
    pub mode: Option<u32>,
}

impl EntryMeta {
    pub fn new(name: impl Into<String>) -> Self {
        EntryMeta {
            name: name.into(),
            entry_type: None,
            mode: None,
        }
    }

    pub fn with_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn with_mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Resolve type and mode.
    ///
    /// A missing type is inferred from the mode bits (no mode at all means a
    /// file); a missing mode comes from `defaults` for the resolved type.
    pub fn normalize(self, defaults: &ModeDefaults) -> ArchiveResult<(String, EntryType, u32)> {
        if self.name.is_empty() {
            return Err(ArchiveError::Validation("entry name is required".into()));
        }
        let entry_type = match (self.entry_type, self.mode) {
            (Some(t), _) => t,
            (None, Some(mode)) => EntryType::from_mode(mode),
            (None, None) => EntryType::File,
        };
        let mode = self.mode.unwrap_or_else(|| defaults.for_type(entry_type));
        Ok((self.name, entry_type, mode))
    }
}

/// A bare name is shorthand for a file entry.
impl From<&str> for EntryMeta {
    fn from(name: &str) -> Self {
        EntryMeta::new(name).with_type(EntryType::File)
    }
}

impl From<String> for EntryMeta {
    fn from(name: String) -> Self {
        EntryMeta::new(name).with_type(EntryType::File)
    }
}
