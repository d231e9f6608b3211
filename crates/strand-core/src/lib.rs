pub mod config;
pub mod error;
pub mod types;

pub use error::{ArchiveError, ArchiveResult};
pub use types::{Entry, EntryKind, EntryMeta, EntryType, FeedId, Link};

/// Wire records for entries stored in an archive's entry log
pub mod proto;
