//! strand-archive: sparse, content-addressed archives
//!
//! An archive is an entry log (one encoded `Entry` per block) plus one
//! content feed per committed file. A file's content feed holds its
//! FastCDC chunks followed by the pages of its chunk index; the entry's
//! `Link` names the feed and carries the root of that index.
//!
//! # Modules
//! - `archive`: entry log access, append, finalize, notifications
//! - `append`: the file byte sink (`FileWriter`)
//! - `select`: opening content feeds and declaring wants
//! - `stream`: lazy entry and content block streams
//! - `cursor`: byte-offset random access through the paged index
//! - `drive`: archives keyed by id

pub mod append;
pub mod archive;
pub mod cursor;
pub mod drive;
pub mod events;
pub mod select;
pub mod stream;

pub use append::{Appended, FileWriter};
pub use archive::{Archive, ArchiveSettings};
pub use cursor::FileCursor;
pub use drive::Drive;
pub use events::ArchiveEvent;
pub use select::ContentFeed;

pub use strand_core::{ArchiveError, ArchiveResult, Entry, EntryKind, EntryMeta, EntryType, FeedId, Link};
