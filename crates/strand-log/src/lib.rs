//! strand-log: append-only block feeds
//!
//! A feed is an ordered sequence of blocks. Writable feeds are appended to
//! and then finalized, which fixes their content address (`FeedId`). Remote
//! feeds are opened by id, may be only partially present locally, and are
//! filled in block by block through `Feed::put`.
//!
//! Storage layout (OpenDAL, under a configurable prefix):
//!
//! ```text
//!   {prefix}/blocks/{blake3 hex}   block bytes, shared across feeds
//!   {prefix}/feeds/{feed id hex}   JSON feed tree (ordered block hashes)
//! ```

pub mod error;
pub mod events;
pub mod feed;
pub mod registry;
pub mod tree;

pub use error::{LogError, LogResult};
pub use events::{BlockEvent, Subscription};
pub use feed::{Feed, FeedOptions, Want, WantRequest};
pub use registry::Core;
pub use tree::FeedTree;
