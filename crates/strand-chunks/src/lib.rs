//! strand-chunks: content-defined chunking, BLAKE3 hashing, and packed chunk indexes
//!
//! # Overview
//! - `blake3`: block hashing and feed content addresses
//! - `fastcdc`: content-defined chunking, whole-buffer and incremental
//! - `delta`: delta + varint packing of offset lists
//! - `index`: two-level paged boundary index stored at the tail of a content feed

pub mod blake3;
pub mod delta;
pub mod error;
pub mod fastcdc;
pub mod index;

// Convenience re-exports for the most common operations
pub use blake3::{feed_root, hash_bytes, hash_from_hex, hash_to_hex, Hash};
pub use error::ChunkError;
pub use fastcdc::{chunk_data, Chunk, ChunkSizes, StreamChunker};
pub use index::{page_for_offset, ChunkSpan, IndexPage, PagedIndex};
