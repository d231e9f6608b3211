//! Error types for chunking and index decoding.

#[derive(Debug, thiserror::Error)]
pub enum ChunkError {
    /// A packed offset list ended inside a varint.
    #[error("malformed packed offsets at byte {position}")]
    MalformedDelta { position: usize },

    /// An index page decoded to no values at all.
    #[error("index page is empty")]
    EmptyIndexPage,

    /// Chunk sizes outside what FastCDC accepts.
    #[error("invalid chunk sizes: {0}")]
    InvalidSizes(String),
}
