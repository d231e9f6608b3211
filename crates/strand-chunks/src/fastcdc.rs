//! FastCDC content-defined chunking
//!
//! Splits byte streams into variable-size chunks whose boundaries are
//! content-defined, so identical input always yields identical boundaries
//! (and therefore identical block hashes and feed addresses).
//!
//! Two entry points:
//!   - `chunk_data`: whole buffer in memory
//!   - `StreamChunker`: incremental, fed piecewise by a writer; produces the
//!     exact same boundaries as `chunk_data` over the concatenated input
//!
//! Default sizes: min 2KB, avg 4KB, max 16KB (see `ChunkingConfig`).

use bytes::Bytes;
use strand_core::config::ChunkingConfig;

use crate::error::ChunkError;

// Bounds enforced by fastcdc::v2020 (it panics outside them)
const MINIMUM_MIN: u32 = 64;
const MAXIMUM_MIN: u32 = 1_048_576;
const MINIMUM_AVG: u32 = 256;
const MAXIMUM_AVG: u32 = 4_194_304;
const MINIMUM_MAX: u32 = 1024;
const MAXIMUM_MAX: u32 = 16_777_216;

/// A single content-defined chunk
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the source
    pub offset: u64,
    /// Chunk length in bytes
    pub length: usize,
    /// BLAKE3 hash of this chunk's data
    pub hash: crate::blake3::Hash,
}

/// Chunk size configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSizes {
    pub min_size: u32,
    pub avg_size: u32,
    pub max_size: u32,
}

impl ChunkSizes {
    /// Default for most files (small-file optimized)
    pub const SMALL: ChunkSizes = ChunkSizes {
        min_size: 2 * 1024,  // 2KB
        avg_size: 4 * 1024,  // 4KB
        max_size: 16 * 1024, // 16KB
    };

    /// Check the sizes against the FastCDC bounds and ordering.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if !(MINIMUM_MIN..=MAXIMUM_MIN).contains(&self.min_size)
            || !(MINIMUM_AVG..=MAXIMUM_AVG).contains(&self.avg_size)
            || !(MINIMUM_MAX..=MAXIMUM_MAX).contains(&self.max_size)
        {
            return Err(ChunkError::InvalidSizes(format!(
                "min {} / avg {} / max {} outside FastCDC bounds",
                self.min_size, self.avg_size, self.max_size
            )));
        }
        if !(self.min_size <= self.avg_size && self.avg_size <= self.max_size) {
            return Err(ChunkError::InvalidSizes(format!(
                "expected min <= avg <= max, got {} / {} / {}",
                self.min_size, self.avg_size, self.max_size
            )));
        }
        Ok(())
    }
}

impl From<&ChunkingConfig> for ChunkSizes {
    fn from(cfg: &ChunkingConfig) -> Self {
        ChunkSizes {
            min_size: cfg.min_size,
            avg_size: cfg.avg_size,
            max_size: cfg.max_size,
        }
    }
}

impl Default for ChunkSizes {
    fn default() -> Self {
        Self::SMALL
    }
}

/// Split `data` into content-defined chunks using FastCDC.
///
/// Returns a list of chunks. For empty data, returns an empty list.
pub fn chunk_data(data: &[u8], sizes: ChunkSizes) -> Vec<Chunk> {
    if data.is_empty() {
        return vec![];
    }

    let chunker =
        fastcdc::v2020::FastCDC::new(data, sizes.min_size, sizes.avg_size, sizes.max_size);

    chunker
        .map(|c| {
            let chunk_data = &data[c.offset..c.offset + c.length];
            Chunk {
                offset: c.offset as u64,
                length: c.length,
                hash: crate::blake3::hash_bytes(chunk_data),
            }
        })
        .collect()
}

/// Incremental chunker for data that arrives in pieces.
///
/// A boundary is only emitted once at least `max_size` bytes are buffered
/// past the previous one; FastCDC never looks further than `max_size` bytes
/// ahead, so every cut matches what `chunk_data` would produce.
pub struct StreamChunker {
    sizes: ChunkSizes,
    buf: Vec<u8>,
}

impl StreamChunker {
    pub fn new(sizes: ChunkSizes) -> Self {
        StreamChunker {
            sizes,
            buf: Vec::with_capacity(sizes.max_size as usize * 2),
        }
    }

    /// Feed more bytes; returns every chunk whose boundary is now settled.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(data);

        let max = self.sizes.max_size as usize;
        let mut out = Vec::new();
        let mut consumed = 0usize;

        while self.buf.len() - consumed >= max {
            let window = &self.buf[consumed..consumed + max];
            let cut = fastcdc::v2020::FastCDC::new(
                window,
                self.sizes.min_size,
                self.sizes.avg_size,
                self.sizes.max_size,
            )
            .next()
            .map(|c| c.length)
            .unwrap_or(max);

            out.push(Bytes::copy_from_slice(&self.buf[consumed..consumed + cut]));
            consumed += cut;
        }

        if consumed > 0 {
            self.buf.drain(..consumed);
        }
        out
    }

    /// Flush the buffered tail at end of input.
    pub fn finish(self) -> Vec<Bytes> {
        let tail = self.buf;
        chunk_data(&tail, self.sizes)
            .into_iter()
            .map(|c| Bytes::copy_from_slice(&tail[c.offset as usize..c.offset as usize + c.length]))
            .collect()
    }

    /// Bytes held back waiting for a settled boundary.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pseudo_random(size: usize) -> Vec<u8> {
        (0..size as u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 24) as u8)
            .collect()
    }

    fn stream_all(data: &[u8], piece: usize, sizes: ChunkSizes) -> Vec<Bytes> {
        let mut chunker = StreamChunker::new(sizes);
        let mut out = Vec::new();
        for part in data.chunks(piece.max(1)) {
            out.extend(chunker.push(part));
        }
        out.extend(chunker.finish());
        out
    }

    #[test]
    fn empty_data_yields_no_chunks() {
        let chunks = chunk_data(&[], ChunkSizes::SMALL);
        assert!(chunks.is_empty());
        assert!(StreamChunker::new(ChunkSizes::SMALL).finish().is_empty());
    }

    #[test]
    fn small_input_is_a_single_chunk() {
        let chunks = stream_all(b"hello, world!", 4, ChunkSizes::SMALL);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].as_ref(), b"hello, world!");
    }

    #[test]
    fn chunk_offsets_are_contiguous() {
        let data: Vec<u8> = (0u8..=255).cycle().take(128 * 1024).collect();
        let chunks = chunk_data(&data, ChunkSizes::SMALL);

        let mut expected_offset = 0u64;
        for chunk in &chunks {
            assert_eq!(chunk.offset, expected_offset, "chunks must be contiguous");
            expected_offset += chunk.length as u64;
        }
        assert_eq!(expected_offset as usize, data.len());
    }

    #[test]
    fn stream_matches_whole_buffer() {
        let data = pseudo_random(300_000);
        let whole: Vec<usize> = chunk_data(&data, ChunkSizes::SMALL)
            .iter()
            .map(|c| c.length)
            .collect();

        for piece in [1usize, 7, 1000, 4096, 16 * 1024, 100_000] {
            let streamed: Vec<usize> = stream_all(&data, piece, ChunkSizes::SMALL)
                .iter()
                .map(|c| c.len())
                .collect();
            assert_eq!(streamed, whole, "piece size {piece} changed boundaries");
        }
    }

    #[test]
    fn stream_holds_back_less_than_max() {
        let mut chunker = StreamChunker::new(ChunkSizes::SMALL);
        let emitted: usize = chunker.push(&pseudo_random(100_000)).iter().map(|c| c.len()).sum();
        assert!(chunker.buffered() < ChunkSizes::SMALL.max_size as usize);
        assert_eq!(emitted + chunker.buffered(), 100_000);
    }

    #[test]
    fn validate_rejects_out_of_range_sizes() {
        assert!(ChunkSizes::SMALL.validate().is_ok());
        let tiny = ChunkSizes { min_size: 8, avg_size: 16, max_size: 32 };
        assert!(tiny.validate().is_err());
        let inverted = ChunkSizes { min_size: 8192, avg_size: 4096, max_size: 16384 };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn sizes_from_config() {
        let sizes = ChunkSizes::from(&ChunkingConfig::default());
        assert_eq!(sizes, ChunkSizes::SMALL);
    }

    proptest! {
        /// FastCDC boundary stability: same input → same chunk boundaries
        #[test]
        fn chunking_is_deterministic(data in proptest::collection::vec(any::<u8>(), 0..=32768)) {
            let c1 = chunk_data(&data, ChunkSizes::SMALL);
            let c2 = chunk_data(&data, ChunkSizes::SMALL);
            prop_assert_eq!(c1.len(), c2.len(), "chunk count must be deterministic");
            for (a, b) in c1.iter().zip(c2.iter()) {
                prop_assert_eq!(a.offset, b.offset);
                prop_assert_eq!(a.length, b.length);
                prop_assert_eq!(a.hash, b.hash, "chunk hash must be deterministic");
            }
        }

        /// Streamed chunks concatenate back to the input
        #[test]
        fn stream_chunks_cover_full_input(
            data in proptest::collection::vec(any::<u8>(), 0..=65536),
            piece in 1usize..=20000,
        ) {
            let chunks = stream_all(&data, piece, ChunkSizes::SMALL);
            let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
            prop_assert_eq!(joined, data);
        }
    }
}
