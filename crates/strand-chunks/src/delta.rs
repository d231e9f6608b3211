//! Delta + varint packing for ordered offset lists.
//!
//! Each value is stored as the wrapping difference from its predecessor
//! (the first from zero), LEB128-encoded. Monotonic boundary lists pack to
//! roughly two bytes per entry; any list round-trips exactly.

use prost::encoding::{decode_varint, encode_varint};

use crate::error::ChunkError;

/// Pack an offset list.
pub fn pack(offsets: &[u64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(offsets.len() * 2);
    let mut prev = 0u64;
    for &value in offsets {
        encode_varint(value.wrapping_sub(prev), &mut buf);
        prev = value;
    }
    buf
}

/// Unpack an offset list produced by [`pack`].
pub fn unpack(packed: &[u8]) -> Result<Vec<u64>, ChunkError> {
    let total = packed.len();
    let mut rest = packed;
    let mut out = Vec::new();
    let mut prev = 0u64;

    while !rest.is_empty() {
        let position = total - rest.len();
        let delta = decode_varint(&mut rest).map_err(|_| ChunkError::MalformedDelta { position })?;
        prev = prev.wrapping_add(delta);
        out.push(prev);
    }
    Ok(out)
}
