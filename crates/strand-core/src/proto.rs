//! Protobuf records as they appear in the entry log.
//!
//! Field numbers are part of the on-disk format and must never be reused.

/// Entry type as stored on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EntryTypeRecord {
    File = 0,
    Directory = 1,
    Symlink = 2,
    BlockDevice = 3,
    CharacterDevice = 4,
    Fifo = 5,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LinkRecord {
    /// Content address of the content feed (32 bytes)
    #[prost(bytes = "vec", tag = "1")]
    pub id: Vec<u8>,
    /// Total blocks in the content feed, index blocks included
    #[prost(uint64, tag = "2")]
    pub blocks: u64,
    /// Packed page-start offsets, one per trailing index block
    #[prost(bytes = "vec", tag = "3")]
    pub index: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntryRecord {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(enumeration = "EntryTypeRecord", tag = "2")]
    pub r#type: i32,
    #[prost(uint32, tag = "3")]
    pub mode: u32,
    #[prost(uint64, tag = "4")]
    pub size: u64,
    #[prost(message, optional, tag = "5")]
    pub link: Option<LinkRecord>,
}
