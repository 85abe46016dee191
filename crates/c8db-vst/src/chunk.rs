//! Wire chunk layout
//!
//! Every frame on the stream is a fixed 28-byte little-endian header
//! followed by `content_length` payload bytes. Payload slices concatenated
//! in index order per message id reproduce the encoded message.

use std::io::Cursor;

use binrw::{BinRead, BinWrite};
use bytes::Bytes;
use c8db_net::{Error, Result};

/// Serialized size of [`ChunkHeader`]
pub const CHUNK_HEADER_LEN: usize = 28;

/// `message_length` value for chunks that do not announce a total size
pub const NO_MESSAGE_LENGTH: i64 = -1;

/// Fixed prefix of every chunk on the wire
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(little)]
pub struct ChunkHeader {
    /// Message this chunk belongs to
    pub message_id: u64,
    /// Zero-based position within the message
    pub chunk_index: u32,
    /// Total number of chunks carrying the message
    pub chunk_count: u32,
    /// Total message byte length, announced only on chunk 0 of a
    /// multi-chunk message; [`NO_MESSAGE_LENGTH`] otherwise
    pub message_length: i64,
    /// Number of payload bytes following this header
    pub content_length: u32,
}

impl ChunkHeader {
    /// Parse a header from its serialized form
    pub fn decode(buf: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(buf);
        Self::read(&mut cursor).map_err(|err| Error::framing(err.to_string()))
    }
}

/// One frame: header plus the payload slice it announces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Wire header
    pub header: ChunkHeader,
    /// Payload carried by this chunk
    pub payload: Bytes,
}

impl Chunk {
    /// Serialize header and payload into one contiguous buffer
    pub fn encode(&self) -> Result<Bytes> {
        let mut cursor = Cursor::new(Vec::with_capacity(CHUNK_HEADER_LEN + self.payload.len()));
        self.header
            .write(&mut cursor)
            .map_err(|err| Error::framing(err.to_string()))?;
        let mut buf = cursor.into_inner();
        buf.extend_from_slice(&self.payload);
        Ok(Bytes::from(buf))
    }
}
