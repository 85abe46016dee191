//! Message framing: splitting into chunks and reassembly
//!
//! A message is the unit of exchange, one request or one response. On the
//! wire it travels as one or more chunks; the assembler on the receive side
//! rebuilds messages and refuses anything out of sequence rather than
//! handing back truncated data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Bytes, BytesMut};
use c8db_net::{Error, Result};

use crate::chunk::{Chunk, ChunkHeader, NO_MESSAGE_LENGTH};

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-wide unique message id
pub fn next_message_id() -> u64 {
    NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Encoded head plus optional opaque body, addressed by message id
#[derive(Debug, Clone)]
pub struct Message {
    id: u64,
    head: Bytes,
    body: Option<Bytes>,
}

impl Message {
    /// Assemble a message from already-encoded parts
    pub fn new(id: u64, head: Bytes, body: Option<Bytes>) -> Self {
        Self { id, head, body }
    }

    /// Message id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Encoded head
    pub fn head(&self) -> &Bytes {
        &self.head
    }

    /// Opaque body, if any
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Combined head and body byte length
    pub fn total_len(&self) -> usize {
        self.head.len() + self.body.as_ref().map_or(0, Bytes::len)
    }
}

/// Split a message into ordered chunks of at most `chunk_size` payload
/// bytes.
///
/// Payload slices borrow from one contiguous buffer, so no message bytes
/// are copied more than once regardless of chunk count. Chunk 0 announces
/// the total length only when more chunks follow.
pub fn split_message(message: &Message, chunk_size: usize) -> Result<Vec<Chunk>> {
    if chunk_size == 0 {
        return Err(Error::framing("chunk size must be positive"));
    }
    let mut content = BytesMut::with_capacity(message.total_len());
    content.extend_from_slice(message.head());
    if let Some(body) = message.body() {
        content.extend_from_slice(body);
    }
    let content = content.freeze();
    let total = content.len();

    let chunk_count = total.div_ceil(chunk_size).max(1);
    let announced = i64::try_from(total)
        .map_err(|_| Error::framing("message length exceeds wire limit"))?;
    let count = u32::try_from(chunk_count)
        .map_err(|_| Error::framing("chunk count exceeds wire limit"))?;

    let mut chunks = Vec::with_capacity(chunk_count);
    for index in 0..chunk_count {
        let offset = index * chunk_size;
        let len = chunk_size.min(total - offset);
        let payload = content.slice(offset..offset + len);
        let message_length = if index == 0 && chunk_count > 1 {
            announced
        } else {
            NO_MESSAGE_LENGTH
        };
        chunks.push(Chunk {
            header: ChunkHeader {
                message_id: message.id(),
                chunk_index: u32::try_from(index)
                    .map_err(|_| Error::framing("chunk index exceeds wire limit"))?,
                chunk_count: count,
                message_length,
                content_length: u32::try_from(len)
                    .map_err(|_| Error::framing("chunk payload exceeds wire limit"))?,
            },
            payload,
        });
    }
    Ok(chunks)
}

struct PartialMessage {
    chunk_count: u32,
    announced: i64,
    next_index: u32,
    content: BytesMut,
}

/// Rebuilds messages from chunks arriving in index order per message id.
///
/// Chunks of different messages may interleave freely; within one message
/// id the sequence must start at index 0 and stay contiguous. Every
/// violation fails with [`Error::Framing`] so a corrupted stream can never
/// produce a truncated message.
#[derive(Default)]
pub struct MessageAssembler {
    partial: HashMap<u64, PartialMessage>,
}

impl MessageAssembler {
    /// Feed one chunk; returns the completed `(message_id, content)` pair
    /// once the final chunk of a message arrives.
    pub fn push(&mut self, chunk: Chunk) -> Result<Option<(u64, Bytes)>> {
        let header = chunk.header;
        let id = header.message_id;
        if chunk.payload.len() != header.content_length as usize {
            return Err(Error::framing(format!(
                "chunk for message {id} carries {} bytes but announces {}",
                chunk.payload.len(),
                header.content_length
            )));
        }

        if header.chunk_index == 0 {
            if self.partial.contains_key(&id) {
                return Err(Error::framing(format!(
                    "duplicate first chunk for message {id}"
                )));
            }
            if header.chunk_count == 0 {
                return Err(Error::framing(format!(
                    "message {id} announces zero chunks"
                )));
            }
            if header.chunk_count == 1 {
                if header.message_length != NO_MESSAGE_LENGTH {
                    return Err(Error::framing(format!(
                        "single-chunk message {id} announces a total length"
                    )));
                }
                return Ok(Some((id, chunk.payload)));
            }
            if header.message_length < 0 {
                return Err(Error::framing(format!(
                    "multi-chunk message {id} announces no total length"
                )));
            }
            let capacity = usize::try_from(header.message_length)
                .map_err(|_| Error::framing("announced length exceeds address space"))?;
            let mut content = BytesMut::with_capacity(capacity);
            content.extend_from_slice(&chunk.payload);
            self.partial.insert(
                id,
                PartialMessage {
                    chunk_count: header.chunk_count,
                    announced: header.message_length,
                    next_index: 1,
                    content,
                },
            );
            return Ok(None);
        }

        let Some(partial) = self.partial.get_mut(&id) else {
            return Err(Error::framing(format!(
                "chunk {} for unknown message {id}",
                header.chunk_index
            )));
        };
        if header.chunk_count != partial.chunk_count {
            self.partial.remove(&id);
            return Err(Error::framing(format!(
                "message {id} changed chunk count mid-stream"
            )));
        }
        if header.chunk_index != partial.next_index {
            let expected = partial.next_index;
            self.partial.remove(&id);
            return Err(Error::framing(format!(
                "message {id} skipped from chunk {} to {}",
                expected - 1,
                header.chunk_index
            )));
        }
        if header.message_length != NO_MESSAGE_LENGTH {
            self.partial.remove(&id);
            return Err(Error::framing(format!(
                "non-first chunk of message {id} announces a total length"
            )));
        }

        partial.content.extend_from_slice(&chunk.payload);
        partial.next_index += 1;
        if partial.next_index < partial.chunk_count {
            return Ok(None);
        }

        let partial = self
            .partial
            .remove(&id)
            .ok_or_else(|| Error::framing(format!("message {id} vanished mid-assembly")))?;
        let received = i64::try_from(partial.content.len())
            .map_err(|_| Error::framing("assembled length exceeds wire limit"))?;
        if received != partial.announced {
            return Err(Error::framing(format!(
                "message {id} assembled {received} bytes but announced {}",
                partial.announced
            )));
        }
        Ok(Some((id, partial.content.freeze())))
    }

    /// Number of messages still missing chunks
    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}
