//! VelocyStream transport for C8DB clusters
//!
//! Implements the chunked binary protocol on top of the routing core from
//! `c8db-net`. One TCP (or TLS) stream carries any number of concurrent
//! requests: messages are split into fixed-header chunks, interleaved per
//! message id, and reassembled on receive. It includes:
//!
//! - The 28-byte little-endian chunk layout and a fail-closed reassembler
//! - [`VstConnection`], a multiplexing connection with a background reader
//!   and per-request response dispatch
//! - The `VST/1.1` hello and the credential handshake on open
//! - [`VstCommunication`], the failover-aware client front door
//!
//! # Example
//!
//! ```no_run
//! use c8db_net::{ClientConfig, Method, Request, Service};
//! use c8db_vst::VstCommunication;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new()
//!     .with_host("db0.example.com", 8529)
//!     .with_basic_auth("root", "secret");
//! let client = VstCommunication::new(config).await?;
//!
//! let request = Request::new("_system", Method::Get, "/_api/version");
//! let response = client.execute(&request, None, Service::Database).await?;
//! println!("status {}", response.code());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod chunk;
pub mod communication;
pub mod connection;
pub mod message;

pub use chunk::{CHUNK_HEADER_LEN, Chunk, ChunkHeader, NO_MESSAGE_LENGTH};
pub use communication::VstCommunication;
pub use connection::{PROTOCOL_PREAMBLE, VstConnection, VstConnectionFactory};
pub use message::{Message, MessageAssembler, next_message_id, split_message};
