//! Connection and failover core for C8DB clusters
//!
//! This crate carries everything the transports share: the logical
//! request/response model, the error taxonomy, host resolution and
//! round-robin selection with a bounded failure budget, per-host
//! connection pools, and the retry/redirect engine. It includes:
//!
//! - Typed errors separating transport faults (retried) from redirects
//!   (followed) and application errors (surfaced)
//! - Static and discovering host resolvers with a stale-cache fallback
//! - Sticky host affinity through [`HostHandle`]
//! - A codec seam so the wire encoding can change without touching routing
//!
//! Concrete transports live in the companion crates and plug in through
//! [`Connection`] and [`ConnectionFactory`].
//!
//! # Example
//!
//! ```
//! use c8db_net::{AccessType, Method, Request};
//!
//! let request = Request::new("_system", Method::Get, "/_api/version")
//!     .with_query_param("details", Some(true))
//!     .with_allow_dirty_read(true);
//!
//! assert_eq!(request.access_type(), AccessType::DirtyRead);
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod communication;
pub mod config;
pub mod connection;
pub mod error;
pub mod handler;
pub mod host;
pub mod pool;
pub mod request;
pub mod resolver;
pub mod response;

pub use codec::{Codec, JsonCodec};
pub use communication::Communication;
pub use config::{ClientConfig, Credentials};
pub use connection::{Connection, ConnectionFactory};
pub use error::{Error, ErrorPayload, Result};
pub use handler::RoundRobinHostHandler;
pub use host::{Host, HostDescription, HostHandle};
pub use pool::ConnectionPool;
pub use request::{AccessType, Method, Request};
pub use resolver::{
    DiscoveryHostResolver, EndpointLoader, HostResolver, HostSet, Service, SimpleHostResolver,
};
pub use response::Response;
