//! HTTP transport for C8DB clusters
//!
//! Implements the plain request/response transport on top of the routing
//! core from `c8db-net`. Every connection shares one pooled
//! [`reqwest::Client`]; requests are one-shot, so there is no handshake, no
//! framing, and nothing to multiplex. Failover, soft redirects, and error
//! classification behave exactly as they do on the binary transport.
//!
//! # Example
//!
//! ```no_run
//! use c8db_http::HttpCommunication;
//! use c8db_net::{ClientConfig, Method, Request, Service};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig::new()
//!     .with_host("db0.example.com", 8529)
//!     .with_basic_auth("root", "secret");
//! let client = HttpCommunication::new(config).await?;
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

pub mod communication;
pub mod connection;

pub use communication::HttpCommunication;
pub use connection::{HttpConnection, HttpConnectionFactory};
