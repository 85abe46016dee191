//! Transport-polymorphic connection seam

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::host::HostDescription;
use crate::request::Request;
use crate::response::Response;

/// One transport-level connection to one host.
///
/// The routing layer treats connections uniformly: open them lazily, execute
/// one request at a time from its point of view, and close them when a host
/// goes away. Implementations decide how concurrent `execute` calls share
/// the underlying socket; callers may hold one connection from several tasks
/// at once.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Whether the connection is currently usable
    fn is_open(&self) -> bool;

    /// Connect and, when credentials are configured, authenticate.
    ///
    /// Idempotent; a second call on an open connection returns immediately.
    async fn open(&self) -> Result<()>;

    /// Execute one request and wait for its response
    async fn execute(&self, request: &Request) -> Result<Response>;

    /// Tear the connection down.
    ///
    /// In-flight requests complete with a transport error.
    async fn close(&self);
}

/// Builds unopened connections for a host.
///
/// Creation does no I/O; timeouts, TLS material, and credentials are
/// captured when the factory itself is built.
pub trait ConnectionFactory: Send + Sync {
    /// Build a connection bound to `host`
    fn create(&self, host: &HostDescription) -> Arc<dyn Connection>;
}
