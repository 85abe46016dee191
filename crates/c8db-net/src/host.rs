//! Host identity, per-host pooled state, and sticky host handles

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::pool::ConnectionPool;

/// Network identity of one cluster node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostDescription {
    host: String,
    port: u16,
}

impl HostDescription {
    /// Create a description from host name and port
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse an endpoint of the form `host:port`, with or without a scheme
    /// prefix and trailing path.
    ///
    /// Accepts the shapes the cluster emits in redirect hints and callers
    /// put in configuration: `db1:8529`, `https://db1:8529`,
    /// `vst://db1:8529/`.
    pub fn parse(endpoint: &str) -> Result<Self> {
        let trimmed = endpoint.trim();
        let without_scheme = trimmed
            .find("://")
            .map_or(trimmed, |at| &trimmed[at + 3..]);
        let authority = match without_scheme.find('/') {
            Some(at) => &without_scheme[..at],
            None => without_scheme,
        };
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_endpoint(endpoint))?;
        if host.is_empty() {
            return Err(Error::invalid_endpoint(endpoint));
        }
        let port = port
            .parse()
            .map_err(|_| Error::invalid_endpoint(endpoint))?;
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Host name or address
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port
    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// One endpoint plus its dedicated connection pool.
///
/// Created by a host resolver, destroyed when the resolver's host set is
/// closed. A transport that finds the host unusable despite the socket
/// connecting (a failed TLS handshake, say) marks it close-on-error, and the
/// stale pool is drained at the next acquisition.
pub struct Host {
    description: HostDescription,
    pool: ConnectionPool,
    close_on_error: AtomicBool,
}

impl Host {
    /// Pair a description with its pool
    pub fn new(description: HostDescription, pool: ConnectionPool) -> Self {
        Self {
            description,
            pool,
            close_on_error: AtomicBool::new(false),
        }
    }

    /// Network identity of this host
    pub fn description(&self) -> &HostDescription {
        &self.description
    }

    /// Next pooled connection, draining the pool first when the host was
    /// marked close-on-error
    pub async fn connection(&self) -> Arc<dyn Connection> {
        if self.close_on_error.swap(false, Ordering::AcqRel) {
            debug!(host = %self.description, "draining pool marked close-on-error");
            self.pool.close().await;
        }
        self.pool.connection()
    }

    /// Drop every pooled connection at the next acquisition
    pub fn mark_close_on_error(&self) {
        self.close_on_error.store(true, Ordering::Release);
    }

    /// Close the pool and every connection in it
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("description", &self.description)
            .field("pooled", &self.pool.active())
            .finish()
    }
}

/// Caller-supplied affinity token pinning a sequence of requests to one
/// resolved host.
///
/// Used so multi-step flows land on the node that served the first step.
/// The handler binds an unbound handle to whichever host it picks; the
/// engine clears the binding when that host fails, freeing the next pick.
#[derive(Debug, Default)]
pub struct HostHandle {
    bound: Mutex<Option<HostDescription>>,
}

impl HostHandle {
    /// Unbound handle; the first routed request binds it
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle already bound to a specific host
    pub fn bound_to(description: HostDescription) -> Self {
        Self {
            bound: Mutex::new(Some(description)),
        }
    }

    /// Currently bound host, if any
    pub fn bound(&self) -> Option<HostDescription> {
        self.bound.lock().clone()
    }

    /// Bind the handle to `description`
    pub fn bind(&self, description: HostDescription) {
        *self.bound.lock() = Some(description);
    }

    /// Drop the binding
    pub fn clear(&self) {
        *self.bound.lock() = None;
    }
}
