//! Round-robin host selection with a bounded failure budget

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::Result;
use crate::host::{Host, HostHandle};
use crate::request::AccessType;
use crate::resolver::{HostResolver, Service};

struct HandlerState {
    current: usize,
    fails: usize,
    last: Option<Arc<Host>>,
}

/// Stateful round-robin routing policy for one service.
///
/// Selection asks the resolver for the current host set on every call, so a
/// refreshing resolver feeds topology changes straight into rotation. The
/// failure budget equals the host-set size: a caller cycling `get`/`fail`
/// can never loop more times than there are distinct hosts before selection
/// returns `None`, which keeps failover finite when the whole cluster is
/// down.
pub struct RoundRobinHostHandler {
    resolver: Arc<dyn HostResolver>,
    service: Service,
    state: Mutex<HandlerState>,
}

impl RoundRobinHostHandler {
    /// Create a handler for `service`, performing initial host resolution
    pub async fn new(resolver: Arc<dyn HostResolver>, service: Service) -> Result<Self> {
        let hosts = resolver.resolve(service, true, false).await?;
        debug!(service = ?service, hosts = hosts.len(), "resolved initial host set");
        Ok(Self {
            resolver,
            service,
            state: Mutex::new(HandlerState {
                current: 0,
                fails: 0,
                last: None,
            }),
        })
    }

    /// Service this handler routes for
    pub fn service(&self) -> Service {
        self.service
    }

    /// Pick the next host, or `None` once consecutive failures reach the
    /// number of known hosts.
    ///
    /// A handle bound to a host still present in the set wins over the
    /// cursor; a handle bound to a departed host falls through to the cursor
    /// pick; an unbound handle is bound to the pick as a side effect. The
    /// access type is accepted for policies that route reads differently;
    /// this one rotates regardless.
    pub async fn get(
        &self,
        handle: Option<&HostHandle>,
        _access_type: AccessType,
    ) -> Result<Option<Arc<Host>>> {
        let hosts = self.resolver.resolve(self.service, false, false).await?;

        let mut state = self.state.lock();
        let size = hosts.len();
        if size == 0 || state.fails >= size {
            trace!(service = ?self.service, fails = state.fails, "failure budget exhausted");
            return Ok(None);
        }

        let index = state.current % size;
        state.current = state.current.wrapping_add(1);
        let mut selected = Arc::clone(&hosts.hosts()[index]);
        if let Some(handle) = handle {
            if let Some(bound) = handle.bound() {
                // Wrap-around scan from the cursor; a miss keeps the cursor pick
                for offset in 0..size {
                    let candidate = &hosts.hosts()[(index + offset) % size];
                    if *candidate.description() == bound {
                        selected = Arc::clone(candidate);
                        break;
                    }
                }
            } else {
                handle.bind(selected.description().clone());
            }
        }
        trace!(service = ?self.service, host = %selected.description(), "selected host");
        state.last = Some(Arc::clone(&selected));
        Ok(Some(selected))
    }

    /// Reset the failure counter after a successful exchange
    pub fn success(&self) {
        self.state.lock().fails = 0;
    }

    /// Record one failed host attempt; the rotation cursor is untouched
    pub fn fail(&self) {
        let mut state = self.state.lock();
        state.fails += 1;
        trace!(service = ?self.service, fails = state.fails, "host attempt failed");
    }

    /// Post-handshake acknowledgement hook; this policy needs none
    pub fn confirm(&self) {}

    /// Forget accumulated failures without requiring a success
    pub fn reset(&self) {
        self.state.lock().fails = 0;
    }

    /// Mark the most recently selected host to drop its pooled connections.
    ///
    /// Used when a transport finds the host unusable even though its socket
    /// still connects.
    pub fn close_current_on_error(&self) {
        let last = self.state.lock().last.clone();
        if let Some(host) = last {
            debug!(host = %host.description(), "marking host close-on-error");
            host.mark_close_on_error();
        }
    }

    /// Close the current host set
    pub async fn close(&self) {
        if let Ok(hosts) = self.resolver.resolve(self.service, false, false).await {
            hosts.close().await;
        }
    }
}
