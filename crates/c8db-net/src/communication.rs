//! Failover and redirect engine shared by all transports

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::handler::RoundRobinHostHandler;
use crate::host::{HostDescription, HostHandle};
use crate::request::Request;
use crate::resolver::{HostResolver, Service};
use crate::response::Response;

/// Routing core that turns a fallible single-host exchange into a
/// cluster-aware one.
///
/// The engine owns one [`RoundRobinHostHandler`] per service and drives the
/// retry loop: transport failures move to the next host until the failure
/// budget runs out, endpoint redirects are followed with an engine-internal
/// sticky handle, and application errors pass straight through. Transports
/// differ only in the [`Connection`](crate::connection::Connection)
/// implementations their factories produce.
pub struct Communication {
    handlers: HashMap<Service, RoundRobinHostHandler>,
    codec: Arc<dyn Codec>,
}

impl Communication {
    /// Build an engine routing for `services`, resolving each service's
    /// initial host set.
    pub async fn new(
        resolver: Arc<dyn HostResolver>,
        codec: Arc<dyn Codec>,
        services: &[Service],
    ) -> Result<Self> {
        let mut handlers = HashMap::new();
        for &service in services {
            let handler = RoundRobinHostHandler::new(Arc::clone(&resolver), service).await?;
            handlers.insert(service, handler);
        }
        Ok(Self { handlers, codec })
    }

    /// Execute `request` against `service`, retrying across hosts.
    ///
    /// A caller-supplied `handle` pins the exchange to its bound host while
    /// that host stays reachable; the binding is cleared on transport
    /// failure so the retry can move on. Redirects never touch the caller's
    /// handle: the engine follows them with its own handle bound to the
    /// hinted endpoint, and the hop chain stays bounded by the handler's
    /// failure budget because every hop counts as a failure.
    pub async fn execute(
        &self,
        request: &Request,
        handle: Option<&HostHandle>,
        service: Service,
    ) -> Result<Response> {
        let handler = self.handlers.get(&service).ok_or(Error::NoHostAvailable)?;
        let access_type = request.access_type();
        let mut sticky: Option<HostHandle> = None;
        let mut last_transport: Option<Error> = None;
        loop {
            let Some(host) = handler.get(sticky.as_ref().or(handle), access_type).await? else {
                return Err(match last_transport.take() {
                    Some(err) => err,
                    None => {
                        handler.reset();
                        Error::NoHostAvailable
                    }
                });
            };
            let connection = host.connection().await;
            let exchange: Result<Response> = async {
                if !connection.is_open() {
                    connection.open().await?;
                }
                connection.execute(request).await
            }
            .await;
            let response = match exchange {
                Ok(response) => response,
                Err(err) if err.is_transport() => {
                    warn!(
                        host = %host.description(),
                        error = %err,
                        "could not reach host, trying next"
                    );
                    handler.fail();
                    if let Some(active) = sticky.as_ref().or(handle) {
                        active.clear();
                    }
                    last_transport = Some(err);
                    continue;
                }
                Err(err) => return Err(err),
            };
            match response.check_error(self.codec.as_ref()) {
                Ok(()) => {
                    handler.success();
                    handler.confirm();
                    return Ok(response);
                }
                Err(Error::Redirect { location }) => {
                    debug!(
                        host = %host.description(),
                        location = %location,
                        "following endpoint redirect"
                    );
                    handler.close_current_on_error();
                    handler.fail();
                    sticky = Some(HostHandle::bound_to(HostDescription::parse(&location)?));
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Close every host set behind every service handler
    pub async fn close(&self) {
        for handler in self.handlers.values() {
            handler.close().await;
        }
    }
}
