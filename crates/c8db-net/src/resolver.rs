//! Host discovery and host-set lifecycle

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::connection::ConnectionFactory;
use crate::error::{Error, Result};
use crate::host::{Host, HostDescription};
use crate::pool::ConnectionPool;

/// Logical service a request targets.
///
/// Each service resolves its own host set and is routed by its own handler,
/// so the streams side channel never contends with database traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Core database API
    Database,
    /// Streams side channel
    Streams,
}

/// Ordered set of hosts for one service
pub struct HostSet {
    hosts: Vec<Arc<Host>>,
}

impl HostSet {
    /// Build a set from already-constructed hosts
    pub fn new(hosts: Vec<Arc<Host>>) -> Self {
        Self { hosts }
    }

    /// Build a set from resolved descriptions, giving each host its own pool
    pub fn from_descriptions(
        descriptions: Vec<HostDescription>,
        max_connections: usize,
        factory: &Arc<dyn ConnectionFactory>,
    ) -> Self {
        let hosts = descriptions
            .into_iter()
            .map(|description| {
                let pool = ConnectionPool::new(
                    description.clone(),
                    max_connections,
                    Arc::clone(factory),
                );
                Arc::new(Host::new(description, pool))
            })
            .collect();
        Self { hosts }
    }

    /// Hosts in resolution order
    pub fn hosts(&self) -> &[Arc<Host>] {
        &self.hosts
    }

    /// Number of hosts in the set
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the set holds no hosts
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Close every host's pool
    pub async fn close(&self) {
        for host in &self.hosts {
            host.close().await;
        }
    }
}

/// Produces the current host set for a logical service.
///
/// Owns host-set lifecycle: hosts come into being at resolve time and die
/// when the resolver is closed.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Current host set for `service`.
    ///
    /// `initial` forces discovery; afterwards the cached set is returned.
    /// `close_connections` additionally tears down every pooled connection
    /// before the set is handed out, for when credentials or TLS material
    /// changed underneath the pools.
    async fn resolve(
        &self,
        service: Service,
        initial: bool,
        close_connections: bool,
    ) -> Result<Arc<HostSet>>;

    /// Close every host set this resolver produced
    async fn close(&self);
}

/// Resolver over fixed, configuration-supplied host lists
pub struct SimpleHostResolver {
    sets: HashMap<Service, Arc<HostSet>>,
}

impl SimpleHostResolver {
    /// Build per-service host sets from static endpoint lists
    pub fn new(
        endpoints: HashMap<Service, Vec<HostDescription>>,
        max_connections: usize,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        let sets = endpoints
            .into_iter()
            .map(|(service, descriptions)| {
                let set = HostSet::from_descriptions(descriptions, max_connections, &factory);
                (service, Arc::new(set))
            })
            .collect();
        Self { sets }
    }
}

#[async_trait]
impl HostResolver for SimpleHostResolver {
    async fn resolve(
        &self,
        service: Service,
        _initial: bool,
        close_connections: bool,
    ) -> Result<Arc<HostSet>> {
        let set = self
            .sets
            .get(&service)
            .cloned()
            .ok_or(Error::NoHostAvailable)?;
        if close_connections {
            set.close().await;
        }
        Ok(set)
    }

    async fn close(&self) {
        for set in self.sets.values() {
            set.close().await;
        }
    }
}

/// Fetches the live endpoint list for a service, typically from a cluster
/// endpoints API
#[async_trait]
pub trait EndpointLoader: Send + Sync {
    /// Load the advertised endpoints for `service`
    async fn load(&self, service: Service) -> Result<Vec<HostDescription>>;
}

/// Resolver that discovers hosts through an [`EndpointLoader`] and caches
/// the result per service.
///
/// A discovery failure falls back to the last known set; only a failure
/// with no prior set propagates. A flapping discovery endpoint therefore
/// cannot take down live traffic.
pub struct DiscoveryHostResolver {
    loader: Arc<dyn EndpointLoader>,
    factory: Arc<dyn ConnectionFactory>,
    max_connections: usize,
    cached: Mutex<HashMap<Service, Arc<HostSet>>>,
}

impl DiscoveryHostResolver {
    /// Create a resolver over `loader`
    pub fn new(
        loader: Arc<dyn EndpointLoader>,
        factory: Arc<dyn ConnectionFactory>,
        max_connections: usize,
    ) -> Self {
        Self {
            loader,
            factory,
            max_connections,
            cached: Mutex::new(HashMap::new()),
        }
    }

    async fn rediscover(&self, service: Service) -> Result<Arc<HostSet>> {
        let descriptions = self.loader.load(service).await?;
        if descriptions.is_empty() {
            return Err(Error::NoHostAvailable);
        }
        debug!(service = ?service, hosts = descriptions.len(), "discovered endpoints");
        let set = Arc::new(HostSet::from_descriptions(
            descriptions,
            self.max_connections,
            &self.factory,
        ));
        let previous = self.cached.lock().insert(service, Arc::clone(&set));
        if let Some(previous) = previous {
            previous.close().await;
        }
        Ok(set)
    }
}

#[async_trait]
impl HostResolver for DiscoveryHostResolver {
    async fn resolve(
        &self,
        service: Service,
        initial: bool,
        close_connections: bool,
    ) -> Result<Arc<HostSet>> {
        let cached = self.cached.lock().get(&service).cloned();
        if close_connections {
            if let Some(set) = &cached {
                set.close().await;
            }
        }
        if let Some(set) = &cached {
            if !initial && !close_connections {
                return Ok(Arc::clone(set));
            }
        }
        match (self.rediscover(service).await, cached) {
            (Ok(set), _) => Ok(set),
            (Err(err), Some(stale)) => {
                warn!(
                    service = ?service,
                    error = %err,
                    "endpoint discovery failed, keeping cached host set"
                );
                Ok(stale)
            }
            (Err(err), None) => Err(err),
        }
    }

    async fn close(&self) {
        let sets: Vec<Arc<HostSet>> = self.cached.lock().drain().map(|(_, set)| set).collect();
        for set in sets {
            set.close().await;
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::connection::Connection;
    use crate::request::Request;
    use crate::response::Response;

    struct NullConnection;

    #[async_trait]
    impl Connection for NullConnection {
        fn is_open(&self) -> bool {
            true
        }

        async fn open(&self) -> Result<()> {
            Ok(())
        }

        async fn execute(&self, _request: &Request) -> Result<Response> {
            Ok(Response::new(200))
        }

        async fn close(&self) {}
    }

    #[derive(Default)]
    struct CountingFactory {
        created: AtomicUsize,
    }

    impl ConnectionFactory for CountingFactory {
        fn create(&self, _host: &HostDescription) -> Arc<dyn Connection> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::new(NullConnection)
        }
    }

    fn endpoints() -> HashMap<Service, Vec<HostDescription>> {
        HashMap::from([(
            Service::Database,
            vec![
                HostDescription::new("db0", 8529),
                HostDescription::new("db1", 8529),
            ],
        )])
    }

    #[tokio::test]
    async fn test_simple_resolver_is_idempotent() {
        let resolver =
            SimpleHostResolver::new(endpoints(), 1, Arc::new(CountingFactory::default()));
        let first = resolver.resolve(Service::Database, true, false).await.unwrap();
        let second = resolver.resolve(Service::Database, false, false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_simple_resolver_unknown_service() {
        let resolver =
            SimpleHostResolver::new(endpoints(), 1, Arc::new(CountingFactory::default()));
        assert!(matches!(
            resolver.resolve(Service::Streams, true, false).await,
            Err(Error::NoHostAvailable)
        ));
    }

    #[tokio::test]
    async fn test_close_connections_drains_pools() {
        let factory = Arc::new(CountingFactory::default());
        let resolver = SimpleHostResolver::new(
            endpoints(),
            1,
            Arc::clone(&factory) as Arc<dyn ConnectionFactory>,
        );
        let set = resolver.resolve(Service::Database, true, false).await.unwrap();
        let _ = set.hosts()[0].connection().await;
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);

        let set = resolver.resolve(Service::Database, false, true).await.unwrap();
        let _ = set.hosts()[0].connection().await;
        assert_eq!(factory.created.load(Ordering::SeqCst), 2);
    }

    struct ScriptedLoader {
        responses: Mutex<VecDeque<Result<Vec<HostDescription>>>>,
        calls: AtomicUsize,
    }

    impl ScriptedLoader {
        fn new(responses: Vec<Result<Vec<HostDescription>>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EndpointLoader for ScriptedLoader {
        async fn load(&self, _service: Service) -> Result<Vec<HostDescription>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(Error::NoHostAvailable))
        }
    }

    fn refused() -> Error {
        Error::transport(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "discovery endpoint down",
        ))
    }

    #[tokio::test]
    async fn test_discovery_caches_between_resolves() {
        let loader = Arc::new(ScriptedLoader::new(vec![Ok(vec![HostDescription::new(
            "db0", 8529,
        )])]));
        let resolver = DiscoveryHostResolver::new(
            Arc::clone(&loader) as Arc<dyn EndpointLoader>,
            Arc::new(CountingFactory::default()),
            1,
        );

        let first = resolver.resolve(Service::Database, true, false).await.unwrap();
        let second = resolver.resolve(Service::Database, false, false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_discovery_failure_prefers_stale_set() {
        let loader = Arc::new(ScriptedLoader::new(vec![
            Ok(vec![HostDescription::new("db0", 8529)]),
            Err(refused()),
        ]));
        let resolver = DiscoveryHostResolver::new(
            Arc::clone(&loader) as Arc<dyn EndpointLoader>,
            Arc::new(CountingFactory::default()),
            1,
        );

        let first = resolver.resolve(Service::Database, true, false).await.unwrap();
        let stale = resolver.resolve(Service::Database, true, false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &stale));
        assert_eq!(loader.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_discovery_failure_without_prior_set_propagates() {
        let loader = Arc::new(ScriptedLoader::new(vec![Err(refused())]));
        let resolver = DiscoveryHostResolver::new(
            loader as Arc<dyn EndpointLoader>,
            Arc::new(CountingFactory::default()),
            1,
        );

        let result = resolver.resolve(Service::Database, true, false).await;
        assert!(matches!(result, Err(ref err) if err.is_transport()));
    }

    #[tokio::test]
    async fn test_rediscovery_replaces_and_closes_previous_set() {
        let loader = Arc::new(ScriptedLoader::new(vec![
            Ok(vec![HostDescription::new("db0", 8529)]),
            Ok(vec![
                HostDescription::new("db0", 8529),
                HostDescription::new("db1", 8529),
            ]),
        ]));
        let resolver = DiscoveryHostResolver::new(
            loader as Arc<dyn EndpointLoader>,
            Arc::new(CountingFactory::default()),
            1,
        );

        let first = resolver.resolve(Service::Database, true, false).await.unwrap();
        assert_eq!(first.len(), 1);
        let second = resolver.resolve(Service::Database, true, false).await.unwrap();
        assert_eq!(second.len(), 2);
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
