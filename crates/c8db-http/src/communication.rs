//! Client front door for the HTTP transport

use std::sync::Arc;

use c8db_net::{
    ClientConfig, Codec, Communication, ConnectionFactory, HostHandle, JsonCodec, Request,
    Response, Result, Service, SimpleHostResolver,
};

use crate::connection::HttpConnectionFactory;

/// HTTP client: one-shot requests over a pooled client behind the shared
/// failover engine.
pub struct HttpCommunication {
    communication: Communication,
}

impl HttpCommunication {
    /// Client with the default JSON codec
    pub async fn new(config: ClientConfig) -> Result<Self> {
        Self::with_codec(config, Arc::new(JsonCodec)).await
    }

    /// Client with a custom value-format codec
    pub async fn with_codec(config: ClientConfig, codec: Arc<dyn Codec>) -> Result<Self> {
        let factory: Arc<dyn ConnectionFactory> =
            Arc::new(HttpConnectionFactory::new(&config, Arc::clone(&codec))?);
        let resolver = Arc::new(SimpleHostResolver::new(
            config.service_endpoints(),
            config.max_connections,
            factory,
        ));
        let communication =
            Communication::new(resolver, codec, &[Service::Database, Service::Streams]).await?;
        Ok(Self { communication })
    }

    /// Execute a request with host failover and redirect handling
    pub async fn execute(
        &self,
        request: &Request,
        handle: Option<&HostHandle>,
        service: Service,
    ) -> Result<Response> {
        self.communication.execute(request, handle, service).await
    }

    /// Close every pooled connection across all services
    pub async fn close(&self) {
        self.communication.close().await;
    }
}
