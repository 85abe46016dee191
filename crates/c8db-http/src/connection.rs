//! One-shot request execution over a shared HTTP client

use std::sync::Arc;

use async_trait::async_trait;
use c8db_net::{
    ClientConfig, Codec, Connection, ConnectionFactory, Credentials, Error, HostDescription,
    Method, Request, Response, Result,
};
use tracing::trace;

fn http_method(method: Method) -> reqwest::Method {
    match method {
        Method::Delete => reqwest::Method::DELETE,
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Head => reqwest::Method::HEAD,
        Method::Patch => reqwest::Method::PATCH,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

/// Connection to one host over HTTP.
///
/// The underlying [`reqwest::Client`] is shared across every connection the
/// factory creates and pools sockets internally, so this type is a thin
/// binding of that client to one host. It always reports open and `open` is
/// a no-op; the per-host connection bound is enforced by the pool layer
/// above, not here.
pub struct HttpConnection {
    host: HostDescription,
    client: reqwest::Client,
    codec: Arc<dyn Codec>,
    credentials: Option<Credentials>,
    secure: bool,
}

impl HttpConnection {
    fn base_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host.host(), self.host.port())
    }
}

impl std::fmt::Debug for HttpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnection")
            .field("host", &self.host)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Connection for HttpConnection {
    fn is_open(&self) -> bool {
        true
    }

    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn execute(&self, request: &Request) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), request.path());
        let mut builder = self
            .client
            .request(http_method(request.method()), &url)
            .query(request.query_params());

        for (name, value) in request.header_params() {
            builder = builder.header(name, value);
        }
        match &self.credentials {
            Some(Credentials::Basic { username, password }) => {
                builder = builder.basic_auth(username, Some(password));
            }
            Some(Credentials::Jwt { token }) => {
                builder = builder.bearer_auth(token);
            }
            None => {}
        }
        if let Some(body) = request.body() {
            builder = builder
                .header(reqwest::header::CONTENT_TYPE, self.codec.content_type())
                .body(body.clone());
        }

        trace!(method = %request.method(), url = %url, "sending request");
        let upstream = builder.send().await.map_err(Error::transport)?;

        let mut response = Response::new(upstream.status().as_u16());
        for (name, value) in upstream.headers() {
            // Binary header values have no place in the metadata map
            if let Ok(value) = value.to_str() {
                response.put_meta(name.as_str(), value);
            }
        }
        let body = upstream.bytes().await.map_err(Error::transport)?;
        if !body.is_empty() {
            response.attach_body(body);
        }
        Ok(response)
    }

    async fn close(&self) {}
}

/// Builds [`HttpConnection`]s that share one pooled HTTP client.
///
/// Timeouts, TLS material, and credentials are baked into the client when
/// the factory is constructed; creating a connection does no I/O.
pub struct HttpConnectionFactory {
    client: reqwest::Client,
    codec: Arc<dyn Codec>,
    credentials: Option<Credentials>,
    secure: bool,
}

impl HttpConnectionFactory {
    /// Build the shared client from the driver configuration
    pub fn new(config: &ClientConfig, codec: Arc<dyn Codec>) -> Result<Self> {
        let mut builder = match &config.tls {
            Some(tls) => reqwest::Client::builder().use_preconfigured_tls((**tls).clone()),
            None => reqwest::Client::builder().use_rustls_tls(),
        };
        builder = builder.pool_max_idle_per_host(config.max_connections);
        if let Some(timeout) = config.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(Error::transport)?;

        Ok(Self {
            client,
            codec,
            credentials: config.credentials.clone(),
            secure: config.tls.is_some(),
        })
    }
}

impl std::fmt::Debug for HttpConnectionFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnectionFactory")
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl ConnectionFactory for HttpConnectionFactory {
    fn create(&self, host: &HostDescription) -> Arc<dyn Connection> {
        Arc::new(HttpConnection {
            host: host.clone(),
            client: self.client.clone(),
            codec: Arc::clone(&self.codec),
            credentials: self.credentials.clone(),
            secure: self.secure,
        })
    }
}
