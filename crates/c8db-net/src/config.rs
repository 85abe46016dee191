//! Client configuration shared by all transports

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::host::HostDescription;
use crate::resolver::Service;

/// Host used when no endpoint is configured
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Port used when no endpoint is configured
pub const DEFAULT_PORT: u16 = 8529;
/// Maximum payload bytes per chunk on the binary transport
pub const DEFAULT_CHUNK_SIZE: usize = 30_000;
/// Connections held per host
pub const DEFAULT_MAX_CONNECTIONS: usize = 1;

/// Authentication material presented on connection open.
#[derive(Clone)]
pub enum Credentials {
    /// Username and password
    Basic {
        /// Account name
        username: String,
        /// Account password
        password: String,
    },
    /// Pre-issued bearer token
    Jwt {
        /// Encoded token
        token: String,
    },
}

impl Credentials {
    /// Encryption scheme name carried in the auth handshake
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Basic { .. } => "plain",
            Self::Jwt { .. } => "jwt",
        }
    }

    /// Account name, empty for token auth
    pub fn user(&self) -> &str {
        match self {
            Self::Basic { username, .. } => username,
            Self::Jwt { .. } => "",
        }
    }

    /// Password or token
    pub fn secret(&self) -> &str {
        match self {
            Self::Basic { password, .. } => password,
            Self::Jwt { token } => token,
        }
    }
}

/// Connection settings consumed by the transport builders.
///
/// Fields are public so a fully custom configuration can be assembled
/// directly; the `with_*` helpers cover the common path.
#[derive(Clone)]
pub struct ClientConfig {
    /// Database service endpoints
    pub hosts: Vec<HostDescription>,
    /// Streams service endpoints; falls back to `hosts` when empty
    pub stream_hosts: Vec<HostDescription>,
    /// Connections held per host before rotation starts
    pub max_connections: usize,
    /// Socket connect deadline, unlimited when `None`
    pub connect_timeout: Option<Duration>,
    /// Per-request response deadline, unlimited when `None`
    pub request_timeout: Option<Duration>,
    /// Maximum payload bytes per chunk on the binary transport
    pub chunk_size: usize,
    /// TLS client configuration, plaintext when `None`
    pub tls: Option<Arc<rustls::ClientConfig>>,
    /// Authentication material, anonymous when `None`
    pub credentials: Option<Credentials>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            hosts: vec![HostDescription::new(DEFAULT_HOST, DEFAULT_PORT)],
            stream_hosts: Vec::new(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            connect_timeout: None,
            request_timeout: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            tls: None,
            credentials: None,
        }
    }
}

impl ClientConfig {
    /// Configuration with the default local endpoint
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a database service endpoint.
    ///
    /// The first call replaces the default local endpoint instead of
    /// appending to it.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        if self.hosts == vec![HostDescription::new(DEFAULT_HOST, DEFAULT_PORT)] {
            self.hosts.clear();
        }
        self.hosts.push(HostDescription::new(host, port));
        self
    }

    /// Add a streams service endpoint
    #[must_use]
    pub fn with_stream_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.stream_hosts.push(HostDescription::new(host, port));
        self
    }

    /// Set the per-host connection limit
    #[must_use]
    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the socket connect deadline
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the per-request response deadline
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the chunk payload limit for the binary transport
    #[must_use]
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Enable TLS with the given client configuration
    #[must_use]
    pub fn with_tls(mut self, tls: Arc<rustls::ClientConfig>) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Authenticate with username and password
    #[must_use]
    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::Basic {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Authenticate with a bearer token
    #[must_use]
    pub fn with_jwt(mut self, token: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::Jwt {
            token: token.into(),
        });
        self
    }

    /// Endpoint list per service, with streams falling back to the
    /// database endpoints when none are configured
    pub fn service_endpoints(&self) -> HashMap<Service, Vec<HostDescription>> {
        let stream_hosts = if self.stream_hosts.is_empty() {
            self.hosts.clone()
        } else {
            self.stream_hosts.clone()
        };
        HashMap::from([
            (Service::Database, self.hosts.clone()),
            (Service::Streams, stream_hosts),
        ])
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("hosts", &self.hosts)
            .field("stream_hosts", &self.stream_hosts)
            .field("max_connections", &self.max_connections)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("chunk_size", &self.chunk_size)
            .field("tls", &self.tls.is_some())
            .field("credentials", &self.credentials.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.hosts, vec![HostDescription::new("127.0.0.1", 8529)]);
        assert_eq!(config.max_connections, 1);
        assert_eq!(config.chunk_size, 30_000);
        assert!(config.connect_timeout.is_none());
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_first_host_replaces_default() {
        let config = ClientConfig::new()
            .with_host("db0.example.com", 8529)
            .with_host("db1.example.com", 8530);
        assert_eq!(
            config.hosts,
            vec![
                HostDescription::new("db0.example.com", 8529),
                HostDescription::new("db1.example.com", 8530),
            ]
        );
    }

    #[test]
    fn test_streams_fall_back_to_database_hosts() {
        let config = ClientConfig::new().with_host("db0", 8529);
        let endpoints = config.service_endpoints();
        assert_eq!(
            endpoints[&Service::Streams],
            vec![HostDescription::new("db0", 8529)]
        );

        let config = config.with_stream_host("streams0", 6650);
        let endpoints = config.service_endpoints();
        assert_eq!(
            endpoints[&Service::Database],
            vec![HostDescription::new("db0", 8529)]
        );
        assert_eq!(
            endpoints[&Service::Streams],
            vec![HostDescription::new("streams0", 6650)]
        );
    }

    #[test]
    fn test_credential_schemes() {
        let basic = Credentials::Basic {
            username: "root".to_owned(),
            password: "secret".to_owned(),
        };
        assert_eq!(basic.scheme(), "plain");
        assert_eq!(basic.user(), "root");
        assert_eq!(basic.secret(), "secret");

        let jwt = Credentials::Jwt {
            token: "eyJhbGciOiJIUzI1NiJ9".to_owned(),
        };
        assert_eq!(jwt.scheme(), "jwt");
        assert_eq!(jwt.user(), "");
        assert_eq!(jwt.secret(), "eyJhbGciOiJIUzI1NiJ9");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let config = ClientConfig::new().with_basic_auth("root", "hunter2");
        let printed = format!("{config:?}");
        assert!(printed.contains("credentials: true"));
        assert!(!printed.contains("hunter2"));
    }
}
