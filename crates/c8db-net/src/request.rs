//! Logical request model shared by both transports

use std::collections::HashMap;

use bytes::Bytes;

/// Header that marks a request as satisfiable by a possibly-stale replica
pub const HEADER_ALLOW_DIRTY_READ: &str = "X-C8-Allow-Dirty-Read";

/// Request verb understood by the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// DELETE
    Delete,
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// HEAD
    Head,
    /// PATCH
    Patch,
    /// OPTIONS
    Options,
}

impl Method {
    /// Wire name of the verb
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Delete => "DELETE",
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Head => "HEAD",
            Self::Patch => "PATCH",
            Self::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing hint derived from a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessType {
    /// Plain read, may prefer followers under smarter policies
    Read,
    /// Mutating request, must reach a node that accepts writes
    Write,
    /// Read explicitly allowed to hit a stale replica
    DirtyRead,
}

/// One logical call against the cluster.
///
/// Carries everything a transport needs to put the request on the wire: the
/// verb, the path, parameter maps, and an opaque pre-encoded body. Query and
/// header setters take `Option` values and silently drop `None`, so callers
/// can forward optional parameters without branching.
#[derive(Debug, Clone)]
pub struct Request {
    tenant: Option<String>,
    database: String,
    method: Method,
    path: String,
    query_params: HashMap<String, String>,
    header_params: HashMap<String, String>,
    body: Option<Bytes>,
    retry_enabled: bool,
}

impl Request {
    /// Create a request against `database` with the given verb and path
    pub fn new(database: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            tenant: None,
            database: database.into(),
            method,
            path: path.into(),
            query_params: HashMap::new(),
            header_params: HashMap::new(),
            body: None,
            retry_enabled: false,
        }
    }

    /// Set the tenant the request runs under
    #[must_use]
    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    /// Add a query parameter, dropped entirely when `value` is `None`
    #[must_use]
    pub fn with_query_param(mut self, key: impl Into<String>, value: Option<impl ToString>) -> Self {
        self.put_query_param(key, value);
        self
    }

    /// Add a header parameter, dropped entirely when `value` is `None`
    #[must_use]
    pub fn with_header_param(
        mut self,
        key: impl Into<String>,
        value: Option<impl ToString>,
    ) -> Self {
        self.put_header_param(key, value);
        self
    }

    /// Attach the pre-encoded body
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Mark the request as eligible for caller-driven retries.
    ///
    /// The routing layer passes this flag through untouched; it never retries
    /// application-level failures on its own.
    #[must_use]
    pub fn with_retry_enabled(mut self, retry_enabled: bool) -> Self {
        self.retry_enabled = retry_enabled;
        self
    }

    /// Permit this read to be served by a possibly-stale replica
    #[must_use]
    pub fn with_allow_dirty_read(mut self, allow: bool) -> Self {
        if allow {
            self.put_header_param(HEADER_ALLOW_DIRTY_READ, Some(true));
        } else {
            self.header_params.remove(HEADER_ALLOW_DIRTY_READ);
        }
        self
    }

    /// Add a query parameter in place, dropped entirely when `value` is `None`
    pub fn put_query_param(&mut self, key: impl Into<String>, value: Option<impl ToString>) {
        if let Some(value) = value {
            self.query_params.insert(key.into(), value.to_string());
        }
    }

    /// Add a header parameter in place, dropped entirely when `value` is `None`
    pub fn put_header_param(&mut self, key: impl Into<String>, value: Option<impl ToString>) {
        if let Some(value) = value {
            self.header_params.insert(key.into(), value.to_string());
        }
    }

    /// Tenant the request runs under, if any
    pub fn tenant(&self) -> Option<&str> {
        self.tenant.as_deref()
    }

    /// Target database
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Request verb
    pub fn method(&self) -> Method {
        self.method
    }

    /// Request path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Query parameters
    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Header parameters
    pub fn header_params(&self) -> &HashMap<String, String> {
        &self.header_params
    }

    /// Pre-encoded body, if any
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether the caller considers this request safe to replay
    pub fn is_retry_enabled(&self) -> bool {
        self.retry_enabled
    }

    /// Routing hint for the host handler.
    ///
    /// The dirty-read marker wins over the verb; GET is a read; every other
    /// verb, HEAD included, counts as a write.
    pub fn access_type(&self) -> AccessType {
        if self.header_params.contains_key(HEADER_ALLOW_DIRTY_READ) {
            AccessType::DirtyRead
        } else if self.method == Method::Get {
            AccessType::Read
        } else {
            AccessType::Write
        }
    }
}
