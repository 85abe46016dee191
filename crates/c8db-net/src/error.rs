//! Error types for driver networking

use serde::Deserialize;
use thiserror::Error;

/// Structured error document returned by the cluster for failed requests.
///
/// Wire shape: `{"code": 404, "errorNum": 1202, "errorMessage": "...",
/// "exception": "..."}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ErrorPayload {
    /// HTTP-like status code echoed in the body
    #[serde(default)]
    pub code: i32,
    /// Cluster-specific numeric error identifier
    #[serde(default, rename = "errorNum")]
    pub error_num: i32,
    /// Human-readable error message
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
    /// Server-side exception description
    #[serde(default)]
    pub exception: Option<String>,
}

impl ErrorPayload {
    /// Whether the document carries anything beyond zero/empty defaults.
    ///
    /// Error bodies that decode but say nothing are treated as unstructured
    /// and surfaced with their raw text instead.
    pub fn is_meaningful(&self) -> bool {
        self.exception.is_some()
            || self.error_message.is_some()
            || self.code != 0
            || self.error_num != 0
    }
}

impl std::fmt::Display for ErrorPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let message = self
            .error_message
            .as_deref()
            .or(self.exception.as_deref())
            .unwrap_or("");
        write!(
            f,
            "Response: {}, Error: {} - {}",
            self.code, self.error_num, message
        )
    }
}

/// Error types for driver network operations
#[derive(Error, Debug)]
pub enum Error {
    /// Socket-level failure while connecting, writing, or reading
    #[error("transport failure: {source}")]
    Transport {
        /// Underlying socket or protocol error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Every known host was tried and failed
    #[error("no reachable host available")]
    NoHostAvailable,

    /// Server asked for the request to be replayed against another endpoint.
    ///
    /// Consumed by the communication engine; callers only observe it when
    /// executing a connection directly.
    #[error("redirect to {location}")]
    Redirect {
        /// Target endpoint taken from the response metadata
        location: String,
    },

    /// Server-side failure that carried no structured error document
    #[error("unexpected response: {reason}")]
    Internal {
        /// HTTP-like status code of the response
        code: u16,
        /// Raw body text, or a generic description when the body was empty
        reason: String,
    },

    /// Structured application-level error reported by the cluster
    #[error("{0}")]
    Api(ErrorPayload),

    /// Chunk stream violated the framing rules
    #[error("framing error: {reason}")]
    Framing {
        /// What the offending chunk did wrong
        reason: String,
    },

    /// Endpoint string could not be parsed into host and port
    #[error("invalid endpoint: {endpoint}")]
    InvalidEndpoint {
        /// The offending endpoint string
        endpoint: String,
    },

    /// Authentication handshake was rejected by the server
    #[error("authentication failed: {reason}")]
    Authentication {
        /// Server's answer to the authentication message
        reason: String,
    },

    /// Request head, authentication message, or response head could not be
    /// encoded or decoded
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Result type for driver network operations
pub type Result<T> = std::result::Result<T, Error>;

// Helper methods for common error construction
impl Error {
    /// Create a transport error from any socket-level failure
    pub fn transport(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Transport {
            source: source.into(),
        }
    }

    /// Create a redirect signal for the given target endpoint
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::Redirect {
            location: location.into(),
        }
    }

    /// Create an internal error carrying a status code and body text
    pub fn internal(code: u16, reason: impl Into<String>) -> Self {
        Self::Internal {
            code,
            reason: reason.into(),
        }
    }

    /// Create an internal error for a status code without a usable body
    pub fn status(code: u16) -> Self {
        Self::Internal {
            code,
            reason: format!("Response Code: {code}"),
        }
    }

    /// Create a framing error
    pub fn framing(reason: impl Into<String>) -> Self {
        Self::Framing {
            reason: reason.into(),
        }
    }

    /// Create an invalid endpoint error
    pub fn invalid_endpoint(endpoint: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
        }
    }

    /// Create an authentication error
    pub fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }

    /// Whether this error is a socket-level failure that failover may retry
    /// against another host
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::transport(source)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_payload_meaningful() {
        assert!(!ErrorPayload::default().is_meaningful());

        let payload = ErrorPayload {
            error_num: 1202,
            ..Default::default()
        };
        assert!(payload.is_meaningful());

        let payload = ErrorPayload {
            error_message: Some("document not found".to_string()),
            ..Default::default()
        };
        assert!(payload.is_meaningful());
    }

    #[test]
    fn test_error_payload_decodes_wire_names() {
        let payload: ErrorPayload = serde_json::from_str(
            r#"{"code":404,"errorNum":1202,"errorMessage":"document not found"}"#,
        )
        .unwrap();
        assert_eq!(payload.code, 404);
        assert_eq!(payload.error_num, 1202);
        assert_eq!(payload.error_message.as_deref(), Some("document not found"));
        assert_eq!(payload.exception, None);
    }

    #[test]
    fn test_error_payload_display() {
        let payload = ErrorPayload {
            code: 404,
            error_num: 1202,
            error_message: Some("document not found".to_string()),
            exception: None,
        };
        assert_eq!(
            payload.to_string(),
            "Response: 404, Error: 1202 - document not found"
        );
    }

    #[test]
    fn test_io_error_maps_to_transport() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused").into();
        assert!(err.is_transport());
    }
}
