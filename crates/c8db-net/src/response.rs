//! Response model and error classification

use std::collections::HashMap;

use bytes::Bytes;

use crate::codec::Codec;
use crate::error::{Error, Result};

/// Lowest status code treated as a failure
pub const ERROR_STATUS: u16 = 300;
/// Status code the cluster uses both for overload and for soft redirects
pub const ERROR_INTERNAL: u16 = 503;
/// Response header naming the endpoint a redirected request should go to
pub const HEADER_ENDPOINT: &str = "X-C8-Endpoint";

/// One response from the cluster.
///
/// Built once per attempt from the decoded wire head; the body is attached
/// separately once available and never replaced afterwards.
#[derive(Debug, Clone, Default)]
pub struct Response {
    code: u16,
    meta: HashMap<String, String>,
    body: Option<Bytes>,
}

impl Response {
    /// Create a response shell with the given status code
    pub fn new(code: u16) -> Self {
        Self {
            code,
            meta: HashMap::new(),
            body: None,
        }
    }

    /// Replace the metadata map wholesale
    #[must_use]
    pub fn with_meta(mut self, meta: HashMap<String, String>) -> Self {
        self.meta = meta;
        self
    }

    /// Add one metadata entry
    pub fn put_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }

    /// Attach the body; only the first attachment sticks
    pub fn attach_body(&mut self, body: Bytes) {
        if self.body.is_none() {
            self.body = Some(body);
        }
    }

    /// Status code
    pub fn code(&self) -> u16 {
        self.code
    }

    /// Response metadata (headers for the HTTP transport)
    pub fn meta(&self) -> &HashMap<String, String> {
        &self.meta
    }

    /// Look up a metadata entry by name, ignoring ASCII case.
    ///
    /// HTTP stacks lowercase header names while the binary transport passes
    /// them through verbatim, so exact-key lookups are not reliable here.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.meta
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Body bytes, if any
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Consume the response, yielding the body bytes
    pub fn into_body(self) -> Option<Bytes> {
        self.body
    }

    /// Classify the response, turning failure statuses into typed errors.
    ///
    /// Order matters and matches the cluster's contract: below 300 is
    /// success; 503 with an endpoint hint is a redirect; 503 without one is
    /// an internal failure even when a body is present; any other failure
    /// status is decoded as a structured error document when possible and
    /// surfaced as raw text otherwise.
    pub fn check_error(&self, codec: &dyn Codec) -> Result<()> {
        let code = self.code;
        if code < ERROR_STATUS {
            return Ok(());
        }
        if code == ERROR_INTERNAL {
            if let Some(endpoint) = self.header(HEADER_ENDPOINT) {
                return Err(Error::redirect(endpoint));
            }
            return Err(Error::status(code));
        }
        match &self.body {
            Some(body) if !body.is_empty() => {
                if let Some(payload) = codec.decode_error(body) {
                    if payload.is_meaningful() {
                        return Err(Error::Api(payload));
                    }
                }
                Err(Error::internal(
                    code,
                    String::from_utf8_lossy(body).into_owned(),
                ))
            }
            _ => Err(Error::status(code)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::codec::JsonCodec;

    fn classify(response: &Response) -> Result<()> {
        response.check_error(&JsonCodec)
    }

    #[test]
    fn test_success_statuses_pass() {
        assert!(classify(&Response::new(200)).is_ok());
        assert!(classify(&Response::new(201)).is_ok());
        assert!(classify(&Response::new(299)).is_ok());
    }

    #[test]
    fn test_redirect_needs_endpoint_hint() {
        let mut response = Response::new(503);
        response.put_meta(HEADER_ENDPOINT, "https://db2.example.com:443");
        match classify(&response) {
            Err(Error::Redirect { location }) => {
                assert_eq!(location, "https://db2.example.com:443");
            }
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_hint_is_case_insensitive() {
        let mut response = Response::new(503);
        response.put_meta("x-c8-endpoint", "db2.example.com:443");
        assert!(matches!(classify(&response), Err(Error::Redirect { .. })));
    }

    #[test]
    fn test_internal_without_hint_ignores_body() {
        let mut response = Response::new(503);
        response.attach_body(Bytes::from_static(
            br#"{"code":503,"errorNum":21003,"errorMessage":"unavailable"}"#,
        ));
        match classify(&response) {
            Err(Error::Internal { code, .. }) => assert_eq!(code, 503),
            other => panic!("expected internal error, got {other:?}"),
        }
    }

    #[test]
    fn test_structured_error_body() {
        let mut response = Response::new(404);
        response.attach_body(Bytes::from_static(
            br#"{"code":404,"errorNum":1202,"errorMessage":"document not found"}"#,
        ));
        match classify(&response) {
            Err(Error::Api(payload)) => {
                assert_eq!(payload.code, 404);
                assert_eq!(payload.error_num, 1202);
                assert_eq!(payload.error_message.as_deref(), Some("document not found"));
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_error_document_falls_back_to_raw_text() {
        let mut response = Response::new(400);
        response.attach_body(Bytes::from_static(b"{}"));
        match classify(&response) {
            Err(Error::Internal { code, reason }) => {
                assert_eq!(code, 400);
                assert_eq!(reason, "{}");
            }
            other => panic!("expected internal error, got {other:?}"),
        }
    }

    #[test]
    fn test_undecodable_body_falls_back_to_raw_text() {
        let mut response = Response::new(502);
        response.attach_body(Bytes::from_static(b"<html>bad gateway</html>"));
        match classify(&response) {
            Err(Error::Internal { code, reason }) => {
                assert_eq!(code, 502);
                assert_eq!(reason, "<html>bad gateway</html>");
            }
            other => panic!("expected internal error, got {other:?}"),
        }
    }

    #[test]
    fn test_failure_without_body() {
        match classify(&Response::new(300)) {
            Err(Error::Internal { code, reason }) => {
                assert_eq!(code, 300);
                assert_eq!(reason, "Response Code: 300");
            }
            other => panic!("expected internal error, got {other:?}"),
        }
    }

    #[test]
    fn test_body_attaches_once() {
        let mut response = Response::new(200);
        response.attach_body(Bytes::from_static(b"first"));
        response.attach_body(Bytes::from_static(b"second"));
        assert_eq!(response.body().unwrap().as_ref(), b"first");
    }
}
