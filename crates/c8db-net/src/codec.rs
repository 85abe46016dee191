//! Pluggable encoding seam for the cluster's value format
//!
//! The driver core never interprets payload bytes. Everything it needs from
//! the value format is behind [`Codec`]: encoding request heads and the
//! authentication message, decoding response heads and error documents, and
//! telling head from body in a reassembled binary-transport message.
//! [`JsonCodec`] is the default implementation.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, ErrorPayload, Result};
use crate::request::Request;
use crate::response::Response;

/// Protocol version tag carried in every message head
pub const PROTOCOL_VERSION: u8 = 1;
/// Message type tag for requests
pub const MESSAGE_TYPE_REQUEST: u16 = 1;
/// Message type tag for responses
pub const MESSAGE_TYPE_RESPONSE: u16 = 2;
/// Message type tag for the authentication handshake
pub const MESSAGE_TYPE_AUTH: u16 = 1000;

/// Value-format operations the driver core depends on.
///
/// Implementations must be cheap to share; the same codec instance is used
/// concurrently by every connection.
pub trait Codec: Send + Sync {
    /// MIME type advertised for encoded payloads
    fn content_type(&self) -> &'static str;

    /// Encode the request head, everything except the body
    fn encode_request_head(&self, request: &Request) -> Result<Bytes>;

    /// Encode the authentication message sent before any application message
    fn encode_auth(&self, scheme: &str, user: &str, secret: &str) -> Result<Bytes>;

    /// Decode a response head into a body-less [`Response`]
    fn decode_response_head(&self, head: &[u8]) -> Result<Response>;

    /// Number of leading bytes of `message` that form the head.
    ///
    /// The binary transport reassembles `[head, body?]` as one byte run; this
    /// is how it finds the boundary without understanding the format.
    fn head_len(&self, message: &[u8]) -> Result<usize>;

    /// Try to decode a structured error document from a response body.
    ///
    /// `None` means the body is not in the value format at all; the caller
    /// falls back to raw text.
    fn decode_error(&self, body: &[u8]) -> Option<ErrorPayload>;
}

#[derive(Serialize)]
struct RequestHead<'a> {
    version: u8,
    #[serde(rename = "type")]
    message_type: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    tenant: Option<&'a str>,
    database: &'a str,
    #[serde(rename = "requestType")]
    request_type: &'static str,
    request: &'a str,
    parameters: &'a HashMap<String, String>,
    meta: &'a HashMap<String, String>,
}

#[derive(Serialize)]
struct AuthHead<'a> {
    version: u8,
    #[serde(rename = "type")]
    message_type: u16,
    encryption: &'a str,
    user: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct ResponseHead {
    #[serde(rename = "responseCode")]
    response_code: u16,
    #[serde(default)]
    meta: HashMap<String, String>,
}

/// JSON implementation of [`Codec`], the format the cluster's HTTP API
/// speaks natively
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn content_type(&self) -> &'static str {
        "application/json"
    }

    fn encode_request_head(&self, request: &Request) -> Result<Bytes> {
        let head = RequestHead {
            version: PROTOCOL_VERSION,
            message_type: MESSAGE_TYPE_REQUEST,
            tenant: request.tenant(),
            database: request.database(),
            request_type: request.method().as_str(),
            request: request.path(),
            parameters: request.query_params(),
            meta: request.header_params(),
        };
        Ok(Bytes::from(serde_json::to_vec(&head)?))
    }

    fn encode_auth(&self, scheme: &str, user: &str, secret: &str) -> Result<Bytes> {
        let head = AuthHead {
            version: PROTOCOL_VERSION,
            message_type: MESSAGE_TYPE_AUTH,
            encryption: scheme,
            user,
            password: secret,
        };
        Ok(Bytes::from(serde_json::to_vec(&head)?))
    }

    fn decode_response_head(&self, head: &[u8]) -> Result<Response> {
        let head: ResponseHead = serde_json::from_slice(head)?;
        Ok(Response::new(head.response_code).with_meta(head.meta))
    }

    fn head_len(&self, message: &[u8]) -> Result<usize> {
        let mut values =
            serde_json::Deserializer::from_slice(message).into_iter::<serde::de::IgnoredAny>();
        match values.next() {
            Some(Ok(_)) => Ok(values.byte_offset()),
            Some(Err(err)) => Err(err.into()),
            None => Err(Error::framing("message head missing")),
        }
    }

    fn decode_error(&self, body: &[u8]) -> Option<ErrorPayload> {
        serde_json::from_slice(body).ok()
    }
}
