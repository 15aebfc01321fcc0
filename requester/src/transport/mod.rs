//! Transport contract.
//!
//! The core never talks to the network itself: it hands a
//! [`TransportRequest`] to a [`Transport`] and receives the body bytes and
//! [`ResponseMetadata`] back. Connection pooling, HTTP/2 and timeouts are
//! the transport's concern.

mod config;
#[cfg(feature = "http")]
mod http;

pub use config::TransportConfig;
#[cfg(feature = "http")]
pub use http::ReqwestTransport;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;

use crate::core::Method;
use crate::errors::TransportError;

/// A fully built request, ready to be sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: String,
    /// Headers keyed by lower-case name.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Option<Bytes>,
}

impl TransportRequest {
    /// Creates a request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Sets a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().trim().to_ascii_lowercase(), value.into());
    }

    /// Sets a header.
    #[must_use]
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.trim().to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Status line and headers of a received response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMetadata {
    /// HTTP status code.
    pub status_code: u16,
    /// Response headers keyed by lower-case name.
    pub headers: BTreeMap<String, String>,
    /// Final URL after redirects.
    pub url: String,
}

impl ResponseMetadata {
    /// Creates metadata with the given status code.
    #[must_use]
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Default::default()
        }
    }

    /// Whether the status code is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Returns a header value by case-insensitive name.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.trim().to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Body and metadata of a received response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportResponse {
    /// Status and headers.
    pub metadata: ResponseMetadata,
    /// Raw body bytes.
    pub body: Bytes,
}

impl TransportResponse {
    /// Creates a response with the given status and body.
    #[must_use]
    pub fn new(status_code: u16, body: impl Into<Bytes>) -> Self {
        Self {
            metadata: ResponseMetadata::new(status_code),
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    #[must_use]
    pub fn json(status_code: u16, value: &serde_json::Value) -> Self {
        Self::new(status_code, value.to_string()).with_header("content-type", "application/json")
    }

    /// Sets a response header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.metadata
            .headers
            .insert(name.trim().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns the status code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.metadata.status_code
    }
}

/// Sends transport requests.
///
/// Implementations may be shared across backends or supplied per backend.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the response body and metadata.
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive() {
        let request = TransportRequest::new(Method::Get, "https://example.com")
            .with_header("Authorization", "Bearer abc");

        assert_eq!(request.header("authorization"), Some("Bearer abc"));
        assert_eq!(request.header("AUTHORIZATION"), Some("Bearer abc"));
        assert!(request.headers.contains_key("authorization"));
    }

    #[test]
    fn test_json_response() {
        let response = TransportResponse::json(201, &serde_json::json!({"id": 1}));

        assert_eq!(response.status_code(), 201);
        assert!(response.metadata.is_success());
        assert_eq!(response.metadata.header("Content-Type"), Some("application/json"));
        assert_eq!(&response.body[..], br#"{"id":1}"#);
    }
}
