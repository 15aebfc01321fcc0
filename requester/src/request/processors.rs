//! Pluggable request and response processing stages.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;

use crate::transport::{ResponseMetadata, TransportRequest};

/// Adjusts a mapped request before it is signed.
///
/// Processors run in backend order, once per `perform` call; a retry after
/// token refresh does not run them again.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RequestProcessor: Send + Sync {
    /// Processes the request in place.
    async fn process(&self, request: &mut TransportRequest) -> anyhow::Result<()>;
}

/// Inspects a response before authorization and status validation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseProcessor: Send + Sync {
    /// Processes the response. An error fails the request.
    async fn process(&self, metadata: &ResponseMetadata, body: &Bytes) -> anyhow::Result<()>;
}

/// Adds fixed headers to every request.
#[derive(Debug, Clone, Default)]
pub struct HeaderProcessor {
    headers: BTreeMap<String, String>,
}

impl HeaderProcessor {
    /// Creates an empty processor.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl RequestProcessor for HeaderProcessor {
    async fn process(&self, request: &mut TransportRequest) -> anyhow::Result<()> {
        for (name, value) in &self.headers {
            request.set_header(name, value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Method;

    #[tokio::test]
    async fn test_header_processor() {
        let processor = HeaderProcessor::new()
            .with_header("X-Api-Key", "secret")
            .with_header("Accept", "application/json");
        let mut request = TransportRequest::new(Method::Get, "https://example.com");

        processor.process(&mut request).await.unwrap();

        assert_eq!(request.header("x-api-key"), Some("secret"));
        assert_eq!(request.header("accept"), Some("application/json"));
    }

    #[tokio::test]
    async fn test_mock_request_processor() {
        let mut processor = MockRequestProcessor::new();
        processor
            .expect_process()
            .times(1)
            .returning(|_| Err(anyhow::anyhow!("rejected")));

        let mut request = TransportRequest::new(Method::Get, "https://example.com");
        let result = processor.process(&mut request).await;

        assert_eq!(result.unwrap_err().to_string(), "rejected");
    }
}
