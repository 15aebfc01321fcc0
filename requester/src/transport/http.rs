//! [`Transport`] backed by a pooled `reqwest` client.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use std::collections::BTreeMap;
use tracing::debug;

use super::{ResponseMetadata, Transport, TransportConfig, TransportRequest, TransportResponse};
use crate::core::Method;
use crate::errors::TransportError;

/// HTTP transport using one shared connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a transport from configuration.
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let mut default_headers = HeaderMap::new();
        for (name, value) in &config.default_headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            default_headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .pool_idle_timeout(config.pool_idle_timeout())
            .user_agent(config.user_agent.clone())
            .default_headers(default_headers)
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;

        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else if error.is_builder() {
        TransportError::InvalidRequest(error.to_string())
    } else if error.is_body() || error.is_decode() {
        TransportError::Io(error.to_string())
    } else {
        TransportError::Other(error.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(to_reqwest_method(request.method), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| map_error(&e))?;

        let status_code = response.status().as_u16();
        let url = response.url().to_string();
        let headers: BTreeMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|e| map_error(&e))?;

        debug!(status_code, url = %url, bytes = body.len(), "Response received");

        Ok(TransportResponse {
            metadata: ResponseMetadata {
                status_code,
                headers,
                url,
            },
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_builds_client() {
        let config = TransportConfig::new().with_header("x-client", "requester");
        assert!(ReqwestTransport::from_config(&config).is_ok());
    }

    #[test]
    fn test_from_config_rejects_bad_header() {
        let config = TransportConfig::new().with_header("bad header", "value");
        let result = ReqwestTransport::from_config(&config);
        assert!(matches!(result, Err(TransportError::InvalidRequest(_))));
    }

    #[test]
    fn test_method_mapping() {
        assert_eq!(to_reqwest_method(Method::Patch), reqwest::Method::PATCH);
        assert_eq!(to_reqwest_method(Method::Delete), reqwest::Method::DELETE);
    }

    #[tokio::test]
    async fn test_connect_failure_is_classified() {
        let transport =
            ReqwestTransport::from_config(&TransportConfig::new().with_connect_timeout(1.0))
                .unwrap();
        let result = transport
            .send(TransportRequest::new(Method::Get, "http://127.0.0.1:1/"))
            .await;

        assert!(matches!(
            result,
            Err(TransportError::Connect(_) | TransportError::Timeout | TransportError::Other(_))
        ));
    }
}
