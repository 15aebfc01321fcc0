//! Backends group requests that share a base URL, auth and processing.

use std::fmt;
use std::sync::Arc;

use super::processors::{RequestProcessor, ResponseProcessor};
use crate::auth::Authenticator;
use crate::transport::Transport;

/// A remote service and how to talk to it.
#[derive(Clone)]
pub struct Backend {
    base_url: String,
    authenticator: Option<Arc<dyn Authenticator>>,
    request_processors: Vec<Arc<dyn RequestProcessor>>,
    response_processors: Vec<Arc<dyn ResponseProcessor>>,
    transport: Option<Arc<dyn Transport>>,
}

impl Backend {
    /// Creates a backend without authentication or processors.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            authenticator: None,
            request_processors: Vec::new(),
            response_processors: Vec::new(),
            transport: None,
        }
    }

    /// Sets the authenticator.
    #[must_use]
    pub fn with_authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Appends a request processor.
    #[must_use]
    pub fn with_request_processor(mut self, processor: Arc<dyn RequestProcessor>) -> Self {
        self.request_processors.push(processor);
        self
    }

    /// Appends a response processor.
    #[must_use]
    pub fn with_response_processor(mut self, processor: Arc<dyn ResponseProcessor>) -> Self {
        self.response_processors.push(processor);
        self
    }

    /// Uses `transport` instead of the requester's default.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the authenticator.
    #[must_use]
    pub fn authenticator(&self) -> Option<&Arc<dyn Authenticator>> {
        self.authenticator.as_ref()
    }

    /// Returns the request processors in order.
    #[must_use]
    pub fn request_processors(&self) -> &[Arc<dyn RequestProcessor>] {
        &self.request_processors
    }

    /// Returns the response processors in order.
    #[must_use]
    pub fn response_processors(&self) -> &[Arc<dyn ResponseProcessor>] {
        &self.response_processors
    }

    /// Returns the transport override.
    #[must_use]
    pub fn transport(&self) -> Option<&Arc<dyn Transport>> {
        self.transport.as_ref()
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("base_url", &self.base_url)
            .field("authenticated", &self.authenticator.is_some())
            .field("request_processors", &self.request_processors.len())
            .field("response_processors", &self.response_processors.len())
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}
