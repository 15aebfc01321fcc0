//! Request fixtures.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::cache::CachingGroup;
use crate::core::Method;
use crate::pipeline::StatusValidation;
use crate::request::{ApiRequest, Backend, ParameterEncoding};

/// Base URL used by [`TestRequest`] unless overridden.
pub const DEFAULT_BASE_URL: &str = "https://api.example.com";

/// A configurable request decoding into `serde_json::Value`.
#[derive(Debug, Clone)]
pub struct TestRequest {
    method: Method,
    path: String,
    backend: Arc<Backend>,
    headers: BTreeMap<String, String>,
    parameters: Map<String, Value>,
    encoding: Option<ParameterEncoding>,
    status_validation: StatusValidation,
    caching_groups: BTreeSet<CachingGroup>,
}

impl TestRequest {
    /// Creates a request against [`DEFAULT_BASE_URL`].
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            backend: Arc::new(Backend::new(DEFAULT_BASE_URL)),
            headers: BTreeMap::new(),
            parameters: Map::new(),
            encoding: None,
            status_validation: StatusValidation::Default,
            caching_groups: BTreeSet::new(),
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    /// Sets the backend.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<Backend>) -> Self {
        self.backend = backend;
        self
    }

    /// Replaces the backend with a plain one at `base_url`.
    #[must_use]
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        self.with_backend(Arc::new(Backend::new(base_url)))
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replaces the parameters.
    #[must_use]
    pub fn with_parameters(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Adds one parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Sets the parameter encoding.
    #[must_use]
    pub fn with_encoding(mut self, encoding: ParameterEncoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Sets the status validation.
    #[must_use]
    pub fn with_status_validation(mut self, validation: StatusValidation) -> Self {
        self.status_validation = validation;
        self
    }

    /// Adds a caching group.
    #[must_use]
    pub fn with_caching_group(mut self, group: impl Into<CachingGroup>) -> Self {
        self.caching_groups.insert(group.into());
        self
    }
}

impl ApiRequest for TestRequest {
    type Response = Value;

    fn path(&self) -> String {
        self.path.clone()
    }

    fn backend(&self) -> Arc<Backend> {
        Arc::clone(&self.backend)
    }

    fn method(&self) -> Method {
        self.method
    }

    fn headers(&self) -> BTreeMap<String, String> {
        self.headers.clone()
    }

    fn parameters(&self) -> Map<String, Value> {
        self.parameters.clone()
    }

    fn parameter_encoding(&self) -> ParameterEncoding {
        self.encoding
            .clone()
            .unwrap_or_else(|| ParameterEncoding::default_for(self.method))
    }

    fn status_validation(&self) -> StatusValidation {
        self.status_validation.clone()
    }

    fn caching_groups(&self) -> BTreeSet<CachingGroup> {
        self.caching_groups.clone()
    }
}
