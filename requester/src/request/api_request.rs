//! The declarative request contract.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::backend::Backend;
use super::decoder::DataDecoder;
use super::encoding::ParameterEncoding;
use crate::cache::CachingGroup;
use crate::core::Method;
use crate::pipeline::StatusValidation;

/// Describes one endpoint call.
///
/// Only [`ApiRequest::path`] and [`ApiRequest::backend`] are required;
/// everything else has a sensible default.
///
/// ```rust,ignore
/// struct GetUser {
///     id: u64,
///     backend: Arc<Backend>,
/// }
///
/// impl ApiRequest for GetUser {
///     type Response = User;
///
///     fn path(&self) -> String {
///         format!("/users/{}", self.id)
///     }
///
///     fn backend(&self) -> Arc<Backend> {
///         Arc::clone(&self.backend)
///     }
/// }
/// ```
pub trait ApiRequest: Send + Sync {
    /// Decoded response type.
    type Response: DeserializeOwned + Send + 'static;

    /// Path appended to the backend's base URL, or an absolute URL.
    fn path(&self) -> String;

    /// The backend serving this request.
    fn backend(&self) -> Arc<Backend>;

    /// HTTP method.
    fn method(&self) -> Method {
        Method::Get
    }

    /// Extra headers.
    fn headers(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    /// Parameters, encoded according to [`ApiRequest::parameter_encoding`].
    fn parameters(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Parameter encoding. URL for GET, JSON otherwise.
    fn parameter_encoding(&self) -> ParameterEncoding {
        ParameterEncoding::default_for(self.method())
    }

    /// Which status codes count as success.
    fn status_validation(&self) -> StatusValidation {
        StatusValidation::Default
    }

    /// Cache groups the response belongs to.
    fn caching_groups(&self) -> BTreeSet<CachingGroup> {
        BTreeSet::new()
    }

    /// Decodes the response body.
    fn decode(&self, body: &Bytes, decoder: &DataDecoder) -> anyhow::Result<Self::Response> {
        decoder.decode(body)
    }
}
