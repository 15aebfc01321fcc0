//! Declarative requests and their translation to transport requests.
//!
//! An [`ApiRequest`] describes *what* to call: method, path, parameters and
//! how to encode them, the [`Backend`] it belongs to, how to validate the
//! status and how to decode the body. [`RequestMapper`] turns it into a
//! [`crate::transport::TransportRequest`].

mod api_request;
mod backend;
mod decoder;
mod encoding;
mod mapper;
mod processors;

pub use api_request::ApiRequest;
pub use backend::Backend;
pub use decoder::{DataDecoder, EmptyResponse};
pub use encoding::{CustomEncoder, ParameterEncoding, UrlEncodingDestination, JSON_ARRAY_KEY};
pub use mapper::RequestMapper;
pub use processors::{HeaderProcessor, RequestProcessor, ResponseProcessor};

#[cfg(test)]
pub use processors::{MockRequestProcessor, MockResponseProcessor};
