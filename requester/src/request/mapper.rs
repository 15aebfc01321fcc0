//! Translation of declarative requests into transport requests.

use serde_json::{Map, Value};
use url::form_urlencoded;
use url::Url;

use super::api_request::ApiRequest;
use super::encoding::{query_pairs, ParameterEncoding, JSON_ARRAY_KEY};
use crate::core::PipelineStage;
use crate::errors::{ErrorKind, RequestError};
use crate::transport::TransportRequest;

const CONTENT_TYPE: &str = "content-type";
const JSON_CONTENT_TYPE: &str = "application/json";
const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";

/// Builds the unsigned transport request for an [`ApiRequest`].
///
/// Mapping is deterministic: the same request always maps to the same
/// transport request, which is what makes coalescing and caching by
/// request identity work.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestMapper;

impl RequestMapper {
    /// Creates a mapper.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Maps `request`. Failures are tagged with the `Mapping` stage.
    pub fn map<R: ApiRequest + ?Sized>(&self, request: &R) -> Result<TransportRequest, RequestError> {
        self.try_map(request).map_err(|error| {
            RequestError::from_hook(ErrorKind::RequestMapping, error).at_stage(PipelineStage::Mapping)
        })
    }

    fn try_map<R: ApiRequest + ?Sized>(&self, request: &R) -> anyhow::Result<TransportRequest> {
        let backend = request.backend();
        let url = Url::parse(&join_url(backend.base_url(), &request.path()))?;
        let method = request.method();

        let mut mapped = TransportRequest::new(method, url.as_str());
        for (name, value) in request.headers() {
            mapped.set_header(name, value);
        }

        let parameters = request.parameters();
        match request.parameter_encoding() {
            ParameterEncoding::Json => {
                if !parameters.is_empty() {
                    set_json_body(&mut mapped, &Value::Object(parameters))?;
                }
            }
            ParameterEncoding::Url { destination } => {
                if destination.uses_query(method) {
                    mapped.url = append_query(url, &parameters);
                } else if !parameters.is_empty() {
                    set_form_body(&mut mapped, &parameters);
                }
            }
            ParameterEncoding::UrlAndJson { url_keys } => {
                let (query, body): (Map<String, Value>, Map<String, Value>) = parameters
                    .into_iter()
                    .partition(|(key, _)| url_keys.contains(key));
                mapped.url = append_query(url, &query);
                if !body.is_empty() {
                    set_json_body(&mut mapped, &Value::Object(body))?;
                }
            }
            ParameterEncoding::JsonArray => match parameters.get(JSON_ARRAY_KEY) {
                Some(array @ Value::Array(_)) => set_json_body(&mut mapped, array)?,
                Some(_) => anyhow::bail!("'{JSON_ARRAY_KEY}' must hold an array"),
                None => anyhow::bail!("missing '{JSON_ARRAY_KEY}' parameter"),
            },
            ParameterEncoding::Custom(encoder) => encoder(&mut mapped, &parameters)?,
        }

        Ok(mapped)
    }
}

fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{path}")
    }
}

fn encoded_pairs(parameters: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in parameters {
        query_pairs(key, value, &mut pairs);
    }
    pairs
}

fn append_query(mut url: Url, parameters: &Map<String, Value>) -> String {
    let pairs = encoded_pairs(parameters);
    if !pairs.is_empty() {
        url.query_pairs_mut().extend_pairs(pairs);
    }
    url.into()
}

fn set_json_body(request: &mut TransportRequest, body: &Value) -> anyhow::Result<()> {
    request.body = Some(serde_json::to_vec(body)?.into());
    if request.header(CONTENT_TYPE).is_none() {
        request.set_header(CONTENT_TYPE, JSON_CONTENT_TYPE);
    }
    Ok(())
}

fn set_form_body(request: &mut TransportRequest, parameters: &Map<String, Value>) {
    let body = form_urlencoded::Serializer::new(String::new())
        .extend_pairs(encoded_pairs(parameters))
        .finish();
    request.body = Some(body.into());
    if request.header(CONTENT_TYPE).is_none() {
        request.set_header(CONTENT_TYPE, FORM_CONTENT_TYPE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Method;
    use crate::request::UrlEncodingDestination;
    use crate::testing::TestRequest;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn body_json(request: &TransportRequest) -> Value {
        serde_json::from_slice(request.body.as_deref().unwrap_or_default()).unwrap()
    }

    #[test]
    fn test_joins_base_url_and_path() {
        assert_eq!(join_url("https://api.example.com/", "/v1/users"), "https://api.example.com/v1/users");
        assert_eq!(join_url("https://api.example.com", "v1"), "https://api.example.com/v1");
        assert_eq!(join_url("https://api.example.com/", ""), "https://api.example.com");
        assert_eq!(join_url("https://api.example.com", "https://other.com/x"), "https://other.com/x");
    }

    #[test]
    fn test_get_parameters_go_to_query() {
        let request = TestRequest::get("/search")
            .with_parameters(params(json!({"q": "rust lang", "page": 2})));

        let mapped = RequestMapper::new().map(&request).unwrap();

        assert_eq!(mapped.method, Method::Get);
        assert_eq!(mapped.url, "https://api.example.com/search?page=2&q=rust+lang");
        assert!(mapped.body.is_none());
    }

    #[test]
    fn test_post_defaults_to_json_body() {
        let request = TestRequest::new(Method::Post, "/users")
            .with_parameters(params(json!({"name": "ada"})));

        let mapped = RequestMapper::new().map(&request).unwrap();

        assert_eq!(mapped.url, "https://api.example.com/users");
        assert_eq!(mapped.header("content-type"), Some(JSON_CONTENT_TYPE));
        assert_eq!(body_json(&mapped), json!({"name": "ada"}));
    }

    #[test]
    fn test_url_encoding_on_post_uses_form_body() {
        let request = TestRequest::new(Method::Post, "/login")
            .with_parameters(params(json!({"user": "ada", "pass": "a&b"})))
            .with_encoding(ParameterEncoding::url());

        let mapped = RequestMapper::new().map(&request).unwrap();

        assert_eq!(mapped.header("content-type"), Some(FORM_CONTENT_TYPE));
        assert_eq!(mapped.body.as_deref(), Some(&b"pass=a%26b&user=ada"[..]));
    }

    #[test]
    fn test_url_encoding_forced_to_query() {
        let request = TestRequest::new(Method::Post, "/items")
            .with_parameters(params(json!({"id": 5})))
            .with_encoding(ParameterEncoding::Url {
                destination: UrlEncodingDestination::QueryString,
            });

        let mapped = RequestMapper::new().map(&request).unwrap();

        assert_eq!(mapped.url, "https://api.example.com/items?id=5");
        assert!(mapped.body.is_none());
    }

    #[test]
    fn test_url_and_json_splits_parameters() {
        let request = TestRequest::new(Method::Patch, "/items")
            .with_parameters(params(json!({"id": 5, "title": "new"})))
            .with_encoding(ParameterEncoding::url_and_json(["id"]));

        let mapped = RequestMapper::new().map(&request).unwrap();

        assert_eq!(mapped.url, "https://api.example.com/items?id=5");
        assert_eq!(body_json(&mapped), json!({"title": "new"}));
    }

    #[test]
    fn test_json_array_body() {
        let request = TestRequest::new(Method::Post, "/batch")
            .with_parameters(params(json!({ "jsonArrayKey": [1, 2, 3] })))
            .with_encoding(ParameterEncoding::JsonArray);

        let mapped = RequestMapper::new().map(&request).unwrap();
        assert_eq!(body_json(&mapped), json!([1, 2, 3]));
    }

    #[test]
    fn test_json_array_without_array_fails_mapping() {
        let request = TestRequest::new(Method::Post, "/batch")
            .with_parameters(params(json!({ "items": [1] })))
            .with_encoding(ParameterEncoding::JsonArray);

        let error = RequestMapper::new().map(&request).unwrap_err();
        assert_eq!(error.kind, ErrorKind::RequestMapping);
        assert_eq!(error.stage, Some(PipelineStage::Mapping));
    }

    #[test]
    fn test_custom_encoder() {
        let request = TestRequest::new(Method::Put, "/raw")
            .with_parameters(params(json!({"text": "hello"})))
            .with_encoding(ParameterEncoding::custom(|req, params| {
                let text = params.get("text").and_then(Value::as_str).unwrap_or_default();
                req.body = Some(text.to_string().into());
                req.set_header("content-type", "text/plain");
                Ok(())
            }));

        let mapped = RequestMapper::new().map(&request).unwrap();

        assert_eq!(mapped.body.as_deref(), Some(&b"hello"[..]));
        assert_eq!(mapped.header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_invalid_url_fails_mapping() {
        let request = TestRequest::get("/x").with_base_url("not a url");
        let error = RequestMapper::new().map(&request).unwrap_err();
        assert_eq!(error.kind, ErrorKind::RequestMapping);
    }

    #[test]
    fn test_request_headers_are_applied() {
        let request = TestRequest::get("/h").with_header("X-Trace", "abc");
        let mapped = RequestMapper::new().map(&request).unwrap();
        assert_eq!(mapped.header("x-trace"), Some("abc"));
    }
}
