//! Parameter encodings.

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::core::Method;
use crate::transport::TransportRequest;

/// Key whose value becomes the body under [`ParameterEncoding::JsonArray`].
pub const JSON_ARRAY_KEY: &str = "jsonArrayKey";

/// Encoder for [`ParameterEncoding::Custom`].
pub type CustomEncoder =
    Arc<dyn Fn(&mut TransportRequest, &Map<String, Value>) -> anyhow::Result<()> + Send + Sync>;

/// Where URL-encoded parameters go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UrlEncodingDestination {
    /// Query string for GET, PUT and DELETE; form body otherwise.
    #[default]
    MethodDependent,
    /// Always the query string.
    QueryString,
    /// Always a form body.
    HttpBody,
}

impl UrlEncodingDestination {
    /// Returns true if parameters go in the query string for `method`.
    #[must_use]
    pub fn uses_query(self, method: Method) -> bool {
        match self {
            Self::MethodDependent => matches!(method, Method::Get | Method::Put | Method::Delete),
            Self::QueryString => true,
            Self::HttpBody => false,
        }
    }
}

/// How request parameters are encoded.
#[derive(Clone)]
pub enum ParameterEncoding {
    /// JSON object body.
    Json,
    /// URL-encoded query string or form body.
    Url {
        /// Where the encoded parameters go.
        destination: UrlEncodingDestination,
    },
    /// The listed keys go in the query string, the rest in a JSON body.
    UrlAndJson {
        /// Keys encoded into the query string.
        url_keys: BTreeSet<String>,
    },
    /// The array stored under [`JSON_ARRAY_KEY`] is the JSON body.
    JsonArray,
    /// A caller-supplied encoder.
    Custom(CustomEncoder),
}

impl ParameterEncoding {
    /// URL encoding with the method-dependent destination.
    #[must_use]
    pub fn url() -> Self {
        Self::Url {
            destination: UrlEncodingDestination::MethodDependent,
        }
    }

    /// Default encoding for `method`: URL for GET, JSON otherwise.
    #[must_use]
    pub fn default_for(method: Method) -> Self {
        if method == Method::Get {
            Self::url()
        } else {
            Self::Json
        }
    }

    /// Builds a [`ParameterEncoding::UrlAndJson`] from key names.
    #[must_use]
    pub fn url_and_json<I, S>(url_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::UrlAndJson {
            url_keys: url_keys.into_iter().map(Into::into).collect(),
        }
    }

    /// Wraps a custom encoder.
    #[must_use]
    pub fn custom<F>(encoder: F) -> Self
    where
        F: Fn(&mut TransportRequest, &Map<String, Value>) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Self::Custom(Arc::new(encoder))
    }
}

impl fmt::Debug for ParameterEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("Json"),
            Self::Url { destination } => f.debug_struct("Url").field("destination", destination).finish(),
            Self::UrlAndJson { url_keys } => {
                f.debug_struct("UrlAndJson").field("url_keys", url_keys).finish()
            }
            Self::JsonArray => f.write_str("JsonArray"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Flattens a JSON value into URL-encoded pairs.
///
/// Arrays become `key[]=v` pairs, objects `key[sub]=v`, booleans `true` or
/// `false`; `null` values are dropped.
pub(crate) fn query_pairs(key: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Null => {}
        Value::Bool(b) => out.push((key.to_string(), b.to_string())),
        Value::Number(n) => out.push((key.to_string(), n.to_string())),
        Value::String(s) => out.push((key.to_string(), s.clone())),
        Value::Array(items) => {
            let nested = format!("{key}[]");
            for item in items {
                query_pairs(&nested, item, out);
            }
        }
        Value::Object(fields) => {
            for (sub, item) in fields {
                query_pairs(&format!("{key}[{sub}]"), item, out);
            }
        }
    }
}
