//! Response body decoding.

use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Deserializer, Serialize};

/// Decodes JSON response bodies.
///
/// An empty body decodes as JSON `null`, so `()`, `Option<T>` and
/// [`EmptyResponse`] succeed on `204 No Content`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataDecoder {
    reject_empty: bool,
}

impl DataDecoder {
    /// Creates the default decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder that fails on empty bodies.
    #[must_use]
    pub fn rejecting_empty() -> Self {
        Self { reject_empty: true }
    }

    /// Decodes `body` as `T`.
    pub fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> anyhow::Result<T> {
        if body.iter().all(u8::is_ascii_whitespace) {
            if self.reject_empty {
                anyhow::bail!("response body is empty");
            }
            return Ok(serde_json::from_value(serde_json::Value::Null)?);
        }
        Ok(serde_json::from_slice(body)?)
    }
}

/// A response whose body is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EmptyResponse;

impl<'de> Deserialize<'de> for EmptyResponse {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        IgnoredAny::deserialize(deserializer)?;
        Ok(Self)
    }
}
