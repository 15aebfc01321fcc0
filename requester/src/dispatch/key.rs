//! Coalescing keys for network calls.

use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

use crate::auth::TokenId;
use crate::core::Method;
use crate::transport::TransportRequest;

/// Equality and hash identity of a transport request.
///
/// Two requests are the same when method, normalized URL, header set and
/// body bytes are equal. Header names compare case-insensitively; header
/// order and URL spelling differences that parse to the same URL do not
/// matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestIdentity {
    method: Method,
    url: String,
    headers: BTreeMap<String, String>,
    body: Bytes,
}

impl RequestIdentity {
    /// Computes the identity of `request`.
    #[must_use]
    pub fn from_request(request: &TransportRequest) -> Self {
        Self {
            method: request.method,
            url: normalize_url(&request.url),
            headers: request
                .headers
                .iter()
                .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
                .collect(),
            body: request.body.clone().unwrap_or_default(),
        }
    }

    /// Returns the method.
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns the normalized URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns a short stable digest suitable for logging.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.method.as_str().as_bytes());
        hasher.update([0]);
        hasher.update(self.url.as_bytes());
        for (name, value) in &self.headers {
            hasher.update([0]);
            hasher.update(name.as_bytes());
            hasher.update(b":");
            hasher.update(value.as_bytes());
        }
        hasher.update([0]);
        hasher.update(&self.body);
        let result = hasher.finalize();
        format!("req:{}", hex::encode(&result[..16]))
    }
}

fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => url.to_string(),
        Err(_) => raw.trim().to_string(),
    }
}

/// Key a dispatch is coalesced on: the request identity plus the token it
/// was signed with.
///
/// Requests signed with different tokens never coalesce.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchKey {
    /// Identity of the signed request.
    pub identity: RequestIdentity,
    /// Token used to sign it.
    pub token_id: Option<TokenId>,
}

impl DispatchKey {
    /// Builds the key for a signed request.
    #[must_use]
    pub fn new(request: &TransportRequest, token_id: Option<TokenId>) -> Self {
        Self {
            identity: RequestIdentity::from_request(request),
            token_id,
        }
    }

    /// Returns true if this dispatch was signed with `token_id`.
    #[must_use]
    pub fn uses_token(&self, token_id: &TokenId) -> bool {
        self.token_id.as_ref() == Some(token_id)
    }
}

impl fmt::Display for DispatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.identity.method, self.identity.fingerprint())?;
        if let Some(ref token_id) = self.token_id {
            write!(f, " token={token_id}")?;
        }
        Ok(())
    }
}
