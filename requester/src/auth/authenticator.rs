//! The authenticator contract.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::transport::{ResponseMetadata, TransportRequest};

/// Opaque identifier of the token a request was signed with.
pub type TokenId = String;

/// Errors raised while signing a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthenticationError {
    /// There is no token to sign the request with.
    #[error("no token available")]
    MissingToken,
}

/// Signs requests and refreshes the token it signs them with.
///
/// An authenticator is shared by every request of a backend, so all methods
/// take `&self` and implementations keep their token behind interior
/// mutability.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Signs `request` with the current token.
    ///
    /// Returns the identifier of the token used, or `None` if the token has
    /// no stable identity.
    async fn authenticate(
        &self,
        request: &mut TransportRequest,
    ) -> Result<Option<TokenId>, AuthenticationError>;

    /// Obtains a fresh token.
    async fn fetch_token(&self) -> anyhow::Result<()>;

    /// Decides whether a response means the token must be refreshed.
    fn should_refresh_token(&self, metadata: &ResponseMetadata, _body: &Bytes) -> bool {
        metadata.status_code == 401
    }

    /// Identity used to coalesce refreshes when no token id is known.
    fn identity(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}
