//! Coalesced token refresh.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;

use super::authenticator::{Authenticator, TokenId};
use crate::coalescing::Coalescer;
use crate::core::PipelineStage;
use crate::errors::{ErrorKind, RequestError};

/// What a refresh is coalesced on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum RefreshKey {
    /// The stale token.
    Token(TokenId),
    /// The authenticator, when no token id is known.
    Authenticator(String),
}

impl RefreshKey {
    /// Builds the key for refreshing `token_id` on `authenticator`.
    #[must_use]
    pub fn for_token(authenticator: &dyn Authenticator, token_id: Option<&TokenId>) -> Self {
        match token_id {
            Some(token_id) => Self::Token(token_id.clone()),
            None => Self::Authenticator(authenticator.identity()),
        }
    }
}

impl fmt::Display for RefreshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token(token_id) => write!(f, "token:{token_id}"),
            Self::Authenticator(identity) => write!(f, "authenticator:{identity}"),
        }
    }
}

/// Guarantees one token fetch per stale token, however many callers ask.
#[derive(Debug)]
pub struct TokenRefreshCoordinator {
    refreshes: Coalescer<RefreshKey, Result<(), RequestError>>,
}

impl Default for TokenRefreshCoordinator {
    fn default() -> Self {
        Self {
            refreshes: Coalescer::new().with_panic_handler(|panic| {
                Err(RequestError::new(ErrorKind::RefreshFailed)
                    .at_stage(PipelineStage::Authenticating)
                    .with_source(panic))
            }),
        }
    }
}

impl TokenRefreshCoordinator {
    /// Creates a coordinator with no refresh in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes the token, joining an in-flight refresh for the same key.
    ///
    /// Every caller joining the same refresh receives its single outcome.
    /// A fetch failure is reported as [`ErrorKind::RefreshFailed`].
    pub async fn refresh(
        &self,
        authenticator: Arc<dyn Authenticator>,
        token_id: Option<&TokenId>,
    ) -> Result<(), RequestError> {
        let key = RefreshKey::for_token(authenticator.as_ref(), token_id);

        self.refreshes
            .dispatch(key, move |key, operation_id| {
                info!(key = %key, operation_id = %operation_id, "Refreshing token");
                let key = key.clone();
                async move {
                    match authenticator.fetch_token().await {
                        Ok(()) => {
                            info!(key = %key, "Token refreshed");
                            Ok(())
                        }
                        Err(error) => {
                            info!(key = %key, error = %error, "Token refresh failed");
                            Err(RequestError::from_hook(ErrorKind::RefreshFailed, error)
                                .at_stage(PipelineStage::Authenticating))
                        }
                    }
                }
            })
            .await
    }

    /// Returns true if a refresh for `key` is in flight.
    #[must_use]
    pub fn is_refreshing(&self, key: &RefreshKey) -> bool {
        self.refreshes.is_in_flight(key)
    }

    /// Fails every in-flight refresh with `error`.
    pub fn cancel_all(&self, error: RequestError) -> usize {
        self.refreshes.invalidate_all(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAuthenticator;
    use crate::transport::TransportRequest;
    use async_trait::async_trait;
    use futures::future::join_all;
    use std::time::Duration;

    #[derive(Debug)]
    struct PanickingAuthenticator;

    #[async_trait]
    impl Authenticator for PanickingAuthenticator {
        async fn authenticate(
            &self,
            _request: &mut TransportRequest,
        ) -> Result<Option<TokenId>, crate::auth::AuthenticationError> {
            Ok(None)
        }

        async fn fetch_token(&self) -> anyhow::Result<()> {
            panic!("token store corrupted")
        }
    }

    #[tokio::test]
    async fn test_panicking_fetch_fails_refresh_and_frees_key() {
        let coordinator = TokenRefreshCoordinator::new();
        let stale = "token-1".to_string();

        let result = tokio::time::timeout(
            Duration::from_millis(300),
            coordinator.refresh(Arc::new(PanickingAuthenticator), Some(&stale)),
        )
        .await
        .unwrap();

        let error = result.unwrap_err();
        assert_eq!(error.kind, ErrorKind::RefreshFailed);
        assert_eq!(error.stage, Some(PipelineStage::Authenticating));
        assert!(error.to_string().contains("token store corrupted"));

        let auth = Arc::new(MockAuthenticator::new());
        coordinator.refresh(auth.clone(), Some(&stale)).await.unwrap();
        assert_eq!(auth.fetch_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refreshes_share_one_fetch() {
        let coordinator = Arc::new(TokenRefreshCoordinator::new());
        let auth = Arc::new(MockAuthenticator::new().with_fetch_delay(Duration::from_millis(50)));
        let stale = "token-1".to_string();

        let results = join_all((0..32).map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let auth: Arc<dyn Authenticator> = auth.clone();
            let stale = stale.clone();
            async move { coordinator.refresh(auth, Some(&stale)).await }
        }))
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(auth.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_distinct_tokens_refresh_separately() {
        let coordinator = TokenRefreshCoordinator::new();
        let auth = Arc::new(MockAuthenticator::new().with_fetch_delay(Duration::from_millis(20)));
        let a = "a".to_string();
        let b = "b".to_string();

        let (first, second) = tokio::join!(
            coordinator.refresh(auth.clone(), Some(&a)),
            coordinator.refresh(auth.clone(), Some(&b)),
        );

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(auth.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_refresh_without_token_id_coalesces_on_identity() {
        let coordinator = TokenRefreshCoordinator::new();
        let auth = Arc::new(MockAuthenticator::new().with_fetch_delay(Duration::from_millis(20)));

        let (first, second) = tokio::join!(
            coordinator.refresh(auth.clone(), None),
            coordinator.refresh(auth.clone(), None),
        );

        assert!(first.is_ok() && second.is_ok());
        assert_eq!(auth.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_refresh_reaches_every_caller() {
        let coordinator = TokenRefreshCoordinator::new();
        let auth = Arc::new(
            MockAuthenticator::new()
                .with_fetch_delay(Duration::from_millis(20))
                .with_failing_fetch(true),
        );
        let stale = "token-1".to_string();

        let (first, second) = tokio::join!(
            coordinator.refresh(auth.clone(), Some(&stale)),
            coordinator.refresh(auth.clone(), Some(&stale)),
        );

        assert_eq!(first.unwrap_err().kind, ErrorKind::RefreshFailed);
        assert_eq!(second.unwrap_err().kind, ErrorKind::RefreshFailed);
        assert_eq!(auth.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_sequential_refreshes_fetch_again() {
        let coordinator = TokenRefreshCoordinator::new();
        let auth = Arc::new(MockAuthenticator::new());
        let stale = "token-1".to_string();

        coordinator.refresh(auth.clone(), Some(&stale)).await.unwrap();
        coordinator.refresh(auth.clone(), Some(&stale)).await.unwrap();

        assert_eq!(auth.fetch_count(), 2);
    }

    #[test]
    fn test_refresh_key_display() {
        let auth = MockAuthenticator::new();
        assert_eq!(
            RefreshKey::for_token(&auth, Some(&"t".to_string())).to_string(),
            "token:t"
        );
        assert!(matches!(
            RefreshKey::for_token(&auth, None),
            RefreshKey::Authenticator(identity) if identity.ends_with("MockAuthenticator")
        ));
    }
}
