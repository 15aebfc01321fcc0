//! Authentication and coordinated token refresh.

mod authenticator;
mod refresh;

pub use authenticator::{AuthenticationError, Authenticator, TokenId};
pub use refresh::{RefreshKey, TokenRefreshCoordinator};
