//! Testing utilities for requester pipelines.
//!
//! This module provides:
//! - A scripted transport and an authenticator with controllable tokens
//! - A configurable request fixture
//! - Assertions for pipeline failures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_failed_at, assert_failed_with};
pub use fixtures::{TestRequest, DEFAULT_BASE_URL};
pub use mocks::{MockAuthenticator, MockTransport};
