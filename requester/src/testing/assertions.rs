//! Test assertions for request results.

use std::fmt::Debug;

use crate::core::PipelineStage;
use crate::errors::{ErrorKind, RequestError};

/// Asserts that the result failed with `kind`.
pub fn assert_failed_with<T: Debug>(result: &Result<T, RequestError>, kind: &ErrorKind) {
    match result {
        Ok(value) => panic!("Expected failure {kind:?}, got success: {value:?}"),
        Err(error) => assert_eq!(
            &error.kind, kind,
            "Expected failure {kind:?}, got {error}"
        ),
    }
}

/// Asserts that the result failed during `stage`.
pub fn assert_failed_at<T: Debug>(result: &Result<T, RequestError>, stage: PipelineStage) {
    match result {
        Ok(value) => panic!("Expected failure at {stage}, got success: {value:?}"),
        Err(error) => assert_eq!(
            error.stage,
            Some(stage),
            "Expected failure at {stage}, got {error}"
        ),
    }
}
