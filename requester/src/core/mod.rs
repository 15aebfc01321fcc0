//! Core value types shared across the crate.
//!
//! This module provides:
//! - HTTP methods
//! - Pipeline stages used for failure attribution

mod method;
mod stage;

pub use method::Method;
pub use stage::PipelineStage;
