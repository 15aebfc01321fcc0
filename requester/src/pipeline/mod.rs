//! Request execution pipeline.

mod attempt;
mod config;
mod requester;
mod validation;


pub use attempt::PipelineAttempt;
pub use config::RequesterConfig;
pub use requester::{Requester, RequesterBuilder};
pub use validation::StatusValidation;
