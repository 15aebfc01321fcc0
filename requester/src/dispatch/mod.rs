//! Coalesced network dispatch.

mod dispatcher;
mod key;

pub use dispatcher::{DispatchId, DispatchOutcome, Dispatcher};
pub use key::{DispatchKey, RequestIdentity};
