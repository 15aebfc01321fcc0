//! Request coalescing ("singleflight").
//!
//! This module provides:
//! - [`Operation`]: one in-flight unit of work whose single result is shared
//!   by every attached caller
//! - [`Coalescer`]: a keyed registry that hands concurrent callers for the
//!   same key the same operation, and lets any party force-fail a subset
//!
//! The coalescer is generic over key and result type and is used both for
//! transport dispatches and for token refreshes.

mod coalescer;
mod operation;

pub use coalescer::{Attachment, Coalescer};
pub use operation::{Operation, OperationId, ProducerPanic};
