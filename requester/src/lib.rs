//! # Requester
//!
//! A concurrency-safe HTTP request execution layer.
//!
//! Requester turns a declarative request description into a dispatched
//! network call with support for:
//!
//! - **Request coalescing**: concurrent identical requests share one transmission
//! - **Coordinated token refresh**: one refresh per stale token, one retry per caller
//! - **Staged execution**: failures are attributed to the pipeline stage that raised them
//! - **Activity observation**: subscription-based telemetry for dispatched requests
//! - **In-memory caching**: optional TTL cache keyed by request identity
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use requester::prelude::*;
//!
//! let transport = Arc::new(ReqwestTransport::from_config(&TransportConfig::default())?);
//! let requester = Requester::new(transport);
//!
//! // Concurrent calls with the same identity share one dispatch.
//! let user: User = requester.perform(&GetUser { id: 42, backend }).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod auth;
pub mod cache;
pub mod coalescing;
pub mod core;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod request;
pub mod testing;
pub mod transport;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::auth::{
        AuthenticationError, Authenticator, RefreshKey, TokenId, TokenRefreshCoordinator,
    };
    pub use crate::cache::{CacheLifetime, CachingGroup, MemoryCache};
    pub use crate::coalescing::{Attachment, Coalescer, Operation, OperationId, ProducerPanic};
    pub use crate::core::{Method, PipelineStage};
    pub use crate::dispatch::{DispatchId, DispatchKey, Dispatcher, RequestIdentity};
    pub use crate::errors::{ErrorKind, RequestError, TransportError};
    pub use crate::events::{
        ActivityItem, ActivityObserver, ActivityState, ActivityStore, DispatchReport,
        LoggingActivityObserver, ObserverRegistry, PipelineReport, Subscription,
    };
    pub use crate::pipeline::{
        PipelineAttempt, Requester, RequesterBuilder, RequesterConfig, StatusValidation,
    };
    pub use crate::request::{
        ApiRequest, Backend, DataDecoder, EmptyResponse, ParameterEncoding, RequestMapper,
        RequestProcessor, ResponseProcessor, UrlEncodingDestination,
    };
    #[cfg(feature = "http")]
    pub use crate::transport::ReqwestTransport;
    pub use crate::transport::{
        ResponseMetadata, Transport, TransportConfig, TransportRequest, TransportResponse,
    };
}
