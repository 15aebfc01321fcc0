//! The request execution pipeline.
//!
//! `perform` runs a request through the ordered stages
//! Mapping, RequestProcessing, Authenticating, Dispatching,
//! ResponseProcessing, AuthorizationValidation, StatusValidation, Decoding
//! and ResultMapping. When authentication fails with a missing or rejected
//! token, the pipeline fails every other in-flight dispatch signed with that
//! token, joins the single coordinated refresh for it, and reruns from
//! Authenticating exactly once.

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, info};

use super::attempt::PipelineAttempt;
use super::config::RequesterConfig;
use crate::auth::{AuthenticationError, TokenRefreshCoordinator};
use crate::cache::{CacheLifetime, MemoryCache};
use crate::core::PipelineStage;
use crate::dispatch::{Dispatcher, RequestIdentity};
use crate::errors::{ErrorKind, RequestError};
use crate::events::{
    ActivityObserver, ActivityStore, LoggingActivityObserver, ObserverRegistry, PipelineReport,
    Subscription,
};
use crate::request::{ApiRequest, Backend, DataDecoder, RequestMapper};
use crate::transport::{ResponseMetadata, Transport, TransportRequest, TransportResponse};

/// Builder for [`Requester`].
///
/// Every collaborator defaults to a fresh instance. Pass shared `Arc`s to
/// let several requesters coalesce dispatches or refreshes together.
pub struct RequesterBuilder {
    transport: Arc<dyn Transport>,
    dispatcher: Option<Arc<Dispatcher>>,
    refresher: Option<Arc<TokenRefreshCoordinator>>,
    cache: Option<Arc<MemoryCache>>,
    decoder: DataDecoder,
    config: RequesterConfig,
}

impl RequesterBuilder {
    /// Starts a builder with the default transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            dispatcher: None,
            refresher: None,
            cache: None,
            decoder: DataDecoder::default(),
            config: RequesterConfig::default(),
        }
    }

    /// Uses a shared dispatcher.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Uses a shared refresh coordinator.
    #[must_use]
    pub fn refresh_coordinator(mut self, refresher: Arc<TokenRefreshCoordinator>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Uses a shared cache.
    #[must_use]
    pub fn cache(mut self, cache: Arc<MemoryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the body decoder.
    #[must_use]
    pub fn decoder(mut self, decoder: DataDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    /// Applies configuration.
    #[must_use]
    pub fn config(mut self, config: RequesterConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the requester.
    #[must_use]
    pub fn build(self) -> Requester {
        let dispatcher = self.dispatcher.unwrap_or_default();

        if self.config.log_activity {
            dispatcher
                .observers()
                .subscribe(Arc::new(LoggingActivityObserver::default()));
        }
        let activity = self.config.max_activity_items.map(|max_items| {
            let store = Arc::new(ActivityStore::new(max_items));
            dispatcher.observers().subscribe(store.clone());
            store
        });

        Requester {
            transport: self.transport,
            dispatcher,
            refresher: self.refresher.unwrap_or_default(),
            cache: self.cache.unwrap_or_default(),
            mapper: RequestMapper::new(),
            decoder: self.decoder,
            activity,
        }
    }
}

/// Executes [`ApiRequest`]s.
pub struct Requester {
    transport: Arc<dyn Transport>,
    dispatcher: Arc<Dispatcher>,
    refresher: Arc<TokenRefreshCoordinator>,
    cache: Arc<MemoryCache>,
    mapper: RequestMapper,
    decoder: DataDecoder,
    activity: Option<Arc<ActivityStore>>,
}

impl Requester {
    /// Creates a requester with default collaborators.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::builder(transport).build()
    }

    /// Starts a builder.
    #[must_use]
    pub fn builder(transport: Arc<dyn Transport>) -> RequesterBuilder {
        RequesterBuilder::new(transport)
    }

    /// Performs `request` and returns its decoded response.
    ///
    /// Concurrent identical requests share one transport call. A rejected
    /// or missing token is refreshed once and the request retried once;
    /// the retry is invisible except as latency.
    pub async fn perform<R>(&self, request: &R) -> Result<R::Response, RequestError>
    where
        R: ApiRequest + ?Sized,
    {
        self.perform_mapped(request, Ok).await
    }

    /// Performs `request` and maps the decoded response with `mapper`.
    ///
    /// A mapper failure is reported as [`ErrorKind::ResultMapping`].
    pub async fn perform_mapped<R, M, F>(&self, request: &R, mapper: F) -> Result<M, RequestError>
    where
        R: ApiRequest + ?Sized,
        F: FnOnce(R::Response) -> anyhow::Result<M>,
    {
        let backend = request.backend();
        let mut attempt = PipelineAttempt::first();

        let result = match self.execute_pipeline(request, &backend, &mut attempt).await {
            Ok(response) => {
                attempt.enter(PipelineStage::ResultMapping);
                mapper(response).map_err(|error| {
                    let error = RequestError::from_hook(ErrorKind::ResultMapping, error)
                        .at_stage(PipelineStage::ResultMapping);
                    match attempt.dispatch_id {
                        Some(dispatch_id) => error.with_dispatch_id(dispatch_id),
                        None => error,
                    }
                })
            }
            Err(error) => Err(error),
        };

        self.report(&attempt, result.as_ref().err());
        result
    }

    /// Like [`Requester::perform`], consulting the memory cache first.
    pub async fn perform_cached<R>(
        &self,
        request: &R,
        lifetime: CacheLifetime,
    ) -> Result<R::Response, RequestError>
    where
        R: ApiRequest + ?Sized,
        R::Response: Clone + Sync,
    {
        self.perform_cached_mapped(request, lifetime, Ok).await
    }

    /// Like [`Requester::perform_mapped`], consulting the memory cache first.
    ///
    /// Entries are keyed by the identity of the unsigned request and the
    /// mapped type, and tagged with the request's caching groups.
    pub async fn perform_cached_mapped<R, M, F>(
        &self,
        request: &R,
        lifetime: CacheLifetime,
        mapper: F,
    ) -> Result<M, RequestError>
    where
        R: ApiRequest + ?Sized,
        M: Clone + Send + Sync + 'static,
        F: FnOnce(R::Response) -> anyhow::Result<M>,
    {
        // A mapping failure falls through so the pipeline reports it.
        let identity = self
            .mapper
            .map(request)
            .ok()
            .map(|mapped| RequestIdentity::from_request(&mapped));

        if let Some(ref identity) = identity {
            if let Some(hit) = self.cache.get::<M>(identity, lifetime) {
                debug!(key = %identity.fingerprint(), "Cache hit");
                return Ok(hit);
            }
        }

        let value = self.perform_mapped(request, mapper).await?;
        if let Some(ref identity) = identity {
            self.cache
                .store(identity, value.clone(), lifetime, request.caching_groups());
        }
        Ok(value)
    }

    /// Fails every in-flight dispatch signed with `token_id`.
    pub fn invalidate_token(&self, token_id: &str) -> usize {
        self.dispatcher.throw_requests(&token_id.to_string())
    }

    /// Fails every in-flight dispatch and clears the cache.
    pub fn reset(&self) -> usize {
        self.cache.clear();
        self.dispatcher.throw_all_requests(
            RequestError::unauthorized()
                .at_stage(PipelineStage::Dispatching)
                .with_message("requester was reset"),
        )
    }

    /// Subscribes an activity observer.
    pub fn subscribe(&self, observer: Arc<dyn ActivityObserver>) -> Subscription {
        self.dispatcher.observers().subscribe(observer)
    }

    /// Removes an activity observer.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        self.dispatcher.observers().unsubscribe(subscription)
    }

    /// Returns the observer registry.
    #[must_use]
    pub fn observers(&self) -> &ObserverRegistry {
        self.dispatcher.observers()
    }

    /// Returns the activity store, if enabled in the configuration.
    #[must_use]
    pub fn activity_store(&self) -> Option<&Arc<ActivityStore>> {
        self.activity.as_ref()
    }

    /// Returns the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Returns the cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<MemoryCache> {
        &self.cache
    }

    async fn execute_pipeline<R>(
        &self,
        request: &R,
        backend: &Backend,
        attempt: &mut PipelineAttempt,
    ) -> Result<R::Response, RequestError>
    where
        R: ApiRequest + ?Sized,
    {
        let prepared = self.prepare(request, backend, attempt).await?;
        let transport = backend
            .transport()
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.transport));

        let error = match self
            .execute(request, backend, &prepared, &transport, attempt)
            .await
        {
            Err(error) if error.is_auth_recoverable() => error,
            other => return other,
        };
        let Some(authenticator) = backend.authenticator().cloned() else {
            return Err(error);
        };

        let stale = error
            .invalidated_token()
            .cloned()
            .or_else(|| attempt.token_id.clone());
        self.report(attempt, Some(&error));

        if let Some(ref token_id) = stale {
            self.dispatcher.throw_requests(token_id);
        }

        info!(
            token_id = ?stale,
            stage = %error.stage.unwrap_or(attempt.stage),
            dispatch_id = ?attempt.dispatch_id,
            "Token rejected; refreshing before retry"
        );
        *attempt = attempt.retry();
        self.refresher.refresh(authenticator, stale.as_ref()).await?;

        info!(attempt = attempt.number, "Retrying request after token refresh");
        self.execute(request, backend, &prepared, &transport, attempt)
            .await
    }

    async fn prepare<R>(
        &self,
        request: &R,
        backend: &Backend,
        attempt: &mut PipelineAttempt,
    ) -> Result<TransportRequest, RequestError>
    where
        R: ApiRequest + ?Sized,
    {
        attempt.enter(PipelineStage::Mapping);
        let mut mapped = self.mapper.map(request)?;

        attempt.enter(PipelineStage::RequestProcessing);
        for processor in backend.request_processors() {
            processor.process(&mut mapped).await.map_err(|error| {
                RequestError::from_hook(ErrorKind::RequestProcessing, error)
                    .at_stage(PipelineStage::RequestProcessing)
            })?;
        }

        Ok(mapped)
    }

    async fn execute<R>(
        &self,
        request: &R,
        backend: &Backend,
        prepared: &TransportRequest,
        transport: &Arc<dyn Transport>,
        attempt: &mut PipelineAttempt,
    ) -> Result<R::Response, RequestError>
    where
        R: ApiRequest + ?Sized,
    {
        attempt.enter(PipelineStage::Authenticating);
        let mut signed = prepared.clone();
        if let Some(authenticator) = backend.authenticator() {
            attempt.token_id = authenticator
                .authenticate(&mut signed)
                .await
                .map_err(|error| match error {
                    AuthenticationError::MissingToken => {
                        RequestError::missing_token().at_stage(PipelineStage::Authenticating)
                    }
                })?;
        }

        attempt.enter(PipelineStage::Dispatching);
        let outcome = self
            .dispatcher
            .dispatch(signed, attempt.token_id.clone(), Arc::clone(transport))
            .await;
        attempt.dispatch_id = Some(outcome.dispatch_id);
        debug!(
            dispatch_id = %outcome.dispatch_id,
            leader = outcome.leader,
            attempt = attempt.number,
            "Dispatch finished"
        );

        let response = outcome.result?;
        self.process_response(request, backend, response, attempt)
            .await
            .map_err(|error| error.with_dispatch_id(outcome.dispatch_id))
    }

    async fn process_response<R>(
        &self,
        request: &R,
        backend: &Backend,
        response: TransportResponse,
        attempt: &mut PipelineAttempt,
    ) -> Result<R::Response, RequestError>
    where
        R: ApiRequest + ?Sized,
    {
        let TransportResponse { metadata, body } = response;
        let status_code = metadata.status_code;

        attempt.enter(PipelineStage::ResponseProcessing);
        for processor in backend.response_processors() {
            processor.process(&metadata, &body).await.map_err(|error| {
                RequestError::from_hook(ErrorKind::ResponseProcessing, error)
                    .at_stage(PipelineStage::ResponseProcessing)
                    .with_status_code(status_code)
            })?;
        }

        attempt.enter(PipelineStage::AuthorizationValidation);
        Self::validate_authorization(backend, attempt, &metadata, &body)?;

        attempt.enter(PipelineStage::StatusValidation);
        if !request.status_validation().is_valid(status_code) {
            return Err(RequestError::invalid_status_code(status_code)
                .at_stage(PipelineStage::StatusValidation));
        }

        attempt.enter(PipelineStage::Decoding);
        request.decode(&body, &self.decoder).map_err(|error| {
            RequestError::from_hook(ErrorKind::DecodingFailed, error)
                .at_stage(PipelineStage::Decoding)
                .with_status_code(status_code)
        })
    }

    fn validate_authorization(
        backend: &Backend,
        attempt: &PipelineAttempt,
        metadata: &ResponseMetadata,
        body: &Bytes,
    ) -> Result<(), RequestError> {
        let refresh = backend
            .authenticator()
            .is_some_and(|authenticator| authenticator.should_refresh_token(metadata, body));

        let error = if refresh {
            match attempt.token_id {
                Some(ref token_id) => RequestError::token_invalidated(token_id.clone()),
                None => RequestError::missing_token(),
            }
        } else if metadata.status_code == 401 {
            RequestError::unauthorized()
        } else {
            return Ok(());
        };

        Err(error
            .at_stage(PipelineStage::AuthorizationValidation)
            .with_status_code(metadata.status_code))
    }

    fn report(&self, attempt: &PipelineAttempt, error: Option<&RequestError>) {
        self.dispatcher.observers().pipeline_finished(&PipelineReport {
            dispatch_id: attempt.dispatch_id,
            previous_dispatch_id: attempt.previous_dispatch_id,
            attempt: attempt.number,
            failed_stage: error.map(|error| error.stage.unwrap_or(attempt.stage)),
            error: error.cloned(),
        });
    }
}

impl std::fmt::Debug for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Requester")
            .field("dispatcher", &self.dispatcher)
            .field("cache", &self.cache)
            .field("activity", &self.activity.is_some())
            .finish_non_exhaustive()
    }
}
