//! Core HTTP dispatcher with auth injection, retry, and lifecycle events.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::config::ClientConfig;
use crate::credentials::{BearerToken, Credential};
use crate::error::{ApiError, Error, ErrorKind, FailureClass, Result};
use crate::events::{
    AuthFailureEvent, ErrorEvent, Event, EventBus, RateLimitEvent, RequestCompleteEvent,
    RequestStartEvent,
};
use crate::rate_limit::RateLimitTracker;
use crate::request::RequestDescriptor;
use crate::response::Response;
use crate::retry::RetryScheduler;

/// HTTP client for the Planning Center API.
///
/// Every request goes through [`execute`](Self::execute), which injects the
/// bearer token, classifies the response, refreshes OAuth credentials once on
/// a 401, and retries transient failures per the [`RetryScheduler`].
/// Clones share the credential, the rate-limit tracker and the event bus.
#[derive(Debug, Clone)]
pub struct PcoHttpClient {
    inner: reqwest::Client,
    config: ClientConfig,
    base_url: Url,
    credential: Credential,
    scheduler: RetryScheduler,
    rate_limits: Arc<RateLimitTracker>,
    events: Arc<EventBus>,
}

impl PcoHttpClient {
    /// Create a new HTTP client.
    ///
    /// Hooks in `config.events` are registered on a fresh bus.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let events = Arc::new(EventBus::new());
        config.events.bind(&events);
        Self::with_event_bus(config, events)
    }

    /// Create a client that publishes to an existing bus.
    pub fn with_event_bus(config: ClientConfig, events: Arc<EventBus>) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::with_source(ErrorKind::Config(e.to_string()), e))?;

        let base_url = Url::parse(&config.base_url)?;

        Ok(Self {
            inner,
            credential: config.credential(),
            scheduler: RetryScheduler::new(config.retry.clone()),
            base_url,
            config,
            rate_limits: Arc::new(RateLimitTracker::new()),
            events,
        })
    }

    /// Get the client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn rate_limits(&self) -> &Arc<RateLimitTracker> {
        &self.rate_limits
    }

    pub fn scheduler(&self) -> &RetryScheduler {
        &self.scheduler
    }

    /// Absolute URL for an endpoint path or an already absolute link.
    pub fn resolve_url(&self, endpoint: &str) -> Result<Url> {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return Ok(Url::parse(endpoint)?);
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let path = endpoint.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/{path}"))?)
    }

    /// Execute a request with auth injection, refresh and retry handling.
    ///
    /// Returns the 2xx response, or the error of the last attempt once the
    /// failure is fatal or retries are exhausted.
    #[instrument(
        skip(self, request),
        fields(
            method = %request.method,
            endpoint = %request.endpoint,
            request_id = %request.request_id
        )
    )]
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<Response> {
        let url = self.resolve_url(&request.endpoint)?;

        let mut attempt: u32 = 0;
        let mut retries: u32 = 0;
        let mut refreshed = false;

        loop {
            attempt += 1;
            self.throttle().await;

            let bearer = self.credential.bearer();
            self.emit_request_start(request, attempt);

            let err = match self.execute_once(&url, request, &bearer).await {
                Ok(response) if response.is_success() => return Ok(response),
                Ok(response) => self.classify_failure(response),
                Err(err) => err,
            };

            let Some(class) = err.failure_class() else {
                return Err(self.fail(request, err, attempt));
            };

            if class == FailureClass::AuthExpired {
                match self.recover_auth(request, &bearer, refreshed).await {
                    Ok(()) => {
                        refreshed = true;
                        continue;
                    }
                    Err(message) => {
                        self.emit_auth_failure(request, &message);
                        let err = if refreshed || !self.credential.can_refresh() {
                            err
                        } else {
                            Error::new(ErrorKind::Authentication(message))
                        };
                        return Err(self.fail(request, err, attempt));
                    }
                }
            }

            retries += 1;
            if !self.scheduler.should_retry(retries, class) {
                return Err(self.fail(request, err, attempt));
            }

            let delay = self.scheduler.wait_for(retries, err.retry_after());
            warn!(
                attempt,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Execute a single attempt without retry logic.
    ///
    /// The body is read before returning, so the configured timeout covers
    /// the whole exchange.
    async fn execute_once(
        &self,
        url: &Url,
        request: &RequestDescriptor,
        bearer: &BearerToken,
    ) -> Result<Response> {
        let mut url = url.clone();
        if !request.query_params.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query_params);
        }

        let mut req = self
            .inner
            .request(request.method.to_reqwest(), url.as_str())
            .bearer_auth(&bearer.token);

        for (name, value) in &self.config.headers {
            req = req.header(name.as_str(), value.as_str());
        }
        for (name, value) in &request.headers {
            req = req.header(name.as_str(), value.as_str());
        }

        if let Some(ref body) = request.body {
            req = req.json(body);
        }

        if self.config.enable_tracing {
            debug!(method = %request.method, url = %url, "Sending request");
        }

        let started = Instant::now();
        let response = req.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        let duration = started.elapsed();

        if self.config.enable_tracing {
            if (200..300).contains(&status) {
                debug!(status, content_length = body.len(), "Response received");
            } else {
                info!(status, content_length = body.len(), "Non-success response");
            }
        }

        let parsed = self.rate_limits.observe(&headers);

        if status == 429 {
            self.events.emit(&Event::RateLimit(RateLimitEvent {
                request_id: request.request_id,
                endpoint: request.endpoint.clone(),
                snapshot: self.rate_limits.snapshot(),
                retry_after: parsed.retry_after,
                timestamp: Utc::now(),
            }));
        } else {
            self.events.emit(&Event::RequestComplete(RequestCompleteEvent {
                request_id: request.request_id,
                method: request.method,
                endpoint: request.endpoint.clone(),
                status,
                duration,
                timestamp: Utc::now(),
            }));
        }

        Ok(Response::new(status, headers, body))
    }

    /// Turn a non-2xx response into a structured error.
    fn classify_failure(&self, response: Response) -> Error {
        let retry_after =
            crate::rate_limit::RateLimitHeaders::parse(response.headers()).retry_after;
        let api = ApiError::from_body(
            response.status(),
            response.bytes(),
            self.rate_limits.snapshot(),
            retry_after,
        );
        Error::new(ErrorKind::Api(api))
    }

    /// Refresh after a 401. `Err` carries the reason the credential could
    /// not be recovered.
    async fn recover_auth(
        &self,
        request: &RequestDescriptor,
        bearer: &BearerToken,
        already_refreshed: bool,
    ) -> std::result::Result<(), String> {
        if !self.credential.can_refresh() {
            return Err("personal access token was rejected".to_string());
        }
        if already_refreshed {
            return Err("credentials rejected after token refresh".to_string());
        }

        debug!(request_id = %request.request_id, "Access token rejected, refreshing");
        self.credential
            .refresh(bearer)
            .await
            .map(|_| ())
            .map_err(|e| e.to_string())
    }

    /// Wait out an exhausted rate-limit window before sending.
    async fn throttle(&self) {
        if !self.config.preemptive_throttling {
            return;
        }
        if let Some(delay) = self.rate_limits.throttle_delay() {
            debug!(
                delay_ms = delay.as_millis() as u64,
                "Rate limit exhausted, waiting before send"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Emit `error` and hand back the error to return.
    fn fail(&self, request: &RequestDescriptor, err: Error, attempts: u32) -> Error {
        if self.config.enable_tracing {
            info!(attempts, error = %err, "Request failed");
        }
        self.events.emit(&Event::Error(ErrorEvent {
            request_id: request.request_id,
            method: request.method,
            endpoint: request.endpoint.clone(),
            status: err.status(),
            class: err.failure_class(),
            message: err.to_string(),
            attempts,
            timestamp: Utc::now(),
        }));
        err
    }

    fn emit_request_start(&self, request: &RequestDescriptor, attempt: u32) {
        self.events.emit(&Event::RequestStart(RequestStartEvent {
            request_id: request.request_id,
            method: request.method,
            endpoint: request.endpoint.clone(),
            attempt,
            timestamp: Utc::now(),
        }));
    }

    fn emit_auth_failure(&self, request: &RequestDescriptor, message: &str) {
        self.events.emit(&Event::AuthFailure(AuthFailureEvent {
            request_id: request.request_id,
            endpoint: request.endpoint.clone(),
            message: message.to_string(),
            timestamp: Utc::now(),
        }));
    }
}
