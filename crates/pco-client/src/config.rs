//! Client configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::credentials::{
    Credential, OAuthCredential, RefreshError, RefreshFailureHook, RefreshHook, TokenPair,
    TokenRefresher,
};
use crate::error::{Error, ErrorKind, Result};
use crate::events::{
    AuthFailureEvent, ErrorEvent, EventBus, RateLimitEvent, RequestCompleteEvent,
    RequestStartEvent,
};
use crate::retry::RetryConfig;

/// How the client authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// Personal access token, sent as a bearer token and never refreshed.
    PersonalAccessToken { token: String },
    /// OAuth access/refresh pair.
    OAuth {
        access_token: String,
        refresh_token: String,
    },
}

impl AuthConfig {
    pub fn personal_access_token(token: impl Into<String>) -> Self {
        AuthConfig::PersonalAccessToken {
            token: token.into(),
        }
    }

    pub fn oauth(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        AuthConfig::OAuth {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// `"personal_access_token"` or `"oauth"`.
    pub fn auth_type(&self) -> &'static str {
        match self {
            AuthConfig::PersonalAccessToken { .. } => "personal_access_token",
            AuthConfig::OAuth { .. } => "oauth",
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthConfig::PersonalAccessToken { .. } => f
                .debug_struct("PersonalAccessToken")
                .field("token", &"[REDACTED]")
                .finish(),
            AuthConfig::OAuth { .. } => f
                .debug_struct("OAuth")
                .field("access_token", &"[REDACTED]")
                .field("refresh_token", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Settings for the field-definition cache used by resource modules.
///
/// The core client does not cache anything itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachingConfig {
    pub field_definitions: bool,
    pub ttl: Duration,
    pub max_size: usize,
}

impl Default for CachingConfig {
    fn default() -> Self {
        Self {
            field_definitions: true,
            ttl: Duration::from_secs(300),
            max_size: 1000,
        }
    }
}

impl CachingConfig {
    pub fn disabled() -> Self {
        Self {
            field_definitions: false,
            ..Self::default()
        }
    }
}

type Hook<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Event handlers registered on the client's bus at construction.
#[derive(Clone, Default)]
pub struct EventHooks {
    pub on_error: Option<Hook<ErrorEvent>>,
    pub on_auth_failure: Option<Hook<AuthFailureEvent>>,
    pub on_request_start: Option<Hook<RequestStartEvent>>,
    pub on_request_complete: Option<Hook<RequestCompleteEvent>>,
    pub on_rate_limit: Option<Hook<RateLimitEvent>>,
}

impl std::fmt::Debug for EventHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHooks")
            .field("on_error", &self.on_error.is_some())
            .field("on_auth_failure", &self.on_auth_failure.is_some())
            .field("on_request_start", &self.on_request_start.is_some())
            .field("on_request_complete", &self.on_request_complete.is_some())
            .field("on_rate_limit", &self.on_rate_limit.is_some())
            .finish()
    }
}

impl EventHooks {
    pub fn on_error(mut self, hook: impl Fn(&ErrorEvent) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(hook));
        self
    }

    pub fn on_auth_failure(
        mut self,
        hook: impl Fn(&AuthFailureEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_auth_failure = Some(Arc::new(hook));
        self
    }

    pub fn on_request_start(
        mut self,
        hook: impl Fn(&RequestStartEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_request_start = Some(Arc::new(hook));
        self
    }

    pub fn on_request_complete(
        mut self,
        hook: impl Fn(&RequestCompleteEvent) + Send + Sync + 'static,
    ) -> Self {
        self.on_request_complete = Some(Arc::new(hook));
        self
    }

    pub fn on_rate_limit(mut self, hook: impl Fn(&RateLimitEvent) + Send + Sync + 'static) -> Self {
        self.on_rate_limit = Some(Arc::new(hook));
        self
    }

    /// Register every configured hook on `bus`.
    pub(crate) fn bind(&self, bus: &EventBus) {
        if let Some(hook) = self.on_error.clone() {
            bus.on_error(move |event| hook(event));
        }
        if let Some(hook) = self.on_auth_failure.clone() {
            bus.on_auth_failure(move |event| hook(event));
        }
        if let Some(hook) = self.on_request_start.clone() {
            bus.on_request_start(move |event| hook(event));
        }
        if let Some(hook) = self.on_request_complete.clone() {
            bus.on_request_complete(move |event| hook(event));
        }
        if let Some(hook) = self.on_rate_limit.clone() {
            bus.on_rate_limit(move |event| hook(event));
        }
    }
}

/// Configuration for the client.
#[derive(Clone)]
pub struct ClientConfig {
    /// API root; no trailing slash.
    pub base_url: String,
    pub auth: AuthConfig,
    pub retry: RetryConfig,
    pub caching: CachingConfig,
    pub events: EventHooks,
    /// Per-attempt timeout, covering send and body read.
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Extra headers sent with every request.
    pub headers: Vec<(String, String)>,
    pub user_agent: String,
    /// Whether to enable request/response tracing.
    pub enable_tracing: bool,
    /// Maximum operations in flight during a batch.
    pub batch_concurrency: usize,
    /// Wait before sending while the rate-limit window is exhausted.
    pub preemptive_throttling: bool,
    pub(crate) token_refresher: Option<Arc<dyn TokenRefresher>>,
    pub(crate) on_refresh: Option<RefreshHook>,
    pub(crate) on_refresh_failure: Option<RefreshFailureHook>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("auth", &self.auth)
            .field("retry", &self.retry)
            .field("caching", &self.caching)
            .field("events", &self.events)
            .field("timeout", &self.timeout)
            .field("connect_timeout", &self.connect_timeout)
            .field("headers", &self.headers.len())
            .field("user_agent", &self.user_agent)
            .field("enable_tracing", &self.enable_tracing)
            .field("batch_concurrency", &self.batch_concurrency)
            .field("preemptive_throttling", &self.preemptive_throttling)
            .field("token_refresher", &self.token_refresher.is_some())
            .finish()
    }
}

impl ClientConfig {
    /// Create a new client config builder.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Config with defaults and a personal access token.
    pub fn with_personal_access_token(token: impl Into<String>) -> Self {
        Self::from_auth(AuthConfig::personal_access_token(token))
    }

    fn from_auth(auth: AuthConfig) -> Self {
        Self {
            base_url: crate::DEFAULT_BASE_URL.to_string(),
            auth,
            retry: RetryConfig::default(),
            caching: CachingConfig::default(),
            events: EventHooks::default(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            headers: Vec::new(),
            user_agent: crate::USER_AGENT.to_string(),
            enable_tracing: true,
            batch_concurrency: crate::batch::DEFAULT_CONCURRENCY,
            preemptive_throttling: false,
            token_refresher: None,
            on_refresh: None,
            on_refresh_failure: None,
        }
    }

    /// Build the credential the dispatcher authenticates with.
    pub(crate) fn credential(&self) -> Credential {
        match &self.auth {
            AuthConfig::PersonalAccessToken { token } => Credential::Static(token.clone()),
            AuthConfig::OAuth {
                access_token,
                refresh_token,
            } => {
                let refresher = self
                    .token_refresher
                    .clone()
                    .unwrap_or_else(|| Arc::new(MissingRefresher));
                Credential::OAuth(OAuthCredential::with_hooks(
                    TokenPair::new(access_token.clone(), refresh_token.clone()),
                    refresher,
                    self.on_refresh.clone(),
                    self.on_refresh_failure.clone(),
                ))
            }
        }
    }
}

/// Used when OAuth is configured without a refresher: every refresh fails.
struct MissingRefresher;

impl TokenRefresher for MissingRefresher {
    fn refresh(
        &self,
        _refresh_token: String,
    ) -> futures::future::BoxFuture<'static, std::result::Result<TokenPair, RefreshError>> {
        Box::pin(async { Err(RefreshError::new("no token refresher configured")) })
    }
}

/// Builder for ClientConfig.
#[derive(Default)]
pub struct ClientConfigBuilder {
    base_url: Option<String>,
    auth: Option<AuthConfig>,
    retry: Option<RetryConfig>,
    caching: Option<CachingConfig>,
    events: EventHooks,
    timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    headers: Vec<(String, String)>,
    user_agent: Option<String>,
    enable_tracing: Option<bool>,
    batch_concurrency: Option<usize>,
    preemptive_throttling: bool,
    token_refresher: Option<Arc<dyn TokenRefresher>>,
    on_refresh: Option<RefreshHook>,
    on_refresh_failure: Option<RefreshFailureHook>,
}

impl ClientConfigBuilder {
    /// Set the API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Authenticate with a personal access token.
    pub fn with_personal_access_token(self, token: impl Into<String>) -> Self {
        self.with_auth(AuthConfig::personal_access_token(token))
    }

    /// Authenticate with an OAuth token pair.
    pub fn with_oauth(
        self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        self.with_auth(AuthConfig::oauth(access_token, refresh_token))
    }

    /// Set what exchanges the refresh token after a 401.
    pub fn with_token_refresher(mut self, refresher: impl TokenRefresher + 'static) -> Self {
        self.token_refresher = Some(Arc::new(refresher));
        self
    }

    /// Called with the new pair after each successful refresh.
    pub fn on_refresh(mut self, hook: impl Fn(&TokenPair) + Send + Sync + 'static) -> Self {
        self.on_refresh = Some(Arc::new(hook));
        self
    }

    /// Called once when a refresh fails.
    pub fn on_refresh_failure(
        mut self,
        hook: impl Fn(&RefreshError) + Send + Sync + 'static,
    ) -> Self {
        self.on_refresh_failure = Some(Arc::new(hook));
        self
    }

    /// Set the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Disable retries.
    pub fn without_retry(mut self) -> Self {
        self.retry = Some(RetryConfig::no_retry());
        self
    }

    pub fn with_caching(mut self, caching: CachingConfig) -> Self {
        self.caching = Some(caching);
        self
    }

    pub fn with_events(mut self, events: EventHooks) -> Self {
        self.events = events;
        self
    }

    /// Set per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Add a header sent with every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set custom User-Agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Enable or disable request/response tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = Some(enabled);
        self
    }

    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = Some(concurrency);
        self
    }

    pub fn with_preemptive_throttling(mut self, enabled: bool) -> Self {
        self.preemptive_throttling = enabled;
        self
    }

    /// Build the client configuration.
    ///
    /// Fails when no credentials were given, the base URL does not parse, or
    /// the batch concurrency is zero.
    pub fn build(self) -> Result<ClientConfig> {
        let auth = self.auth.ok_or_else(|| {
            Error::new(ErrorKind::Config("no credentials configured".to_string()))
        })?;

        let mut config = ClientConfig::from_auth(auth);

        if let Some(base_url) = self.base_url {
            config.base_url = base_url.trim_end_matches('/').to_string();
        }
        url::Url::parse(&config.base_url)?;

        if let Some(concurrency) = self.batch_concurrency {
            if concurrency == 0 {
                return Err(Error::new(ErrorKind::Config(
                    "batch concurrency must be at least 1".to_string(),
                )));
            }
            config.batch_concurrency = concurrency;
        }

        if let Some(retry) = self.retry {
            config.retry = retry;
        }
        if let Some(caching) = self.caching {
            config.caching = caching;
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(timeout) = self.connect_timeout {
            config.connect_timeout = timeout;
        }
        if let Some(user_agent) = self.user_agent {
            config.user_agent = user_agent;
        }
        if let Some(enabled) = self.enable_tracing {
            config.enable_tracing = enabled;
        }

        config.events = self.events;
        config.headers = self.headers;
        config.preemptive_throttling = self.preemptive_throttling;
        config.token_refresher = self.token_refresher;
        config.on_refresh = self.on_refresh;
        config.on_refresh_failure = self.on_refresh_failure;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::BackoffStrategy;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_default_config() {
        let config = ClientConfig::with_personal_access_token("pat");
        assert_eq!(config.base_url, "https://api.planningcenteronline.com");
        assert!(config.retry.enabled);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.batch_concurrency, 5);
        assert!(!config.preemptive_throttling);
        assert!(config.caching.field_definitions);
        assert_eq!(config.caching.ttl, Duration::from_secs(300));
        assert_eq!(config.caching.max_size, 1000);
        assert!(config.user_agent.starts_with("pco-api/"));
    }

    #[test]
    fn test_builder() {
        let config = ClientConfig::builder()
            .with_personal_access_token("pat")
            .with_base_url("http://localhost:8080/")
            .with_timeout(Duration::from_secs(60))
            .with_retry(
                RetryConfig::default()
                    .with_max_retries(5)
                    .with_backoff(BackoffStrategy::Linear),
            )
            .with_header("X-PCO-Test", "1")
            .with_batch_concurrency(2)
            .with_user_agent("custom-agent/1.0")
            .build()
            .unwrap();

        assert_eq!(config.base_url, "http://localhost:8080");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.backoff, BackoffStrategy::Linear);
        assert_eq!(config.headers, vec![("X-PCO-Test".to_string(), "1".to_string())]);
        assert_eq!(config.batch_concurrency, 2);
        assert_eq!(config.user_agent, "custom-agent/1.0");
    }

    #[test]
    fn test_without_retry() {
        let config = ClientConfig::builder()
            .with_personal_access_token("pat")
            .without_retry()
            .build()
            .unwrap();
        assert!(!config.retry.enabled);
    }

    #[test]
    fn test_build_requires_auth() {
        let err = ClientConfig::builder().build().unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Config(_)));
    }

    #[test]
    fn test_build_rejects_bad_values() {
        let err = ClientConfig::builder()
            .with_personal_access_token("pat")
            .with_base_url("not a url")
            .build()
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::InvalidUrl(_)));

        let err = ClientConfig::builder()
            .with_personal_access_token("pat")
            .with_batch_concurrency(0)
            .build()
            .unwrap_err();
        assert!(matches!(err.kind, ErrorKind::Config(_)));
    }

    #[test]
    fn test_auth_debug_redacts() {
        let auth = AuthConfig::oauth("secret-access", "secret-refresh");
        let debug = format!("{:?}", auth);
        assert!(!debug.contains("secret"));
        assert_eq!(auth.auth_type(), "oauth");

        let config = ClientConfig::with_personal_access_token("secret-pat");
        assert!(!format!("{:?}", config).contains("secret-pat"));
    }

    #[test]
    fn test_credential_from_auth() {
        let config = ClientConfig::with_personal_access_token("pat");
        let credential = config.credential();
        assert!(!credential.can_refresh());
        assert_eq!(credential.bearer().token, "pat");

        let config = ClientConfig::builder()
            .with_oauth("access", "refresh")
            .build()
            .unwrap();
        let credential = config.credential();
        assert!(credential.can_refresh());
        assert_eq!(credential.bearer().token, "access");
    }

    #[tokio::test]
    async fn test_oauth_without_refresher_fails_refresh() {
        let failures = Arc::new(AtomicU32::new(0));
        let f = failures.clone();
        let config = ClientConfig::builder()
            .with_oauth("access", "refresh")
            .on_refresh_failure(move |_| {
                f.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        let credential = config.credential();
        let stale = credential.bearer();
        assert!(credential.refresh(&stale).await.is_err());
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_event_hooks_bind() {
        let bus = EventBus::new();
        let hooks = EventHooks::default()
            .on_error(|_| {})
            .on_rate_limit(|_| {});
        hooks.bind(&bus);

        assert_eq!(bus.listener_count(crate::events::EventKind::Error), 1);
        assert_eq!(bus.listener_count(crate::events::EventKind::RateLimit), 1);
        assert_eq!(bus.listener_count(crate::events::EventKind::RequestStart), 0);
    }
}
