//! Authentication material and single-flight OAuth refresh.
//!
//! A [`Credential`] is either a static personal access token or an OAuth
//! access/refresh pair. The OAuth pair is versioned: every successful
//! refresh replaces it atomically and bumps the version. Requests remember
//! the version they were sent with, so a 401 observed with an already
//! superseded token resolves to the newer token instead of refreshing again.
//!
//! Concurrent 401s share one in-flight refresh future. The refresh hooks run
//! exactly once per refresh, before any waiter resumes. A failed refresh is
//! final for its pair: later 401s on the same version get the recorded error
//! without calling the refresher again, until [`OAuthCredential::set_tokens`]
//! installs a new pair.
//!
//! ## Security
//!
//! Tokens are redacted in all Debug output.

use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{error, info, warn};

/// An OAuth access/refresh token pair.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// A refresh attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("token refresh failed: {message}")]
pub struct RefreshError {
    pub message: String,
}

impl RefreshError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Exchanges a refresh token for a new token pair.
///
/// Implemented by `pco_auth::OAuthClient`, and by any
/// `Fn(String) -> impl Future<Output = Result<TokenPair, RefreshError>>`.
pub trait TokenRefresher: Send + Sync {
    fn refresh(&self, refresh_token: String) -> BoxFuture<'static, Result<TokenPair, RefreshError>>;
}

impl<F, Fut> TokenRefresher for F
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Result<TokenPair, RefreshError>> + Send + 'static,
{
    fn refresh(
        &self,
        refresh_token: String,
    ) -> BoxFuture<'static, Result<TokenPair, RefreshError>> {
        Box::pin(self(refresh_token))
    }
}

/// Called with the new pair after a successful refresh, e.g. to persist it.
pub type RefreshHook = Arc<dyn Fn(&TokenPair) + Send + Sync>;
/// Called once when a refresh fails.
pub type RefreshFailureHook = Arc<dyn Fn(&RefreshError) + Send + Sync>;

/// The bearer value for one attempt, tagged with the credential version.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    pub token: String,
    pub version: u64,
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerToken")
            .field("token", &"[REDACTED]")
            .field("version", &self.version)
            .finish()
    }
}

/// Active authentication material for a client.
#[derive(Clone)]
pub enum Credential {
    /// Personal access token; never refreshed.
    Static(String),
    /// OAuth access/refresh pair.
    OAuth(OAuthCredential),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Static(_) => f.debug_tuple("Static").field(&"[REDACTED]").finish(),
            Credential::OAuth(oauth) => f.debug_tuple("OAuth").field(oauth).finish(),
        }
    }
}

impl Credential {
    pub fn personal_access_token(token: impl Into<String>) -> Self {
        Credential::Static(token.into())
    }

    /// The bearer value to send now.
    pub fn bearer(&self) -> BearerToken {
        match self {
            Credential::Static(token) => BearerToken {
                token: token.clone(),
                version: 0,
            },
            Credential::OAuth(oauth) => oauth.bearer(),
        }
    }

    /// Returns true if a 401 can be recovered by refreshing.
    pub fn can_refresh(&self) -> bool {
        matches!(self, Credential::OAuth(_))
    }

    /// Refresh after a 401 seen with `stale`.
    pub async fn refresh(&self, stale: &BearerToken) -> Result<BearerToken, RefreshError> {
        match self {
            Credential::Static(_) => Err(RefreshError::new(
                "personal access tokens cannot be refreshed",
            )),
            Credential::OAuth(oauth) => oauth.refresh(stale.version).await,
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Result<BearerToken, RefreshError>>>;

struct VersionedPair {
    pair: TokenPair,
    version: u64,
    /// Set when refreshing this version failed.
    failed: Option<RefreshError>,
}

struct OAuthInner {
    state: RwLock<VersionedPair>,
    in_flight: Mutex<Option<SharedRefresh>>,
    refresher: Arc<dyn TokenRefresher>,
    on_refresh: Option<RefreshHook>,
    on_refresh_failure: Option<RefreshFailureHook>,
    refresh_calls: AtomicU64,
}

/// OAuth credential shared by every request of a client.
#[derive(Clone)]
pub struct OAuthCredential {
    inner: Arc<OAuthInner>,
}

impl std::fmt::Debug for OAuthCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredential")
            .field("tokens", &"[REDACTED]")
            .field("version", &self.version())
            .field("refreshing", &self.is_refreshing())
            .finish_non_exhaustive()
    }
}

impl OAuthCredential {
    pub fn new(pair: TokenPair, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self::with_hooks(pair, refresher, None, None)
    }

    pub fn with_hooks(
        pair: TokenPair,
        refresher: Arc<dyn TokenRefresher>,
        on_refresh: Option<RefreshHook>,
        on_refresh_failure: Option<RefreshFailureHook>,
    ) -> Self {
        Self {
            inner: Arc::new(OAuthInner {
                state: RwLock::new(VersionedPair {
                    pair,
                    version: 1,
                    failed: None,
                }),
                in_flight: Mutex::new(None),
                refresher,
                on_refresh,
                on_refresh_failure,
                refresh_calls: AtomicU64::new(0),
            }),
        }
    }

    pub fn bearer(&self) -> BearerToken {
        let state = self.inner.read_state();
        BearerToken {
            token: state.pair.access_token.clone(),
            version: state.version,
        }
    }

    /// Current token pair.
    pub fn tokens(&self) -> TokenPair {
        self.inner.read_state().pair.clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.read_state().version
    }

    /// Number of times the refresher has been invoked.
    pub fn refresh_calls(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.lock_in_flight().is_some()
    }

    /// Install a pair obtained out of band, e.g. after re-authorization.
    ///
    /// Bumps the version and clears a recorded refresh failure.
    pub fn set_tokens(&self, pair: TokenPair) -> BearerToken {
        let mut state = self.inner.write_state();
        state.pair = pair;
        state.version += 1;
        state.failed = None;
        BearerToken {
            token: state.pair.access_token.clone(),
            version: state.version,
        }
    }

    /// Refresh unless a newer pair than `stale_version` already exists.
    ///
    /// Joins the in-flight refresh if there is one.
    pub async fn refresh(&self, stale_version: u64) -> Result<BearerToken, RefreshError> {
        let refresh = {
            let mut slot = self.inner.lock_in_flight();

            {
                let state = self.inner.read_state();
                if state.version > stale_version {
                    return Ok(BearerToken {
                        token: state.pair.access_token.clone(),
                        version: state.version,
                    });
                }
                if let Some(err) = &state.failed {
                    return Err(err.clone());
                }
            }

            match slot.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None => {
                    let started = run_refresh(Arc::clone(&self.inner)).boxed().shared();
                    *slot = Some(started.clone());
                    started
                }
            }
        };

        refresh.await
    }
}

impl OAuthInner {
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, VersionedPair> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, VersionedPair> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, Option<SharedRefresh>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn run_refresh(inner: Arc<OAuthInner>) -> Result<BearerToken, RefreshError> {
    let refresh_token = inner.read_state().pair.refresh_token.clone();
    inner.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let outcome = match inner.refresher.refresh(refresh_token).await {
        Ok(pair) => {
            let bearer = {
                let mut state = inner.write_state();
                state.pair = pair.clone();
                state.version += 1;
                state.failed = None;
                BearerToken {
                    token: pair.access_token.clone(),
                    version: state.version,
                }
            };
            info!(version = bearer.version, "OAuth token refreshed");

            if let Some(hook) = &inner.on_refresh {
                if catch_unwind(AssertUnwindSafe(|| hook(&pair))).is_err() {
                    warn!("Token refresh hook panicked");
                }
            }
            Ok(bearer)
        }
        Err(err) => {
            error!(error = %err, "OAuth token refresh failed");
            inner.write_state().failed = Some(err.clone());
            if let Some(hook) = &inner.on_refresh_failure {
                if catch_unwind(AssertUnwindSafe(|| hook(&err))).is_err() {
                    warn!("Token refresh failure hook panicked");
                }
            }
            Err(err)
        }
    };

    *inner.lock_in_flight() = None;
    outcome
}
