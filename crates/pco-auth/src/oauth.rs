//! OAuth 2.0 against the Planning Center token endpoints.
//!
//! - **Authorization Code** - authorize URL and code exchange for web apps
//! - **Refresh Token** - exchanging a refresh token for a new pair
//! - **Revocation** - invalidating an access or refresh token
//!
//! [`OAuthClient`] implements [`TokenRefresher`], so it can be handed to
//! `ClientConfigBuilder::with_token_refresher` and the core client will use
//! it for its single-flight refresh.

use chrono::{DateTime, TimeZone, Utc};
use futures::future::BoxFuture;
use pco_client::{RefreshError, TokenPair, TokenRefresher};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{Error, ErrorKind, Result};

/// OAuth 2.0 configuration for a registered application.
///
/// `client_secret` is redacted in Debug output.
#[derive(Clone)]
pub struct OAuthConfig {
    /// Application ID (client_id).
    pub client_id: String,
    client_secret: Option<String>,
    /// Redirect URI for the authorization code flow.
    pub redirect_uri: Option<String>,
    /// Scopes to request (e.g. `people`, `services`).
    pub scopes: Vec<String>,
    /// Root hosting `/oauth/*`.
    pub auth_url: String,
}

impl std::fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("auth_url", &self.auth_url)
            .finish()
    }
}

impl OAuthConfig {
    /// Create a new OAuth config.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: None,
            scopes: vec!["people".to_string()],
            auth_url: pco_client::DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Read `PCO_CLIENT_ID` and, if set, `PCO_CLIENT_SECRET`.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var("PCO_CLIENT_ID")
            .map_err(|_| Error::new(ErrorKind::EnvVar("PCO_CLIENT_ID".to_string())))?;

        let mut config = Self::new(client_id);
        if let Ok(secret) = std::env::var("PCO_CLIENT_SECRET") {
            config = config.with_secret(secret);
        }
        if let Ok(auth_url) = std::env::var("PCO_BASE_URL") {
            config = config.with_auth_url(auth_url);
        }
        Ok(config)
    }

    /// Set the client secret.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub(crate) fn client_secret(&self) -> Option<&str> {
        self.client_secret.as_deref()
    }

    /// Set the redirect URI.
    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = Some(uri.into());
        self
    }

    /// Set the scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Set the root hosting the OAuth endpoints.
    pub fn with_auth_url(mut self, url: impl Into<String>) -> Self {
        self.auth_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

/// OAuth client for the Planning Center token endpoints.
#[derive(Clone)]
pub struct OAuthClient {
    config: OAuthConfig,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// Create a new OAuth client.
    pub fn new(config: OAuthConfig) -> Self {
        Self {
            config,
            http_client: reqwest::Client::new(),
        }
    }

    /// Get the OAuth config.
    pub fn config(&self) -> &OAuthConfig {
        &self.config
    }

    /// URL to send the user to for consent.
    pub fn authorization_url(&self, state: Option<&str>) -> Result<String> {
        let redirect_uri = self.config.redirect_uri.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::Config(
                "redirect_uri is required for the authorization code flow".to_string(),
            ))
        })?;
        let scopes = self.config.scopes.join(" ");

        let mut url = format!(
            "{}/oauth/authorize?response_type=code&client_id={}&redirect_uri={}",
            self.config.auth_url,
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(redirect_uri),
        );

        if !scopes.is_empty() {
            url.push_str(&format!("&scope={}", urlencoding::encode(&scopes)));
        }

        if let Some(state) = state {
            url.push_str(&format!("&state={}", urlencoding::encode(state)));
        }

        Ok(url)
    }

    /// Exchange an authorization code for tokens.
    #[instrument(skip(self, code))]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse> {
        let redirect_uri = self.config.redirect_uri.as_deref().ok_or_else(|| {
            Error::new(ErrorKind::Config(
                "redirect_uri is required for the authorization code flow".to_string(),
            ))
        })?;

        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", redirect_uri),
        ];
        if let Some(secret) = self.config.client_secret() {
            params.push(("client_secret", secret));
        }

        self.token_request(&params).await
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// The refresh token is not logged.
    #[instrument(skip(self, refresh_token))]
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse> {
        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret() {
            params.push(("client_secret", secret));
        }

        let token = self.token_request(&params).await?;
        debug!(expires_in = ?token.expires_in, "Refreshed access token");
        Ok(token)
    }

    /// Revoke an access or refresh token.
    #[instrument(skip(self, token))]
    pub async fn revoke_token(&self, token: &str) -> Result<()> {
        let mut params = vec![
            ("token", token),
            ("client_id", self.config.client_id.as_str()),
        ];
        if let Some(secret) = self.config.client_secret() {
            params.push(("client_secret", secret));
        }
        let body = serde_urlencoded::to_string(params)?;

        let response = self
            .http_client
            .post(format!("{}/oauth/revoke", self.config.auth_url))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::new(ErrorKind::OAuth {
                error: "revoke_failed".to_string(),
                description: format!(
                    "Failed to revoke token (HTTP {})",
                    response.status().as_u16()
                ),
            }));
        }

        Ok(())
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let body = serde_urlencoded::to_string(params)?;

        let response = self
            .http_client
            .post(format!("{}/oauth/token", self.config.auth_url))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(body)
            .send()
            .await?;

        Self::handle_token_response(response).await
    }

    /// Handle a token response, checking for errors.
    async fn handle_token_response(response: reqwest::Response) -> Result<TokenResponse> {
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            let error = serde_json::from_slice::<OAuthErrorResponse>(&bytes).unwrap_or_else(|_| {
                OAuthErrorResponse {
                    error: format!("http_{}", status.as_u16()),
                    error_description: status
                        .canonical_reason()
                        .unwrap_or("token request failed")
                        .to_string(),
                }
            });
            return Err(Error::new(ErrorKind::OAuth {
                error: error.error,
                description: error.error_description,
            }));
        }

        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl TokenRefresher for OAuthClient {
    fn refresh(
        &self,
        refresh_token: String,
    ) -> BoxFuture<'static, std::result::Result<TokenPair, RefreshError>> {
        let client = self.clone();
        Box::pin(async move {
            let token = client.refresh_token(&refresh_token).await?;
            Ok(token.into_token_pair(&refresh_token))
        })
    }
}

/// Token endpoint response.
///
/// Tokens are redacted in Debug output.
#[derive(Clone, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Usually "bearer".
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// A rotated refresh token, when the server issues one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    /// Unix timestamp of issue.
    #[serde(default)]
    pub created_at: Option<i64>,
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl TokenResponse {
    /// When the access token stops working, if the response says.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let created = Utc.timestamp_opt(self.created_at?, 0).single()?;
        created.checked_add_signed(chrono::Duration::try_seconds(self.expires_in?)?)
    }

    /// Returns true if the access token has expired.
    pub fn is_expired(&self) -> bool {
        self.expires_at().is_some_and(|at| at <= Utc::now())
    }

    /// New token pair, keeping `previous_refresh_token` when none was issued.
    pub fn into_token_pair(self, previous_refresh_token: &str) -> TokenPair {
        let refresh_token = self
            .refresh_token
            .unwrap_or_else(|| previous_refresh_token.to_string());
        TokenPair::new(self.access_token, refresh_token)
    }
}

/// OAuth error response.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: String,
}
