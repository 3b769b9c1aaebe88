//! Credential loading from the environment.
//!
//! Tokens are redacted in Debug output.

use pco_client::{AuthConfig, ClientConfig, ClientConfigBuilder};

use crate::error::{Error, ErrorKind, Result};
use crate::oauth::{OAuthClient, OAuthConfig};

/// Planning Center credentials plus an optional API root override.
#[derive(Clone, PartialEq, Eq)]
pub struct PcoCredentials {
    auth: AuthConfig,
    base_url: Option<String>,
}

impl std::fmt::Debug for PcoCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PcoCredentials")
            .field("auth", &self.auth)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl PcoCredentials {
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            auth,
            base_url: None,
        }
    }

    pub fn personal_access_token(token: impl Into<String>) -> Self {
        Self::new(AuthConfig::personal_access_token(token))
    }

    pub fn oauth(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self::new(AuthConfig::oauth(access_token, refresh_token))
    }

    /// Override the API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Load credentials from environment variables.
    ///
    /// - `PCO_ACCESS_TOKEN` + `PCO_REFRESH_TOKEN`: OAuth pair
    /// - `PCO_PERSONAL_ACCESS_TOKEN`, or `PCO_ACCESS_TOKEN` alone: personal access token
    /// - `PCO_BASE_URL` (optional): API root override
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let auth = match (get("PCO_ACCESS_TOKEN"), get("PCO_REFRESH_TOKEN")) {
            (Some(access), Some(refresh)) => AuthConfig::oauth(access, refresh),
            (access, _) => match get("PCO_PERSONAL_ACCESS_TOKEN").or(access) {
                Some(token) => AuthConfig::personal_access_token(token),
                None => {
                    return Err(Error::new(ErrorKind::EnvVar(
                        "PCO_PERSONAL_ACCESS_TOKEN or PCO_ACCESS_TOKEN".to_string(),
                    )))
                }
            },
        };

        Ok(Self {
            auth,
            base_url: get("PCO_BASE_URL"),
        })
    }

    pub fn auth(&self) -> &AuthConfig {
        &self.auth
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    /// Returns true if these credentials can be refreshed.
    pub fn is_oauth(&self) -> bool {
        matches!(self.auth, AuthConfig::OAuth { .. })
    }

    /// Builder seeded with these credentials.
    pub fn into_config_builder(self) -> ClientConfigBuilder {
        let builder = ClientConfig::builder().with_auth(self.auth);
        match self.base_url {
            Some(base_url) => builder.with_base_url(base_url),
            None => builder,
        }
    }

    /// Builder seeded with these credentials, refreshing through `oauth`.
    ///
    /// Fails for personal access tokens, which cannot be refreshed.
    pub fn into_oauth_config_builder(self, oauth: OAuthConfig) -> Result<ClientConfigBuilder> {
        if !self.is_oauth() {
            return Err(Error::new(ErrorKind::InvalidCredentials(
                "a personal access token cannot be refreshed".to_string(),
            )));
        }
        Ok(self
            .into_config_builder()
            .with_token_refresher(OAuthClient::new(oauth)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_env_oauth_pair() {
        let creds = PcoCredentials::from_lookup(lookup(&[
            ("PCO_ACCESS_TOKEN", "a1"),
            ("PCO_REFRESH_TOKEN", "r1"),
        ]))
        .unwrap();

        assert_eq!(creds.auth(), &AuthConfig::oauth("a1", "r1"));
        assert!(creds.is_oauth());
        assert_eq!(creds.base_url(), None);
    }

    #[test]
    fn test_from_env_personal_access_token() {
        let creds = PcoCredentials::from_lookup(lookup(&[
            ("PCO_PERSONAL_ACCESS_TOKEN", "pat"),
            ("PCO_BASE_URL", "http://localhost:3000"),
        ]))
        .unwrap();

        assert_eq!(creds.auth(), &AuthConfig::personal_access_token("pat"));
        assert_eq!(creds.base_url(), Some("http://localhost:3000"));
    }

    #[test]
    fn test_from_env_access_token_alone_is_static() {
        let creds =
            PcoCredentials::from_lookup(lookup(&[("PCO_ACCESS_TOKEN", "a1")])).unwrap();
        assert_eq!(creds.auth(), &AuthConfig::personal_access_token("a1"));
        assert!(!creds.is_oauth());
    }

    #[test]
    fn test_from_env_missing() {
        let err = PcoCredentials::from_lookup(lookup(&[("PCO_ACCESS_TOKEN", "  ")])).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::EnvVar(_)));
    }

    #[test]
    fn test_into_config_builder() {
        let config = PcoCredentials::personal_access_token("pat")
            .with_base_url("http://localhost:3000/")
            .into_config_builder()
            .build()
            .unwrap();

        assert_eq!(config.base_url, "http://localhost:3000");
        assert_eq!(config.auth.auth_type(), "personal_access_token");
    }

    #[test]
    fn test_into_oauth_config_builder_rejects_pat() {
        let result = PcoCredentials::personal_access_token("pat")
            .into_oauth_config_builder(OAuthConfig::new("app"));
        assert!(result.is_err());

        let config = PcoCredentials::oauth("a1", "r1")
            .into_oauth_config_builder(OAuthConfig::new("app"))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.auth.auth_type(), "oauth");
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let creds = PcoCredentials::oauth("secret_access", "secret_refresh");
        let debug_output = format!("{:?}", creds);
        assert!(!debug_output.contains("secret_access"));
        assert!(!debug_output.contains("secret_refresh"));
    }
}
