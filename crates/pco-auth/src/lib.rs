//! # pco-auth
//!
//! Planning Center authentication: OAuth 2.0 token endpoints and credential
//! loading.
//!
//! ## Security
//!
//! - Tokens and client secrets are redacted in Debug output
//! - Tracing skips token parameters
//! - Error messages sanitize credential data
//!
//! ## Example
//!
//! ```rust,ignore
//! use pco_auth::{OAuthConfig, PcoCredentials};
//! use pco_client::PcoClient;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // PCO_ACCESS_TOKEN + PCO_REFRESH_TOKEN, refreshed through the token endpoint
//!     let config = PcoCredentials::from_env()?
//!         .into_oauth_config_builder(OAuthConfig::from_env()?)?
//!         .on_refresh(|pair| store_tokens(pair))
//!         .build()?;
//!
//!     let client = PcoClient::new(config)?;
//!     let me: serde_json::Value = client.get_json("/people/v2/me").await?;
//!     Ok(())
//! }
//! ```

mod credentials;
mod error;
mod oauth;

pub use credentials::PcoCredentials;
pub use error::{Error, ErrorKind, Result};
pub use oauth::{OAuthClient, OAuthConfig, TokenResponse};
