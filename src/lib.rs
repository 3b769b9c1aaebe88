//! # pco-api
//!
//! Resilient access layer for the Planning Center APIs.
//!
//! Requests carry bearer credentials, are retried with backoff, refresh
//! OAuth tokens once per expiry no matter how many requests see the 401,
//! and report their lifecycle on a client-scoped event bus.
//!
//! ## Security
//!
//! - Sensitive data (tokens, secrets) are redacted in Debug output
//! - Tracing skips credential parameters
//! - Error messages sanitize credential data
//!
//! ## Crates
//!
//! - **pco-client** - Dispatcher, retry, rate limits, pagination, batches, events
//! - **pco-auth** - OAuth token endpoints and credential loading
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pco_api::{PcoClient, PcoCredentials, PaginationOptions, RequestDescriptor, Resource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PcoCredentials::from_env()?.into_config_builder().build()?;
//!     let client = PcoClient::new(config)?;
//!
//!     let lists = client
//!         .paginate_all::<Resource>(
//!             RequestDescriptor::get("/people/v2/lists"),
//!             PaginationOptions::default().with_per_page(100),
//!         )
//!         .await?;
//!
//!     for list in lists.data {
//!         println!("{}", list.attributes["name"]);
//!     }
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "auth")]
pub use pco_auth as auth;
#[cfg(feature = "client")]
pub use pco_client as client;

#[cfg(feature = "auth")]
pub use pco_auth::{OAuthClient, OAuthConfig, PcoCredentials};
#[cfg(feature = "client")]
pub use pco_client::{
    BatchOperation, BatchReport, ClientConfig, Error, ErrorKind, EventKind, FailureClass,
    PaginationOptions, PcoClient, RequestDescriptor, Resource, Result,
};
