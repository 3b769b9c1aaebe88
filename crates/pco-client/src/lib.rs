//! # pco-client
//!
//! Core HTTP access layer for the Planning Center APIs.
//!
//! This crate provides:
//! - Bearer authentication with personal access tokens or OAuth
//! - Single-flight OAuth refresh on 401
//! - Retry with linear or exponential backoff, honoring `Retry-After`
//! - Rate-limit tracking from the `X-PCO-API-Request-Rate-*` headers
//! - Link-based pagination, eager or streamed
//! - Batches with per-operation outcomes
//! - A client-scoped event bus for request lifecycle notifications
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Resource Modules                         │
//! │  (people, fields, workflows, households, lists, ...)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PcoClient                             │
//! │  - Typed JSON methods (get_json, post_json, ...)            │
//! │  - Paginator (eager / stream)    - BatchExecutor            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PcoHttpClient                           │
//! │  - Credential (static / OAuth, single-flight refresh)       │
//! │  - RetryScheduler    - RateLimitTracker    - EventBus       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use pco_client::{ClientConfig, PcoClient, PaginationOptions, RequestDescriptor, Resource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), pco_client::Error> {
//!     let client = PcoClient::new(
//!         ClientConfig::builder()
//!             .with_personal_access_token(std::env::var("PCO_PERSONAL_ACCESS_TOKEN").unwrap())
//!             .build()?,
//!     )?;
//!
//!     client.events().on_rate_limit(|event| {
//!         eprintln!("throttled, retry after {:?}", event.retry_after);
//!     });
//!
//!     let people = client
//!         .paginate_all::<Resource>(
//!             RequestDescriptor::get("/people/v2/people"),
//!             PaginationOptions::default().with_per_page(100),
//!         )
//!         .await?;
//!     println!("{} people in {} pages", people.total_count, people.pages_fetched);
//!
//!     Ok(())
//! }
//! ```

mod batch;
mod client;
mod config;
mod credentials;
mod error;
mod events;
mod pagination;
mod pco_client;
mod rate_limit;
mod request;
mod response;
mod retry;
mod types;

pub use batch::{
    BatchExecutor, BatchOperation, BatchOptions, BatchReport, BatchResult, ResourceKind,
    DEFAULT_CONCURRENCY,
};
pub use client::PcoHttpClient;
pub use config::{AuthConfig, CachingConfig, ClientConfig, ClientConfigBuilder, EventHooks};
pub use credentials::{
    BearerToken, Credential, OAuthCredential, RefreshError, RefreshFailureHook, RefreshHook,
    TokenPair, TokenRefresher,
};
pub use error::{ApiError, ApiErrorRecord, Error, ErrorKind, FailureClass, Result};
pub use events::{
    AuthFailureEvent, ErrorEvent, Event, EventBus, EventHandler, EventKind, EventPayload,
    ListenerId, RateLimitEvent, RequestCompleteEvent, RequestStartEvent,
};
pub use pagination::{PaginatedResult, PaginationOptions, Paginator};
pub use pco_client::PcoClient;
pub use rate_limit::{RateLimitHeaders, RateLimitSnapshot, RateLimitTracker};
pub use request::{RequestDescriptor, RequestMethod};
pub use response::Response;
pub use retry::{BackoffStrategy, RetryConfig, RetryScheduler};
pub use types::{Document, Links, Page, PageMeta, Resource};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.planningcenteronline.com";

/// User-Agent string for the client
pub const USER_AGENT: &str = concat!("pco-api/", env!("CARGO_PKG_VERSION"));
