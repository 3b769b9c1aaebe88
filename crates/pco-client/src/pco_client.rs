//! High-level Planning Center client with typed JSON methods.
//!
//! `PcoClient` is what resource modules call into. It offers two things:
//! "issue a described request, get a typed result or a structured error",
//! and "walk the pages of a collection". Batches and events hang off the
//! same client.
//!
//! ## Security
//!
//! - Tokens are redacted in Debug output
//! - Request bodies are skipped in tracing spans

use std::sync::Arc;

use futures::stream::BoxStream;
use serde::{de::DeserializeOwned, Serialize};
use tracing::instrument;

use crate::batch::{BatchExecutor, BatchOperation, BatchOptions, BatchReport};
use crate::client::PcoHttpClient;
use crate::config::ClientConfig;
use crate::credentials::Credential;
use crate::error::Result;
use crate::events::EventBus;
use crate::pagination::{PaginatedResult, PaginationOptions, Paginator};
use crate::rate_limit::RateLimitSnapshot;
use crate::request::RequestDescriptor;
use crate::response::Response;
use crate::types::Page;

/// High-level Planning Center API client.
///
/// Cloning is cheap; clones share the credential, rate-limit state and
/// event bus.
///
/// # Example
///
/// ```rust,ignore
/// use pco_client::{PcoClient, ClientConfig, Document, Resource};
///
/// let client = PcoClient::new(
///     ClientConfig::builder()
///         .with_personal_access_token(token)
///         .build()?,
/// )?;
///
/// let person: Document<Resource> = client.get_json("/people/v2/people/1").await?;
///
/// let everyone = client
///     .paginate_all::<Resource>(
///         RequestDescriptor::get("/people/v2/people"),
///         PaginationOptions::default().with_per_page(100),
///     )
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct PcoClient {
    http: PcoHttpClient,
}

impl PcoClient {
    /// Create a client from configuration.
    pub fn new(config: ClientConfig) -> Result<Self> {
        Ok(Self {
            http: PcoHttpClient::new(config)?,
        })
    }

    /// Client with default settings and a personal access token.
    pub fn with_personal_access_token(token: impl Into<String>) -> Result<Self> {
        Self::new(ClientConfig::with_personal_access_token(token))
    }

    /// Wrap an existing dispatcher.
    pub fn from_http(http: PcoHttpClient) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &PcoHttpClient {
        &self.http
    }

    pub fn config(&self) -> &ClientConfig {
        self.http.config()
    }

    pub fn credential(&self) -> &Credential {
        self.http.credential()
    }

    /// The client's event bus.
    pub fn events(&self) -> &Arc<EventBus> {
        self.http.events()
    }

    /// Latest rate-limit snapshot.
    pub fn rate_limit(&self) -> RateLimitSnapshot {
        self.http.rate_limits().snapshot()
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Execute a request and return the raw response.
    pub async fn execute(&self, request: &RequestDescriptor) -> Result<Response> {
        self.http.execute(request).await
    }

    /// Execute a request and deserialize the JSON response.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
    ) -> Result<T> {
        let response = self.http.execute(request).await?;
        response.json()
    }

    /// GET request with JSON response deserialization.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute_json(&RequestDescriptor::get(path)).await
    }

    /// POST request with JSON body and response.
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = RequestDescriptor::post(path).json(body)?;
        self.execute_json(&request).await
    }

    /// PATCH request with JSON body and response.
    #[instrument(skip(self, body), fields(path = %path))]
    pub async fn patch_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let request = RequestDescriptor::patch(path).json(body)?;
        self.execute_json(&request).await
    }

    /// DELETE request; the response body is ignored.
    #[instrument(skip(self), fields(path = %path))]
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.http.execute(&RequestDescriptor::delete(path)).await?;
        Ok(())
    }

    // =========================================================================
    // Pagination
    // =========================================================================

    pub fn paginator(&self, template: RequestDescriptor, options: PaginationOptions) -> Paginator {
        Paginator::new(self.http.clone(), template, options)
    }

    /// Fetch every page of a collection.
    #[instrument(skip(self, template), fields(endpoint = %template.endpoint()))]
    pub async fn paginate_all<T>(
        &self,
        template: RequestDescriptor,
        options: PaginationOptions,
    ) -> Result<PaginatedResult<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.paginator(template, options).collect_all().await
    }

    /// Pages of a collection as a lazy stream.
    pub fn paginate<T>(
        &self,
        template: RequestDescriptor,
        options: PaginationOptions,
    ) -> BoxStream<'static, Result<Page<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.paginator(template, options).pages()
    }

    // =========================================================================
    // Batches
    // =========================================================================

    /// Run operations with the configured batch concurrency.
    pub async fn batch(&self, operations: Vec<BatchOperation>) -> BatchReport {
        let options = BatchOptions::default().with_concurrency(self.config().batch_concurrency);
        self.batch_with(operations, options).await
    }

    pub async fn batch_with(
        &self,
        operations: Vec<BatchOperation>,
        options: BatchOptions,
    ) -> BatchReport {
        BatchExecutor::new(self.http.clone(), options)
            .execute(operations)
            .await
    }
}
