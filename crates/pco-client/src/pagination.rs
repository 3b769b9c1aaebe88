//! Link-based pagination.
//!
//! A [`Paginator`] issues a request template, then keeps following
//! `links.next` until the server sends `null`. Pages can be consumed lazily
//! as a stream ([`Paginator::pages`]) or gathered eagerly
//! ([`Paginator::collect_all`]). Each paginator runs once; it is consumed by
//! either mode.

use std::time::{Duration, Instant};

use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::client::PcoHttpClient;
use crate::error::Result;
use crate::request::RequestDescriptor;
use crate::types::{Page, PageMeta};

/// Options for a pagination run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationOptions {
    /// Sets `per_page` on the first request.
    pub per_page: Option<u32>,
    /// Stop after this many pages even if more exist.
    pub max_pages: Option<usize>,
}

impl PaginationOptions {
    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = Some(per_page);
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }
}

/// All items of an eager pagination run.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub data: Vec<T>,
    pub included: Vec<serde_json::Value>,
    /// Number of items gathered.
    pub total_count: usize,
    pub pages_fetched: usize,
    /// `meta` of the last page.
    pub meta: PageMeta,
    /// Wall-clock time from the first request to the last page.
    pub duration: Duration,
}

/// Drives one traversal of a paginated collection.
#[derive(Debug, Clone)]
pub struct Paginator {
    client: PcoHttpClient,
    template: RequestDescriptor,
    options: PaginationOptions,
}

struct PageState {
    next: Option<Result<RequestDescriptor>>,
    fetched: usize,
}

impl Paginator {
    pub fn new(
        client: PcoHttpClient,
        template: RequestDescriptor,
        options: PaginationOptions,
    ) -> Self {
        let template = match options.per_page {
            Some(per_page) => template.set_query("per_page", per_page.to_string()),
            None => template,
        };

        Self {
            client,
            template,
            options,
        }
    }

    /// The first request the run will issue.
    pub fn template(&self) -> &RequestDescriptor {
        &self.template
    }

    /// Request for the page `link` points at, relative links resolved
    /// against the client's base URL.
    fn next_request(&self, current: &RequestDescriptor, link: &str) -> Result<RequestDescriptor> {
        let absolute = self.client.resolve_url(link)?;
        current.follow_link(absolute.as_str())
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        request: &RequestDescriptor,
    ) -> Result<Page<T>> {
        let response = self.client.execute(request).await?;
        response.json()
    }

    /// Pages in order, ending after the page whose `next` link is null.
    ///
    /// The stream stops after the first error. Dropping it abandons the
    /// remaining pages.
    pub fn pages<T>(self) -> BoxStream<'static, Result<Page<T>>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let state = PageState {
            next: Some(Ok(self.template.clone())),
            fetched: 0,
        };

        stream::unfold((self, state), |(pager, mut state)| async move {
            if pager
                .options
                .max_pages
                .is_some_and(|max| state.fetched >= max)
            {
                return None;
            }

            let request = match state.next.take()? {
                Ok(request) => request,
                Err(err) => return Some((Err(err), (pager, state))),
            };

            match pager.fetch_page::<T>(&request).await {
                Ok(page) => {
                    state.fetched += 1;
                    debug!(
                        page = state.fetched,
                        items = page.data.len(),
                        has_next = page.next_link().is_some(),
                        "Fetched page"
                    );
                    state.next = page
                        .next_link()
                        .map(|link| pager.next_request(&request, link));
                    Some((Ok(page), (pager, state)))
                }
                Err(err) => Some((Err(err), (pager, state))),
            }
        })
        .boxed()
    }

    /// Fetch every page and combine the items.
    pub async fn collect_all<T>(self) -> Result<PaginatedResult<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let started = Instant::now();
        let mut data = Vec::new();
        let mut included = Vec::new();
        let mut meta = PageMeta::default();
        let mut pages_fetched = 0;

        let mut pages = self.pages::<T>();
        while let Some(page) = pages.next().await {
            let page = page?;
            pages_fetched += 1;
            data.extend(page.data);
            included.extend(page.included);
            meta = page.meta;
        }

        Ok(PaginatedResult {
            total_count: data.len(),
            data,
            included,
            pages_fetched,
            meta,
            duration: started.elapsed(),
        })
    }
}
