//! Page-by-page collection from a CRM list endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::{retry_fetch, RetryPolicy, Sleeper, TokioSleeper};
use crate::errors::{FetchError, TransientFetchError, TransientKind};

/// Query pairs in request order. Repeated keys are allowed.
pub type Query = Vec<(String, String)>;

/// A raw answer from the CRM API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResponse {
    /// HTTP status.
    pub status: u16,
    /// Parsed JSON body; `None` for an empty body.
    pub body: Option<Value>,
}

impl PageResponse {
    /// A 200 response with a body.
    #[must_use]
    pub const fn ok(body: Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    /// A 204 response.
    #[must_use]
    pub const fn no_content() -> Self {
        Self {
            status: 204,
            body: None,
        }
    }

    /// True when the API signals an expired access token.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
            || self
                .body
                .as_ref()
                .and_then(|b| b.get("status"))
                .and_then(Value::as_i64)
                == Some(401)
    }
}

/// Performs a single GET against the CRM API.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PageTransport: Send + Sync {
    /// Requests `path` with `query`.
    async fn get(&self, path: &str, query: &[(String, String)]) -> Result<PageResponse, FetchError>;
}

/// Renews the access token after an unauthorized answer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Obtains and installs a fresh token.
    async fn refresh(&self) -> Result<(), FetchError>;
}

/// Paging behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginatorConfig {
    /// Items requested per page.
    pub limit: usize,
    /// Pause between consecutive pages.
    pub courtesy_delay_ms: u64,
    /// Retry policy for each page request.
    pub retry: RetryPolicy,
}

impl Default for PaginatorConfig {
    fn default() -> Self {
        Self {
            limit: 250,
            courtesy_delay_ms: 1000,
            retry: RetryPolicy::default(),
        }
    }
}

impl PaginatorConfig {
    /// Sets the page size.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the courtesy delay.
    #[must_use]
    pub const fn with_courtesy_delay_ms(mut self, delay: u64) -> Self {
        self.courtesy_delay_ms = delay;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Walks `page=1..` of an endpoint until the data runs out.
///
/// A page ends the walk when the API answers 204, sends an empty body or
/// returns fewer items than requested. An expired-token answer triggers a
/// token refresh and is retried under the configured [`RetryPolicy`].
#[derive(Clone)]
pub struct Paginator {
    transport: Arc<dyn PageTransport>,
    refresher: Option<Arc<dyn TokenRefresher>>,
    sleeper: Arc<dyn Sleeper>,
    config: PaginatorConfig,
}

impl std::fmt::Debug for Paginator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("config", &self.config)
            .field("has_refresher", &self.refresher.is_some())
            .finish_non_exhaustive()
    }
}

impl Paginator {
    /// Creates a paginator sleeping on the tokio timer.
    #[must_use]
    pub fn new(transport: Arc<dyn PageTransport>) -> Self {
        Self {
            transport,
            refresher: None,
            sleeper: Arc::new(TokioSleeper),
            config: PaginatorConfig::default(),
        }
    }

    /// Sets the token refresher.
    #[must_use]
    pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Replaces the sleeper.
    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Replaces the config.
    #[must_use]
    pub fn with_config(mut self, config: PaginatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Current config.
    #[must_use]
    pub const fn config(&self) -> &PaginatorConfig {
        &self.config
    }

    /// Collects `_embedded.<collection>` across every page of `path`.
    ///
    /// # Errors
    ///
    /// Returns the first fatal or exhausted page error.
    pub async fn collect(
        &self,
        path: &str,
        collection: &str,
        query: &[(String, String)],
        limit: Option<usize>,
    ) -> Result<Vec<Value>, FetchError> {
        let limit = limit.unwrap_or(self.config.limit).max(1);
        let mut items = Vec::new();
        let mut page = 1usize;

        loop {
            let mut page_query = query.to_vec();
            page_query.push(("limit".to_string(), limit.to_string()));
            page_query.push(("page".to_string(), page.to_string()));

            let chunk = self.get_one(path, collection, &page_query).await?;
            let Some(chunk) = chunk else {
                debug!(path, page, "No more data");
                break;
            };
            let received = chunk.len();
            items.extend(chunk);
            debug!(path, page, received, total = items.len(), "Fetched page");
            if received < limit {
                break;
            }
            self.sleeper
                .sleep(Duration::from_millis(self.config.courtesy_delay_ms))
                .await;
            page += 1;
        }

        Ok(items)
    }

    /// Fetches a single un-paged document with retries.
    ///
    /// # Errors
    ///
    /// Returns the fatal or exhausted error.
    pub async fn get_document(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Option<Value>, FetchError> {
        retry_fetch(&self.config.retry, self.sleeper.as_ref(), || {
            self.request(path, query)
        })
        .await
    }

    async fn get_one(
        &self,
        path: &str,
        collection: &str,
        query: &[(String, String)],
    ) -> Result<Option<Vec<Value>>, FetchError> {
        let body = self.get_document(path, query).await?;
        Ok(body.map(|body| {
            body.get("_embedded")
                .and_then(|e| e.get(collection))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        }))
    }

    async fn request(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<Option<Value>, FetchError> {
        let response = self.transport.get(path, query).await?;
        if response.is_unauthorized() {
            warn!(path, "Access token rejected, refreshing");
            if let Some(refresher) = &self.refresher {
                refresher.refresh().await?;
            }
            return Err(TransientFetchError::new(
                TransientKind::Unauthorized,
                path,
                "access token expired",
            )
            .with_status(401)
            .into());
        }
        if response.status == 204 {
            return Ok(None);
        }
        Ok(response.body.filter(|b| !b.is_null()))
    }
}
