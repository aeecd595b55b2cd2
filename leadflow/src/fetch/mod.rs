//! Fetch layer: paging, retries and lead sources.
//!
//! The engine itself never talks to the network. A [`LeadSource`] hands a
//! batch its leads and dictionaries; [`CrmLeadSource`] implements it over any
//! [`PageTransport`], with [`HttpTransport`] as the production transport.

#[cfg(feature = "http")]
pub mod http;
pub mod paginator;
pub mod retry;
pub mod source;

#[cfg(feature = "http")]
pub use http::{HttpConfig, HttpTransport, OAuthCredentials, OAuthRefresher, TokenPair, TokenStore};
pub use paginator::{PageResponse, PageTransport, Paginator, PaginatorConfig, Query, TokenRefresher};
pub use retry::{
    retry_fetch, BackoffStrategy, JitterStrategy, RecordingSleeper, RetryPolicy, RetryState,
    Sleeper, TokioSleeper,
};
pub use source::{CrmLeadSource, LeadSource, SourceLimits, StaticLeadSource};
