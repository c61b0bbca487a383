use std::future::Future;
use thiserror::Error;

use super::types::{Page, Profile};

/// Errors that can occur while fetching from the upstream feed service.
///
/// Every variant is terminal for the request that produced it. Nothing at
/// this layer retries.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("Upstream error: status {0}")]
    Upstream(u16),
    /// Body could not be decoded, or exceeded the size limit
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

/// A paginated, read-only feed plus the profile it belongs to.
///
/// Implementations are expected to be idempotent and forward-only: the same
/// cursor yields equivalent-or-newer content, and cursors never page backward.
pub trait FeedSource: Send + Sync + 'static {
    fn fetch_profile(&self) -> impl Future<Output = Result<Profile, FetchError>> + Send;

    /// Fetch one page. `None` requests the first (newest) page.
    fn fetch_feed_page(
        &self,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page, FetchError>> + Send;
}
