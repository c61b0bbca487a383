use futures::StreamExt;
use reqwest::redirect::Policy;
use serde::de::DeserializeOwned;
use url::Url;

use super::source::{FeedSource, FetchError};
use super::types::{AuthorFeedResponse, Page, Profile};

const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Upper bound the upstream accepts for `limit` on getAuthorFeed.
const MAX_PAGE_SIZE: u32 = 100;

const PROFILE_ENDPOINT: &str = "app.bsky.actor.getProfile";
const AUTHOR_FEED_ENDPOINT: &str = "app.bsky.feed.getAuthorFeed";

/// Create a custom redirect policy with loop detection and limited hops.
///
/// - Limits redirects to 3 hops maximum
/// - Detects redirect loops (same URL appearing twice in chain)
fn create_redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        for prev in attempt.previous() {
            if prev.as_str() == url.as_str() {
                return attempt.error("Redirect loop detected");
            }
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );

        attempt.follow()
    })
}

/// Build the HTTP client used for all upstream requests.
pub fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .user_agent(concat!("skyshelf/", env!("CARGO_PKG_VERSION")))
        .redirect(create_redirect_policy())
        .build()
}

/// Reads one actor's public profile and author feed from an XRPC endpoint.
#[derive(Debug, Clone)]
pub struct BlueskySource {
    client: reqwest::Client,
    api_base: String,
    actor: String,
    page_size: u32,
}

impl BlueskySource {
    /// # Arguments
    ///
    /// * `client` - HTTP client (shared; cloning is cheap)
    /// * `api_base` - XRPC base, e.g. `https://public.api.bsky.app/xrpc`
    /// * `actor` - Handle or DID whose feed is read
    /// * `page_size` - Items per page, clamped to `1..=100`
    pub fn new(
        client: reqwest::Client,
        api_base: impl Into<String>,
        actor: impl Into<String>,
        page_size: u32,
    ) -> Self {
        let api_base: String = api_base.into();
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            actor: actor.into(),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    fn endpoint(&self, method: &str) -> Result<Url, FetchError> {
        Url::parse(&format!("{}/{}", self.api_base, method))
            .map_err(|e| FetchError::MalformedResponse(format!("invalid endpoint URL: {e}")))
    }

    fn profile_url(&self) -> Result<Url, FetchError> {
        let mut url = self.endpoint(PROFILE_ENDPOINT)?;
        url.query_pairs_mut().append_pair("actor", &self.actor);
        Ok(url)
    }

    fn feed_url(&self, cursor: Option<&str>) -> Result<Url, FetchError> {
        let mut url = self.endpoint(AUTHOR_FEED_ENDPOINT)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("actor", &self.actor)
                .append_pair("limit", &self.page_size.to_string());
            if let Some(cursor) = cursor {
                query.append_pair("cursor", cursor);
            }
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        tracing::debug!(url = %url, "Fetching");

        let response = self.client.get(url.clone()).send().await?;

        if !response.status().is_success() {
            tracing::warn!(url = %url, status = %response.status(), "Upstream returned error status");
            return Err(FetchError::Upstream(response.status().as_u16()));
        }

        let bytes = read_limited_bytes(response, MAX_RESPONSE_SIZE).await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::MalformedResponse(e.to_string()))
    }
}

impl FeedSource for BlueskySource {
    async fn fetch_profile(&self) -> Result<Profile, FetchError> {
        let url = self.profile_url()?;
        self.get_json(url).await
    }

    async fn fetch_feed_page(&self, cursor: Option<&str>) -> Result<Page, FetchError> {
        let url = self.feed_url(cursor)?;
        let response: AuthorFeedResponse = self.get_json(url).await?;
        let page = Page::from(response);
        tracing::debug!(
            items = page.items.len(),
            has_cursor = page.cursor.is_some(),
            "Feed page decoded"
        );
        Ok(page)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let too_large = || FetchError::MalformedResponse(format!("response exceeds {limit} bytes"));

    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(too_large());
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
