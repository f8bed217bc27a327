use crate::feed::cache::FeedCache;
use crate::feed::fetcher::{FetchError, FetchResult, Fetcher};
use crate::feed::parser::FeedParser;
use crate::feed::transport::HttpTransport;
use std::sync::Arc;
use thiserror::Error;

/// Input rejected before any cache or network access.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("URL required")]
    UrlRequired,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// Entry point for callers that need a feed for a user-supplied URL.
///
/// Combines a [`Fetcher`] with a shared [`FeedCache`]. The resolver holds no
/// state of its own between calls, so one instance can serve many
/// concurrent requests; wrap it in an `Arc` to share it across tasks.
pub struct FeedResolver<T, P> {
    fetcher: Fetcher<T, P>,
    cache: Arc<FeedCache>,
}

impl<T: HttpTransport, P: FeedParser> FeedResolver<T, P> {
    pub fn new(fetcher: Fetcher<T, P>, cache: Arc<FeedCache>) -> Self {
        Self { fetcher, cache }
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    /// Returns the feed for `raw_url`, from cache when possible.
    ///
    /// The cache is keyed by `raw_url` exactly as given, while the network
    /// request uses the normalized form. Only successful fetches are cached;
    /// a failure leaves the cache untouched so the next call retries.
    ///
    /// When the returned result has `used_insecure` set, the caller must warn
    /// the end user that the feed was loaded without certificate verification.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::Validation`] - `raw_url` is empty
    /// - [`ResolveError::Fetch`] - propagated from [`Fetcher::fetch`]
    pub async fn resolve(&self, raw_url: &str) -> Result<Arc<FetchResult>, ResolveError> {
        if raw_url.is_empty() {
            return Err(ValidationError::UrlRequired.into());
        }

        if let Some(hit) = self.cache.get(raw_url) {
            tracing::debug!(url = %raw_url, "Feed cache hit");
            return Ok(hit);
        }

        let result = match self.fetcher.fetch(raw_url).await {
            Ok(result) => Arc::new(result),
            Err(e) => {
                tracing::warn!(url = %raw_url, error = %e, "Feed fetch failed");
                return Err(e.into());
            }
        };

        if result.used_insecure {
            tracing::warn!(
                url = %raw_url,
                "Loaded feed with certificate verification disabled"
            );
        }
        tracing::info!(
            url = %raw_url,
            entries = result.parsed_feed.entries.len(),
            malformed = result.parsed_feed.malformed,
            "Fetched feed"
        );

        self.cache.put(raw_url, Arc::clone(&result));
        Ok(result)
    }
}
