use crate::feed::parser::{Feed, FeedParser};
use crate::feed::transport::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::util::normalize_url;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_USER_AGENT: &str = "rss-reader/1.0";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors that can occur while fetching a feed.
///
/// Malformed feed documents are not an error; see [`Feed::malformed`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, timeout)
    #[error("Failed to fetch feed: {0}")]
    Transport(TransportError),
    /// HTTP response with non-2xx status code
    #[error("Failed to fetch feed: HTTP status {0}")]
    HttpStatus(u16),
    /// Response body exceeded the size limit
    #[error("Failed to fetch feed: response too large (limit {0} bytes)")]
    ResponseTooLarge(usize),
    /// The verified request hit a certificate error and the unverified retry
    /// failed as well; wraps the retry's cause
    #[error("Failed to fetch feed without certificate verification: {0}")]
    InsecureRetry(Box<FetchError>),
}

impl From<TransportError> for FetchError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::TooLarge(limit) => FetchError::ResponseTooLarge(limit),
            other => FetchError::Transport(other),
        }
    }
}

/// Outcome of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchResult {
    pub parsed_feed: Feed,
    /// True when the body was obtained with certificate validation disabled.
    /// Callers must surface this to the user.
    pub used_insecure: bool,
}

/// Which channel produced a response.
///
/// The verified attempt is always made first; an [`Attempt::Unverified`]
/// value only exists when that attempt failed certificate verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt<T> {
    Verified(T),
    Unverified(T),
}

impl<T> Attempt<T> {
    pub fn is_unverified(&self) -> bool {
        matches!(self, Attempt::Unverified(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Attempt::Verified(inner) | Attempt::Unverified(inner) => inner,
        }
    }
}

/// Tunables for [`Fetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Sent as the `User-Agent` header on every request.
    pub user_agent: String,
    pub timeout: Duration,
    pub max_feed_size: usize,
    /// Whether a certificate failure may be retried without verification.
    pub allow_insecure_fallback: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            max_feed_size: MAX_FEED_SIZE,
            allow_insecure_fallback: true,
        }
    }
}

/// Fetches and parses feeds with a verified-first, insecure-fallback policy.
pub struct Fetcher<T, P> {
    transport: T,
    parser: P,
    options: FetchOptions,
}

impl<T: HttpTransport, P: FeedParser> Fetcher<T, P> {
    pub fn new(transport: T, parser: P, options: FetchOptions) -> Self {
        Self {
            transport,
            parser,
            options,
        }
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Fetches `url` and parses the body.
    ///
    /// The URL is normalized first (see [`normalize_url`]). The request is
    /// made with certificate verification on; only if it fails *because of*
    /// certificate verification is it repeated once with verification off,
    /// and the result is then flagged with `used_insecure = true`.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Transport`] - DNS, connection, timeout or TLS errors
    /// - [`FetchError::HttpStatus`] - Non-2xx HTTP response
    /// - [`FetchError::ResponseTooLarge`] - Body over the configured limit
    /// - [`FetchError::InsecureRetry`] - The unverified retry failed too
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let url = normalize_url(url);

        let attempt = self.download(&url).await?;
        let used_insecure = attempt.is_unverified();
        let response = attempt.into_inner();

        let parsed_feed = self.parser.parse(&response.body);
        if parsed_feed.malformed {
            tracing::warn!(
                url = %url,
                salvaged = parsed_feed.entries.len(),
                "Feed document is malformed"
            );
        }

        Ok(FetchResult {
            parsed_feed,
            used_insecure,
        })
    }

    /// Performs the verified request and, for certificate failures only,
    /// the single unverified retry.
    async fn download(&self, url: &str) -> Result<Attempt<HttpResponse>, FetchError> {
        match self.get(url, true).await {
            Ok(response) => Ok(Attempt::Verified(response)),
            Err(FetchError::Transport(err))
                if err.is_certificate_error() && self.options.allow_insecure_fallback =>
            {
                tracing::warn!(
                    url = %url,
                    error = %err,
                    "Certificate verification failed, retrying without verification"
                );
                self.get(url, false)
                    .await
                    .map(Attempt::Unverified)
                    .map_err(|retry_err| {
                        tracing::warn!(url = %url, error = %retry_err, "Unverified retry failed");
                        FetchError::InsecureRetry(Box::new(retry_err))
                    })
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Feed request failed");
                Err(e)
            }
        }
    }

    async fn get(&self, url: &str, verify: bool) -> Result<HttpResponse, FetchError> {
        let request = HttpRequest {
            url: url.to_string(),
            headers: vec![("User-Agent".to_string(), self.options.user_agent.clone())],
            timeout: self.options.timeout,
            verify,
            suppress_insecure_warning: !verify,
            max_body_bytes: self.options.max_feed_size,
        };

        let response = self.transport.get(&request).await?;
        if !response.is_success() {
            return Err(FetchError::HttpStatus(response.status));
        }
        Ok(response)
    }
}
