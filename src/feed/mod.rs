//! Feed retrieval: fetching, parsing and caching RSS/Atom feeds.
//!
//! - **Transport**: [`HttpTransport`] abstracts a single HTTP GET; [`ReqwestTransport`]
//!   is the production implementation
//! - **Parsing**: [`FeedParser`] turns bytes into a [`Feed`], never failing on bad input
//! - **Fetching**: [`Fetcher`] makes a verified request first and retries once without
//!   certificate verification only when verification itself failed
//! - **Caching**: [`FeedCache`] keeps successful results keyed by the raw URL
//! - **Resolving**: [`FeedResolver`] is what callers use; it validates input, consults
//!   the cache and falls through to the fetcher
//!
//! # Example
//!
//! ```no_run
//! use rss_reader::feed::{
//!     FeedCache, FeedResolver, FeedRsParser, FetchOptions, Fetcher, ReqwestTransport,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let fetcher = Fetcher::new(ReqwestTransport::new()?, FeedRsParser, FetchOptions::default());
//! let resolver = FeedResolver::new(fetcher, Arc::new(FeedCache::new()));
//!
//! let result = resolver.resolve("example.com/feed.xml").await?;
//! if result.used_insecure {
//!     eprintln!("warning: loaded without certificate verification");
//! }
//! for entry in &result.parsed_feed.entries {
//!     println!("{}", entry.title);
//! }
//! # Ok(())
//! # }
//! ```

mod cache;
mod fetcher;
mod parser;
mod resolver;
#[cfg(test)]
mod testing;
mod transport;

pub use cache::FeedCache;
pub use fetcher::{Attempt, FetchError, FetchOptions, FetchResult, Fetcher};
pub use parser::{Entry, Feed, FeedParser, FeedRsParser};
pub use resolver::{FeedResolver, ResolveError, ValidationError};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
