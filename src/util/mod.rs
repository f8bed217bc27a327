//! Utility functions for common operations.
//!
//! - **URL normalization**: make sure user-supplied feed URLs carry a scheme
//!
//! # Examples
//!
//! ```
//! use rss_reader::util::normalize_url;
//!
//! let url = normalize_url("example.com/feed.xml");
//! assert_eq!(url, "http://example.com/feed.xml");
//! ```

mod url_normalizer;

pub use url_normalizer::normalize_url;
