//! Feed retrieval for an RSS reader.
//!
//! See [`feed::FeedResolver`] for the entry point.

pub mod config;
pub mod feed;
pub mod util;
