use url::{ParseError, Url};

/// Scheme prepended to inputs that do not carry one.
const DEFAULT_SCHEME_PREFIX: &str = "http://";

/// Ensures a URL string carries a scheme before it is used on the network.
///
/// The input is parsed with the `url` crate. Only when parsing fails because
/// the string has no scheme at all is `http://` prepended; the rest of the
/// string (path, query, port) is kept exactly as given. Anything else,
/// including strings that fail to parse for other reasons, is returned
/// unchanged so that bad hosts surface as network errors later.
///
/// # Examples
///
/// ```
/// use rss_reader::util::normalize_url;
///
/// assert_eq!(normalize_url("example.com/feed"), "http://example.com/feed");
/// assert_eq!(normalize_url("https://example.com/rss"), "https://example.com/rss");
/// ```
pub fn normalize_url(raw_url: &str) -> String {
    match Url::parse(raw_url) {
        Err(ParseError::RelativeUrlWithoutBase) => format!("{DEFAULT_SCHEME_PREFIX}{raw_url}"),
        _ => raw_url.to_owned(),
    }
}
