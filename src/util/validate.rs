use std::net::IpAddr;
use thiserror::Error;
use url::Url;

/// Longest subreddit name the API accepts.
pub const MAX_FEED_NAME_LEN: usize = 21;

/// Errors raised when checking configured URIs and requested feed names.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The URI string could not be parsed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// The URI uses a scheme other than http or https.
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    /// Plain HTTP to a remote host would expose the bearer token.
    #[error("Insecure base URL {0}: HTTPS required except for localhost")]
    Insecure(String),
    /// The feed name is empty, too long, or contains characters outside `[A-Za-z0-9_]`.
    #[error("Invalid feed name {0:?}: expected 1-21 letters, digits or underscores")]
    FeedName(String),
}

/// Validate a base URI that requests (and bearer tokens) will be sent to.
///
/// HTTPS is required. Plain HTTP is accepted only for `localhost` and
/// loopback addresses, which is what local mock servers use.
///
/// # Examples
///
/// ```
/// use subtally::util::validate_base_uri;
///
/// assert!(validate_base_uri("https://oauth.reddit.com").is_ok());
/// assert!(validate_base_uri("http://127.0.0.1:8080").is_ok());
/// assert!(validate_base_uri("http://oauth.reddit.com").is_err());
/// assert!(validate_base_uri("ftp://example.com").is_err());
/// ```
pub fn validate_base_uri(uri: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(uri)?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_local(&url) => {
            tracing::warn!(base_uri = %url, "Using plain HTTP base URI (localhost only)");
            Ok(url)
        }
        "http" => Err(ValidationError::Insecure(url.to_string())),
        scheme => Err(ValidationError::UnsupportedScheme(scheme.to_owned())),
    }
}

fn is_local(url: &Url) -> bool {
    let Some(host) = url.host_str() else {
        return false;
    };
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    // Strip brackets from IPv6 addresses for parsing
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Normalize and validate a requested feed name.
///
/// Surrounding whitespace and a leading `r/` or `/r/` are stripped, so
/// `" r/rust "` tracks `rust`. The remaining name is interpolated into a URL
/// path, so anything outside `[A-Za-z0-9_]` is rejected rather than escaped.
///
/// # Examples
///
/// ```
/// use subtally::util::validate_feed_name;
///
/// assert_eq!(validate_feed_name("r/rust").unwrap(), "rust");
/// assert!(validate_feed_name("../api/v1/me").is_err());
/// ```
pub fn validate_feed_name(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    let name = trimmed
        .strip_prefix("/r/")
        .or_else(|| trimmed.strip_prefix("r/"))
        .unwrap_or(trimmed);

    let valid = !name.is_empty()
        && name.len() <= MAX_FEED_NAME_LEN
        && name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');

    if valid {
        Ok(name.to_owned())
    } else {
        Err(ValidationError::FeedName(raw.to_owned()))
    }
}
