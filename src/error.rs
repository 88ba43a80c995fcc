//! Error types for the weibo-proxy-pool crate.

use reqwest::StatusCode;
use thiserror::Error;

/// Error returned when a proxy API response cannot be turned into a proxy URL.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxyParseError {
    /// The text body had no non-empty line.
    #[error("proxy API returned an empty text response")]
    EmptyText,
    /// The `data` array was present but empty.
    #[error("proxy API returned an empty data array")]
    EmptyList,
    /// A text proxy did not match any known layout.
    #[error("invalid proxy format: {0}")]
    InvalidFormat(String),
    /// The port was not an integer in 1..=65535.
    #[error("invalid proxy port: {0}")]
    InvalidPort(String),
    /// The JSON payload had none of the recognized keys.
    #[error("unable to parse proxy API response: {0}")]
    Unrecognized(String),
}

/// Error returned when a user filter is built with inconsistent criteria.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilterError {
    /// The minimum age was above the maximum age.
    #[error("invalid age range: min {min} is greater than max {max}")]
    InvalidAgeRange {
        /// Lower bound.
        min: u32,
        /// Upper bound.
        max: u32,
    },
}

/// Error returned by the middleware when no attempt produced a classified outcome.
#[derive(Debug, Error)]
#[error("maximum retry attempts reached")]
pub struct RetriesExhausted;

/// Errors surfaced by [`WeiboClient`](crate::WeiboClient).
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The platform kept answering with its anti-scraping status.
    #[error("encountered {status} anti-crawler block after {attempts} attempts")]
    Blocked {
        /// The block status that was observed.
        status: StatusCode,
        /// Attempts made before giving up.
        attempts: usize,
    },
    /// Transport failure (connect, timeout) that survived every retry.
    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),
    /// Non-retryable HTTP status.
    #[error("HTTP error: {0}")]
    Http(StatusCode),
    /// The retry loop finished without a classified outcome.
    #[error("maximum retry attempts reached")]
    MaxRetries,
    /// The response body was not what the endpoint expects.
    #[error("parse error: {0}")]
    Parse(String),
    /// The requested user does not exist.
    #[error("user {0} not found")]
    UserNotFound(String),
    /// An error raised by a middleware in the request chain.
    #[error("middleware error: {0}")]
    Middleware(anyhow::Error),
    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    /// A configured header value contained invalid characters.
    #[error("invalid header value for {0}")]
    InvalidHeader(&'static str),
    /// The base URL or an endpoint path could not be joined.
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

impl From<reqwest_middleware::Error> for CrawlError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => CrawlError::Network(e),
            reqwest_middleware::Error::Middleware(e) => {
                if e.is::<RetriesExhausted>() {
                    CrawlError::MaxRetries
                } else {
                    CrawlError::Middleware(e)
                }
            }
        }
    }
}
