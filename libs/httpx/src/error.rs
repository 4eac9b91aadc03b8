use std::error::Error as StdError;
use std::time::Duration;
use thiserror::Error;

/// Boxed error type used for transport-level sources.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Classification of URL validation failures.
///
/// Provides programmatic matching for different failure modes without
/// relying on unstable error message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum InvalidUriKind {
    /// URL could not be parsed (malformed syntax)
    ParseError,
    /// URL is missing required host/authority component
    MissingAuthority,
    /// URL is missing required scheme (http/https)
    MissingScheme,
}

/// HTTP request error types
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpError {
    /// Request building failed
    #[error("Failed to build request: {0}")]
    RequestBuild(#[from] http::Error),

    /// Method is not a valid HTTP token
    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] http::method::InvalidMethod),

    /// Invalid header name
    #[error("Invalid header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    /// Invalid header value
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// Invalid URL (failed to parse)
    ///
    /// Use the `kind` field for programmatic matching. The `reason` field contains
    /// a diagnostic message intended for logging only.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUri {
        /// The URL that failed to parse
        url: String,
        /// Structured failure classification for programmatic matching
        kind: InvalidUriKind,
        /// Diagnostic message (unstable format, for logging only)
        reason: String,
    },

    /// Proxy string could not be turned into a dialer
    #[error("Invalid proxy '{proxy}': {reason}")]
    InvalidProxy {
        /// The proxy string as supplied
        proxy: String,
        /// Why it was rejected
        reason: String,
    },

    /// Single request attempt (or body read) timed out
    #[error("Request attempt timed out after {0:?}")]
    Timeout(Duration),

    /// Peer closed the connection before the response was complete.
    ///
    /// This is the stale pooled connection signal: the only error the
    /// executor retries, and only for idempotent methods.
    #[error("Connection closed before response completed: {0}")]
    ConnectionClosed(#[source] BoxError),

    /// Connection could not be established (DNS, refused, proxy handshake)
    #[error("Connect error: {0}")]
    Connect(#[source] BoxError),

    /// TLS error
    #[error("TLS error: {0}")]
    Tls(#[source] BoxError),

    /// Any other transport failure
    #[error("Transport error: {0}")]
    Transport(#[source] BoxError),

    /// Response body could not be decoded with its declared content-encoding
    #[error("Failed to decode '{encoding}' response body: {source}")]
    Decompression {
        /// Normalized content-encoding token
        encoding: String,
        /// Decoder failure
        #[source]
        source: std::io::Error,
    },

    /// JSON parsing error
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl HttpError {
    /// True for the per-attempt deadline (or body read timeout).
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// True when no connection could be established.
    #[must_use]
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }

    /// True when the peer dropped a (typically pooled) connection mid-exchange.
    #[must_use]
    pub fn is_stale_connection(&self) -> bool {
        matches!(self, Self::ConnectionClosed(_))
    }

    /// Classify a boxed transport failure by walking its source chain.
    pub(crate) fn from_transport(err: BoxError) -> Self {
        match classify(err.as_ref()) {
            Class::ConnectionClosed => Self::ConnectionClosed(err),
            Class::Tls => Self::Tls(err),
            Class::Other => Self::Transport(err),
        }
    }
}

impl From<hyper::Error> for HttpError {
    fn from(err: hyper::Error) -> Self {
        HttpError::from_transport(Box::new(err))
    }
}

impl From<hyper_util::client::legacy::Error> for HttpError {
    fn from(err: hyper_util::client::legacy::Error) -> Self {
        if err.is_connect() {
            return HttpError::Connect(Box::new(err));
        }
        HttpError::from_transport(Box::new(err))
    }
}

enum Class {
    ConnectionClosed,
    Tls,
    Other,
}

fn classify(err: &(dyn StdError + 'static)) -> Class {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(hyper_err) = e.downcast_ref::<hyper::Error>()
            && hyper_err.is_incomplete_message()
        {
            return Class::ConnectionClosed;
        }
        if let Some(io_err) = e.downcast_ref::<std::io::Error>()
            && io_err.kind() == std::io::ErrorKind::UnexpectedEof
        {
            return Class::ConnectionClosed;
        }
        if e.downcast_ref::<rustls::Error>().is_some() {
            return Class::Tls;
        }
        current = e.source();
    }
    Class::Other
}
