use rand::Rng;
use serde::Deserialize;
use std::time::Duration;

/// User-Agent injected by the transport when default suppression is off
pub const DEFAULT_USER_AGENT: &str = concat!("httpx/", env!("CARGO_PKG_VERSION"));

/// User-Agent placed on every [`Requests`](crate::Requests) by its constructor
pub const DEFAULT_REQUEST_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:103.0) Gecko/20100101 Firefox/103.0";

/// Default per-attempt timeout for a request, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Default number of stale-connection retries for a request
pub const DEFAULT_REQUEST_RETRY: usize = 3;

/// Upper bound on any retry delay, whatever `ExponentialBackoff::max` says
const RETRY_DELAY_CEILING: Duration = Duration::from_secs(3600);

/// Check if an HTTP method may be retried after a stale pooled connection.
///
/// Only GET, HEAD and PUT qualify.
#[must_use]
pub fn is_idempotent_method(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::GET | http::Method::HEAD | http::Method::PUT
    )
}

/// Exponential backoff configuration for retries
///
/// Computes delay as: `min(initial * multiplier^attempt, max)` with optional jitter.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    /// Initial backoff duration (default: 100ms)
    pub initial: Duration,

    /// Maximum backoff duration (default: 10s)
    pub max: Duration,

    /// Backoff multiplier for exponential growth (default: 2.0)
    pub multiplier: f64,

    /// Enable jitter to prevent thundering herd (default: true)
    ///
    /// When enabled, adds random delay of 0-25% to each backoff.
    pub jitter: bool,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl ExponentialBackoff {
    /// Create backoff with custom initial and max durations
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            ..Default::default()
        }
    }

    /// Create fast backoff for testing (1ms initial, 100ms max, no jitter)
    #[must_use]
    pub fn fast() -> Self {
        Self {
            initial: Duration::from_millis(1),
            max: Duration::from_millis(100),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (0-based).
    ///
    /// Jitter never pushes the delay past `max`. A non-finite or negative
    /// multiplier counts as `1.0`.
    #[must_use]
    pub fn delay(&self, attempt: usize) -> Duration {
        let cap = self.max.min(RETRY_DELAY_CEILING);
        let factor = if self.multiplier.is_finite() && self.multiplier >= 0.0 {
            self.multiplier
        } else {
            1.0
        };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);

        // f64::min yields the cap for an infinite or NaN product
        let secs = (self.initial.as_secs_f64() * factor.powi(exponent)).min(cap.as_secs_f64());
        let delay = Duration::from_secs_f64(secs);

        if !self.jitter {
            return delay;
        }
        let spread = rand::rng().random_range(0.0..=0.25);
        (delay + delay.mul_f64(spread)).min(cap)
    }
}

/// Per-call retry policy used by [`RetryLayer`](crate::RetryLayer).
///
/// Only stale pooled connections ([`HttpError::ConnectionClosed`]) on
/// idempotent methods are retried. Timeouts, connect failures and every
/// error on POST/PATCH/DELETE/... are returned on the first attempt.
///
/// [`HttpError::ConnectionClosed`]: crate::HttpError::ConnectionClosed
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt
    pub max_retries: usize,

    /// Deadline for each individual attempt; `None` waits indefinitely
    pub attempt_timeout: Option<Duration>,

    /// Delay between attempts; `None` retries immediately
    pub backoff: Option<ExponentialBackoff>,
}

impl RetryPolicy {
    /// Create a policy with `max_retries` and no delay between attempts
    #[must_use]
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Check whether a failed attempt should be re-issued
    #[must_use]
    pub fn should_retry(&self, err: &crate::HttpError, method: &http::Method) -> bool {
        err.is_stale_connection() && is_idempotent_method(method)
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport configuration shared by every request issued through one
/// [`HttpTransport`](crate::HttpTransport).
///
/// Timeouts are whole seconds; `0` disables the corresponding limit.
/// Applying a new config replaces every setting (no merge).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct ClientConfig {
    /// Verify server certificates (default: false)
    pub ssl_verify: bool,

    /// Root store used when `ssl_verify` is on (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Maximum in-flight connections per `host:port` (default: 1024, `0` = unlimited)
    ///
    /// Also caps the idle connections kept in the pool for each host.
    pub max_conns_per_host: usize,

    /// Maximum wait for each response body chunk, in seconds (default: 20)
    pub read_timeout: u64,

    /// Maximum time to establish a connection, in seconds (default: 3)
    pub write_timeout: u64,

    /// Idle pooled connections are closed after this many seconds (default: 90)
    pub pool_idle_timeout: u64,

    /// Do not inject [`default_user_agent`](Self::default_user_agent) (default: true)
    pub suppress_default_user_agent: bool,

    /// User-Agent added to requests lacking one when suppression is off
    pub default_user_agent: String,

    /// Global proxy used when a request carries no override (default: none)
    ///
    /// `socks4://` and `socks5://` select a SOCKS dialer; anything else is
    /// an HTTP CONNECT proxy, a bare value being read as `host:port`.
    pub proxy: String,

    /// Delay between stale-connection retries (default: none)
    #[serde(skip)]
    pub retry_backoff: Option<ExponentialBackoff>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ssl_verify: false,
            tls_roots: TlsRootConfig::default(),
            max_conns_per_host: 1024,
            read_timeout: 20,
            write_timeout: 3,
            pool_idle_timeout: 90,
            suppress_default_user_agent: true,
            default_user_agent: DEFAULT_USER_AGENT.to_owned(),
            proxy: String::new(),
            retry_backoff: None,
        }
    }
}

impl ClientConfig {
    /// Configuration that verifies certificates against the bundled roots
    #[must_use]
    pub fn verified() -> Self {
        Self {
            ssl_verify: true,
            ..Default::default()
        }
    }

    /// Set the global fallback proxy
    #[must_use]
    pub fn with_proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = proxy.into();
        self
    }

    pub(crate) fn read_timeout(&self) -> Option<Duration> {
        secs(self.read_timeout)
    }

    pub(crate) fn write_timeout(&self) -> Option<Duration> {
        secs(self.write_timeout)
    }

    pub(crate) fn pool_idle_timeout(&self) -> Option<Duration> {
        secs(self.pool_idle_timeout)
    }
}

fn secs(value: u64) -> Option<Duration> {
    (value > 0).then(|| Duration::from_secs(value))
}
