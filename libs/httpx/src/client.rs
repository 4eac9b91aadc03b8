use crate::config::{ClientConfig, RetryPolicy};
use crate::error::HttpError;
use crate::layers::RetryLayer;
use crate::request::Requests;
use crate::response::Response;
use crate::transport::HttpTransport;
use tower::{ServiceBuilder, ServiceExt};

/// Executes [`Requests`] against a shared [`HttpTransport`]
///
/// Each call builds its own middleware stack from the request:
///
/// ```text
/// RetryLayer (requests.retry, per-attempt requests.timeout)
///   -> HttpTransport (proxy route, host limit, default User-Agent, hyper client)
/// ```
///
/// and normalizes the raw response into a [`Response`].
///
/// # Thread Safety
///
/// `RequestExecutor` is `Clone + Send + Sync`. Clones share the transport,
/// so one executor can serve any number of concurrent calls, each with its
/// own proxy.
///
/// # Example
///
/// ```ignore
/// let executor = RequestExecutor::new(ClientConfig::default())?;
///
/// let mut req = Requests::new();
/// req.url = "https://example.com/api".to_owned();
/// let resp = executor.execute(&req).await?;
/// println!("{} {}", resp.status, resp.text());
/// ```
#[derive(Clone, Debug)]
pub struct RequestExecutor {
    transport: HttpTransport,
}

impl RequestExecutor {
    /// Create an executor with a new transport built from `config`
    ///
    /// # Errors
    /// Returns an error if the transport cannot be built (see [`HttpTransport::new`])
    pub fn new(config: ClientConfig) -> Result<Self, HttpError> {
        Ok(Self::with_transport(HttpTransport::new(config)?))
    }

    /// Create an executor over an existing transport
    #[must_use]
    pub fn with_transport(transport: HttpTransport) -> Self {
        Self { transport }
    }

    /// The shared transport
    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Replace the transport configuration for this executor and its clones
    ///
    /// # Errors
    /// Same as [`HttpTransport::configure`].
    pub fn configure(&self, config: ClientConfig) -> Result<(), HttpError> {
        self.transport.configure(config)
    }

    /// Execute `requests` and return the normalized response.
    ///
    /// Any HTTP status is returned as `Ok`. Only stale pooled connections on
    /// GET, HEAD and PUT are retried, up to `requests.retry` times.
    ///
    /// # Errors
    /// - `InvalidMethod`, `InvalidUri`, `InvalidHeaderName`/`InvalidHeaderValue`,
    ///   `InvalidProxy` if the request cannot be assembled
    /// - `Timeout` if an attempt exceeds `requests.timeout`
    /// - `ConnectionClosed`, `Connect`, `Tls`, `Transport` for transport failures
    /// - `Decompression` if the body does not match its `Content-Encoding`
    pub async fn execute(&self, requests: &Requests) -> Result<Response, HttpError> {
        let request = requests.to_http_request()?;
        let method = request.method().clone();
        let url_host = request
            .uri()
            .authority()
            .map_or_else(String::new, ToString::to_string);

        let policy = RetryPolicy {
            max_retries: requests.retry,
            attempt_timeout: requests.attempt_timeout(),
            backoff: self.transport.config().retry_backoff,
        };

        tracing::debug!(
            method = %method,
            host = %url_host,
            proxy = !requests.proxy.trim().is_empty(),
            retry = requests.retry,
            timeout_secs = requests.timeout,
            "Sending request"
        );

        let service = ServiceBuilder::new()
            .layer(RetryLayer::new(policy))
            .service(self.transport.clone());

        let raw = match service.oneshot(request).await {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(method = %method, host = %url_host, error = %err, "Request failed");
                return Err(err);
            }
        };

        let response = Response::from_http(raw)?;
        tracing::debug!(
            method = %method,
            host = %url_host,
            status = response.status,
            body_len = response.body.len(),
            "Received response"
        );
        Ok(response)
    }
}
