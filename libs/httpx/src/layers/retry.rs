use crate::config::RetryPolicy;
use crate::error::HttpError;
use bytes::Bytes;
use http::Request;
use http_body_util::Full;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service, ServiceExt};

/// Tower layer that re-issues requests after a stale pooled connection
///
/// Each attempt runs under the policy's per-attempt deadline. Only errors the
/// policy accepts (connection closed mid-exchange on GET/HEAD/PUT) are retried.
#[derive(Clone, Debug)]
pub struct RetryLayer {
    policy: RetryPolicy,
}

impl RetryLayer {
    /// Create a new `RetryLayer` with the specified policy
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            policy: self.policy.clone(),
        }
    }
}

/// Service that implements the stale-connection retry loop
///
/// At most `max_retries + 1` attempts are made. The last error is returned
/// unchanged once the budget is spent or the error is not retryable.
#[derive(Clone, Debug)]
pub struct RetryService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> Service<Request<Full<Bytes>>> for RetryService<S>
where
    S: Service<Request<Full<Bytes>>, Error = HttpError> + Clone + Send + 'static,
    S::Response: Send + 'static,
    S::Future: Send,
{
    type Response = S::Response;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        // Swap so we consume the instance that was poll_ready'd,
        // leaving a fresh clone for the next poll_ready cycle.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let policy = self.policy.clone();

        let (parts, body) = req.into_parts();

        // Parts::clone drops extensions, and the proxy route travels there
        let http_version = parts.version;
        let extensions = parts.extensions.clone();

        Box::pin(async move {
            let method = parts.method.clone();
            let url_host = parts
                .uri
                .authority()
                .map_or_else(|| "unknown".to_owned(), ToString::to_string);

            let mut attempt = 0usize;
            loop {
                let mut req = Request::from_parts(parts.clone(), body.clone());
                *req.version_mut() = http_version;
                *req.extensions_mut() = extensions.clone();

                let mut svc = inner.clone();
                svc.ready().await?;

                let result = match policy.attempt_timeout {
                    Some(limit) => match tokio::time::timeout(limit, svc.call(req)).await {
                        Ok(result) => result,
                        Err(_) => Err(HttpError::Timeout(limit)),
                    },
                    None => svc.call(req).await,
                };

                let err = match result {
                    Ok(resp) => return Ok(resp),
                    Err(err) => err,
                };

                if attempt >= policy.max_retries || !policy.should_retry(&err, &method) {
                    return Err(err);
                }

                let backoff = policy
                    .backoff
                    .as_ref()
                    .map(|b| b.delay(attempt));

                tracing::debug!(
                    retry = attempt + 1,
                    max_retries = policy.max_retries,
                    error = %err,
                    method = %method,
                    host = %url_host,
                    backoff_ms = backoff.map(|d| d.as_millis()),
                    "Retrying request after stale connection"
                );

                if let Some(delay) = backoff {
                    tokio::time::sleep(delay).await;
                }
                attempt += 1;
            }
        })
    }
}
