use crate::config::ClientConfig;
use crate::error::HttpError;
use crate::proxy::{Dialer, ProxyRoute};
use arc_swap::ArcSwap;
use bytes::{Bytes, BytesMut};
use dashmap::DashMap;
use http::header::USER_AGENT;
use http::{HeaderValue, Request, Response, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Service, ServiceExt};

type HyperClient = Client<HttpsConnector<Dialer>, Full<Bytes>>;

/// Pools kept for per-request proxy routes, on top of the default route's
const MAX_ROUTE_POOLS: usize = 64;

/// Shared HTTP transport
///
/// Cloning is cheap and clones share connection pools. The active
/// configuration is an immutable snapshot; [`configure`](Self::configure)
/// swaps in a new one while calls already in flight finish on the old one.
///
/// As a `tower::Service` it sends one request and returns the response with
/// its raw (still encoded) body fully read. A [`ProxyRoute`] request
/// extension selects the proxy for that request; without one the configured
/// global proxy is used.
#[derive(Clone)]
pub struct HttpTransport {
    state: Arc<ArcSwap<TransportState>>,
}

impl HttpTransport {
    /// Create a transport from `config`.
    ///
    /// # Errors
    /// Returns an error if the proxy or user agent are invalid, or TLS
    /// initialization fails (e.g. no usable native root certificates).
    pub fn new(config: ClientConfig) -> Result<Self, HttpError> {
        let state = TransportState::build(config)?;
        Ok(Self {
            state: Arc::new(ArcSwap::from_pointee(state)),
        })
    }

    /// Replace the whole transport configuration.
    ///
    /// New pools and host limits are created; nothing carries over from the
    /// previous configuration. On error the previous configuration stays
    /// active.
    ///
    /// # Errors
    /// Same as [`HttpTransport::new`].
    pub fn configure(&self, config: ClientConfig) -> Result<(), HttpError> {
        let state = TransportState::build(config)?;
        self.state.store(Arc::new(state));
        Ok(())
    }

    /// Snapshot of the active configuration
    #[must_use]
    pub fn config(&self) -> ClientConfig {
        self.state.load().config.clone()
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.load();
        f.debug_struct("HttpTransport")
            .field("config", &state.config)
            .field("default_route", &state.default_route)
            .field("pools", &state.pool_count())
            .finish_non_exhaustive()
    }
}

impl Service<Request<Full<Bytes>>> for HttpTransport {
    type Response = Response<Bytes>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
        let state = self.state.load_full();
        Box::pin(async move { state.send(req).await })
    }
}

/// Pool for a per-request proxy route, stamped on every use
struct RoutePool {
    client: HyperClient,
    last_used: AtomicU64,
}

/// One configuration generation: pools and host limits built from it.
///
/// The default route's pool lives as long as the generation. Pools for
/// per-request proxies are capped at [`MAX_ROUTE_POOLS`]; the least recently
/// used one is dropped first. Connections it still lends to in-flight calls
/// close once those calls finish.
struct TransportState {
    config: ClientConfig,
    default_route: ProxyRoute,
    default_client: HyperClient,
    user_agent: Option<HeaderValue>,
    routes: DashMap<ProxyRoute, RoutePool>,
    uses: AtomicU64,
    hosts: DashMap<String, Arc<Semaphore>>,
}

impl TransportState {
    fn build(config: ClientConfig) -> Result<Self, HttpError> {
        let default_route = ProxyRoute::parse(&config.proxy)?;
        let user_agent = if config.suppress_default_user_agent {
            None
        } else {
            Some(HeaderValue::from_str(&config.default_user_agent)?)
        };

        if !config.ssl_verify {
            tracing::warn!(
                "TLS certificate verification disabled (ssl_verify = false); \
                 any server certificate will be accepted"
            );
        }

        // Built eagerly so TLS setup failures surface here
        let default_client = build_client(&config, &default_route)?;

        tracing::debug!(
            ssl_verify = config.ssl_verify,
            tls_roots = ?config.tls_roots,
            max_conns_per_host = config.max_conns_per_host,
            read_timeout = config.read_timeout,
            write_timeout = config.write_timeout,
            proxy = ?default_route.proxy_uri(),
            "HTTP transport configured"
        );

        Ok(Self {
            config,
            default_route,
            default_client,
            user_agent,
            routes: DashMap::new(),
            uses: AtomicU64::new(0),
            hosts: DashMap::new(),
        })
    }

    fn pool_count(&self) -> usize {
        self.routes.len() + 1
    }

    fn client_for(&self, route: &ProxyRoute) -> Result<HyperClient, HttpError> {
        if *route == self.default_route {
            return Ok(self.default_client.clone());
        }

        let stamp = self.uses.fetch_add(1, Ordering::Relaxed);
        if let Some(pool) = self.routes.get(route) {
            pool.last_used.store(stamp, Ordering::Relaxed);
            return Ok(pool.client.clone());
        }

        let client = build_client(&self.config, route)?;
        tracing::debug!(proxy = ?route.proxy_uri(), "created connection pool");
        let client = self
            .routes
            .entry(route.clone())
            .or_insert_with(|| RoutePool {
                client,
                last_used: AtomicU64::new(stamp),
            })
            .client
            .clone();

        self.evict_routes();
        Ok(client)
    }

    fn evict_routes(&self) {
        while self.routes.len() > MAX_ROUTE_POOLS {
            let oldest = self
                .routes
                .iter()
                .min_by_key(|entry| entry.value().last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());
            let Some(route) = oldest else {
                return;
            };
            self.routes.remove(&route);
            tracing::debug!(proxy = ?route.proxy_uri(), "evicted connection pool");
        }
    }

    async fn acquire_host(&self, uri: &Uri) -> Result<Option<HostSlot<'_>>, HttpError> {
        let limit = self.config.max_conns_per_host;
        if limit == 0 {
            return Ok(None);
        }

        let key = host_key(uri);
        let semaphore = self
            .hosts
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(limit.min(Semaphore::MAX_PERMITS))))
            .value()
            .clone();

        let permit = semaphore
            .acquire_owned()
            .await
            .map_err(|e| HttpError::Transport(Box::new(e)))?;

        Ok(Some(HostSlot {
            hosts: &self.hosts,
            key,
            permit: Some(permit),
        }))
    }

    async fn send(&self, mut req: Request<Full<Bytes>>) -> Result<Response<Bytes>, HttpError> {
        let route = req
            .extensions()
            .get::<ProxyRoute>()
            .cloned()
            .unwrap_or_else(|| self.default_route.clone());
        let client = self.client_for(&route)?;

        if let Some(user_agent) = &self.user_agent
            && !req.headers().contains_key(USER_AGENT)
        {
            req.headers_mut().insert(USER_AGENT, user_agent.clone());
        }

        // Held until the body is fully read
        let _slot = self.acquire_host(req.uri()).await?;

        let response = client.oneshot(req).await?;
        self.read_body(response).await
    }

    async fn read_body(&self, response: Response<Incoming>) -> Result<Response<Bytes>, HttpError> {
        let (parts, mut body) = response.into_parts();
        let read_timeout = self.config.read_timeout();
        let mut collected = BytesMut::new();

        loop {
            let next = match read_timeout {
                Some(limit) => tokio::time::timeout(limit, body.frame())
                    .await
                    .map_err(|_| HttpError::Timeout(limit))?,
                None => body.frame().await,
            };
            let Some(frame) = next else {
                break;
            };
            if let Ok(chunk) = frame?.into_data() {
                collected.extend_from_slice(&chunk);
            }
        }

        Ok(Response::from_parts(parts, collected.freeze()))
    }
}

/// In-flight slot on a host's limiter.
///
/// Dropping it returns the permit and forgets the host's semaphore once
/// nothing else refers to it.
struct HostSlot<'a> {
    hosts: &'a DashMap<String, Arc<Semaphore>>,
    key: String,
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for HostSlot<'_> {
    fn drop(&mut self) {
        drop(self.permit.take());
        // Permits and waiters each hold a clone; only the map's is left when idle
        self.hosts
            .remove_if(&self.key, |_, semaphore| Arc::strong_count(semaphore) == 1);
    }
}

fn build_client(config: &ClientConfig, route: &ProxyRoute) -> Result<HyperClient, HttpError> {
    let dialer = Dialer::new(route.clone(), config.write_timeout());
    let https = crate::tls::https_connector(config, dialer)?;

    let max_idle = match config.max_conns_per_host {
        0 => usize::MAX,
        n => n,
    };

    let mut builder = Client::builder(TokioExecutor::new());
    // pool_timer is required for pool_idle_timeout to take effect
    builder
        .pool_timer(TokioTimer::new())
        .pool_max_idle_per_host(max_idle);
    if let Some(idle_timeout) = config.pool_idle_timeout() {
        builder.pool_idle_timeout(idle_timeout);
    }

    Ok(builder.build(https))
}

fn host_key(uri: &Uri) -> String {
    let scheme = uri.scheme_str().unwrap_or("http");
    let authority = uri.authority().map_or("", |a| a.as_str());
    format!("{scheme}://{}", authority.to_ascii_lowercase())
}
