//! Proxy route selection and the connector that dials through it.
//!
//! A [`ProxyRoute`] is a plain value. It is attached to each outgoing request
//! as an extension and picks the connection pool used for that request, so
//! two requests with different proxies never share a dialer.

use crate::error::{BoxError, HttpError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::{HeaderValue, Uri};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::connect::proxy::{SocksV4, SocksV5, Tunnel};
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpStream;
use tower::{Service, ServiceExt};

const SOCKS4_PREFIX: &str = "socks4://";
const SOCKS5_PREFIX: &str = "socks5://";
const DEFAULT_SOCKS_PORT: u16 = 1080;

/// How connections for a request are dialed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum ProxyRoute {
    /// Connect straight to the origin
    #[default]
    Direct,
    /// HTTP proxy, tunnelled with `CONNECT`
    Http {
        /// `http://host:port` of the proxy
        proxy: Uri,
        /// `Proxy-Authorization` value built from URL credentials
        auth: Option<HeaderValue>,
    },
    /// SOCKS4 proxy (destination resolved locally)
    Socks4 {
        /// `socks4://host:port` of the proxy
        proxy: Uri,
    },
    /// SOCKS5 proxy
    Socks5 {
        /// `socks5://host:port` of the proxy
        proxy: Uri,
        /// Username/password from URL credentials
        credentials: Option<(String, String)>,
    },
}

impl ProxyRoute {
    /// Select a route from a proxy string.
    ///
    /// Empty or whitespace-only input means [`ProxyRoute::Direct`].
    /// `socks4://` and `socks5://` prefixes select SOCKS; every other value is
    /// an HTTP proxy, and a value without a scheme is read as `host:port`.
    /// `user:pass@` credentials are honoured for HTTP and SOCKS5 proxies.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidProxy` if the value cannot be parsed, has no
    /// host, or uses a scheme other than `http`, `socks4` or `socks5`.
    pub fn parse(raw: &str) -> Result<Self, HttpError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::Direct);
        }

        let lower = trimmed.to_ascii_lowercase();
        let candidate = if lower.starts_with(SOCKS4_PREFIX)
            || lower.starts_with(SOCKS5_PREFIX)
            || trimmed.contains("://")
        {
            trimmed.to_owned()
        } else {
            format!("http://{trimmed}")
        };

        let invalid = |reason: String| HttpError::InvalidProxy {
            proxy: trimmed.to_owned(),
            reason,
        };

        let url = url::Url::parse(&candidate).map_err(|e| invalid(e.to_string()))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| invalid("missing host".to_owned()))?;
        let scheme = url.scheme();
        let port = url
            .port_or_known_default()
            .unwrap_or(DEFAULT_SOCKS_PORT);
        let proxy: Uri = format!("{scheme}://{host}:{port}")
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;

        let credentials = (!url.username().is_empty()).then(|| {
            (
                url.username().to_owned(),
                url.password().unwrap_or_default().to_owned(),
            )
        });

        match scheme {
            "socks4" => Ok(Self::Socks4 { proxy }),
            "socks5" => Ok(Self::Socks5 { proxy, credentials }),
            "http" => {
                let auth = credentials
                    .map(|(user, pass)| {
                        let token = STANDARD.encode(format!("{user}:{pass}"));
                        HeaderValue::try_from(format!("Basic {token}"))
                    })
                    .transpose()
                    .map_err(|e| invalid(e.to_string()))?;
                Ok(Self::Http { proxy, auth })
            }
            other => Err(invalid(format!("unsupported proxy scheme '{other}'"))),
        }
    }

    /// True for SOCKS4 and SOCKS5 routes.
    #[must_use]
    pub fn is_socks(&self) -> bool {
        matches!(self, Self::Socks4 { .. } | Self::Socks5 { .. })
    }

    /// True for an HTTP CONNECT route.
    #[must_use]
    pub fn is_http(&self) -> bool {
        matches!(self, Self::Http { .. })
    }

    /// The proxy endpoint, or `None` for direct connections.
    #[must_use]
    pub fn proxy_uri(&self) -> Option<&Uri> {
        match self {
            Self::Direct => None,
            Self::Http { proxy, .. } | Self::Socks4 { proxy } | Self::Socks5 { proxy, .. } => {
                Some(proxy)
            }
        }
    }
}

type DialFuture = Pin<Box<dyn Future<Output = Result<TokioIo<TcpStream>, BoxError>> + Send>>;

/// Connector dialing TCP either directly or through the route's proxy.
///
/// `connect_timeout` bounds the TCP connect together with any proxy handshake.
#[derive(Clone)]
pub(crate) struct Dialer {
    route: ProxyRoute,
    tcp: HttpConnector,
    connect_timeout: Option<Duration>,
}

impl Dialer {
    pub(crate) fn new(route: ProxyRoute, connect_timeout: Option<Duration>) -> Self {
        let mut tcp = HttpConnector::new();
        // TLS is layered on top by hyper-rustls, so https destinations pass through here
        tcp.enforce_http(false);
        tcp.set_nodelay(true);
        Self {
            route,
            tcp,
            connect_timeout,
        }
    }
}

impl Service<Uri> for Dialer {
    type Response = TokioIo<TcpStream>;
    type Error = BoxError;
    type Future = DialFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let tcp = self.tcp.clone();
        let connecting = match &self.route {
            ProxyRoute::Direct => dial(tcp, dst),
            ProxyRoute::Http { proxy, auth } => {
                let mut tunnel = Tunnel::new(proxy.clone(), tcp);
                if let Some(auth) = auth {
                    tunnel = tunnel.with_auth(auth.clone());
                }
                dial(tunnel, dst)
            }
            ProxyRoute::Socks4 { proxy } => {
                // SOCKS4 cannot carry hostnames
                dial(SocksV4::new(proxy.clone(), tcp).local_dns(true), dst)
            }
            ProxyRoute::Socks5 { proxy, credentials } => {
                let mut socks = SocksV5::new(proxy.clone(), tcp);
                if let Some((user, pass)) = credentials {
                    socks = socks.with_auth(user.clone(), pass.clone());
                }
                dial(socks, dst)
            }
        };

        let Some(limit) = self.connect_timeout else {
            return connecting;
        };
        Box::pin(async move {
            match tokio::time::timeout(limit, connecting).await {
                Ok(result) => result,
                Err(_) => Err(Box::new(std::io::Error::new(
                    std::io::ErrorKind::TimedOut,
                    format!("connect timed out after {limit:?}"),
                )) as BoxError),
            }
        })
    }
}

fn dial<S>(connector: S, dst: Uri) -> DialFuture
where
    S: Service<Uri, Response = TokioIo<TcpStream>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Into<BoxError>,
{
    Box::pin(async move { connector.oneshot(dst).await.map_err(Into::into) })
}
