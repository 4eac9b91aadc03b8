use crate::config::{DEFAULT_REQUEST_RETRY, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_REQUEST_USER_AGENT};
use crate::error::{HttpError, InvalidUriKind};
use crate::proxy::ProxyRoute;
use bytes::Bytes;
use http::header::{COOKIE, HeaderName, HeaderValue};
use http::{Method, Request, Uri};
use http_body_util::Full;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const USER_AGENT_KEY: &str = "User-Agent";

/// Description of a single HTTP call.
///
/// Build one with [`Requests::new`] to get the default `User-Agent`, timeout
/// and retry budget, then fill in the remaining fields. Nothing is validated
/// until the request is executed.
///
/// # Example
///
/// ```ignore
/// let mut req = Requests::new();
/// req.url = "https://example.com/api".to_owned();
/// req.method = httpx::types::POST.to_owned();
/// req.body = Bytes::from_static(br#"{"k":"v"}"#);
/// req.proxy = "socks5://127.0.0.1:1080".to_owned();
/// let resp = executor.execute(&req).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Requests {
    /// Absolute URL
    pub url: String,
    /// HTTP method token; empty means GET
    pub method: String,
    /// Request headers, inserted with overwrite semantics
    pub headers: HashMap<String, String>,
    /// Cookies sent in a single `Cookie` header
    pub cookies: HashMap<String, String>,
    /// Request body, sent verbatim
    #[serde(with = "body_bytes")]
    pub body: Bytes,
    /// Per-attempt deadline in seconds; `0` disables it
    pub timeout: u64,
    /// Maximum stale-connection retries
    pub retry: usize,
    /// Per-request proxy overriding the transport's global proxy
    pub proxy: String,
}

impl Default for Requests {
    fn default() -> Self {
        Self::new()
    }
}

impl Requests {
    /// Create a request with default `User-Agent`, 60s timeout and 3 retries
    #[must_use]
    pub fn new() -> Self {
        Self {
            url: String::new(),
            method: String::new(),
            headers: HashMap::from([(
                USER_AGENT_KEY.to_owned(),
                DEFAULT_REQUEST_USER_AGENT.to_owned(),
            )]),
            cookies: HashMap::new(),
            body: Bytes::new(),
            timeout: DEFAULT_REQUEST_TIMEOUT_SECS,
            retry: DEFAULT_REQUEST_RETRY,
            proxy: String::new(),
        }
    }

    /// Per-attempt deadline, `None` when `timeout` is zero
    #[must_use]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    /// Parse the method token, defaulting to GET when empty.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidMethod` for a malformed token.
    pub fn parsed_method(&self) -> Result<Method, HttpError> {
        let token = self.method.trim();
        if token.is_empty() {
            return Ok(Method::GET);
        }
        Ok(Method::from_bytes(token.as_bytes())?)
    }

    /// Per-request proxy route, or `None` when no override is set.
    ///
    /// # Errors
    /// Returns `HttpError::InvalidProxy` if `proxy` cannot be parsed.
    pub fn proxy_route(&self) -> Result<Option<ProxyRoute>, HttpError> {
        if self.proxy.trim().is_empty() {
            return Ok(None);
        }
        ProxyRoute::parse(&self.proxy).map(Some)
    }

    /// Assemble the outgoing `http::Request`.
    ///
    /// The proxy override, when present, is attached as a request extension.
    ///
    /// # Errors
    /// Returns an error for an invalid method, URL, header, or proxy.
    pub fn to_http_request(&self) -> Result<Request<Full<Bytes>>, HttpError> {
        let method = self.parsed_method()?;
        let uri = parse_absolute_uri(&self.url)?;

        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Full::new(self.body.clone()))?;

        let headers = request.headers_mut();
        for (name, value) in &self.headers {
            headers.insert(
                HeaderName::try_from(name.as_str())?,
                HeaderValue::try_from(value.as_str())?,
            );
        }

        if let Some(cookie) = cookie_header(headers.get(COOKIE), &self.cookies)? {
            headers.insert(COOKIE, cookie);
        }

        if let Some(route) = self.proxy_route()? {
            request.extensions_mut().insert(route);
        }

        Ok(request)
    }
}

/// Merge `cookies` into a `Cookie` header value (sorted by name), appending
/// to any value the caller set explicitly.
fn cookie_header(
    existing: Option<&HeaderValue>,
    cookies: &HashMap<String, String>,
) -> Result<Option<HeaderValue>, HttpError> {
    if cookies.is_empty() {
        return Ok(None);
    }

    let mut pairs: Vec<_> = cookies.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));

    let mut parts: Vec<String> = Vec::with_capacity(pairs.len() + 1);
    if let Some(existing) = existing.and_then(|v| v.to_str().ok())
        && !existing.trim().is_empty()
    {
        parts.push(existing.trim().to_owned());
    }
    parts.extend(pairs.into_iter().map(|(k, v)| format!("{k}={v}")));

    Ok(Some(HeaderValue::try_from(parts.join("; "))?))
}

/// Parse a URL, requiring scheme and authority.
pub(crate) fn parse_absolute_uri(url: &str) -> Result<Uri, HttpError> {
    let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| HttpError::InvalidUri {
        url: url.to_owned(),
        kind: InvalidUriKind::ParseError,
        reason: e.to_string(),
    })?;

    if uri.scheme().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingScheme,
            reason: "URL must include a scheme (http:// or https://)".to_owned(),
        });
    }
    if uri.authority().is_none() {
        return Err(HttpError::InvalidUri {
            url: url.to_owned(),
            kind: InvalidUriKind::MissingAuthority,
            reason: "URL must include a host".to_owned(),
        });
    }

    Ok(uri)
}

mod body_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(body: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(body)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        Vec::<u8>::deserialize(d).map(Bytes::from)
    }
}
