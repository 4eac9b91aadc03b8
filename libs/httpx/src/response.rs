use crate::decode::{ContentEncoding, decode_body};
use crate::error::HttpError;
use bytes::Bytes;
use http::HeaderMap;
use http::header::{CONTENT_ENCODING, SET_COOKIE};
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Normalized result of an executed request.
///
/// Any HTTP status is a successful result here; only transport failures,
/// timeouts and body decoding failures surface as [`HttpError`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response headers keyed by lowercase name.
    ///
    /// A header received several times holds all its values concatenated
    /// without a separator, in arrival order.
    pub headers: HashMap<String, String>,
    /// Cookies set by the response (`Set-Cookie`), one value per name
    pub cookies: HashMap<String, String>,
    /// Body, decoded according to `Content-Encoding`
    pub body: Bytes,
}

impl Response {
    /// Normalize a fully read `http::Response`.
    ///
    /// # Errors
    /// Returns `HttpError::Decompression` if the body does not match its
    /// declared `Content-Encoding`.
    pub fn from_http(response: http::Response<Bytes>) -> Result<Self, HttpError> {
        let (parts, raw) = response.into_parts();

        let encoding = parts
            .headers
            .get(CONTENT_ENCODING)
            .and_then(|v| v.to_str().ok())
            .map_or(ContentEncoding::Identity, ContentEncoding::from_header);
        let body = decode_body(encoding, raw)?;

        Ok(Self {
            status: parts.status.as_u16(),
            headers: fold_headers(&parts.headers),
            cookies: parse_set_cookies(&parts.headers),
            body,
        })
    }

    /// True for 2xx statuses
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Case-insensitive header lookup
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Body as text, replacing invalid UTF-8 sequences
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserialize the body as JSON
    ///
    /// # Errors
    /// Returns `HttpError::Json` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

fn fold_headers(headers: &HeaderMap) -> HashMap<String, String> {
    let mut folded: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        // HeaderName is already lowercase
        folded
            .entry(name.as_str().to_owned())
            .or_default()
            .push_str(&String::from_utf8_lossy(value.as_bytes()));
    }
    folded
}

fn parse_set_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for value in headers.get_all(SET_COOKIE) {
        let raw = String::from_utf8_lossy(value.as_bytes());
        if let Some((name, value)) = parse_cookie_pair(&raw) {
            cookies.insert(name.to_owned(), value.to_owned());
        }
    }
    cookies
}

/// Name and value of a `Set-Cookie` header, attributes ignored
fn parse_cookie_pair(raw: &str) -> Option<(&str, &str)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, value.trim()))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    fn response() -> http::response::Builder {
        http::Response::builder().status(200)
    }

    #[test]
    fn test_status_and_body_copied() {
        let resp = Response::from_http(
            http::Response::builder()
                .status(418)
                .body(Bytes::from_static(b"teapot"))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(resp.status, 418);
        assert_eq!(resp.text(), "teapot");
        assert!(!resp.is_success());
    }

    #[test]
    fn test_headers_lowercased() {
        let resp = Response::from_http(
            response()
                .header("Content-Type", "text/plain")
                .body(Bytes::new())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(resp.headers["content-type"], "text/plain");
        assert_eq!(resp.header("Content-Type"), Some("text/plain"));
    }

    #[test]
    fn test_repeated_headers_concatenated() {
        let resp = Response::from_http(
            response()
                .header("X-Trace", "a")
                .header("X-Trace", "b")
                .body(Bytes::new())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(resp.headers["x-trace"], "ab");
    }

    #[test]
    fn test_set_cookie_attributes_stripped() {
        let resp = Response::from_http(
            response()
                .header("Set-Cookie", "sid=abc123; Path=/; HttpOnly")
                .header("Set-Cookie", "theme = dark ; Max-Age=60")
                .body(Bytes::new())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(resp.cookies.len(), 2);
        assert_eq!(resp.cookies["sid"], "abc123");
        assert_eq!(resp.cookies["theme"], "dark");
    }

    #[test]
    fn test_cookie_value_may_contain_equals() {
        assert_eq!(parse_cookie_pair("token=a=b==; Secure"), Some(("token", "a=b==")));
    }

    #[test]
    fn test_last_cookie_occurrence_wins() {
        let resp = Response::from_http(
            response()
                .header("Set-Cookie", "sid=first")
                .header("Set-Cookie", "sid=second")
                .body(Bytes::new())
                .unwrap(),
        )
        .unwrap();
        assert_eq!(resp.cookies["sid"], "second");
    }

    #[test]
    fn test_malformed_cookies_ignored() {
        assert_eq!(parse_cookie_pair("HttpOnly; Secure"), None);
        assert_eq!(parse_cookie_pair("=value; Path=/"), None);
        assert_eq!(parse_cookie_pair(""), None);
        assert_eq!(parse_cookie_pair("empty="), Some(("empty", "")));
    }

    #[test]
    fn test_gzip_body_decoded() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"hello gzip").unwrap();
        let compressed = enc.finish().unwrap();

        let resp = Response::from_http(
            response()
                .header("Content-Encoding", "GZIP")
                .body(Bytes::from(compressed))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(resp.text(), "hello gzip");
        // the header itself is reported as received
        assert_eq!(resp.headers["content-encoding"], "GZIP");
    }

    #[test]
    fn test_unknown_encoding_passes_through() {
        let resp = Response::from_http(
            response()
                .header("Content-Encoding", "zstd")
                .body(Bytes::from_static(b"\x28\xb5\x2f\xfd"))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(&resp.body[..], b"\x28\xb5\x2f\xfd");
    }

    #[test]
    fn test_corrupt_body_is_an_error() {
        let result = Response::from_http(
            response()
                .header("Content-Encoding", "gzip")
                .body(Bytes::from_static(b"plain text, not gzip"))
                .unwrap(),
        );
        assert!(matches!(result, Err(HttpError::Decompression { .. })));
    }

    #[test]
    fn test_json_body() {
        #[derive(serde::Deserialize)]
        struct Payload {
            id: u32,
        }

        let resp = Response::from_http(
            response()
                .body(Bytes::from_static(br#"{"id": 7}"#))
                .unwrap(),
        )
        .unwrap();
        assert!(resp.is_success());
        assert_eq!(resp.json::<Payload>().unwrap().id, 7);
        assert!(matches!(
            resp.json::<Vec<u32>>(),
            Err(HttpError::Json(_))
        ));
    }
}
