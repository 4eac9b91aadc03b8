#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Configurable HTTP request helper
//!
//! This crate executes a plain [`Requests`] description and hands back a
//! normalized [`Response`]:
//! - Connection pooling over hyper, one pool per proxy route
//! - Per-request proxy override (`socks4://`, `socks5://`, HTTP CONNECT)
//!   with a global fallback in [`ClientConfig`]
//! - TLS via rustls; certificate verification is off unless enabled
//! - Per-attempt timeout and retry of stale pooled connections for GET,
//!   HEAD and PUT
//! - Response bodies decoded from gzip, brotli and deflate
//! - Headers folded by lowercase name and `Set-Cookie` parsed into a map
//!
//! Every HTTP status is a successful result; errors are reserved for
//! request assembly, transport, timeout and decoding failures.
//!
//! # Example
//!
//! ```ignore
//! use httpx::{ClientConfig, RequestExecutor, Requests};
//!
//! let executor = RequestExecutor::new(ClientConfig::default())?;
//!
//! let mut req = Requests::new();
//! req.url = "https://example.com/api".to_owned();
//! req.method = httpx::types::POST.to_owned();
//! req.headers.insert("Content-Type".to_owned(), httpx::types::mime::APPLICATION_JSON.to_owned());
//! req.body = r#"{"name":"value"}"#.into();
//! req.proxy = "socks5://127.0.0.1:1080".to_owned();
//!
//! let resp = executor.execute(&req).await?;
//! let data: MyData = resp.json()?;
//! ```

mod client;
mod config;
mod decode;
mod error;
mod layers;
mod proxy;
mod request;
mod response;
mod tls;
mod transport;
pub mod types;

pub use client::RequestExecutor;
pub use config::{
    ClientConfig, DEFAULT_REQUEST_RETRY, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_REQUEST_USER_AGENT,
    DEFAULT_USER_AGENT, ExponentialBackoff, RetryPolicy, TlsRootConfig, is_idempotent_method,
};
pub use decode::{ContentEncoding, decode_body};
pub use error::{BoxError, HttpError, InvalidUriKind};
pub use layers::{RetryLayer, RetryService};
pub use proxy::ProxyRoute;
pub use request::Requests;
pub use response::Response;
pub use transport::HttpTransport;
