//! Tower layers for the request pipeline
//!
//! - [`RetryLayer`] - Re-issues idempotent requests after a stale pooled connection

mod retry;

pub use retry::{RetryLayer, RetryService};
