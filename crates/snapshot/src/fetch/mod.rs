//! Fetch layer - the only place bytes come from
//!
//! Design decisions:
//! 1. One trait, two implementations: HTTP for real runs, memory for tests/replay
//! 2. Fail fast - no retries, no queuing. The Resource Store decides what a failure means.
//! 3. Non-2xx is an error, not a body

mod http;
mod memory;

pub use http::HttpFetcher;
pub use memory::MemoryFetcher;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Body and declared type of a successful response
#[derive(Debug, Clone)]
pub struct FetchedBody {
    pub content: Bytes,
    /// Raw `Content-Type` header value, if the server sent one
    pub content_type: Option<String>,
}

/// Anything that can turn an absolute URL into bytes
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedBody, FetchError>;
}
