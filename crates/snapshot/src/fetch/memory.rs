use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::{FetchError, FetchedBody, Fetcher};

#[derive(Debug, Clone)]
struct MemoryEntry {
    content: Bytes,
    content_type: Option<String>,
    status: u16,
    delay: Option<Duration>,
}

/// Serves responses from an in-memory URL map
///
/// Used to replay captured pages offline and to keep tests hermetic.
/// Every call is counted per URL, hits and misses alike.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    entries: DashMap<String, MemoryEntry>,
    calls: DashMap<String, usize>,
    total_calls: AtomicUsize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a successful response
    pub fn insert(&self, url: &str, content_type: &str, content: impl Into<Bytes>) {
        self.entries.insert(
            url.to_string(),
            MemoryEntry {
                content: content.into(),
                content_type: Some(content_type.to_string()).filter(|ct| !ct.is_empty()),
                status: 200,
                delay: None,
            },
        );
    }

    /// Register a response that only completes after `delay`
    pub fn insert_delayed(
        &self,
        url: &str,
        content_type: &str,
        content: impl Into<Bytes>,
        delay: Duration,
    ) {
        self.insert(url, content_type, content);
        if let Some(mut entry) = self.entries.get_mut(url) {
            entry.delay = Some(delay);
        }
    }

    /// Register a response with a non-success status
    pub fn insert_status(&self, url: &str, status: u16) {
        self.entries.insert(
            url.to_string(),
            MemoryEntry {
                content: Bytes::new(),
                content_type: None,
                status,
                delay: None,
            },
        );
    }

    /// Number of fetches issued for `url`
    pub fn calls(&self, url: &str) -> usize {
        self.calls.get(url).map(|count| *count).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for MemoryFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedBody, FetchError> {
        *self.calls.entry(url.to_string()).or_insert(0) += 1;
        self.total_calls.fetch_add(1, Ordering::SeqCst);

        // Clone out so no map guard is held across the await
        let entry = self.entries.get(url).map(|entry| entry.clone());

        match entry.as_ref().and_then(|entry| entry.delay) {
            Some(delay) => tokio::time::sleep(delay).await,
            None => tokio::task::yield_now().await,
        }

        let entry = entry.ok_or_else(|| FetchError::NotFound(url.to_string()))?;
        if !(200..300).contains(&entry.status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: entry.status,
            });
        }

        Ok(FetchedBody {
            content: entry.content,
            content_type: entry.content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_fetcher_serves_and_counts() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("https://x.test/a.css", "text/css", "a{}");
        fetcher.insert_status("https://x.test/gone", 404);

        let body = fetcher.fetch("https://x.test/a.css").await.unwrap();
        assert_eq!(body.content, Bytes::from("a{}"));
        assert_eq!(body.content_type.as_deref(), Some("text/css"));

        assert!(matches!(
            fetcher.fetch("https://x.test/gone").await,
            Err(FetchError::Status { status: 404, .. })
        ));
        assert!(matches!(
            fetcher.fetch("https://x.test/missing").await,
            Err(FetchError::NotFound(_))
        ));

        assert_eq!(fetcher.calls("https://x.test/a.css"), 1);
        assert_eq!(fetcher.calls("https://x.test/missing"), 1);
        assert_eq!(fetcher.total_calls(), 3);
    }
}
