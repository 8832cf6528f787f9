//! Resource Store - content-addressed fetch, cache and dedup
//!
//! ## Invariants
//!
//! - At most one fetch per distinct URL, even under concurrent `create` calls.
//!   Each URL owns a `OnceCell`; the first caller runs the fetch, everyone
//!   else awaits the same cell. Failures are cached the same way.
//! - `storage_path` always matches `content`: a `Resource` is immutable and
//!   "changing" content builds a new one with a fresh hash.
//! - Output is deduplicated by storage path, so identical bytes fetched
//!   from different URLs are stored once.
//!
//! ```text
//! sha256(content) = 3fa9…  →  resources/3f/3fa9….png
//! ```

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use url::Url;

use crate::events::{ProgressSink, SnapshotEvent};
use crate::fetch::{FetchedBody, Fetcher};

const EXTENSION_ALIASES: &[(&str, &str)] = &[("jpeg", "jpg")];

/// One fetched byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    source_url: String,
    content: Bytes,
    mime_type: String,
    extension: String,
    filename: String,
    sha256: String,
    storage_path: String,
    src: String,
}

impl Resource {
    /// Build a resource and derive everything that depends on its content
    pub fn new(source_url: &str, content: Bytes, mime_type: &str, link_prefix: &str) -> Self {
        let extension = extension_for_mime(mime_type);
        let sha256 = sha256_hex(&content);
        let storage_path = storage_path(&sha256, &extension);

        Self {
            source_url: source_url.to_string(),
            filename: filename_from_url(source_url),
            mime_type: mime_type.to_string(),
            src: format!("{}{}", link_prefix, storage_path),
            content,
            extension,
            sha256,
            storage_path,
        }
    }

    /// Same resource with new content, rehashed
    pub fn with_content(&self, content: Bytes) -> Self {
        let sha256 = sha256_hex(&content);
        let storage_path = storage_path(&sha256, &self.extension);
        let prefix_len = self.src.len() - self.storage_path.len();

        Self {
            src: format!("{}{}", &self.src[..prefix_len], storage_path),
            source_url: self.source_url.clone(),
            mime_type: self.mime_type.clone(),
            extension: self.extension.clone(),
            filename: self.filename.clone(),
            content,
            sha256,
            storage_path,
        }
    }

    pub fn source_url(&self) -> &str {
        &self.source_url
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// `resources/<h0h1>/<hash>.<ext>`
    pub fn storage_path(&self) -> &str {
        &self.storage_path
    }

    /// Reference written into rewritten markup and CSS
    pub fn src(&self) -> &str {
        &self.src
    }
}

/// `text/css; charset=utf-8` → `css`, `image/svg+xml` → `svg`, `image/jpeg` → `jpg`
pub fn extension_for_mime(mime_type: &str) -> String {
    let essence = mime_type.split(' ').next().unwrap_or("");
    let subtype = essence.rsplit('/').next().unwrap_or("").to_lowercase();
    let extension = subtype
        .split('+')
        .next()
        .and_then(|s| s.split(';').next())
        .unwrap_or("");

    if extension.is_empty() {
        return "unknown".to_string();
    }

    EXTENSION_ALIASES
        .iter()
        .find(|(from, _)| *from == extension)
        .map(|(_, to)| to.to_string())
        .unwrap_or_else(|| extension.to_string())
}

/// Last path segment of the URL
pub fn filename_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|url| url.path_segments()?.last().map(str::to_string))
        .unwrap_or_default()
}

pub fn sha256_hex(content: &[u8]) -> String {
    Sha256::digest(content)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

pub fn storage_path(sha256: &str, extension: &str) -> String {
    format!("resources/{}/{}.{}", &sha256[..2], sha256, extension)
}

type ResourceCell = Arc<OnceCell<Option<Arc<Resource>>>>;

/// Per-document resource cache
pub struct ResourceStore {
    fetcher: Arc<dyn Fetcher>,
    progress: Arc<dyn ProgressSink>,
    link_prefix: String,

    /// URL → single-flight fetch result (original bytes)
    entries: DashMap<String, ResourceCell>,

    /// URL → latest finalized version (rewritten content wins)
    finalized: DashMap<String, Arc<Resource>>,
}

impl ResourceStore {
    pub fn new(fetcher: Arc<dyn Fetcher>, progress: Arc<dyn ProgressSink>, link_prefix: &str) -> Self {
        Self {
            fetcher,
            progress,
            link_prefix: link_prefix.to_string(),
            entries: DashMap::new(),
            finalized: DashMap::new(),
        }
    }

    /// Fetch `url` once and return the resource built from its original bytes.
    /// `None` when the fetch failed; the failure is remembered.
    pub async fn create(&self, url: &str) -> Option<Arc<Resource>> {
        let cell: ResourceCell = self.entries.entry(url.to_string()).or_default().value().clone();
        if cell.initialized() {
            tracing::debug!("[ResourceStore] Cache hit: {}", url);
        }

        cell.get_or_init(|| self.fetch_resource(url)).await.clone()
    }

    /// Replace the stored content of `resource` (e.g. with sanitized CSS)
    pub fn update_content(&self, resource: &Resource, content: impl Into<Bytes>) -> Arc<Resource> {
        let updated = Arc::new(resource.with_content(content.into()));
        self.finalized
            .insert(resource.source_url().to_string(), updated.clone());
        updated
    }

    /// Download `url` and return it as a base64 `data:` URI without storing it
    pub async fn fetch_data_url(&self, url: &str) -> Option<String> {
        if url.starts_with("data:") {
            return Some(url.to_string());
        }

        let body = self.download(url).await?;
        let mime = body
            .content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .filter(|ct| !ct.is_empty())
            .unwrap_or("application/octet-stream");

        Some(format!("data:{};base64,{}", mime, STANDARD.encode(&body.content)))
    }

    /// Finalized resources, one per storage path, ordered by storage path
    pub fn resources(&self) -> Vec<Arc<Resource>> {
        merge_resources(self.finalized.iter().map(|entry| entry.value().clone()))
    }

    async fn fetch_resource(&self, url: &str) -> Option<Arc<Resource>> {
        let body = self.download(url).await?;
        let mime_type = body.content_type.unwrap_or_default();
        let resource = Arc::new(Resource::new(url, body.content, &mime_type, &self.link_prefix));

        tracing::debug!(
            "[ResourceStore] Stored {} as {} ({} bytes)",
            url,
            resource.storage_path(),
            resource.content().len()
        );
        self.finalized.insert(url.to_string(), resource.clone());
        Some(resource)
    }

    async fn download(&self, url: &str) -> Option<FetchedBody> {
        self.progress.on_event(&SnapshotEvent::DownloadStarted {
            url: url.to_string(),
        });

        match self.fetcher.fetch(url).await {
            Ok(body) => {
                self.progress.on_event(&SnapshotEvent::DownloadFinished {
                    url: url.to_string(),
                });
                Some(body)
            }
            Err(err) => {
                tracing::warn!("[ResourceStore] ⚠️  Failed to fetch {}: {}", url, err);
                self.progress.on_event(&SnapshotEvent::DownloadFailed {
                    url: url.to_string(),
                });
                None
            }
        }
    }
}

/// Deduplicate by storage path. Among identical contents the resource with
/// the smallest source URL wins so the output does not depend on map order.
pub fn merge_resources(resources: impl IntoIterator<Item = Arc<Resource>>) -> Vec<Arc<Resource>> {
    let mut by_path: BTreeMap<String, Arc<Resource>> = BTreeMap::new();

    for resource in resources {
        match by_path.get(resource.storage_path()) {
            Some(existing) if existing.source_url() <= resource.source_url() => {}
            _ => {
                by_path.insert(resource.storage_path().to_string(), resource);
            }
        }
    }

    by_path.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{Progress, ProgressCounters, SilentProgress};
    use crate::fetch::MemoryFetcher;
    use std::time::Duration;

    fn store_with(fetcher: Arc<MemoryFetcher>) -> ResourceStore {
        ResourceStore::new(fetcher, Arc::new(SilentProgress), "../../")
    }

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("text/css; charset=utf-8"), "css");
        assert_eq!(extension_for_mime("image/svg+xml"), "svg");
        assert_eq!(extension_for_mime("image/JPEG"), "jpg");
        assert_eq!(extension_for_mime("font/woff2"), "woff2");
        assert_eq!(extension_for_mime("text/css;charset=utf-8"), "css");
        assert_eq!(extension_for_mime(""), "unknown");
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(filename_from_url("https://x.test/img/logo.png?v=2"), "logo.png");
        assert_eq!(filename_from_url("https://x.test/"), "");
        assert_eq!(filename_from_url("nonsense"), "");
    }

    #[test]
    fn test_hash_stability() {
        let a = Resource::new("https://a.test/1.png", Bytes::from_static(b"same"), "image/png", "");
        let b = Resource::new("https://b.test/2.png", Bytes::from_static(b"same"), "image/png", "");

        assert_eq!(a.sha256(), b.sha256());
        assert_eq!(a.storage_path(), b.storage_path());
        assert_eq!(
            a.sha256(),
            "0967115f2813a3541eaef77de9d9d5773f1c0c04314b0bbfe4ff3b3b1c55b5d5"
        );
        assert_eq!(
            a.storage_path(),
            "resources/09/0967115f2813a3541eaef77de9d9d5773f1c0c04314b0bbfe4ff3b3b1c55b5d5.png"
        );
    }

    #[test]
    fn test_with_content_rehashes() {
        let original = Resource::new("https://x.test/s.css", Bytes::from_static(b"a{}"), "text/css", "../../");
        let updated = original.with_content(Bytes::from_static(b"b{}"));

        assert_ne!(original.sha256(), updated.sha256());
        assert_eq!(updated.sha256(), sha256_hex(b"b{}"));
        assert_eq!(updated.src(), format!("../../{}", updated.storage_path()));
        assert_eq!(updated.filename(), "s.css");
        assert_eq!(updated.extension(), "css");
    }

    #[tokio::test]
    async fn test_at_most_one_fetch_under_concurrency() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert_delayed(
            "https://x.test/a.png",
            "image/png",
            "png-bytes",
            Duration::from_millis(20),
        );
        let store = store_with(fetcher.clone());

        let results =
            futures_util::future::join_all((0..10).map(|_| store.create("https://x.test/a.png"))).await;

        assert_eq!(fetcher.calls("https://x.test/a.png"), 1);
        let first = results[0].clone().unwrap();
        for result in &results {
            assert!(Arc::ptr_eq(result.as_ref().unwrap(), &first));
        }
    }

    #[tokio::test]
    async fn test_failures_are_cached_and_counted() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert_status("https://x.test/404.png", 404);
        let counters = Arc::new(ProgressCounters::new());
        let store = ResourceStore::new(fetcher.clone(), counters.clone(), "");

        assert!(store.create("https://x.test/404.png").await.is_none());
        assert!(store.create("https://x.test/404.png").await.is_none());

        assert_eq!(fetcher.calls("https://x.test/404.png"), 1);
        assert_eq!(
            counters.progress(),
            Progress {
                download_count: 1,
                downloaded_count: 0,
                failed_count: 1,
            }
        );
        assert!(store.resources().is_empty());
    }

    #[tokio::test]
    async fn test_update_content_replaces_output_but_not_source() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/s.css", "text/css", "body{}");
        let store = store_with(fetcher);

        let original = store.create("https://x.test/s.css").await.unwrap();
        let updated = store.update_content(&original, "body { }");

        let again = store.create("https://x.test/s.css").await.unwrap();
        assert_eq!(again.content(), &Bytes::from("body{}"));

        let resources = store.resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].storage_path(), updated.storage_path());
        assert_eq!(resources[0].content(), &Bytes::from("body { }"));
    }

    #[tokio::test]
    async fn test_identical_content_is_stored_once() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/b.png", "image/png", "pixels");
        fetcher.insert("https://x.test/a.png", "image/png", "pixels");
        let store = store_with(fetcher);

        let a = store.create("https://x.test/a.png").await.unwrap();
        let b = store.create("https://x.test/b.png").await.unwrap();
        assert_eq!(a.src(), b.src());

        let resources = store.resources();
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].source_url(), "https://x.test/a.png");
    }

    #[tokio::test]
    async fn test_fetch_data_url() {
        let fetcher = Arc::new(MemoryFetcher::new());
        fetcher.insert("https://x.test/favicon.ico", "image/x-icon; q=1", "ico");
        let store = store_with(fetcher);

        assert_eq!(
            store.fetch_data_url("https://x.test/favicon.ico").await.as_deref(),
            Some("data:image/x-icon;base64,aWNv")
        );
        assert_eq!(
            store.fetch_data_url("data:image/png;base64,AA").await.as_deref(),
            Some("data:image/png;base64,AA")
        );
        assert!(store.fetch_data_url("https://x.test/none.ico").await.is_none());
        // Data URLs are not stored as resources
        assert!(store.resources().is_empty());
    }
}
