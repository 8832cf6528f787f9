//! Snapshot assembly - captured page in, self-contained snapshot out

use bytes::Bytes;
use dom::TEXT_BLOCK_DELIMITER;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::SnapshotConfig;
use crate::document::{Document, SnapshotContext};
use crate::error::Result;
use crate::events::{ProgressSink, SilentProgress};
use crate::fetch::{Fetcher, HttpFetcher};
use crate::resource::Resource;

/// One frame as handed over by the capture side
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawDocument {
    #[serde(alias = "html")]
    pub markup: String,
    /// Visible text as extracted by the capture side (may be empty)
    pub text: String,
    pub url: String,
    pub doctype: String,
    pub title: String,
    /// Attributes of the `html` element
    pub attributes: BTreeMap<String, String>,
    pub iframe_count: usize,
}

/// Top-level page plus the documents of its navigated frames
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapturedPage {
    pub page: RawDocument,
    pub frames: Vec<RawDocument>,
}

impl CapturedPage {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A stored resource of a finished snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotResource {
    /// `resources/<h0h1>/<hash>.<ext>`
    pub path: String,
    pub source_url: String,
    pub mime_type: String,
    pub filename: String,
    pub extension: String,
    pub sha256: String,
    #[serde(skip)]
    pub content: Bytes,
}

impl From<&Resource> for SnapshotResource {
    fn from(resource: &Resource) -> Self {
        Self {
            path: resource.storage_path().to_string(),
            source_url: resource.source_url().to_string(),
            mime_type: resource.mime_type().to_string(),
            filename: resource.filename().to_string(),
            extension: resource.extension().to_string(),
            sha256: resource.sha256().to_string(),
            content: resource.content().clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: Uuid,
    pub url: String,
    pub title: String,
    /// Doctype plus serialized markup
    pub dom: String,
    /// `data:` URI of the page icon
    pub favicon: Option<String>,
    pub text: String,
    /// Ordered by storage path
    pub resources: Vec<SnapshotResource>,
    pub multimedia_count: usize,
}

impl Snapshot {
    pub fn total_resource_size(&self) -> usize {
        self.resources.iter().map(|r| r.content.len()).sum()
    }
}

/// Per-member upload metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceMeta {
    pub filename: String,
    pub mimetype: String,
    pub extension: String,
}

impl From<&SnapshotResource> for ResourceMeta {
    fn from(resource: &SnapshotResource) -> Self {
        Self {
            filename: resource.filename.clone(),
            mimetype: resource.mime_type.clone(),
            extension: resource.extension.clone(),
        }
    }
}

/// Resources uploaded together in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceBatch<'a> {
    pub resources: Vec<&'a SnapshotResource>,
    pub size: usize,
}

impl ResourceBatch<'_> {
    pub fn meta(&self) -> Vec<ResourceMeta> {
        self.resources.iter().map(|r| ResourceMeta::from(*r)).collect()
    }
}

/// Split `resources` into upload batches of at most `limit` bytes, keeping
/// order. A batch is closed before the member that would overflow it; a
/// member larger than `limit` travels alone.
pub fn batch_resources(resources: &[SnapshotResource], limit: usize) -> Vec<ResourceBatch<'_>> {
    let mut batches = Vec::new();
    let mut current = ResourceBatch {
        resources: Vec::new(),
        size: 0,
    };

    for resource in resources {
        let size = resource.content.len();
        if !current.resources.is_empty() && current.size + size > limit {
            batches.push(std::mem::replace(
                &mut current,
                ResourceBatch {
                    resources: Vec::new(),
                    size: 0,
                },
            ));
        }
        current.size += size;
        current.resources.push(resource);
    }

    if !current.resources.is_empty() {
        batches.push(current);
    }
    batches
}

/// Pipeline entry point
pub struct Snapshotter {
    config: Arc<SnapshotConfig>,
    fetcher: Arc<dyn Fetcher>,
    progress: Arc<dyn ProgressSink>,
}

impl Snapshotter {
    /// HTTP-backed snapshotter
    pub fn new(config: SnapshotConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpFetcher::new(&config)?);
        Ok(Self {
            config: Arc::new(config),
            fetcher,
            progress: Arc::new(SilentProgress),
        })
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub async fn snapshot_captured(&self, captured: &CapturedPage) -> Result<Snapshot> {
        self.snapshot(&captured.page, captured.frames.clone()).await
    }

    /// Transform `page`, inlining the matching `frames`
    pub async fn snapshot(&self, page: &RawDocument, frames: Vec<RawDocument>) -> Result<Snapshot> {
        tracing::info!("[Snapshotter] 📸 Snapshotting {} ({} frames)", page.url, frames.len());

        let context = SnapshotContext {
            config: self.config.clone(),
            fetcher: self.fetcher.clone(),
            progress: self.progress.clone(),
            frames: frames.into(),
        };
        let document = Document::new(page, context)?;
        document.transform().await;

        let text = if page.text.trim().is_empty() {
            document.visible_text().join(TEXT_BLOCK_DELIMITER)
        } else {
            page.text.clone()
        };
        let title = if page.title.trim().is_empty() {
            document.title().unwrap_or_default()
        } else {
            page.title.clone()
        };

        let snapshot = Snapshot {
            id: Uuid::now_v7(),
            url: page.url.clone(),
            title,
            dom: document.to_html()?,
            favicon: document.favicon(),
            text,
            resources: document
                .resources()
                .iter()
                .map(|resource| SnapshotResource::from(resource.as_ref()))
                .collect(),
            multimedia_count: document.multimedia_count(),
        };

        tracing::info!(
            "[Snapshotter] ✅ Snapshot {} done: {} resources, {} bytes of markup",
            snapshot.id,
            snapshot.resources.len(),
            snapshot.dom.len()
        );
        Ok(snapshot)
    }
}
