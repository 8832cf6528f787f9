//! Web Page Snapshot Pipeline
//!
//! Turns a captured page (markup plus the documents of its frames) into a
//! self-contained snapshot: every external reference rewritten to a
//! content-addressed local resource or a `data:` URI, scripts gone, text
//! extracted for search.
//!
//! ## Architecture
//!
//! ```text
//! RawDocument ──► Document ──► walk (concurrent per node)
//!                    │            ├─ UrlResolver   (base / absolute URLs)
//!                    │            ├─ ResourceStore (fetch once, sha256 path)
//!                    │            ├─ CssSanitizer  (rules, imports, fonts)
//!                    │            └─ nested Document per iframe
//!                    ▼
//!                 Snapshot ──► batch_resources (upload batches)
//! ```
//!
//! Failures stay local: a dead link loses its attribute, a bad CSS rule
//! disappears, a frame that cannot be inlined keeps an empty `src`. The
//! snapshot itself always comes out.

pub mod config;
pub mod css;
pub mod document;
pub mod error;
pub mod events;
pub mod fetch;
pub mod resolver;
pub mod resource;
pub mod snapshot;

pub use config::SnapshotConfig;
pub use css::CssSanitizer;
pub use document::{Document, SnapshotContext};
pub use error::{Result, SnapshotError};
pub use events::{EventBus, Progress, ProgressCounters, ProgressSink, SilentProgress, SnapshotEvent};
pub use fetch::{FetchError, FetchedBody, Fetcher, HttpFetcher, MemoryFetcher};
pub use resolver::UrlResolver;
pub use resource::{Resource, ResourceStore};
pub use snapshot::{
    batch_resources, CapturedPage, RawDocument, ResourceBatch, ResourceMeta, Snapshot, SnapshotResource,
    Snapshotter,
};
