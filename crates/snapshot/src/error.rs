//! Error types for the snapshot pipeline
//!
//! Nothing in here is fatal to a snapshot on its own. Each error is caught
//! at the node / rule / fetch boundary, logged, and turned into a smaller
//! output. Only the entry points (bad input, bad config) surface them.

use dom::DomError;
use thiserror::Error;

use crate::fetch::FetchError;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("DOM error: {0}")]
    Dom(#[from] DomError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Invalid URL {url:?} (base {base:?})")]
    InvalidUrl { url: String, base: String },

    #[error("Unknown CSS rule: @{0}")]
    UnknownCssRule(String),

    #[error("CSS import cycle at {0}")]
    ImportCycle(String),

    #[error("Maximum import depth exceeded: {current} > {max}")]
    MaxImportDepthExceeded { current: usize, max: usize },

    #[error("Frame cycle at {0}")]
    FrameCycle(String),

    #[error("Maximum iframe depth exceeded: {current} > {max}")]
    MaxFrameDepthExceeded { current: usize, max: usize },

    #[error("Base64 decode error: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
