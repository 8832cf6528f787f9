//! Snapshot configuration
//!
//! Plain data with sane defaults. Every field can be overridden from a JSON
//! file; missing fields keep their default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::Result;

/// Upload batches are closed before they would grow past this many bytes
pub const DEFAULT_UPLOAD_BATCH_LIMIT: usize = 7 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Prepended to `resources/..` paths written into the markup
    pub resource_link_prefix: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Nested frames deeper than this are not inlined
    pub max_frame_depth: usize,
    /// Longest `@import` chain followed before giving up
    pub max_import_depth: usize,
    pub upload_batch_limit: usize,
    /// Try `/favicon.ico` when the page declares no icon
    pub fetch_favicon_fallback: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            resource_link_prefix: "../../".to_string(),
            user_agent: concat!("snapshot/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            max_frame_depth: 5,
            max_import_depth: 16,
            upload_batch_limit: DEFAULT_UPLOAD_BATCH_LIMIT,
            fetch_favicon_fallback: true,
        }
    }
}

impl SnapshotConfig {
    /// Load a JSON config file on top of the defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: SnapshotConfig =
            serde_json::from_str(r#"{"max_frame_depth": 2, "resource_link_prefix": ""}"#).unwrap();

        assert_eq!(config.max_frame_depth, 2);
        assert_eq!(config.resource_link_prefix, "");
        assert_eq!(config.max_import_depth, 16);
        assert_eq!(config.upload_batch_limit, 7 * 1024 * 1024);
        assert!(config.fetch_favicon_fallback);
    }

    #[test]
    fn test_from_missing_file_fails() {
        assert!(SnapshotConfig::from_file("/nonexistent/snapshot.json").is_err());
    }
}
