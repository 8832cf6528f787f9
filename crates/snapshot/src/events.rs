//! Progress events - what the pipeline reports while it runs
//!
//! Design: the Resource Store and Document Transformer get a
//! `ProgressSink` at construction and call it synchronously on every state
//! transition. No global counters. Pick a sink:
//! - `ProgressCounters`: atomic download/success/failure tallies for a UI
//! - `EventBus`: tokio broadcast fan-out for async subscribers
//! - `SilentProgress`: nobody is listening

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::broadcast;

/// Snapshot events that can be dispatched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotEvent {
    DownloadStarted { url: String },
    DownloadFinished { url: String },
    DownloadFailed { url: String },
    FrameInlined { url: String },
    RuleDropped { reason: String },
}

/// Receiver of progress events
pub trait ProgressSink: Send + Sync {
    fn on_event(&self, event: &SnapshotEvent);
}

/// Ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl ProgressSink for SilentProgress {
    fn on_event(&self, _event: &SnapshotEvent) {}
}

/// Point-in-time copy of the download counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub download_count: usize,
    pub downloaded_count: usize,
    pub failed_count: usize,
}

/// Atomic download counters
#[derive(Debug, Default)]
pub struct ProgressCounters {
    started: AtomicUsize,
    finished: AtomicUsize,
    failed: AtomicUsize,
}

impl ProgressCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(&self) -> Progress {
        Progress {
            download_count: self.started.load(Ordering::SeqCst),
            downloaded_count: self.finished.load(Ordering::SeqCst),
            failed_count: self.failed.load(Ordering::SeqCst),
        }
    }
}

impl ProgressSink for ProgressCounters {
    fn on_event(&self, event: &SnapshotEvent) {
        let counter = match event {
            SnapshotEvent::DownloadStarted { .. } => &self.started,
            SnapshotEvent::DownloadFinished { .. } => &self.finished,
            SnapshotEvent::DownloadFailed { .. } => &self.failed,
            SnapshotEvent::FrameInlined { .. } | SnapshotEvent::RuleDropped { .. } => return,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Simple event bus using tokio broadcast channel
pub struct EventBus {
    tx: broadcast::Sender<SnapshotEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: SnapshotEvent) {
        let _ = self.tx.send(event); // Ignore error if no subscribers
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<SnapshotEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for EventBus {
    fn on_event(&self, event: &SnapshotEvent) {
        self.publish(event.clone());
    }
}
