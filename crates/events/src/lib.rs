#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Event system for async communication in urpm
//!
//! This crate provides the event types and channel aliases used for
//! communication between crates. All user-visible output goes through
//! events - no direct printing is allowed outside the CLI.

use serde::{Deserialize, Serialize};

/// Type alias for event sender
pub type EventSender = tokio::sync::mpsc::UnboundedSender<Event>;

/// Type alias for event receiver
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<Event>;

/// Create a new event channel
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Phase of a package inside the RPM handoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RpmPhase {
    Prepare,
    Install,
    Remove,
    Cleanup,
}

/// Core event enum for all async communication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    // Download events
    DownloadStarted {
        url: String,
        nevra: Option<String>,
        size: Option<u64>,
        resumed_from: u64,
    },
    DownloadProgress {
        url: String,
        bytes_downloaded: u64,
        total_bytes: u64,
    },
    DownloadCompleted {
        url: String,
        size: u64,
    },
    DownloadFailed {
        url: String,
        error: String,
    },
    PeerHit {
        nevra: String,
        host: String,
        port: u16,
    },

    // Media synchronization
    SyncStarted {
        media: String,
    },
    SyncMetadataFetched {
        media: String,
        kind: String,
        bytes: u64,
    },
    SyncDiffComputed {
        media: String,
        added: usize,
        removed: usize,
        unchanged: usize,
    },
    SyncCompleted {
        media: String,
        packages: usize,
    },
    SyncFailed {
        media: String,
        error: String,
    },

    // Resolution
    ResolvingStarted {
        jobs: usize,
    },
    ChoiceRequired {
        capability: String,
        candidates: Vec<String>,
    },
    ResolvingCompleted {
        to_install: usize,
        to_upgrade: usize,
        to_erase: usize,
    },
    PackageSkipped {
        name: String,
        reason: String,
    },

    // Transaction
    TransactionStarted {
        history_id: i64,
        action: String,
    },
    RpmProgress {
        nevra: String,
        phase: RpmPhase,
        percent: u8,
    },
    TransactionCompleted {
        history_id: i64,
    },
    TransactionFailed {
        history_id: i64,
        error: String,
    },

    // Cache
    CacheEvicted {
        media: String,
        files: usize,
        bytes: u64,
    },

    // Daemon / scheduler
    PeerDiscovered {
        host: String,
        port: u16,
        machine_id: String,
    },
    PeerExpired {
        host: String,
    },
    ScheduledTaskStarted {
        task: String,
    },
    ScheduledTaskFinished {
        task: String,
        ok: bool,
    },

    // Generic
    OperationStarted {
        operation: String,
    },
    Warning {
        message: String,
        context: Option<String>,
    },
    Error {
        message: String,
        details: Option<String>,
    },
}

impl Event {
    /// Create a warning event
    pub fn warning(message: impl Into<String>) -> Self {
        Self::Warning {
            message: message.into(),
            context: None,
        }
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            details: None,
        }
    }
}

/// Helper to send events with error handling
pub trait EventSenderExt {
    /// Send an event, ignoring send errors (receiver dropped)
    fn emit(&self, event: Event);
}

impl EventSenderExt for EventSender {
    fn emit(&self, event: Event) {
        // Receiver dropped just means nobody is listening anymore
        let _ = self.send(event);
    }
}

/// Implemented by components that hold an optional event sender
pub trait EventEmitter {
    fn event_sender(&self) -> Option<&EventSender>;

    fn emit(&self, event: Event) {
        if let Some(tx) = self.event_sender() {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_channel() {
        let (tx, mut rx) = channel();

        tx.emit(Event::warning("test warning"));

        let event = rx.recv().await.unwrap();
        match event {
            Event::Warning { message, .. } => {
                assert_eq!(message, "test warning");
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::SyncDiffComputed {
            media: "core-release".to_string(),
            added: 12,
            removed: 3,
            unchanged: 4800,
        };

        let json = serde_json::to_string(&event).unwrap();
        let deserialized: Event = serde_json::from_str(&json).unwrap();

        match deserialized {
            Event::SyncDiffComputed { media, added, .. } => {
                assert_eq!(media, "core-release");
                assert_eq!(added, 12);
            }
            _ => panic!("Wrong event type"),
        }
    }
}
