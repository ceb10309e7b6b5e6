//! Event payload types emitted while completing consumed resources.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Identifier assigned to each event emitted by the bus.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
pub const DEFAULT_REPLAY_CAPACITY: usize = 1_024;

/// Typed completion events surfaced to subscribers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// The resource was committed and its consumption is durable.
    ResourceCommitted {
        /// Identifier of the completion call.
        completion_id: Uuid,
        /// Endpoint the resource was consumed from.
        endpoint: String,
        /// Deduplication key of the resource.
        key: String,
    },
    /// A rollback was attempted for the resource.
    ResourceRolledBack {
        /// Identifier of the completion call.
        completion_id: Uuid,
        /// Endpoint the resource was consumed from.
        endpoint: String,
        /// Deduplication key of the resource.
        key: String,
        /// Whether processing itself failed (as opposed to a failed commit).
        processing_failed: bool,
    },
    /// An error raised during completion was handed to the dead-letter sink.
    CompletionErrorReported {
        /// Deduplication key of the resource the error belongs to.
        key: String,
        /// Error classification (`processing`, `commit`, `rollback`).
        kind: String,
        /// Rendered error chain.
        message: String,
    },
}

impl Event {
    /// Machine-friendly discriminator for subscribers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ResourceCommitted { .. } => "resource_committed",
            Self::ResourceRolledBack { .. } => "resource_rolled_back",
            Self::CompletionErrorReported { .. } => "completion_error_reported",
        }
    }

    /// Deduplication key of the resource the event refers to.
    #[must_use]
    pub fn key(&self) -> &str {
        match self {
            Self::ResourceCommitted { key, .. }
            | Self::ResourceRolledBack { key, .. }
            | Self::CompletionErrorReported { key, .. } => key,
        }
    }
}

/// Metadata wrapper around events. Each envelope tracks the event id and emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct EventEnvelope {
    /// Monotonic identifier assigned to the wrapped event.
    pub id: EventId,
    /// Timestamp recording when the envelope was produced.
    pub timestamp: DateTime<Utc>,
    /// Wrapped event payload.
    pub event: Event,
}
