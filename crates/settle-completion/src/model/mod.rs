//! Domain models for resource completion.
//!
//! # Design
//! - The handler never inspects a resource beyond its [`ResourceKey`] and `Debug` output.
//! - Outcomes are consumed by value so each one is completed at most once.
//! - A failure may or may not carry an error; the distinction decides whether a
//!   diagnostic report is emitted, never whether rollback runs.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::BoxError;

/// Stable identity of a consumed resource, derived from its name.
///
/// The key never includes the resource's transient location, so a file moved
/// by commit keeps the same key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Borrow the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the key, returning the owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourceKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ResourceKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// View of a resource required by the completion handler.
pub trait Resource: fmt::Debug + Send + Sync {
    /// Deduplication key of the resource.
    fn key(&self) -> ResourceKey;
}

/// A file consumed from an endpoint directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileResource {
    name: String,
    path: PathBuf,
}

impl FileResource {
    /// Describe a file by its endpoint-relative name and its current absolute path.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Describe a file located under `root`, naming it by its relative path.
    ///
    /// Path segments are joined with `/` so keys are identical across platforms.
    /// Returns `None` when `path` is not strictly inside `root`.
    #[must_use]
    pub fn under_root(root: &Path, path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let relative = path.strip_prefix(root).ok()?;
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => {
                    segments.push(segment.to_string_lossy().into_owned());
                }
                Component::CurDir => {}
                _ => return None,
            }
        }
        if segments.is_empty() {
            return None;
        }
        Some(Self {
            name: segments.join("/"),
            path,
        })
    }

    /// Endpoint-relative file name; the deduplication key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current absolute location of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Resource for FileResource {
    fn key(&self) -> ResourceKey {
        ResourceKey::from(self.name.as_str())
    }
}

/// Processing status carried by an outcome.
#[derive(Debug)]
pub enum OutcomeStatus {
    /// Processing succeeded.
    Succeeded,
    /// Processing failed.
    Failed {
        /// Cause of the failure; `None` when an upstream layer already handled it.
        error: Option<BoxError>,
    },
}

/// Result of having attempted to process one resource.
#[derive(Debug)]
pub struct ProcessingOutcome<R> {
    resource: R,
    status: OutcomeStatus,
}

impl<R> ProcessingOutcome<R> {
    /// Outcome for a resource whose processing succeeded.
    #[must_use]
    pub const fn succeeded(resource: R) -> Self {
        Self {
            resource,
            status: OutcomeStatus::Succeeded,
        }
    }

    /// Outcome for a resource whose processing failed with `error`.
    #[must_use]
    pub fn failed(resource: R, error: impl Into<BoxError>) -> Self {
        Self {
            resource,
            status: OutcomeStatus::Failed {
                error: Some(error.into()),
            },
        }
    }

    /// Outcome for a failure that carries no error object.
    #[must_use]
    pub const fn failed_handled(resource: R) -> Self {
        Self {
            resource,
            status: OutcomeStatus::Failed { error: None },
        }
    }

    /// Resource the outcome refers to.
    #[must_use]
    pub const fn resource(&self) -> &R {
        &self.resource
    }

    /// Whether processing failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self.status, OutcomeStatus::Failed { .. })
    }

    /// Processing error, present only for failures that carry one.
    #[must_use]
    pub fn error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match &self.status {
            OutcomeStatus::Failed { error: Some(error) } => Some(error.as_ref()),
            _ => None,
        }
    }

    /// Split the outcome into its resource and status.
    #[must_use]
    pub fn into_parts(self) -> (R, OutcomeStatus) {
        (self.resource, self.status)
    }
}

/// Context handed to the strategy for one completion call.
#[derive(Clone, Debug)]
pub struct CompletionContext {
    /// Unique identifier of this completion call.
    pub completion_id: Uuid,
    /// Endpoint the resource was consumed from.
    pub endpoint: Arc<str>,
    /// Whether processing of the resource failed.
    pub processing_failed: bool,
    /// When the handler received the outcome.
    pub received_at: DateTime<Utc>,
}

impl CompletionContext {
    /// Fresh context for a completion on `endpoint`.
    #[must_use]
    pub fn new(endpoint: Arc<str>, processing_failed: bool) -> Self {
        Self {
            completion_id: Uuid::new_v4(),
            endpoint,
            processing_failed,
            received_at: Utc::now(),
        }
    }
}

/// Terminal state reached by one completion call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Key recorded (when tracking is enabled) and strategy commit succeeded.
    Committed,
    /// A rollback was attempted, whatever its own result.
    RolledBack,
}

impl Disposition {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}
