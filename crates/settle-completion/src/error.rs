//! # Design
//!
//! - Provide structured, constant-message errors for the completion protocol.
//! - Carry the resource key and failing operation as fields so reports are
//!   reproducible without parsing messages.
//! - Preserve source errors without interpolating context into error messages.

use std::error::Error as StdError;

use thiserror::Error;

use crate::model::ResourceKey;

/// Boxed error type accepted from the processing pipeline and collaborators.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Result type for idempotent repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Result type for commit/rollback strategy operations.
pub type StrategyResult<T> = Result<T, StrategyError>;

/// Failure raised by an idempotent repository.
#[derive(Debug, Error)]
#[error("idempotent repository failure")]
pub struct RepositoryError {
    /// Repository operation that failed (`add`, `contains`, `remove`, ...).
    pub operation: &'static str,
    /// Underlying cause.
    pub source: BoxError,
}

impl RepositoryError {
    /// Wrap a cause raised while performing `operation`.
    #[must_use]
    pub fn new(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    pub(crate) fn panicked(operation: &'static str, message: String) -> Self {
        Self::new(operation, Panicked::new(message))
    }
}

/// Failure raised by a commit/rollback strategy.
#[derive(Debug, Error)]
#[error("commit/rollback strategy failure")]
pub struct StrategyError {
    /// Strategy step that failed (for example `commit.move`).
    pub operation: &'static str,
    /// Underlying cause.
    pub source: BoxError,
}

impl StrategyError {
    /// Wrap a cause raised while performing `operation`.
    #[must_use]
    pub fn new(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self {
            operation,
            source: source.into(),
        }
    }

    pub(crate) fn panicked(operation: &'static str, message: String) -> Self {
        Self::new(operation, Panicked::new(message))
    }
}

/// A collaborator panicked; the panic was contained at the call boundary.
#[derive(Debug, Error)]
#[error("collaborator panicked")]
pub struct Panicked {
    /// Panic payload, exposed as the error source so rendered chains keep it.
    #[source]
    pub payload: PanicPayload,
}

impl Panicked {
    fn new(message: String) -> Self {
        Self {
            payload: PanicPayload(message),
        }
    }

    /// Panic payload rendered as text.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.payload.0
    }
}

/// Text of a contained panic.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct PanicPayload(pub String);

/// Classification of errors handed to the exception reporter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The business processing of the resource failed.
    Processing,
    /// Recording the key or running the strategy commit failed.
    Commit,
    /// The strategy rollback failed.
    Rollback,
}

impl ErrorKind {
    /// Stable label used in logs, metrics and events.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }
}

/// Errors produced or observed while completing a resource.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The original processing failure carried by the outcome.
    #[error("resource processing failed")]
    Processing {
        /// Key of the resource that failed processing.
        key: ResourceKey,
        /// Error raised by the processing pipeline.
        source: BoxError,
    },
    /// Writing the key to the idempotent repository failed.
    #[error("idempotent repository write failed")]
    Repository {
        /// Key that could not be recorded.
        key: ResourceKey,
        /// Repository failure.
        source: RepositoryError,
    },
    /// The strategy failed to commit the resource.
    #[error("commit strategy failed")]
    Commit {
        /// Key of the resource being committed.
        key: ResourceKey,
        /// Strategy failure.
        source: StrategyError,
    },
    /// The strategy failed to roll the resource back.
    #[error("rollback strategy failed")]
    Rollback {
        /// Key of the resource being rolled back.
        key: ResourceKey,
        /// Strategy failure.
        source: StrategyError,
    },
}

impl CompletionError {
    /// Classification of the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Processing { .. } => ErrorKind::Processing,
            Self::Repository { .. } | Self::Commit { .. } => ErrorKind::Commit,
            Self::Rollback { .. } => ErrorKind::Rollback,
        }
    }

    /// Key of the resource the error belongs to.
    #[must_use]
    pub const fn key(&self) -> &ResourceKey {
        match self {
            Self::Processing { key, .. }
            | Self::Repository { key, .. }
            | Self::Commit { key, .. }
            | Self::Rollback { key, .. } => key,
        }
    }

    /// Render the error and all of its sources as `outer: inner: root`.
    #[must_use]
    pub fn chain(&self) -> String {
        let mut rendered = self.to_string();
        let mut current = self.source();
        while let Some(source) = current {
            rendered.push_str(": ");
            rendered.push_str(&source.to_string());
            current = source.source();
        }
        rendered
    }
}
