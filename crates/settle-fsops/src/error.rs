//! # Design
//!
//! - Messages are constant; the failing step, path and input travel as fields.
//! - Strategy failures are wrapped in `StrategyError` by the caller, so these
//!   errors surface as the source of a completion report.

use std::io;
use std::path::PathBuf;

use settle_config::ConfigError;
use thiserror::Error;

/// Result type for filesystem operations.
pub type FsOpsResult<T> = Result<T, FsOpsError>;

/// Errors produced by the local file transport.
#[derive(Debug, Error)]
pub enum FsOpsError {
    /// A filesystem call failed.
    #[error("fsops io failure")]
    Io {
        /// Step that failed (for example `move_file.copy`).
        operation: &'static str,
        /// Path the step acted on.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// A value could not be acted on.
    #[error("fsops invalid input")]
    InvalidInput {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: &'static str,
        /// Rejected value, when printable.
        value: Option<String>,
    },
    /// Settings were rejected while wiring the handler.
    #[error("fsops invalid configuration")]
    Config {
        /// Underlying configuration error.
        source: ConfigError,
    },
}

impl FsOpsError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

impl From<ConfigError> for FsOpsError {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}
